//! HTTP/1.1 is the only accepted version (spec.md §3); there is no
//! multi-version dispatch left to benchmark in isolation, so this measures
//! the request-line state (method + target + version validation) alone,
//! the unit that absorbed the old per-version decoder.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use halcyon::limits::HttpRequestLimits;
use halcyon::parser::engine::{InboundCursor, RequestParser};

const LINES: [&[u8]; 2] = [b"GET / HTTP/1.1\r\n", b"GET /api/v1.0/weather/forecast HTTP/1.1\r\n"];

struct SliceCursor<'a>(&'a [u8], usize);

impl<'a> InboundCursor for SliceCursor<'a> {
    fn available(&self) -> &[u8] {
        &self.0[self.1..]
    }
    fn advance(&mut self, n: usize) {
        self.1 += n;
    }
}

fn benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_line");
    for line in LINES {
        group.bench_with_input(BenchmarkId::new("parse", line.len()), black_box(&line), |b, i| {
            b.iter(|| {
                let mut parser = RequestParser::new(HttpRequestLimits::default());
                let mut cursor = SliceCursor(i, 0);
                let _ = parser.parse(&mut cursor);
            })
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
