use std::str::from_utf8;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use halcyon::parser::request::{parse_method_masked, Method};

const LINES: [&[u8]; 7] = [
    b"GET / HTTP/1.1\r\n",
    b"PUT /x HTTP/1.1\r\n",
    b"POST /x HTTP/1.1\r\n",
    b"HEAD /x HTTP/1.1\r\n",
    b"PATCH /x HTTP/1.1\r\n",
    b"DELETE /x HTTP/1.1\r\n",
    b"OPTIONS /x HTTP/1.1\r\n",
];

fn benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("method");
    for line in LINES {
        let name = from_utf8(&line[..line.iter().position(|&b| b == b' ').unwrap()]).unwrap();

        group.bench_with_input(BenchmarkId::new("token_match", name), black_box(&line), |b, i| {
            b.iter(|| {
                let sp = i.iter().position(|&b| b == b' ').unwrap();
                let _: Option<Method> = Method::from_token(&i[..sp]);
            })
        });

        group.bench_with_input(BenchmarkId::new("masked_read", name), black_box(&line), |b, i| {
            b.iter(|| {
                let _: Option<Method> = parse_method_masked(i);
            })
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
