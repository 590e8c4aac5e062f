#![no_main]

use halcyon::limits::HttpRequestLimits;
use halcyon::parser::engine::{InboundCursor, RequestParser};
use libfuzzer_sys::fuzz_target;

struct SliceCursor<'a>(&'a [u8], usize);

impl<'a> InboundCursor for SliceCursor<'a> {
    fn available(&self) -> &[u8] {
        &self.0[self.1..]
    }
    fn advance(&mut self, n: usize) {
        self.1 += n;
    }
}

fuzz_target!(|data: &[u8]| {
    let mut parser = RequestParser::new(HttpRequestLimits::default());
    let mut cursor = SliceCursor(data, 0);
    let _ = parser.parse(&mut cursor);
});
