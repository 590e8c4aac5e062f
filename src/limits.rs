//! Configurable size limits, defaults taken verbatim from
//! `examples/original_source/Src/Http/HttpRequestLimits.h`.

/// Size and count limits enforced by the parser. Shared read-only across
/// all connection handlers on a worker via `Arc`, matching spec.md §5's
/// "immutable once construction completes" requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpRequestLimits {
    /// Combined path + query byte length.
    pub max_url_size: usize,
    /// Per header field name.
    pub max_header_name_size: usize,
    /// Per header field value.
    pub max_header_value_size: usize,
    /// Maximum number of header lines per request.
    pub max_header_line_count: usize,
    /// Per trailer field name.
    pub max_trailer_name_size: usize,
    /// Per trailer field value.
    pub max_trailer_value_size: usize,
    /// Maximum number of trailer lines.
    pub max_trailer_line_count: usize,
    /// Bytes permitted on a single chunk metadata line.
    pub max_chunk_metadata_size: usize,
    /// Cumulative bytes for an entire request (line + headers + body).
    pub max_request_size: usize,
    /// Cumulative bytes for the body alone.
    pub max_body_size: usize,
}

impl Default for HttpRequestLimits {
    fn default() -> Self {
        Self {
            max_url_size: 8192,
            max_header_name_size: 1024,
            max_header_value_size: 8192,
            max_header_line_count: 64,
            max_trailer_name_size: 1024,
            max_trailer_value_size: 8192,
            max_trailer_line_count: 64,
            max_chunk_metadata_size: 1024,
            max_request_size: 32 * 1024 * 1024,
            max_body_size: 32 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod test {
    use super::HttpRequestLimits;

    #[test]
    fn defaults_match_documented_table() {
        let limits = HttpRequestLimits::default();
        assert_eq!(8192, limits.max_url_size);
        assert_eq!(1024, limits.max_header_name_size);
        assert_eq!(8192, limits.max_header_value_size);
        assert_eq!(64, limits.max_header_line_count);
        assert_eq!(1024, limits.max_trailer_name_size);
        assert_eq!(8192, limits.max_trailer_value_size);
        assert_eq!(64, limits.max_trailer_line_count);
        assert_eq!(1024, limits.max_chunk_metadata_size);
        assert_eq!(32 * 1024 * 1024, limits.max_request_size);
        assert_eq!(32 * 1024 * 1024, limits.max_body_size);
    }
}
