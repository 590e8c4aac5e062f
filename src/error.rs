//! Error taxonomy shared by the parser, broker, and connection handler.

use std::fmt;

/// The four error kinds the core ever surfaces to an error handler.
///
/// `NoError` is a sentinel value, not a real failure; it lets callers store
/// "no error yet" in the same type they'll eventually report a real error
/// with, matching `examples/original_source/Src/Http/HttpServer.h`'s
/// `ServerError` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Sentinel: no error has occurred.
    NoError,
    /// Wire syntax invalid, a forbidden header combination, an unsupported
    /// method, or an unroutable path.
    MalformedRequest,
    /// A configured limit (URL size, header count, body size, ...) was
    /// exceeded.
    TooBigRequest,
    /// The idle or request timer elapsed.
    RequestTimeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoError => "no error",
            Self::MalformedRequest => "malformed request",
            Self::TooBigRequest => "request exceeds configured limits",
            Self::RequestTimeout => "request timed out",
        })
    }
}

/// Invoked by the connection handler before a connection carrying a
/// protocol-level error is torn down. Implementations must not block —
/// they run on the worker's single thread.
pub trait ErrorHandler {
    /// Report `kind` for the peer at `client_ip:client_port`.
    fn handle_error(&self, kind: ErrorKind, client_ip: std::net::IpAddr, client_port: u16);
}

impl<F> ErrorHandler for F
where
    F: Fn(ErrorKind, std::net::IpAddr, u16),
{
    fn handle_error(&self, kind: ErrorKind, client_ip: std::net::IpAddr, client_port: u16) {
        (self)(kind, client_ip, client_port)
    }
}

/// A no-op error handler for tests and demos that don't care about
/// observability.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullErrorHandler;

impl ErrorHandler for NullErrorHandler {
    fn handle_error(&self, _kind: ErrorKind, _client_ip: std::net::IpAddr, _client_port: u16) {}
}
