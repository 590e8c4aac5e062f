//! Longest-prefix-match request router (component K).
//!
//! Grounded on `examples/original_source/Src/Http/HttpRequestRouter.{h,cpp}`:
//! a fixed-size array of per-method route lists, each kept sorted in
//! descending lexicographic order by path so the first stored path that is
//! a prefix of the request path is, by construction, the longest matching
//! prefix. Handlers are generic over `H` rather than a function-pointer
//! typedef — this crate's route handler type (a closure capturing worker
//! state) is defined by `connection_handler`, not by the router itself, so
//! [`HttpRequestRouter`] only requires `H: Clone` to hand a matched handler
//! back to the caller.

use crate::parser::request::Method;

/// Why [`HttpRequestRouter::add_route`] refused a registration, mirroring
/// the original's descriptive `m_errorMessage` (spec.md's supplemented
/// `errorMessage()`-equivalent, surfaced here as a typed error instead of a
/// string so callers can match on it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    /// The given path was empty.
    EmptyPath,
    /// The path is neither `*` on an `OPTIONS` route nor an absolute path
    /// (must start with a single `/`, no query, fragment, or authority).
    NotAbsolutePath,
}

struct RouteEntry<H> {
    path: String,
    handler: H,
}

/// Validates a path per spec.md §4.10: `*` is only valid as the sole
/// `OPTIONS`-wide route; everything else must be an absolute path with no
/// scheme, authority, query, or fragment component.
fn is_absolute_path(path: &str) -> Result<(), RouteError> {
    if path.is_empty() {
        return Err(RouteError::EmptyPath);
    }
    if !path.starts_with('/') || path.starts_with("//") {
        return Err(RouteError::NotAbsolutePath);
    }
    if path.contains(['?', '#']) {
        return Err(RouteError::NotAbsolutePath);
    }
    Ok(())
}

/// Maps `(method, path)` to a registered handler by longest-prefix match.
pub struct HttpRequestRouter<H> {
    handlers: [Vec<RouteEntry<H>>; Method::COUNT],
}

impl<H> Default for HttpRequestRouter<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> HttpRequestRouter<H> {
    /// Builds a router with no routes registered.
    pub fn new() -> Self {
        Self {
            handlers: std::array::from_fn(|_| Vec::new()),
        }
    }

    /// Registers `handler` for `(method, path)`. `path` must be `*` (valid
    /// only when `method` is `OPTIONS`) or an absolute path. Re-registering
    /// an identical path replaces its handler in place rather than
    /// inserting a duplicate entry.
    pub fn add_route(&mut self, method: Method, path: &str, handler: H) -> Result<(), RouteError> {
        if path != "*" || method != Method::Options {
            is_absolute_path(path)?;
        }
        let list = &mut self.handlers[method.index()];
        let insert_at = list.iter().position(|e| path >= e.path.as_str());
        match insert_at {
            Some(i) if list[i].path == path => list[i].handler = handler,
            Some(i) => list.insert(
                i,
                RouteEntry {
                    path: path.to_string(),
                    handler,
                },
            ),
            None => list.push(RouteEntry {
                path: path.to_string(),
                handler,
            }),
        }
        Ok(())
    }

    /// A human-readable description of `error`, for logging call sites that
    /// don't want to match on [`RouteError`] themselves.
    pub fn error_message(error: RouteError) -> &'static str {
        match error {
            RouteError::EmptyPath => "failed to add route: given path is empty",
            RouteError::NotAbsolutePath => "failed to add route: given path is not an absolute path",
        }
    }
}

impl<H: Clone> HttpRequestRouter<H> {
    /// Scans `method`'s route list head-to-tail for the first stored path
    /// that is a prefix of `path`, returning a clone of its handler. The
    /// descending sort makes this the longest matching prefix.
    pub fn get_handler(&self, method: Method, path: &[u8]) -> Option<H> {
        self.handlers[method.index()]
            .iter()
            .find(|e| path.starts_with(e.path.as_bytes()))
            .map(|e| e.handler.clone())
    }
}
