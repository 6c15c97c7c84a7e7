//! URL path resolution: `/{service}/{method}` -> `(service, method)`.

/// Service and method names resolved from a request path.
///
/// Borrows from the path, so resolving a route never allocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route<'a> {
    pub service: &'a str,
    pub method: &'a str,
}

/// Failures while resolving a request path to a registered method.
///
/// All variants map to HTTP 404 and short-circuit before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("rpc: can't find service or method")]
    MissingServiceOrMethod,
    #[error("rpc: can't find service {0}")]
    UnknownService(String),
    #[error("rpc: can't find method {0}")]
    UnknownMethod(String),
}

impl RouteError {
    /// HTTP status for every routing failure.
    pub const STATUS: u16 = 404;
}

/// Resolves a raw URL path into service and method names.
///
/// One leading and one trailing slash are stripped, then the remainder is
/// split on its first slash. Anything after that slash belongs to the method
/// segment, so `/a/b/c` resolves to `("a", "b/c")`.
///
/// # Errors
///
/// Returns [`RouteError::MissingServiceOrMethod`] when either segment is empty.
///
/// # Examples
///
/// ```
/// use postwire_core::route::parse_route;
///
/// let route = parse_route("/Arith/Multiply/").unwrap();
/// assert_eq!(route.service, "Arith");
/// assert_eq!(route.method, "Multiply");
/// assert!(parse_route("/Arith").is_err());
/// ```
pub fn parse_route(path: &str) -> Result<Route<'_>, RouteError> {
    let path = path.strip_prefix('/').unwrap_or(path);
    let path = path.strip_suffix('/').unwrap_or(path);

    match path.split_once('/') {
        Some((service, method)) if !service.is_empty() && !method.is_empty() => {
            Ok(Route { service, method })
        }
        _ => Err(RouteError::MissingServiceOrMethod),
    }
}
