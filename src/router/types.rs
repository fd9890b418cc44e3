use std::str::FromStr;
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Static mapping from path prefix to service name.
///
/// Prefixes match on segment boundaries only (`/items` matches `/items` and `/items/1`, never
/// `/itemsx`); the longest matching prefix wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub prefix: String,
    pub service: String,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.insert("/users", "user-service");
        table.insert("/items", "catalog-service");
        table.insert("/books", "catalog-service");
        table.insert("/loans", "loan-service");
        table.insert("/borrows", "loan-service");
        table.insert("/logs", "logging-service");
        table
    }

    /// Adds or replaces the route for `prefix`.
    pub fn insert(&mut self, prefix: &str, service: &str) {
        let prefix = normalize_prefix(prefix);
        match self.routes.iter_mut().find(|route| route.prefix == prefix) {
            Some(route) => route.service = service.to_string(),
            None => self.routes.push(Route {
                prefix,
                service: service.to_string(),
            }),
        }
    }

    pub fn lookup(&self, path: &str) -> Option<&str> {
        self.routes
            .iter()
            .filter(|route| matches_prefix(path, &route.prefix))
            .max_by_key(|route| route.prefix.len())
            .map(|route| route.service.as_str())
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Distinct service names reachable through the table.
    pub fn services(&self) -> Vec<&str> {
        let mut services: Vec<&str> = self.routes.iter().map(|r| r.service.as_str()).collect();
        services.sort();
        services.dedup();
        services
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn matches_prefix(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

impl FromStr for Route {
    type Err = String;

    /// Parses `/prefix=service-name`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, service) = s
            .split_once('=')
            .ok_or_else(|| format!("expected /prefix=service, got '{}'", s))?;

        let service = service.trim();
        if prefix.trim().is_empty() || service.is_empty() {
            return Err(format!("expected /prefix=service, got '{}'", s));
        }

        Ok(Route {
            prefix: normalize_prefix(prefix),
            service: service.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Name the gateway registers under and excludes from probing.
    pub service_name: String,
    /// Per-request budget for forwarded calls.
    pub request_timeout: Duration,
    /// Route forwarded calls through a per-service circuit breaker.
    pub use_breaker: bool,
    /// Largest request body the gateway will buffer.
    pub body_limit: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            service_name: "api-gateway".to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            use_breaker: true,
            body_limit: 10 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_boundary_matching() {
        let table = RouteTable::with_defaults();

        assert_eq!(table.lookup("/items"), Some("catalog-service"));
        assert_eq!(table.lookup("/items/42/units"), Some("catalog-service"));
        assert_eq!(table.lookup("/itemsx"), None);
        assert_eq!(table.lookup("/"), None);
        assert_eq!(table.lookup("/borrows/me"), Some("loan-service"));
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut table = RouteTable::with_defaults();
        table.insert("/loans/reports/", "report-service");

        assert_eq!(table.lookup("/loans/reports/daily"), Some("report-service"));
        assert_eq!(table.lookup("/loans/abc"), Some("loan-service"));
    }

    #[test]
    fn test_insert_replaces_existing_prefix() {
        let mut table = RouteTable::with_defaults();
        let before = table.routes().len();
        table.insert("users", "identity-service");

        assert_eq!(table.routes().len(), before);
        assert_eq!(table.lookup("/users/1"), Some("identity-service"));
    }

    #[test]
    fn test_parse_route() {
        let route: Route = "/reports=report-service".parse().unwrap();
        assert_eq!(route.prefix, "/reports");
        assert_eq!(route.service, "report-service");

        assert!("/reports".parse::<Route>().is_err());
        assert!("/reports=".parse::<Route>().is_err());
    }
}
