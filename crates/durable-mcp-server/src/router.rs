//! Api-version-aware routing.
//!
//! Each api-version owns a complete route table. A version that declares a
//! base starts from a deep clone of the base's table and its derive function
//! may add, overwrite, or delete routes. Cloning rather than chaining lets a
//! new version diverge freely without a per-request fallback walk and
//! without mutating its predecessor.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;
use chrono::{DateTime, Utc};

use durable_mcp_core::ServiceError;

use crate::pipeline::ServerResult;
use crate::reqres::{normalize_action_path, HeaderSpec, RequestContext};

/// A route's terminal handler.
#[async_trait]
pub trait Operation: Send + Sync {
    async fn invoke(&self, ctx: &mut RequestContext) -> ServerResult<()>;
}

/// One registered route: URL pattern + method + static header constraints.
#[derive(Clone)]
pub struct Route {
    pub pattern: &'static str,
    pub method: Method,
    pub headers: HeaderSpec,
    pub handler: Arc<dyn Operation>,
}

/// Outcome of a table lookup.
pub enum Lookup {
    Found {
        route: Route,
        path_vars: HashMap<String, String>,
    },
    MethodNotAllowed,
    NotFound,
}

/// Route table for one api-version, keyed by normalized pattern then method.
#[derive(Clone, Default)]
pub struct RouteTable {
    routes: HashMap<String, HashMap<Method, Route>>,
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("patterns", &self.routes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or overwrite) a route. Action-suffixed patterns like
    /// `…/{id}:advance` are normalized the same way request paths are.
    pub fn insert(
        &mut self,
        method: Method,
        pattern: &'static str,
        headers: HeaderSpec,
        handler: Arc<dyn Operation>,
    ) {
        let key = normalize_action_path(pattern);
        self.routes.entry(key).or_default().insert(
            method.clone(),
            Route {
                pattern,
                method,
                headers,
                handler,
            },
        );
    }

    /// Delete one method from a pattern, dropping the pattern when empty.
    pub fn remove(&mut self, method: &Method, pattern: &str) {
        let key = normalize_action_path(pattern);
        if let Some(methods) = self.routes.get_mut(&key) {
            methods.remove(method);
            if methods.is_empty() {
                self.routes.remove(&key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Match a normalized request path + method.
    pub fn lookup(&self, method: &Method, path: &str) -> Lookup {
        let mut url_matched = false;
        for (pattern, methods) in &self.routes {
            let Some(path_vars) = match_pattern(pattern, path) else {
                continue;
            };
            url_matched = true;
            if let Some(route) = methods.get(method) {
                return Lookup::Found {
                    route: route.clone(),
                    path_vars,
                };
            }
        }
        if url_matched {
            Lookup::MethodNotAllowed
        } else {
            Lookup::NotFound
        }
    }
}

fn match_pattern(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_segments: Vec<&str> = pattern.split('/').collect();
    let path_segments: Vec<&str> = path.split('/').collect();
    if pattern_segments.len() != path_segments.len() {
        return None;
    }
    let mut path_vars = HashMap::new();
    for (pattern_segment, path_segment) in pattern_segments.iter().zip(&path_segments) {
        if let Some(name) = pattern_segment
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
        {
            if path_segment.is_empty() {
                return None;
            }
            path_vars.insert(name.to_string(), (*path_segment).to_string());
        } else if pattern_segment != path_segment {
            return None;
        }
    }
    Some(path_vars)
}

/// Descriptor for one api-version.
pub struct ApiVersion {
    /// Version string; `""` enables versionless operation.
    pub version: &'static str,
    /// Version whose route table this one clones before deriving.
    pub base: Option<&'static str>,
    /// After this instant the version behaves as unknown.
    pub retire_at: Option<DateTime<Utc>>,
    /// Mutates the (cloned) table: add, overwrite, delete.
    pub derive: Box<dyn Fn(&mut RouteTable) + Send + Sync>,
}

struct VersionInfo {
    version: String,
    retire_at: Option<DateTime<Utc>>,
}

/// All versions' route tables, built once at startup.
pub struct VersionedRouter {
    tables: HashMap<String, RouteTable>,
    versions: Vec<VersionInfo>,
}

impl VersionedRouter {
    /// Build every version's table. Versions are processed in lexicographic
    /// order; a base must therefore sort before its derivatives.
    pub fn build(mut descriptors: Vec<ApiVersion>) -> Result<Self, ServiceError> {
        descriptors.sort_by(|a, b| a.version.cmp(b.version));

        let mut tables: HashMap<String, RouteTable> = HashMap::new();
        let mut versions = Vec::new();
        for descriptor in &descriptors {
            let mut table = match descriptor.base {
                Some(base) => tables
                    .get(base)
                    .cloned()
                    .ok_or_else(|| {
                        ServiceError::Internal(format!(
                            "api-version {:?} derives from undeclared base {:?}",
                            descriptor.version, base
                        ))
                    })?,
                None => RouteTable::new(),
            };
            (descriptor.derive)(&mut table);
            tables.insert(descriptor.version.to_string(), table);
            versions.push(VersionInfo {
                version: descriptor.version.to_string(),
                retire_at: descriptor.retire_at,
            });
        }
        Ok(Self { tables, versions })
    }

    /// Currently supported versions, preview suffixes last.
    pub fn supported_versions(&self) -> Vec<String> {
        let now = Utc::now();
        let mut supported: Vec<String> = self
            .versions
            .iter()
            .filter(|info| info.retire_at.map(|at| at > now).unwrap_or(true))
            .filter(|info| !info.version.is_empty())
            .map(|info| info.version.clone())
            .collect();
        supported.sort_by(|a, b| {
            (a.contains("preview"), a.as_str()).cmp(&(b.contains("preview"), b.as_str()))
        });
        supported
    }

    /// Resolve the table for a requested version. `None` selects the
    /// versionless table when one is registered.
    pub fn resolve(&self, requested: Option<&str>) -> Result<(&str, &RouteTable), ServiceError> {
        let now = Utc::now();
        let key = requested.unwrap_or("");
        let active = self
            .versions
            .iter()
            .find(|info| info.version == key)
            .map(|info| info.retire_at.map(|at| at > now).unwrap_or(true))
            .unwrap_or(false);
        if !active {
            return Err(ServiceError::UnknownApiVersion(format!(
                "{}; supported versions: {}",
                if key.is_empty() { "(none)" } else { key },
                self.supported_versions().join(", ")
            )));
        }
        let table = self
            .tables
            .get_key_value(key)
            .ok_or_else(|| ServiceError::Internal(format!("missing table for version {key:?}")))?;
        Ok((table.0.as_str(), table.1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reqres::ResponseHeaders;
    use chrono::Duration;

    struct Nop;

    #[async_trait]
    impl Operation for Nop {
        async fn invoke(&self, ctx: &mut RequestContext) -> ServerResult<()> {
            ctx.write_response(200, ResponseHeaders::default(), None::<&()>)
        }
    }

    fn handler() -> Arc<dyn Operation> {
        Arc::new(Nop)
    }

    fn base_table() -> RouteTable {
        let mut table = RouteTable::new();
        table.insert(
            Method::GET,
            "/mcp/tools",
            HeaderSpec::read_only(),
            handler(),
        );
        table.insert(
            Method::PUT,
            "/mcp/tools/{toolName}/calls/{toolCallId}",
            HeaderSpec::read_only(),
            handler(),
        );
        table.insert(
            Method::POST,
            "/mcp/tools/{toolName}/calls/{toolCallId}/advance",
            HeaderSpec::read_only(),
            handler(),
        );
        table
    }

    #[test]
    fn test_pattern_captures() {
        let table = base_table();
        match table.lookup(&Method::PUT, "/mcp/tools/add/calls/t1") {
            Lookup::Found { path_vars, .. } => {
                assert_eq!(path_vars["toolName"], "add");
                assert_eq!(path_vars["toolCallId"], "t1");
            }
            _ => panic!("expected match"),
        }
    }

    #[test]
    fn test_action_suffix_pattern_matches_normalized_path() {
        let mut table = RouteTable::new();
        table.insert(
            Method::POST,
            "/mcp/tools/{toolName}/calls/{toolCallId}:cancel",
            HeaderSpec::read_only(),
            handler(),
        );
        let path = normalize_action_path("/mcp/tools/add/calls/t1:cancel");
        assert!(matches!(
            table.lookup(&Method::POST, &path),
            Lookup::Found { .. }
        ));
    }

    #[test]
    fn test_method_not_allowed_vs_not_found() {
        let table = base_table();
        assert!(matches!(
            table.lookup(&Method::DELETE, "/mcp/tools"),
            Lookup::MethodNotAllowed
        ));
        assert!(matches!(
            table.lookup(&Method::GET, "/mcp/unknown"),
            Lookup::NotFound
        ));
    }

    fn router(extra: Vec<ApiVersion>) -> VersionedRouter {
        let mut descriptors = vec![ApiVersion {
            version: "",
            base: None,
            retire_at: None,
            derive: Box::new(|table| *table = base_table()),
        }];
        descriptors.extend(extra);
        VersionedRouter::build(descriptors).unwrap()
    }

    #[test]
    fn test_derived_version_clones_base() {
        let router = router(vec![ApiVersion {
            version: "2025-06-18",
            base: Some(""),
            retire_at: None,
            derive: Box::new(|table| {
                table.insert(
                    Method::GET,
                    "/mcp/extra",
                    HeaderSpec::read_only(),
                    Arc::new(Nop),
                );
                table.remove(&Method::POST, "/mcp/tools/{toolName}/calls/{toolCallId}/advance");
            }),
        }]);

        let (_, base) = router.resolve(None).unwrap();
        let (_, derived) = router.resolve(Some("2025-06-18")).unwrap();

        // The derivative gained a route and lost one; the base is untouched.
        assert!(matches!(derived.lookup(&Method::GET, "/mcp/extra"), Lookup::Found { .. }));
        assert!(matches!(
            derived.lookup(&Method::POST, "/mcp/tools/add/calls/t1/advance"),
            Lookup::MethodNotAllowed
        ));
        assert!(matches!(base.lookup(&Method::GET, "/mcp/extra"), Lookup::NotFound));
        assert!(matches!(
            base.lookup(&Method::POST, "/mcp/tools/add/calls/t1/advance"),
            Lookup::Found { .. }
        ));
    }

    #[test]
    fn test_unknown_version_lists_supported() {
        let router = router(vec![
            ApiVersion {
                version: "2025-06-18",
                base: Some(""),
                retire_at: None,
                derive: Box::new(|_| {}),
            },
            ApiVersion {
                version: "2024-01-01-preview",
                base: Some(""),
                retire_at: None,
                derive: Box::new(|_| {}),
            },
        ]);

        let err = router.resolve(Some("1999-01-01")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("2025-06-18, 2024-01-01-preview"));
    }

    #[test]
    fn test_retired_version_rejected() {
        let router = router(vec![ApiVersion {
            version: "2020-01-01",
            base: Some(""),
            retire_at: Some(Utc::now() - Duration::days(1)),
            derive: Box::new(|_| {}),
        }]);
        assert!(router.resolve(Some("2020-01-01")).is_err());
    }

    #[test]
    fn test_missing_base_is_a_startup_error() {
        let result = VersionedRouter::build(vec![ApiVersion {
            version: "2025-06-18",
            base: Some("2024-01-01"),
            retire_at: None,
            derive: Box::new(|_| {}),
        }]);
        assert!(result.is_err());
    }
}
