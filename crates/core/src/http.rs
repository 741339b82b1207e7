//! The HTTP-interface registry: routes, middleware, exception handlers,
//! content formats, not-found handlers and startup hooks for one API.
//!
//! Registration happens single-threaded at startup; once the adapter has
//! walked the registry into concrete server routes, everything here is
//! read-mostly shared state.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use serde_json::{Map, Value};

use crate::defaults;
use crate::error::RegistryResult;
use crate::format::{InputFormat, OutputFormat};
use crate::handler::{ExceptionHandler, Handler, HandlerError, Interface, Middleware, StartupHook};
use crate::route_table::RouteTable;
use crate::version::{self, Version, VersionSignal};

/// Response-extension marker set by the not-found chain so the built-in
/// middleware does not re-route a response that already went through it.
#[derive(Debug, Clone, Copy)]
pub struct NotFoundHandled;

/// Middleware units keyed by an explicit unique name. Set semantics: adding
/// under an existing name replaces that unit; no ordering is guaranteed
/// beyond insertion order.
pub struct MiddlewareSet {
    units: Vec<(String, Middleware)>,
}

impl MiddlewareSet {
    fn new() -> Self {
        Self {
            units: vec![("not_found".to_string(), not_found_middleware())],
        }
    }

    pub fn add(&mut self, name: impl Into<String>, unit: Middleware) {
        let name = name.into();
        if let Some(slot) = self.units.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = unit;
        } else {
            self.units.push((name, unit));
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.units.iter().any(|(n, _)| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Middleware)> {
        self.units.iter().map(|(n, u)| (n.as_str(), u))
    }

    /// Snapshot of the units as a dispatchable chain.
    pub fn chain(&self) -> Arc<[Middleware]> {
        let units: Vec<Middleware> = self.units.iter().map(|(_, u)| u.clone()).collect();
        Arc::from(units.into_boxed_slice())
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Built-in middleware: when a handler responds with a bare 404 that did
/// not come from the not-found chain, replay the request through the
/// not-found handler active for the resolved version.
fn not_found_middleware() -> Middleware {
    Arc::new(|req, next| {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let not_found = next.not_found();
        Box::pin(async move {
            let response = next.run(req).await?;
            if response.status() != StatusCode::NOT_FOUND
                || response.extensions().get::<NotFoundHandled>().is_some()
            {
                return Ok(response);
            }
            let replay = Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .map_err(|e| HandlerError::new("internal", e))?;
            not_found.call(replay).await
        })
    })
}

/// The bare 404 used when nothing else is registered: empty body, marked as
/// handled so the built-in middleware leaves it alone.
pub fn base_not_found() -> Handler {
    Handler::new(Interface::new("base_404").private(), |_req| async {
        let mut response = Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::empty())
            .map_err(|e| HandlerError::new("internal", e))?;
        response.extensions_mut().insert(NotFoundHandled);
        Ok(response)
    })
}

/// Per-API HTTP registry. Owns the route table and every table the
/// dispatch stubs consult.
pub struct HttpApi {
    owner: String,
    base_url: String,
    versions: BTreeSet<Version>,
    routes: RouteTable,
    sinks: Vec<(String, Vec<(String, Handler)>)>,
    middleware: MiddlewareSet,
    exception_handlers: HashMap<Option<Version>, Vec<(String, ExceptionHandler)>>,
    input_formats: HashMap<String, InputFormat>,
    output_format: Option<OutputFormat>,
    not_found_handlers: HashMap<Option<Version>, Handler>,
    startup_handlers: Vec<StartupHook>,
}

impl HttpApi {
    pub(crate) fn new(owner: &str, base_url: &str) -> Self {
        Self {
            owner: owner.to_string(),
            base_url: base_url.to_string(),
            versions: BTreeSet::new(),
            routes: RouteTable::new(),
            sinks: Vec::new(),
            middleware: MiddlewareSet::new(),
            exception_handlers: HashMap::new(),
            input_formats: HashMap::new(),
            output_format: None,
            not_found_handlers: HashMap::new(),
            startup_handlers: Vec::new(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_base_url(&mut self, base_url: impl Into<String>) {
        self.base_url = base_url.into();
    }

    pub fn versions(&self) -> &BTreeSet<Version> {
        &self.versions
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn routes_mut(&mut self) -> &mut RouteTable {
        &mut self.routes
    }

    /// Registers a handler. Inserting under a concrete version also
    /// declares that version for the whole registry.
    pub fn add_route(
        &mut self,
        base_url: Option<&str>,
        path: &str,
        method: Method,
        version: Option<Version>,
        handler: Handler,
    ) {
        if let Some(v) = version {
            self.versions.insert(v);
        }
        let base = base_url.unwrap_or(&self.base_url).to_string();
        handler.set_owner(&self.owner);
        tracing::debug!(base_url = %base, path, method = %method, ?version, "route registered");
        self.routes.insert(&base, path, method, version, handler);
    }

    /// Registers a catch-all handler for a URL prefix. Sinks live in their
    /// own mapping and are never merged into the route table.
    pub fn add_sink(&mut self, sink: Handler, url: &str, base_url: Option<&str>) {
        let base = base_url.unwrap_or(&self.base_url).to_string();
        let index = match self.sinks.iter().position(|(b, _)| *b == base) {
            Some(index) => index,
            None => {
                self.sinks.push((base, Vec::new()));
                self.sinks.len() - 1
            }
        };
        let mount = &mut self.sinks[index].1;
        if let Some(slot) = mount.iter_mut().find(|(u, _)| u == url) {
            slot.1 = sink;
        } else {
            mount.push((url.to_string(), sink));
        }
    }

    /// Iterates registered sinks as (base URL, prefix, handler), insertion
    /// order preserved at both levels.
    pub fn sinks(&self) -> impl Iterator<Item = (&str, &str, &Handler)> {
        self.sinks.iter().flat_map(|(base, entries)| {
            entries
                .iter()
                .map(move |(url, handler)| (base.as_str(), url.as_str(), handler))
        })
    }

    pub fn add_middleware(&mut self, name: impl Into<String>, unit: Middleware) {
        self.middleware.add(name, unit);
    }

    pub fn middleware(&self) -> &MiddlewareSet {
        &self.middleware
    }

    pub fn set_input_format(&mut self, content_type: &str, handler: InputFormat) {
        self.input_formats.insert(content_type.to_string(), handler);
    }

    /// Two-tier lookup: instance override, then the process-wide defaults.
    pub fn input_format(&self, content_type: &str) -> Option<InputFormat> {
        self.input_formats
            .get(content_type)
            .cloned()
            .or_else(|| defaults::input_format(content_type))
    }

    pub fn set_output_format(&mut self, format: OutputFormat) {
        self.output_format = Some(format);
    }

    /// The active encoder: instance override, else the process default.
    pub fn output_format(&self) -> OutputFormat {
        self.output_format
            .clone()
            .unwrap_or_else(defaults::output_format)
    }

    /// Registers an exception handler for each listed version slot.
    pub fn add_exception_handler(
        &mut self,
        kind: &str,
        handler: ExceptionHandler,
        versions: &[Option<Version>],
    ) {
        for &version in versions {
            let table = self.exception_handlers.entry(version).or_default();
            if let Some(slot) = table.iter_mut().find(|(k, _)| k == kind) {
                slot.1 = handler.clone();
            } else {
                table.push((kind.to_string(), handler.clone()));
            }
        }
    }

    /// The exception table for `version`, falling back to the default
    /// (`None`) table, else absent.
    pub fn exception_handlers(
        &self,
        version: Option<Version>,
    ) -> Option<&[(String, ExceptionHandler)]> {
        self.exception_handlers
            .get(&version)
            .or_else(|| self.exception_handlers.get(&None))
            .map(|table| table.as_slice())
    }

    /// The whole exception table, for adapters that snapshot it per route.
    pub fn exception_handler_table(
        &self,
    ) -> &HashMap<Option<Version>, Vec<(String, ExceptionHandler)>> {
        &self.exception_handlers
    }

    pub fn set_not_found_handler(&mut self, handler: Handler, version: Option<Version>) {
        self.not_found_handlers.insert(version, handler);
    }

    pub fn not_found_handlers(&self) -> &HashMap<Option<Version>, Handler> {
        &self.not_found_handlers
    }

    /// Custom not-found handler for `version`, with the usual None
    /// fallback; absent when neither slot is set.
    pub fn not_found_handler(&self, version: Option<Version>) -> Option<Handler> {
        self.not_found_handlers
            .get(&version)
            .or_else(|| self.not_found_handlers.get(&None))
            .cloned()
    }

    /// The active not-found handler: custom chain, else the bare built-in.
    pub fn not_found(&self, version: Option<Version>) -> Handler {
        self.not_found_handler(version).unwrap_or_else(base_not_found)
    }

    pub fn add_startup_handler(&mut self, hook: StartupHook) {
        self.startup_handlers.push(hook);
    }

    pub fn startup_handlers(&self) -> &[StartupHook] {
        &self.startup_handlers
    }

    /// Resolves the version a request at `path` dispatches to, given this
    /// registry's declared versions. Conflicting signals fail loudly.
    pub fn determine_version(
        &self,
        path: &str,
        signal: VersionSignal,
    ) -> RegistryResult<Option<Version>> {
        version::resolve(path, signal, &self.versions)
    }

    /// Merges `other` into `self`, producing a composite API.
    ///
    /// Mutates `other` as a side effect: its handlers are re-homed to
    /// `self`'s owner, and exception handlers present here but absent there
    /// are backfilled into it. The backfill is intentionally one-directional
    /// (input formats and not-found handlers only flow other → self).
    pub fn extend(&mut self, other: &mut HttpApi, route: &str, base_url: &str) {
        tracing::debug!(from = %other.owner, into = %self.owner, route, base_url, "extending http registry");

        self.versions.extend(other.versions.iter().copied());

        for entry in other.routes.entries() {
            entry.handler.set_owner(&self.owner);
        }
        for (mount_base, path, methods) in other.routes.paths() {
            let target_base = if base_url.is_empty() { mount_base } else { base_url };
            let target_path = format!("{route}{path}");
            self.routes.set_methods(target_base, &target_path, methods.clone());
        }

        let merged_sinks: Vec<(String, String, Handler)> = other
            .sinks()
            .map(|(base, prefix, handler)| {
                let target_base = if base_url.is_empty() { base } else { base_url };
                (target_base.to_string(), format!("{route}{prefix}"), handler.clone())
            })
            .collect();
        for (target_base, url, sink) in merged_sinks {
            self.add_sink(sink, &url, Some(&target_base));
        }

        for (name, unit) in other.middleware.iter() {
            if !self.middleware.contains(name) {
                self.middleware.add(name, unit.clone());
            }
        }

        self.startup_handlers
            .extend(other.startup_handlers.iter().cloned());

        // Backfill exception handlers from self into other for every
        // (version, kind) the other side lacks.
        for (&version, table) in &self.exception_handlers {
            for (kind, handler) in table {
                let present = other
                    .exception_handlers(version)
                    .is_some_and(|t| t.iter().any(|(k, _)| k == kind));
                if !present {
                    other.add_exception_handler(kind, handler.clone(), &[version]);
                }
            }
        }

        for (content_type, handler) in &other.input_formats {
            if !self.input_formats.contains_key(content_type) {
                self.input_formats
                    .insert(content_type.clone(), handler.clone());
            }
        }

        for (&version, handler) in &other.not_found_handlers {
            self.not_found_handlers
                .entry(version)
                .or_insert_with(|| handler.clone());
        }
    }

    /// Generates the documentation tree for this registry: an ordered
    /// object with `overview`, `version`, `versions` and `handlers` keys.
    /// Handlers flagged private are skipped; unversioned handlers apply to
    /// every declared version.
    pub fn documentation(
        &self,
        overview: Option<&str>,
        base_url: Option<&str>,
        api_version: Option<Version>,
    ) -> Value {
        let mut doc = Map::new();
        let base_url = base_url.unwrap_or(&self.base_url);

        if let Some(text) = overview {
            doc.insert("overview".to_string(), Value::String(text.to_string()));
        }

        let declared: Vec<Version> = self.versions.iter().copied().collect();
        let api_version = api_version.or_else(|| declared.last().copied());
        if let Some(v) = api_version {
            doc.insert("version".to_string(), Value::from(v));
        }
        if !declared.is_empty() {
            doc.insert(
                "versions".to_string(),
                Value::Array(declared.iter().map(|&v| Value::from(v)).collect()),
            );
        }

        let mut handlers = Map::new();
        for (mount_base, path, methods) in self.routes.paths() {
            for (method, bucket) in methods {
                for (version, handler) in bucket.handlers() {
                    if handler.is_private() {
                        continue;
                    }
                    let applies_to: Vec<Option<Version>> = match version {
                        Some(v) => vec![Some(v)],
                        None if declared.is_empty() => vec![None],
                        None => declared.iter().map(|&v| Some(v)).collect(),
                    };
                    for applied in applies_to {
                        if let (Some(requested), Some(actual)) = (api_version, applied) {
                            if requested != actual {
                                continue;
                            }
                        }
                        let url = format!("{mount_base}{path}");
                        let entry = handlers
                            .entry(url)
                            .or_insert_with(|| Value::Object(Map::new()));
                        let Value::Object(per_url) = entry else {
                            continue;
                        };
                        let effective_base = if mount_base.is_empty() {
                            base_url
                        } else {
                            mount_base
                        };
                        let fragment = handler.documentation(
                            per_url.get(method.as_str()),
                            applied,
                            effective_base,
                            path,
                        );
                        per_url.insert(method.as_str().to_string(), fragment);
                    }
                }
            }
        }
        doc.insert("handlers".to_string(), Value::Object(handlers));

        Value::Object(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    fn handler(name: &str) -> Handler {
        Handler::new(Interface::new(name).with_doc("doc"), |_req| async {
            Ok(StatusCode::OK.into_response())
        })
    }

    fn exception(status: StatusCode) -> ExceptionHandler {
        Arc::new(move |_err| status.into_response())
    }

    #[test]
    fn add_route_declares_concrete_versions() {
        let mut api = HttpApi::new("owner", "");
        api.add_route(None, "/a", Method::GET, Some(2), handler("a"));
        api.add_route(None, "/b", Method::GET, None, handler("b"));
        assert_eq!(api.versions().iter().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn middleware_set_is_seeded_and_keyed_by_name() {
        let mut api = HttpApi::new("owner", "");
        assert!(api.middleware().contains("not_found"));
        assert_eq!(api.middleware().len(), 1);

        let unit: Middleware = Arc::new(|req, next| next.run(req));
        api.add_middleware("trace", unit.clone());
        api.add_middleware("trace", unit);
        assert_eq!(api.middleware().len(), 2);
    }

    #[test]
    fn exception_handlers_fall_back_to_default_slot() {
        let mut api = HttpApi::new("owner", "");
        assert!(api.exception_handlers(Some(2)).is_none());

        api.add_exception_handler("timeout", exception(StatusCode::GATEWAY_TIMEOUT), &[None]);
        let table = api.exception_handlers(Some(2)).unwrap();
        assert_eq!(table[0].0, "timeout");

        api.add_exception_handler("conflict", exception(StatusCode::CONFLICT), &[Some(2)]);
        let table = api.exception_handlers(Some(2)).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].0, "conflict");
    }

    #[test]
    fn input_format_prefers_instance_override_over_process_default() {
        let mut api = HttpApi::new("owner", "");
        assert!(api.input_format("application/json").is_some());
        assert!(api.input_format("application/msgpack").is_none());

        let marker: crate::format::InputFormat =
            Arc::new(|_bytes| Ok(Value::String("override".to_string())));
        api.set_input_format("application/json", marker);
        let decode = api.input_format("application/json").unwrap();
        assert_eq!(decode(b"{}").unwrap(), Value::String("override".to_string()));
    }

    #[test]
    fn not_found_handler_falls_back_by_version_then_builtin() {
        let mut api = HttpApi::new("owner", "");
        assert!(api.not_found_handler(Some(1)).is_none());
        // The built-in is always available through `not_found`.
        assert_eq!(api.not_found(Some(1)).interface().name, "base_404");

        let custom = handler("custom_404");
        api.set_not_found_handler(custom.clone(), None);
        assert!(api.not_found_handler(Some(1)).unwrap().same(&custom));

        let v1 = handler("v1_404");
        api.set_not_found_handler(v1.clone(), Some(1));
        assert!(api.not_found_handler(Some(1)).unwrap().same(&v1));
        assert!(api.not_found_handler(Some(2)).unwrap().same(&custom));
    }

    #[test]
    fn extend_preserves_both_sides_routes_and_rehomes_handlers() {
        let mut a = HttpApi::new("a", "");
        let mut b = HttpApi::new("b", "");
        let handler_a = handler("ha");
        let handler_b = handler("hb");
        a.add_route(None, "/a", Method::GET, None, handler_a.clone());
        b.add_route(None, "/b", Method::GET, None, handler_b.clone());
        assert_eq!(handler_b.owner(), "b");

        a.extend(&mut b, "", "");

        assert!(a.routes().lookup("", "/a", &Method::GET, None).is_some());
        let merged = a.routes().lookup("", "/b", &Method::GET, None).unwrap();
        assert!(merged.same(&handler_b));
        assert_eq!(handler_b.owner(), "a");
    }

    #[test]
    fn extend_applies_route_prefix_and_base_url_override() {
        let mut a = HttpApi::new("a", "");
        let mut b = HttpApi::new("b", "/sub");
        b.add_route(None, "/b", Method::GET, Some(3), handler("hb"));

        a.extend(&mut b, "/ext", "/api");

        assert!(a
            .routes()
            .lookup("/api", "/ext/b", &Method::GET, Some(3))
            .is_some());
        assert!(a.versions().contains(&3));
    }

    #[test]
    fn extend_backfills_exception_handlers_into_other_only() {
        let mut a = HttpApi::new("a", "");
        let mut b = HttpApi::new("b", "");
        a.add_exception_handler("timeout", exception(StatusCode::GATEWAY_TIMEOUT), &[None]);

        let json_marker: crate::format::InputFormat = Arc::new(|_| Ok(Value::Null));
        a.set_input_format("application/yaml", json_marker);

        a.extend(&mut b, "", "");

        // Exception handlers flow self -> other.
        let table = b.exception_handlers(None).unwrap();
        assert_eq!(table[0].0, "timeout");
        // Input formats do not.
        assert!(b.input_format("application/yaml").is_none());
    }

    #[test]
    fn extend_merges_input_and_not_found_tables_from_other() {
        let mut a = HttpApi::new("a", "");
        let mut b = HttpApi::new("b", "");
        let keep: crate::format::InputFormat = Arc::new(|_| Ok(Value::Bool(true)));
        a.set_input_format("text/csv", keep);
        let replace_attempt: crate::format::InputFormat = Arc::new(|_| Ok(Value::Bool(false)));
        b.set_input_format("text/csv", replace_attempt);
        b.set_input_format("application/yaml", Arc::new(|_| Ok(Value::Null)));
        let nf = handler("b_404");
        b.set_not_found_handler(nf.clone(), Some(1));

        a.extend(&mut b, "", "");

        let decode = a.input_format("text/csv").unwrap();
        assert_eq!(decode(b"").unwrap(), Value::Bool(true));
        assert!(a.input_format("application/yaml").is_some());
        assert!(a.not_found_handler(Some(1)).unwrap().same(&nf));
    }

    #[test]
    fn extend_appends_startup_handlers_without_dedup() {
        let mut a = HttpApi::new("a", "");
        let mut b = HttpApi::new("b", "");
        let hook: StartupHook = Arc::new(|| Box::pin(async {}));
        a.add_startup_handler(hook.clone());
        b.add_startup_handler(hook.clone());
        b.add_startup_handler(hook);

        a.extend(&mut b, "", "");
        assert_eq!(a.startup_handlers().len(), 3);
    }

    #[test]
    fn documentation_lists_urls_in_registration_order() {
        let mut api = HttpApi::new("owner", "");
        api.add_route(None, "/first", Method::GET, None, handler("f"));
        api.add_route(None, "/second", Method::POST, None, handler("s"));
        api.add_route(None, "/first", Method::POST, None, handler("f2"));

        let doc = api.documentation(Some("demo api"), None, None);
        assert_eq!(doc["overview"], Value::String("demo api".to_string()));

        let Value::Object(handlers) = &doc["handlers"] else {
            panic!("handlers must be an object");
        };
        let urls: Vec<&String> = handlers.keys().collect();
        assert_eq!(urls, ["/first", "/second"]);
    }

    #[test]
    fn documentation_skips_private_handlers_and_filters_by_version() {
        let mut api = HttpApi::new("owner", "");
        api.add_route(None, "/public", Method::GET, Some(1), handler("p"));
        api.add_route(None, "/public", Method::GET, Some(2), handler("p2"));
        let hidden = Handler::new(Interface::new("hidden").private(), |_req| async {
            Ok(StatusCode::OK.into_response())
        });
        api.add_route(None, "/hidden", Method::GET, None, hidden);

        let doc = api.documentation(None, None, Some(1));
        assert_eq!(doc["version"], Value::from(1));
        assert_eq!(doc["versions"], serde_json::json!([1, 2]));
        let Value::Object(handlers) = &doc["handlers"] else {
            panic!("handlers must be an object");
        };
        assert!(handlers.contains_key("/public"));
        assert!(!handlers.contains_key("/hidden"));
    }

    #[test]
    fn documentation_defaults_to_max_declared_version() {
        let mut api = HttpApi::new("owner", "");
        api.add_route(None, "/a", Method::GET, Some(1), handler("a"));
        api.add_route(None, "/a", Method::GET, Some(3), handler("a3"));

        let doc = api.documentation(None, None, None);
        assert_eq!(doc["version"], Value::from(3));
    }

    #[test]
    fn documentation_covers_unversioned_registries() {
        let mut api = HttpApi::new("owner", "");
        api.add_route(None, "/only", Method::GET, None, handler("o"));

        let doc = api.documentation(None, None, None);
        assert!(doc.get("version").is_none());
        let Value::Object(handlers) = &doc["handlers"] else {
            panic!("handlers must be an object");
        };
        assert!(handlers.contains_key("/only"));
    }

    #[test]
    fn determine_version_surfaces_conflicts() {
        let mut api = HttpApi::new("owner", "");
        api.add_route(None, "/a", Method::GET, Some(1), handler("a"));
        api.add_route(None, "/a", Method::GET, Some(2), handler("a2"));

        let err = api
            .determine_version("/v1/a", VersionSignal::Explicit(2))
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::RegistryError::ConflictingVersions { .. }
        ));
        assert_eq!(
            api.determine_version("/v2/a", VersionSignal::InferFromPath),
            Ok(Some(2))
        );
    }
}
