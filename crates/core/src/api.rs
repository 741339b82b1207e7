//! The top-level per-owner API registry.
//!
//! One [`Api`] exists per owning component (binary, module, test). It is an
//! explicit object passed by reference to registration calls; the
//! process-wide [`api_for`] map provides the get-or-create-by-owner
//! construction contract for code that wants a shared instance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use serde_json::{Map, Value};

use crate::cli::CliApi;
use crate::defaults;
use crate::http::HttpApi;
use crate::version::Version;

/// Free-form context shared with directives and handlers.
pub type ContextMap = HashMap<String, Value>;

/// A named injectable, resolved by name at call time against the owning
/// registry's context map.
pub type Directive = Arc<dyn Fn(&ContextMap) -> Value + Send + Sync>;

/// Per-owner API registry: one HTTP interface, one CLI interface, named
/// directives and a context map. Interfaces are created lazily on first
/// access and live as long as the registry.
pub struct Api {
    name: String,
    overview: Option<String>,
    http: Option<HttpApi>,
    cli: Option<CliApi>,
    directives: HashMap<String, Directive>,
    context: ContextMap,
}

impl Api {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overview: None,
            http: None,
            cli: None,
            directives: HashMap::new(),
            context: ContextMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn overview(&self) -> Option<&str> {
        self.overview.as_deref()
    }

    /// Sets the overview text surfaced at the top of generated docs.
    pub fn set_overview(&mut self, overview: impl Into<String>) {
        self.overview = Some(overview.into());
    }

    /// The HTTP interface registry, created on first access.
    pub fn http(&mut self) -> &mut HttpApi {
        let name = self.name.clone();
        self.http.get_or_insert_with(|| HttpApi::new(&name, ""))
    }

    pub fn http_opt(&self) -> Option<&HttpApi> {
        self.http.as_ref()
    }

    pub fn has_http(&self) -> bool {
        self.http.is_some()
    }

    /// The CLI interface registry, created on first access.
    pub fn cli(&mut self) -> &mut CliApi {
        let name = self.name.clone();
        self.cli.get_or_insert_with(|| CliApi::new(&name))
    }

    pub fn cli_opt(&self) -> Option<&CliApi> {
        self.cli.as_ref()
    }

    pub fn add_directive(&mut self, name: impl Into<String>, directive: Directive) {
        self.directives.insert(name.into(), directive);
    }

    /// All directives applicable to this API: process-wide defaults merged
    /// with this registry's own, own entries winning on name collision.
    pub fn directives(&self) -> HashMap<String, Directive> {
        let mut all = defaults::directives();
        for (name, directive) in &self.directives {
            all.insert(name.clone(), directive.clone());
        }
        all
    }

    /// Resolves one directive by name: own entries first, then defaults.
    pub fn directive(&self, name: &str) -> Option<Directive> {
        self.directives
            .get(name)
            .cloned()
            .or_else(|| defaults::directive(name))
    }

    pub fn context(&self) -> &ContextMap {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ContextMap {
        &mut self.context
    }

    /// Documentation for this API's HTTP interface; an overview-only stub
    /// when no HTTP interface exists.
    pub fn documentation(&self, base_url: Option<&str>, api_version: Option<Version>) -> Value {
        match &self.http {
            Some(http) => http.documentation(self.overview.as_deref(), base_url, api_version),
            None => {
                let mut doc = Map::new();
                if let Some(text) = &self.overview {
                    doc.insert("overview".to_string(), Value::String(text.clone()));
                }
                doc.insert("handlers".to_string(), Value::Object(Map::new()));
                Value::Object(doc)
            }
        }
    }

    /// Merges `other` into `self`: HTTP registries when present, then
    /// directives (own entries win). Like [`HttpApi::extend`], `other` is
    /// mutated as a side effect.
    pub fn extend(&mut self, other: &mut Api, route: &str, base_url: &str) {
        if let Some(other_http) = other.http.as_mut() {
            self.http().extend(other_http, route, base_url);
        }
        for (name, directive) in &other.directives {
            self.directives
                .entry(name.clone())
                .or_insert_with(|| directive.clone());
        }
    }
}

static REGISTRIES: OnceLock<Mutex<HashMap<String, Arc<Mutex<Api>>>>> = OnceLock::new();

/// Get-or-create the process-wide registry for `owner`. Idempotent: the
/// same owner identity always yields the same handle. Registration is
/// expected to happen single-threaded at startup; the interior mutex keeps
/// this sound even when that expectation is violated.
pub fn api_for(owner: &str) -> Arc<Mutex<Api>> {
    let registries = REGISTRIES.get_or_init(|| Mutex::new(HashMap::new()));
    let mut map = registries.lock().unwrap_or_else(|e| e.into_inner());
    Arc::clone(
        map.entry(owner.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Api::new(owner)))),
    )
}
