//! Registered units of behavior and the types that flow through dispatch.
//!
//! A [`Handler`] is a type-erased async function plus its API-surface
//! metadata ([`Interface`]). Handlers are stored behind `Arc`: after
//! [`crate::http::HttpApi::extend`] the same record may legitimately be
//! referenced from two registries, and re-owning a handler only rewrites
//! its owner field through [`Handler::set_owner`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use serde_json::{Map, Value};

use crate::version::Version;

/// Boxed future used by all type-erased callables in the registry.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Type-erased route function.
pub type RouteFn = Arc<dyn Fn(Request<Body>) -> BoxFuture<Result<Response, HandlerError>> + Send + Sync>;

/// A middleware unit. Middleware wraps every dispatched request; call
/// [`Next::run`] to continue down the chain.
pub type Middleware = Arc<dyn Fn(Request<Body>, Next) -> BoxFuture<Result<Response, HandlerError>> + Send + Sync>;

/// Renders a handler-raised error into a response, registered per
/// (version, kind) in the exception-handler table.
pub type ExceptionHandler = Arc<dyn Fn(&HandlerError) -> Response + Send + Sync>;

/// Runs once at serve time, before the listener accepts traffic.
pub type StartupHook = Arc<dyn Fn() -> BoxFuture<()> + Send + Sync>;

/// Failure raised by a handler, tagged with the kind string that the
/// exception-handler table matches on.
#[derive(Debug)]
pub struct HandlerError {
    pub kind: String,
    pub source: anyhow::Error,
}

impl HandlerError {
    pub fn new(kind: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self {
            kind: kind.into(),
            source: source.into(),
        }
    }

    pub fn msg(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            source: anyhow::Error::msg(message.into()),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.source)
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// API-surface metadata attached to a handler: its name, documentation
/// text, example fragments and privacy flag.
#[derive(Debug, Clone, Default)]
pub struct Interface {
    pub name: String,
    pub doc: Option<String>,
    pub examples: Vec<String>,
    pub private: bool,
}

impl Interface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.examples.push(example.into());
        self
    }

    /// Marks the handler as excluded from generated documentation.
    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }
}

struct HandlerRecord {
    call: RouteFn,
    interface: Interface,
    owner: RwLock<String>,
}

/// A registered unit of request-handling behavior.
///
/// Cloning a `Handler` shares the underlying record; the build-time
/// "fill missing versions" pass and `extend` both rely on that aliasing.
#[derive(Clone)]
pub struct Handler {
    record: Arc<HandlerRecord>,
}

impl Handler {
    pub fn new<F, Fut>(interface: Interface, call: F) -> Self
    where
        F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, HandlerError>> + Send + 'static,
    {
        Self {
            record: Arc::new(HandlerRecord {
                call: Arc::new(move |req| Box::pin(call(req))),
                interface,
                owner: RwLock::new(String::new()),
            }),
        }
    }

    pub fn call(&self, req: Request<Body>) -> BoxFuture<Result<Response, HandlerError>> {
        (self.record.call)(req)
    }

    pub fn interface(&self) -> &Interface {
        &self.record.interface
    }

    pub fn is_private(&self) -> bool {
        self.record.interface.private
    }

    /// The name of the API registry currently owning this handler.
    pub fn owner(&self) -> String {
        self.record
            .owner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Re-homes the handler. The record itself is shared, so every registry
    /// referencing it observes the new owner.
    pub fn set_owner(&self, owner: &str) {
        let mut slot = self.record.owner.write().unwrap_or_else(|e| e.into_inner());
        *slot = owner.to_string();
    }

    /// True when both handles point at the same underlying record.
    pub fn same(&self, other: &Handler) -> bool {
        Arc::ptr_eq(&self.record, &other.record)
    }

    /// Builds this handler's documentation fragment for one (url, method)
    /// pair, merging into `existing` when the pair was already documented
    /// for another version.
    pub fn documentation(
        &self,
        existing: Option<&Value>,
        version: Option<Version>,
        base_url: &str,
        url: &str,
    ) -> Value {
        let mut fragment = match existing {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };

        if let Some(text) = &self.record.interface.doc {
            fragment
                .entry("usage")
                .or_insert_with(|| Value::String(text.clone()));
        }

        if !self.record.interface.examples.is_empty() && !fragment.contains_key("examples") {
            let prefix = match version {
                Some(v) => format!("{base_url}/v{v}{url}"),
                None => format!("{base_url}{url}"),
            };
            let examples = self
                .record
                .interface
                .examples
                .iter()
                .map(|example| Value::String(format!("{prefix}{example}")))
                .collect();
            fragment.insert("examples".to_string(), Value::Array(examples));
        }

        if let Some(v) = version {
            let versions = fragment
                .entry("versions")
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(list) = versions {
                let value = Value::from(v);
                if !list.contains(&value) {
                    list.push(value);
                }
            }
        }

        Value::Object(fragment)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.record.interface.name)
            .field("private", &self.record.interface.private)
            .field("owner", &self.owner())
            .finish()
    }
}

/// Remaining middleware chain plus the terminal handler.
///
/// Each middleware unit receives the request and a `Next`; calling
/// [`Next::run`] hands the request to the rest of the chain and finally to
/// the resolved handler.
pub struct Next {
    chain: Arc<[Middleware]>,
    index: usize,
    endpoint: Handler,
    version: Option<Version>,
    not_found: Handler,
}

impl Next {
    pub fn new(
        chain: Arc<[Middleware]>,
        endpoint: Handler,
        version: Option<Version>,
        not_found: Handler,
    ) -> Self {
        Self {
            chain,
            index: 0,
            endpoint,
            version,
            not_found,
        }
    }

    /// The version the dispatch stub resolved for this request.
    pub fn version(&self) -> Option<Version> {
        self.version
    }

    /// The not-found handler active for the resolved version.
    pub fn not_found(&self) -> Handler {
        self.not_found.clone()
    }

    pub fn run(mut self, req: Request<Body>) -> BoxFuture<Result<Response, HandlerError>> {
        if self.index < self.chain.len() {
            let unit = Arc::clone(&self.chain[self.index]);
            self.index += 1;
            unit(req, self)
        } else {
            self.endpoint.call(req)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use serde_json::json;

    fn ok_handler(name: &str) -> Handler {
        Handler::new(Interface::new(name), |_req| async {
            Ok(StatusCode::OK.into_response())
        })
    }

    #[test]
    fn set_owner_is_visible_through_every_alias() {
        let handler = ok_handler("h");
        let alias = handler.clone();
        handler.set_owner("composite");
        assert_eq!(alias.owner(), "composite");
        assert!(handler.same(&alias));
    }

    #[test]
    fn documentation_merges_versions_into_existing_fragment() {
        let handler = ok_handler("h");
        let first = handler.documentation(None, Some(1), "", "/items");
        let merged = handler.documentation(Some(&first), Some(2), "", "/items");
        assert_eq!(merged["versions"], json!([1, 2]));
    }

    #[test]
    fn documentation_includes_usage_and_example_urls() {
        let handler = Handler::new(
            Interface::new("h")
                .with_doc("Lists items")
                .with_example("?limit=10"),
            |_req| async { Ok(StatusCode::OK.into_response()) },
        );
        let doc = handler.documentation(None, Some(1), "/api", "/items");
        assert_eq!(doc["usage"], json!("Lists items"));
        assert_eq!(doc["examples"], json!(["/api/v1/items?limit=10"]));
    }

    #[tokio::test]
    async fn middleware_chain_runs_in_order_then_hits_endpoint() {
        let tag_outer: Middleware = Arc::new(|req, next| {
            Box::pin(async move {
                let mut response = next.run(req).await?;
                response
                    .headers_mut()
                    .insert("x-outer", "1".parse().unwrap());
                Ok(response)
            })
        });
        let chain: Arc<[Middleware]> = Arc::from(vec![tag_outer].into_boxed_slice());
        let endpoint = ok_handler("endpoint");
        let next = Next::new(chain, endpoint.clone(), None, endpoint);

        let req = Request::builder().uri("/x").body(Body::empty()).unwrap();
        let response = next.run(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-outer"));
    }
}
