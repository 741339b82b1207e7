//! Per-route dispatch stubs.
//!
//! The adapter registers one [`Endpoint`] per concrete server route. At
//! request time the stub resolves the version, runs the middleware chain
//! and the resolved handler, and maps handler-raised errors through the
//! registry's exception-handler table.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::routing::{MethodFilter, MethodRouter};
use waypoint_core::{
    ExceptionHandler, Handler, HandlerError, Middleware, Next, RegistryError, Version,
    VersionBucket, VersionSignal, resolve,
};

use crate::not_found::json_error;

/// Everything one concrete server route needs at request time. Built once
/// at registration, then shared read-only across request tasks.
pub(crate) struct Endpoint {
    bucket: VersionBucket,
    declared: BTreeSet<Version>,
    signal: VersionSignal,
    middleware: Arc<[Middleware]>,
    exceptions: HashMap<Option<Version>, Vec<(String, ExceptionHandler)>>,
    not_found: Handler,
}

impl Endpoint {
    pub(crate) fn new(
        bucket: VersionBucket,
        declared: BTreeSet<Version>,
        signal: VersionSignal,
        middleware: Arc<[Middleware]>,
        exceptions: HashMap<Option<Version>, Vec<(String, ExceptionHandler)>>,
        not_found: Handler,
    ) -> Self {
        Self {
            bucket,
            declared,
            signal,
            middleware,
            exceptions,
            not_found,
        }
    }

    pub(crate) async fn dispatch(&self, req: Request<Body>) -> Response {
        let path = req.uri().path().to_string();
        let version = match resolve(&path, self.signal, &self.declared) {
            Ok(version) => version,
            Err(err @ RegistryError::ConflictingVersions { .. }) => {
                return json_error(StatusCode::BAD_REQUEST, "conflicting_versions", err.to_string());
            }
        };

        // Versioned slot, else the unversioned default, else not-found.
        let handler = self
            .bucket
            .get(version)
            .or_else(|| self.bucket.get(None))
            .cloned()
            .unwrap_or_else(|| self.not_found.clone());

        let next = Next::new(
            Arc::clone(&self.middleware),
            handler,
            version,
            self.not_found.clone(),
        );
        match next.run(req).await {
            Ok(response) => response,
            Err(err) => self.render_error(version, err),
        }
    }

    fn render_error(&self, version: Option<Version>, err: HandlerError) -> Response {
        let table = self
            .exceptions
            .get(&version)
            .or_else(|| self.exceptions.get(&None));
        if let Some(table) = table {
            if let Some((_, handler)) = table.iter().find(|(kind, _)| *kind == err.kind) {
                return handler(&err);
            }
        }
        tracing::error!(kind = %err.kind, error = %err.source, "unhandled handler error");
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "handler_error", err.to_string())
    }

    /// Wraps this endpoint as an axum method route.
    pub(crate) fn into_method_route(self, filter: MethodFilter) -> MethodRouter {
        let endpoint = Arc::new(self);
        axum::routing::on(filter, move |req: Request<Body>| {
            let endpoint = Arc::clone(&endpoint);
            async move { endpoint.dispatch(req).await }
        })
    }
}

/// Plain pass-through route for handlers dispatched without version logic
/// (sinks and fallbacks).
pub(crate) fn raw_method_route(handler: Handler) -> MethodRouter {
    axum::routing::any(move |req: Request<Body>| {
        let handler = handler.clone();
        async move {
            match handler.call(req).await {
                Ok(response) => response,
                Err(err) => {
                    tracing::error!(kind = %err.kind, error = %err.source, "sink handler error");
                    json_error(StatusCode::INTERNAL_SERVER_ERROR, "handler_error", err.to_string())
                }
            }
        }
    })
}
