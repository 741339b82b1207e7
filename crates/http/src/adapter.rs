//! Walks an API registry into a concrete axum [`Router`].
//!
//! Every registered (base URL, path, method) slot becomes one route at its
//! unversioned URL plus one route per declared version under the `/v{n}`
//! prefix. The build-time fill pass runs here, exactly once per bucket,
//! before any route is exposed to traffic.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::routing::MethodFilter;
use serde_json::Value;
use waypoint_core::{Api, Version, VersionSignal};

use crate::dispatch::{Endpoint, raw_method_route};
use crate::not_found::{documentation_404, json_error};

/// Builds the router for `api`'s HTTP interface, creating the interface if
/// the registry has none yet.
pub fn build_router(api: &mut Api) -> Router {
    let declared = {
        let http = api.http();
        let versions = http.versions().clone();
        for bucket in http.routes_mut().buckets_mut() {
            bucket.fill_missing(&versions);
        }
        versions
    };

    // Pre-render one documentation tree per version slot for the 404 body.
    let mut docs: HashMap<Option<Version>, Value> = HashMap::new();
    docs.insert(None, api.documentation(None, None));
    for &v in &declared {
        docs.insert(Some(v), api.documentation(None, Some(v)));
    }
    let docs = Arc::new(docs);

    let http = api.http();
    let chain = http.middleware().chain();
    let exceptions = http.exception_handler_table().clone();
    let default_404 = http
        .not_found_handler(None)
        .unwrap_or_else(|| documentation_404(Arc::clone(&docs), declared.clone()));

    let mut router = Router::new();

    for (mount_base, path, methods) in http.routes().paths() {
        for (method, bucket) in methods {
            let Some(filter) = method_filter(method) else {
                tracing::warn!(method = %method, path, "method not routable, skipping");
                continue;
            };

            // The bare URL dispatches unversioned; each declared version
            // gets its own prefixed URL with the version fixed up front.
            let mut urls = vec![(format!("{mount_base}{path}"), VersionSignal::Unversioned)];
            for &v in &declared {
                urls.push((
                    format!("{mount_base}/v{v}{path}"),
                    VersionSignal::Explicit(v),
                ));
            }

            for (url, signal) in urls {
                let version = match signal {
                    VersionSignal::Explicit(v) => Some(v),
                    _ => None,
                };
                let not_found = http
                    .not_found_handler(version)
                    .unwrap_or_else(|| default_404.clone());
                let endpoint = Endpoint::new(
                    bucket.clone(),
                    declared.clone(),
                    signal,
                    Arc::clone(&chain),
                    exceptions.clone(),
                    not_found,
                );
                tracing::debug!(url = %url, method = %method, "route mounted");
                router = router.route(&url, endpoint.into_method_route(filter));
            }
        }
    }

    for (mount_base, prefix, handler) in http.sinks() {
        let url = format!("{mount_base}{prefix}");
        tracing::debug!(url = %url, "sink mounted");
        router = router
            .route(&url, raw_method_route(handler.clone()))
            .route(&format!("{url}/*sink"), raw_method_route(handler.clone()));
    }

    router.fallback(move |req: Request<Body>| {
        let handler = default_404.clone();
        async move {
            match handler.call(req).await {
                Ok(response) => response,
                Err(err) => {
                    tracing::error!(kind = %err.kind, error = %err.source, "not-found handler error");
                    json_error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "handler_error",
                        err.to_string(),
                    )
                }
            }
        }
    })
}

fn method_filter(method: &Method) -> Option<MethodFilter> {
    match method.as_str() {
        "GET" => Some(MethodFilter::GET),
        "POST" => Some(MethodFilter::POST),
        "PUT" => Some(MethodFilter::PUT),
        "DELETE" => Some(MethodFilter::DELETE),
        "PATCH" => Some(MethodFilter::PATCH),
        "HEAD" => Some(MethodFilter::HEAD),
        "OPTIONS" => Some(MethodFilter::OPTIONS),
        "TRACE" => Some(MethodFilter::TRACE),
        _ => None,
    }
}
