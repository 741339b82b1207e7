//! Not-found handling: the documentation-producing 404 and the JSON error
//! envelope used for everything the dispatch layer reports itself.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};

use waypoint_core::{Handler, HandlerError, Interface, NotFoundHandled, Version, infer_from_path};

/// Explanation included in every generated 404 body.
pub const NOT_FOUND_MESSAGE: &str = "The API call you tried to make was not defined. \
     Here's a definition of the API to help you get going :)";

/// Consistent JSON error envelope for dispatch-level failures.
pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Builds the documentation-producing 404 handler.
///
/// `docs` holds one pre-rendered documentation tree per declared version
/// (plus the unversioned one under `None`); the handler infers the version
/// from the request path and returns the matching tree alongside the fixed
/// explanation, as `application/json` with status 404.
pub fn documentation_404(
    docs: Arc<HashMap<Option<Version>, Value>>,
    declared: BTreeSet<Version>,
) -> Handler {
    Handler::new(Interface::new("documentation_404").private(), move |req| {
        let docs = Arc::clone(&docs);
        let declared = declared.clone();
        async move {
            let version = infer_from_path(req.uri().path(), &declared);
            let documentation = docs
                .get(&version)
                .or_else(|| docs.get(&None))
                .cloned()
                .unwrap_or(Value::Null);

            let mut body = Map::new();
            body.insert(
                "404".to_string(),
                Value::String(NOT_FOUND_MESSAGE.to_string()),
            );
            body.insert("documentation".to_string(), documentation);
            let bytes = serde_json::to_vec_pretty(&Value::Object(body))
                .map_err(|e| HandlerError::new("encode", e))?;

            let mut response = Response::builder()
                .status(StatusCode::NOT_FOUND)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(bytes))
                .map_err(|e| HandlerError::new("internal", e))?;
            response.extensions_mut().insert(NotFoundHandled);
            Ok(response)
        }
    })
}
