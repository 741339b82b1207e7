//! `waypoint-core` — version-aware API registry building blocks.
//!
//! Applications declare HTTP endpoints and CLI commands as plain async
//! functions and register them into a per-owner [`Api`]. The registry
//! stores routes keyed by base URL, path, method and version; resolves
//! incoming requests to the correct versioned handler; and merges
//! independently built registries into one composite API via `extend`.
//!
//! This crate holds registration-time data structures only. Turning a
//! registry into a runnable server (concrete routes against the HTTP
//! engine, dispatch stubs, the documentation 404) lives in `waypoint-http`.

pub mod api;
pub mod cli;
pub mod defaults;
pub mod error;
pub mod format;
pub mod handler;
pub mod http;
pub mod route_table;
pub mod version;

pub use api::{Api, ContextMap, Directive, api_for};
pub use cli::{CliApi, CliFn};
pub use error::{CliError, FormatError, RegistryError, RegistryResult};
pub use format::{FormattedBody, InputFormat, OutputFormat};
pub use handler::{
    BoxFuture, ExceptionHandler, Handler, HandlerError, Interface, Middleware, Next, RouteFn,
    StartupHook,
};
pub use http::{HttpApi, MiddlewareSet, NotFoundHandled, base_not_found};
pub use route_table::{RouteEntry, RouteTable, VersionBucket};
pub use version::{Version, VersionSignal, infer_from_path, resolve};
