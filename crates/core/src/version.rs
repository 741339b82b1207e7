//! Version signals and resolution.
//!
//! A request can assert its API version in two ways: an explicit version
//! attached to the registered route, and a `v{n}` segment in the request
//! path. Resolution collects the asserted candidates and either yields the
//! single agreed version or fails loudly on a conflict.

use std::collections::BTreeSet;

use crate::error::{RegistryError, RegistryResult};

/// An API generation identifier. Tables key on `Option<Version>`, where
/// `None` means "unversioned / default".
pub type Version = u32;

/// How a request (or a registered route) asserts its version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSignal {
    /// No version asserted; dispatch goes to the unversioned handler.
    Unversioned,
    /// Scan the request path for a declared `v{n}` marker.
    InferFromPath,
    /// A concrete version asserted by the caller.
    Explicit(Version),
}

/// Returns the first declared version whose `v{n}` marker occurs literally
/// in `path`, in ascending version order.
pub fn infer_from_path(path: &str, declared: &BTreeSet<Version>) -> Option<Version> {
    declared
        .iter()
        .copied()
        .find(|v| path.contains(&format!("v{v}")))
}

/// Resolves the single version a request dispatches to.
///
/// Candidates come from the explicit signal and, when the path carries a
/// declared `v{n}` marker, from the path. More than one distinct candidate
/// is a conflict and is never silently tie-broken.
pub fn resolve(
    path: &str,
    signal: VersionSignal,
    declared: &BTreeSet<Version>,
) -> RegistryResult<Option<Version>> {
    let mut candidates = BTreeSet::new();

    match signal {
        VersionSignal::Unversioned => {}
        VersionSignal::InferFromPath => {
            if let Some(v) = infer_from_path(path, declared) {
                candidates.insert(v);
            }
        }
        VersionSignal::Explicit(v) => {
            candidates.insert(v);
            if let Some(inferred) = infer_from_path(path, declared) {
                candidates.insert(inferred);
            }
        }
    }

    if candidates.len() > 1 {
        return Err(RegistryError::ConflictingVersions {
            candidates: candidates.into_iter().collect(),
        });
    }

    Ok(candidates.into_iter().next())
}
