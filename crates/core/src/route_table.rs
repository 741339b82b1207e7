//! Nested route storage: base URL → path → method → version → handler.
//!
//! The base-URL and path levels preserve insertion order (documentation is
//! generated in registration order); the method and version levels are
//! plain hash maps. Lookups here are exact-key and happen at build time —
//! request-time matching belongs to the HTTP engine.

use std::collections::{BTreeSet, HashMap};

use axum::http::Method;

use crate::handler::Handler;
use crate::version::Version;

/// The handlers registered for one (base URL, path, method) slot, keyed by
/// version. `None` is the unversioned/default slot.
#[derive(Clone, Default)]
pub struct VersionBucket {
    handlers: HashMap<Option<Version>, Handler>,
}

impl VersionBucket {
    /// Inserts with silent-overwrite semantics: a repeated insert at the
    /// same version replaces the prior handler.
    pub fn insert(&mut self, version: Option<Version>, handler: Handler) {
        self.handlers.insert(version, handler);
    }

    pub fn get(&self, version: Option<Version>) -> Option<&Handler> {
        self.handlers.get(&version)
    }

    pub fn handlers(&self) -> impl Iterator<Item = (Option<Version>, &Handler)> {
        self.handlers.iter().map(|(v, h)| (*v, h))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Build-time fill pass: every declared version that has no handler in
    /// this bucket gets the unversioned handler, or the sole remaining
    /// handler when no unversioned one exists. Deterministic and idempotent;
    /// the adapter runs it exactly once per bucket before any route is
    /// exposed to traffic.
    pub fn fill_missing(&mut self, declared: &BTreeSet<Version>) {
        if declared.is_empty() {
            return;
        }

        let fallback = match self.handlers.get(&None) {
            Some(handler) => Some(handler.clone()),
            None if self.handlers.len() == 1 => self.handlers.values().next().cloned(),
            // Multiple versioned handlers and no default: nothing
            // unambiguous to duplicate from.
            None => None,
        };
        let Some(fallback) = fallback else {
            return;
        };

        for &version in declared {
            self.handlers
                .entry(Some(version))
                .or_insert_with(|| fallback.clone());
        }
    }
}

struct PathEntry {
    path: String,
    methods: HashMap<Method, VersionBucket>,
}

struct Mount {
    base_url: String,
    paths: Vec<PathEntry>,
}

/// One row of [`RouteTable::entries`].
pub struct RouteEntry<'a> {
    pub base_url: &'a str,
    pub path: &'a str,
    pub method: &'a Method,
    pub version: Option<Version>,
    pub handler: &'a Handler,
}

/// The four-level route mapping owned by an HTTP registry.
#[derive(Default)]
pub struct RouteTable {
    mounts: Vec<Mount>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn mount_mut(&mut self, base_url: &str) -> &mut Mount {
        if let Some(index) = self.mounts.iter().position(|m| m.base_url == base_url) {
            return &mut self.mounts[index];
        }
        self.mounts.push(Mount {
            base_url: base_url.to_string(),
            paths: Vec::new(),
        });
        let last = self.mounts.len() - 1;
        &mut self.mounts[last]
    }

    fn path_mut<'a>(mount: &'a mut Mount, path: &str) -> &'a mut PathEntry {
        if let Some(index) = mount.paths.iter().position(|p| p.path == path) {
            return &mut mount.paths[index];
        }
        mount.paths.push(PathEntry {
            path: path.to_string(),
            methods: HashMap::new(),
        });
        let last = mount.paths.len() - 1;
        &mut mount.paths[last]
    }

    /// Inserts a handler at the exact four-tuple key, silently replacing
    /// any prior handler there.
    pub fn insert(
        &mut self,
        base_url: &str,
        path: &str,
        method: Method,
        version: Option<Version>,
        handler: Handler,
    ) {
        let mount = self.mount_mut(base_url);
        let entry = Self::path_mut(mount, path);
        entry.methods.entry(method).or_default().insert(version, handler);
    }

    /// Replaces the whole method map for one (base URL, path) slot. Used by
    /// `extend`, which merges buckets wholesale while sharing the handlers.
    pub fn set_methods(
        &mut self,
        base_url: &str,
        path: &str,
        methods: HashMap<Method, VersionBucket>,
    ) {
        let mount = self.mount_mut(base_url);
        Self::path_mut(mount, path).methods = methods;
    }

    /// Exact-key lookup. Fallback logic lives in the version resolver and
    /// the per-table lookup helpers, not here.
    pub fn lookup(
        &self,
        base_url: &str,
        path: &str,
        method: &Method,
        version: Option<Version>,
    ) -> Option<&Handler> {
        self.mounts
            .iter()
            .find(|m| m.base_url == base_url)?
            .paths
            .iter()
            .find(|p| p.path == path)?
            .methods
            .get(method)?
            .get(version)
    }

    /// Iterates (base URL, path, method map) slots in insertion order.
    pub fn paths(&self) -> impl Iterator<Item = (&str, &str, &HashMap<Method, VersionBucket>)> {
        self.mounts.iter().flat_map(|m| {
            m.paths
                .iter()
                .map(move |p| (m.base_url.as_str(), p.path.as_str(), &p.methods))
        })
    }

    /// Mutable access to every version bucket, for the build-time fill pass.
    pub fn buckets_mut(&mut self) -> impl Iterator<Item = &mut VersionBucket> {
        self.mounts
            .iter_mut()
            .flat_map(|m| m.paths.iter_mut())
            .flat_map(|p| p.methods.values_mut())
    }

    /// All registered entries, base URL and path levels in insertion order.
    /// Restartable: each call walks the table from the start.
    pub fn entries(&self) -> impl Iterator<Item = RouteEntry<'_>> {
        self.paths().flat_map(|(base_url, path, methods)| {
            methods.iter().flat_map(move |(method, bucket)| {
                bucket.handlers().map(move |(version, handler)| RouteEntry {
                    base_url,
                    path,
                    method,
                    version,
                    handler,
                })
            })
        })
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Interface;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    fn handler(name: &str) -> Handler {
        Handler::new(Interface::new(name), |_req| async {
            Ok(StatusCode::OK.into_response())
        })
    }

    #[test]
    fn repeated_insert_replaces_silently() {
        let mut table = RouteTable::new();
        let first = handler("first");
        let second = handler("second");

        table.insert("", "/items", Method::GET, None, first);
        table.insert("", "/items", Method::GET, None, second.clone());

        let found = table.lookup("", "/items", &Method::GET, None).unwrap();
        assert!(found.same(&second));
        assert_eq!(table.entries().count(), 1);
    }

    #[test]
    fn lookup_is_exact_key_only() {
        let mut table = RouteTable::new();
        table.insert("", "/items", Method::GET, Some(1), handler("v1"));

        assert!(table.lookup("", "/items", &Method::GET, None).is_none());
        assert!(table.lookup("", "/items", &Method::POST, Some(1)).is_none());
        assert!(table.lookup("/api", "/items", &Method::GET, Some(1)).is_none());
        assert!(table.lookup("", "/items", &Method::GET, Some(1)).is_some());
    }

    #[test]
    fn entries_preserve_base_and_path_insertion_order() {
        let mut table = RouteTable::new();
        table.insert("/b", "/first", Method::GET, None, handler("a"));
        table.insert("/b", "/second", Method::GET, None, handler("b"));
        table.insert("/a", "/third", Method::GET, None, handler("c"));

        let order: Vec<(String, String)> = table
            .paths()
            .map(|(base, path, _)| (base.to_string(), path.to_string()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("/b".to_string(), "/first".to_string()),
                ("/b".to_string(), "/second".to_string()),
                ("/a".to_string(), "/third".to_string()),
            ]
        );
    }

    #[test]
    fn fill_missing_duplicates_the_unversioned_handler() {
        let unversioned = handler("default");
        let mut bucket = VersionBucket::default();
        bucket.insert(None, unversioned.clone());

        let declared: BTreeSet<Version> = [1, 2].into_iter().collect();
        bucket.fill_missing(&declared);

        assert!(bucket.get(Some(1)).unwrap().same(&unversioned));
        assert!(bucket.get(Some(2)).unwrap().same(&unversioned));
        assert!(bucket.get(None).unwrap().same(&unversioned));
    }

    #[test]
    fn fill_missing_uses_sole_versioned_handler_as_fallback() {
        let only = handler("v1");
        let mut bucket = VersionBucket::default();
        bucket.insert(Some(1), only.clone());

        let declared: BTreeSet<Version> = [1, 2].into_iter().collect();
        bucket.fill_missing(&declared);

        assert!(bucket.get(Some(2)).unwrap().same(&only));
    }

    #[test]
    fn fill_missing_never_overwrites_concrete_versions() {
        let default = handler("default");
        let v2 = handler("v2");
        let mut bucket = VersionBucket::default();
        bucket.insert(None, default.clone());
        bucket.insert(Some(2), v2.clone());

        let declared: BTreeSet<Version> = [1, 2].into_iter().collect();
        bucket.fill_missing(&declared);

        assert!(bucket.get(Some(1)).unwrap().same(&default));
        assert!(bucket.get(Some(2)).unwrap().same(&v2));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: after the fill pass, every declared version has a
            /// handler whenever the bucket held an unversioned one, and
            /// running the pass again changes nothing.
            #[test]
            fn fill_missing_is_total_and_idempotent(
                declared in proptest::collection::btree_set(1u32..20, 0..6)
            ) {
                let mut bucket = VersionBucket::default();
                bucket.insert(None, handler("default"));
                bucket.fill_missing(&declared);

                for &v in &declared {
                    prop_assert!(bucket.get(Some(v)).is_some());
                }
                let before = bucket.len();
                bucket.fill_missing(&declared);
                prop_assert_eq!(bucket.len(), before);
            }

            /// Property: the last insert at a four-tuple key wins.
            #[test]
            fn insert_is_last_writer_wins(versions in proptest::collection::vec(proptest::option::of(1u32..5), 1..10)) {
                let mut table = RouteTable::new();
                let mut last: std::collections::HashMap<Option<Version>, Handler> = Default::default();
                for (i, version) in versions.iter().enumerate() {
                    let h = handler(&format!("h{i}"));
                    table.insert("", "/p", Method::GET, *version, h.clone());
                    last.insert(*version, h);
                }
                for (version, expected) in &last {
                    let found = table.lookup("", "/p", &Method::GET, *version).unwrap();
                    prop_assert!(found.same(expected));
                }
            }
        }
    }
}
