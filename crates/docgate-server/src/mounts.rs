//! The mount table.
//!
//! Every service pipeline is mounted under a path prefix. A request goes to
//! the pipeline with the longest prefix that matches it on a segment
//! boundary: with `/` and `/graphql` mounted, `/graphql/shop` goes to the
//! GraphQL pipeline while `/graphqlx` and `/db/coll` go to the document API.

use docgate_pipeline::SharedHandler;

/// A pipeline mounted under a path prefix.
#[derive(Clone)]
pub struct Mount {
    prefix: String,
    name: String,
    head: SharedHandler,
}

impl Mount {
    /// Returns the path prefix, without a trailing slash except for `/`.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the name of the mounted service.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the head of the pipeline.
    #[must_use]
    pub fn head(&self) -> &SharedHandler {
        &self.head
    }

    fn matches(&self, path: &str) -> bool {
        if self.prefix == "/" {
            return path.starts_with('/');
        }
        path.strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }
}

impl std::fmt::Debug for Mount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mount")
            .field("prefix", &self.prefix)
            .field("name", &self.name)
            .field("head", &self.head.name())
            .finish()
    }
}

/// Pipelines by mount prefix.
#[derive(Debug, Default, Clone)]
pub struct MountTable {
    // Longest prefix first.
    mounts: Vec<Mount>,
}

impl MountTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mounts a pipeline. A later mount replaces an earlier one with the
    /// same prefix.
    pub fn mount(&mut self, prefix: &str, name: impl Into<String>, head: SharedHandler) {
        let prefix = normalize(prefix);
        self.mounts.retain(|m| m.prefix != prefix);
        self.mounts.push(Mount {
            prefix,
            name: name.into(),
            head,
        });
        self.mounts.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
    }

    /// Returns the mount serving `path`.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&Mount> {
        self.mounts.iter().find(|m| m.matches(path))
    }

    /// Iterates over the mounts, longest prefix first.
    pub fn iter(&self) -> impl Iterator<Item = &Mount> {
        self.mounts.iter()
    }

    /// Returns the number of mounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    /// Returns true if nothing is mounted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }
}

fn normalize(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgate_pipeline::FnHandler;

    fn table() -> MountTable {
        let mut table = MountTable::new();
        table.mount("/", "documents", FnHandler::shared("documents", |_| Ok(())));
        table.mount("/graphql/", "graphql", FnHandler::shared("graphql", |_| Ok(())));
        table.mount("ping", "ping", FnHandler::shared("ping", |_| Ok(())));
        table
    }

    #[test]
    fn test_longest_prefix_wins() {
        let table = table();
        let name = |path: &str| table.resolve(path).map(|m| m.name().to_string());

        assert_eq!(name("/graphql/shop").as_deref(), Some("graphql"));
        assert_eq!(name("/graphql").as_deref(), Some("graphql"));
        assert_eq!(name("/ping").as_deref(), Some("ping"));
        assert_eq!(name("/graphqlx").as_deref(), Some("documents"));
        assert_eq!(name("/db/coll/1").as_deref(), Some("documents"));
        assert_eq!(name("/").as_deref(), Some("documents"));
    }

    #[test]
    fn test_prefixes_are_normalized() {
        let table = table();
        let prefixes: Vec<&str> = table.iter().map(Mount::prefix).collect();
        assert_eq!(prefixes, ["/graphql", "/ping", "/"]);
    }

    #[test]
    fn test_unmatched_without_root() {
        let mut table = MountTable::new();
        table.mount("/ping", "ping", FnHandler::shared("ping", |_| Ok(())));

        assert!(table.resolve("/other").is_none());
        assert_eq!(table.len(), 1);

        table.mount("/ping/", "ping2", FnHandler::shared("ping2", |_| Ok(())));
        assert_eq!(table.len(), 1);
        assert_eq!(table.resolve("/ping").unwrap().name(), "ping2");
    }
}
