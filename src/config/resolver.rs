//! Layered, first-match-wins configuration resolution
//!
//! Evaluation order is the primary store first, then the chained sources in
//! chain order. The first source that defines an item wins and no later
//! source is queried.

use super::source::ConfigSource;

/// Separator used when aggregated store paths are rendered as one string
#[cfg(windows)]
pub const PATH_LIST_SEPARATOR: char = ';';
#[cfg(not(windows))]
pub const PATH_LIST_SEPARATOR: char = ':';

/// Ordered chain of configuration providers
#[derive(Default)]
pub struct ConfigResolver {
    primary: Option<Box<dyn ConfigSource>>,
    chain: Vec<Box<dyn ConfigSource>>,
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the primary store
    ///
    /// Only the first call takes effect. Later calls are ignored (with a
    /// warning) so the primary cannot be swapped out mid-run. Returns whether
    /// the source was accepted.
    pub fn set_source(&mut self, source: impl ConfigSource + 'static) -> bool {
        if let Some(existing) = &self.primary {
            tracing::warn!(
                existing = %existing.describe(),
                ignored = %source.describe(),
                "Primary configuration source already set, ignoring"
            );
            return false;
        }
        tracing::debug!(source = %source.describe(), "Primary configuration source set");
        self.primary = Some(Box::new(source));
        true
    }

    /// Detach the primary store, leaving the chain in place
    pub fn remove_source(&mut self) -> Option<Box<dyn ConfigSource>> {
        self.primary.take()
    }

    pub fn has_source(&self) -> bool {
        self.primary.is_some()
    }

    /// Append a source at the tail of the chain (lowest priority)
    pub fn add_source(&mut self, source: impl ConfigSource + 'static) {
        tracing::debug!(source = %source.describe(), "Configuration source appended");
        self.chain.push(Box::new(source));
    }

    /// Prepend a source at the head of the chain
    ///
    /// It outranks every chained source but never the primary store.
    pub fn insert_source(&mut self, source: impl ConfigSource + 'static) {
        tracing::debug!(source = %source.describe(), "Configuration source inserted at head");
        self.chain.insert(0, Box::new(source));
    }

    /// Resolve an item. `None` means no source defines it.
    pub fn lookup(&self, section: &str, item: &str) -> Option<String> {
        self.primary
            .iter()
            .chain(self.chain.iter())
            .find_map(|source| source.lookup(section, item))
    }

    /// Resolve an item, falling back to `default` when nothing defines it
    pub fn lookup_or(&self, section: &str, item: &str, default: &str) -> String {
        self.lookup(section, item).unwrap_or_else(|| default.to_string())
    }

    /// Backing paths in evaluation order
    ///
    /// Always starts with the primary's path, or an empty string when there
    /// is no primary, followed by each chained source's aggregated path.
    pub fn all_paths(&self) -> Vec<String> {
        let mut paths = Vec::with_capacity(self.chain.len() + 1);
        paths.push(
            self.primary
                .as_ref()
                .map(|source| source.describe())
                .unwrap_or_default(),
        );
        paths.extend(self.chain.iter().map(|source| source.describe()));
        paths
    }

    /// [`all_paths`](Self::all_paths) joined with [`PATH_LIST_SEPARATOR`]
    pub fn joined_paths(&self) -> String {
        self.all_paths().join(&PATH_LIST_SEPARATOR.to_string())
    }

    /// Number of chained sources, excluding the primary
    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }
}

/// A resolver can itself be chained under another resolver
impl ConfigSource for ConfigResolver {
    fn lookup(&self, section: &str, item: &str) -> Option<String> {
        ConfigResolver::lookup(self, section, item)
    }

    fn describe(&self) -> String {
        self.joined_paths()
    }
}

impl std::fmt::Debug for ConfigResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigResolver")
            .field("paths", &self.all_paths())
            .finish()
    }
}
