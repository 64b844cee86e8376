//! Key/value configuration providers
//!
//! A [`ConfigSource`] answers `(section, item)` lookups and describes where its
//! values come from. Sections and items match case-insensitively, the same way
//! INI-style driver stores have always been read.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::common::{Error, Result};

/// A primitive key/value provider consulted by the [`ConfigResolver`](super::ConfigResolver)
pub trait ConfigSource: Send + Sync {
    /// Look up an item in a section. `None` means "not defined here".
    fn lookup(&self, section: &str, item: &str) -> Option<String>;

    /// Path (or pseudo-path) of the backing store, for diagnostics
    fn describe(&self) -> String;
}

fn key(section: &str, item: &str) -> (String, String) {
    (
        section.trim().to_ascii_lowercase(),
        item.trim().to_ascii_lowercase(),
    )
}

/// In-memory store, used for command-line overrides and tests
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    name: String,
    values: HashMap<(String, String), String>,
}

impl MapSource {
    /// Create an empty store described by `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: HashMap::new(),
        }
    }

    /// Builder-style insert
    pub fn with(mut self, section: &str, item: &str, value: impl Into<String>) -> Self {
        self.set(section, item, value);
        self
    }

    /// Insert or replace a value
    pub fn set(&mut self, section: &str, item: &str, value: impl Into<String>) {
        self.values.insert(key(section, item), value.into());
    }

    /// Remove a value, returning what was stored
    pub fn remove(&mut self, section: &str, item: &str) -> Option<String> {
        self.values.remove(&key(section, item))
    }

    /// Parse a `Section.Item=value` override
    pub fn parse_override(&mut self, spec: &str) -> Result<()> {
        let (path, value) = spec
            .split_once('=')
            .ok_or_else(|| Error::InvalidOverride(spec.to_string()))?;
        let (section, item) = path
            .split_once('.')
            .ok_or_else(|| Error::InvalidOverride(spec.to_string()))?;
        if section.trim().is_empty() || item.trim().is_empty() {
            return Err(Error::InvalidOverride(spec.to_string()));
        }
        self.set(section, item, value.trim());
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ConfigSource for MapSource {
    fn lookup(&self, section: &str, item: &str) -> Option<String> {
        self.values.get(&key(section, item)).cloned()
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// File-backed store in TOML form
///
/// ```toml
/// [Driver]
/// Debug = true
///
/// [FlowControl]
/// ScriptFailureBlock = "RECOVER"
/// ```
///
/// Non-string scalars are stringified. Nested tables and arrays are ignored.
#[derive(Debug, Clone)]
pub struct TomlSource {
    path: PathBuf,
    values: HashMap<(String, String), String>,
}

impl TomlSource {
    /// Open a store. A missing file is an empty store, not an error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Configuration store not found, treating as empty");
                String::new()
            }
            Err(e) => return Err(Error::config_parse(&path.display().to_string(), e)),
        };
        Self::parse(path, &content)
    }

    /// Parse store content that was read elsewhere
    pub fn parse(path: impl Into<PathBuf>, content: &str) -> Result<Self> {
        let path = path.into();
        let table: toml::Table = toml::from_str(content)
            .map_err(|e| Error::config_parse(&path.display().to_string(), e))?;

        let mut values = HashMap::new();
        for (section, body) in table {
            let toml::Value::Table(items) = body else {
                tracing::warn!(path = %path.display(), %section, "Ignoring top-level value outside a section");
                continue;
            };
            for (item, value) in items {
                let value = match value {
                    toml::Value::String(s) => s,
                    toml::Value::Integer(i) => i.to_string(),
                    toml::Value::Float(f) => f.to_string(),
                    toml::Value::Boolean(b) => b.to_string(),
                    toml::Value::Datetime(d) => d.to_string(),
                    toml::Value::Array(_) | toml::Value::Table(_) => continue,
                };
                values.insert(key(&section, &item), value);
            }
        }

        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for TomlSource {
    fn lookup(&self, section: &str, item: &str) -> Option<String> {
        self.values.get(&key(section, item)).cloned()
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Process environment as a store: `(Driver, Debug)` reads `<PREFIX>_DRIVER_DEBUG`
#[derive(Debug, Clone)]
pub struct EnvSource {
    prefix: String,
}

impl EnvSource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Environment variable name consulted for a section/item pair
    pub fn var_name(&self, section: &str, item: &str) -> String {
        let normalize = |s: &str| {
            s.trim()
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() {
                        c.to_ascii_uppercase()
                    } else {
                        '_'
                    }
                })
                .collect::<String>()
        };
        format!(
            "{}_{}_{}",
            normalize(&self.prefix),
            normalize(section),
            normalize(item)
        )
    }
}

impl ConfigSource for EnvSource {
    fn lookup(&self, section: &str, item: &str) -> Option<String> {
        std::env::var(self.var_name(section, item)).ok()
    }

    fn describe(&self) -> String {
        format!("env:{}_*", self.prefix.to_ascii_uppercase())
    }
}
