//! Layered configuration: providers and the first-match-wins resolver

mod resolver;
mod source;

pub use resolver::{ConfigResolver, PATH_LIST_SEPARATOR};
pub use source::{ConfigSource, EnvSource, MapSource, TomlSource};
