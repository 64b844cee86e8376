//! Common utilities shared between the driver and served engines

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};
