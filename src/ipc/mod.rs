//! IPC communication between the driver and out-of-process engines
//!
//! Uses Unix domain sockets on Unix/macOS and named pipes on Windows
//! via the interprocess crate.

pub mod protocol;
pub mod transport;
