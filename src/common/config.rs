//! Driver settings read through the configuration chain

use std::time::Duration;

use crate::config::ConfigResolver;
use crate::debug::DebugPolicy;
use crate::driver::DispatchMode;
use crate::flow::{FlowControlTable, Outcome};

/// Section holding driver-wide settings
pub const SECTION_DRIVER: &str = "Driver";
/// Section holding the initial flow-control block bindings
pub const SECTION_FLOW_CONTROL: &str = "FlowControl";

pub const ITEM_DEBUG: &str = "Debug";
pub const ITEM_BREAKPOINTS: &str = "Breakpoints";
pub const ITEM_DRIVER_COMMAND_DEBUG: &str = "DriverCommandDebug";
pub const ITEM_TEST_COMMAND_DEBUG: &str = "TestCommandDebug";
pub const ITEM_DISPATCH_MODE: &str = "DispatchMode";
pub const ITEM_ENGINE_TIMEOUT: &str = "EngineTimeoutSecs";
pub const ITEM_SEPARATOR: &str = "Separator";

/// Everything the driver needs from configuration, resolved once at setup
#[derive(Debug, Clone)]
pub struct DriverSettings {
    /// Which record classes pause for debugging
    pub debug: DebugPolicy,
    /// Initial outcome → block bindings
    pub flow: FlowControlTable,
    /// How records are routed to engines
    pub dispatch_mode: DispatchMode,
    /// Handshake timeout; `None` waits forever
    pub engine_timeout: Option<Duration>,
    /// Record field separator
    pub separator: String,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            debug: DebugPolicy::new(),
            flow: FlowControlTable::new(),
            dispatch_mode: DispatchMode::default(),
            engine_timeout: None,
            separator: default_separator(),
        }
    }
}

fn default_separator() -> String {
    ",".to_string()
}

impl DriverSettings {
    /// Resolve settings from the chain, falling back to defaults item by item
    ///
    /// Malformed values are logged and replaced by their default; they never
    /// fail the resolve.
    pub fn resolve(resolver: &ConfigResolver) -> Self {
        let mut settings = Self::default();

        let flag = |item: &str| read_bool(resolver, SECTION_DRIVER, item);
        settings.debug.set_record_debug_enabled(flag(ITEM_DEBUG));
        settings.debug.set_breakpoints_enabled(flag(ITEM_BREAKPOINTS));
        settings
            .debug
            .set_driver_command_debug_enabled(flag(ITEM_DRIVER_COMMAND_DEBUG));
        settings
            .debug
            .set_test_command_debug_enabled(flag(ITEM_TEST_COMMAND_DEBUG));

        if let Some(value) = resolver.lookup(SECTION_DRIVER, ITEM_DISPATCH_MODE) {
            match value.parse() {
                Ok(mode) => settings.dispatch_mode = mode,
                Err(e) => tracing::warn!(value = %value, "Ignoring {}: {}", ITEM_DISPATCH_MODE, e),
            }
        }

        if let Some(value) = resolver.lookup(SECTION_DRIVER, ITEM_ENGINE_TIMEOUT) {
            match value.trim().parse::<u64>() {
                Ok(0) => {}
                Ok(secs) => settings.engine_timeout = Some(Duration::from_secs(secs)),
                Err(_) => tracing::warn!(value = %value, "Ignoring {}: not a number of seconds", ITEM_ENGINE_TIMEOUT),
            }
        }

        if let Some(value) = resolver.lookup(SECTION_DRIVER, ITEM_SEPARATOR) {
            if value.is_empty() {
                tracing::warn!("Ignoring empty {}", ITEM_SEPARATOR);
            } else {
                settings.separator = value;
            }
        }

        for outcome in Outcome::ALL {
            if let Some(block) = resolver.lookup(SECTION_FLOW_CONTROL, outcome.config_item()) {
                let block = block.trim();
                if !block.is_empty() {
                    settings.flow.set(outcome, block);
                }
            }
        }

        tracing::debug!(?settings, "Resolved driver settings");
        settings
    }
}

/// Parse a boolean configuration value
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn read_bool(resolver: &ConfigResolver, section: &str, item: &str) -> bool {
    let Some(value) = resolver.lookup(section, item) else {
        return false;
    };
    parse_bool(&value).unwrap_or_else(|| {
        tracing::warn!(section, item, value = %value, "Not a boolean, using false");
        false
    })
}
