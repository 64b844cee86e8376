//! CLI command handling
//!
//! Builds the configuration chain and the driver from command-line options
//! and formats run output.

use std::time::Duration;

use async_trait::async_trait;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::commands::{Commands, ConfigCommands, SourceArgs};
use crate::common::config::DriverSettings;
use crate::common::{paths, Error, Result};
use crate::config::{ConfigResolver, EnvSource, MapSource, TomlSource};
use crate::debug::DebugHook;
use crate::driver::{Driver, RunSummary, Script};
use crate::engine::{remote, EngineHandle, InProcessEngine, RemoteEngine, ShellEngine};
use crate::record::TestRecord;

/// Description of the command-line override store
pub const COMMAND_LINE_SOURCE: &str = "<command-line>";
/// Prefix of environment overrides: TESTDRIVER_<SECTION>_<ITEM>
pub const ENV_PREFIX: &str = "testdriver";

/// Dispatch a CLI command
pub async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            script,
            sources,
            engines,
            interactive,
        } => {
            let resolver = build_resolver(&sources)?;
            let settings = DriverSettings::resolve(&resolver);
            let script = Script::load(&script, &settings.separator)?;

            let mut driver = Driver::new(&settings);
            for spec in &engines {
                driver.add_engine(open_engine(spec, settings.engine_timeout).await?);
            }
            if interactive {
                driver = driver.with_debug_hook(StdinPause::new());
            }

            println!(
                "{} {} ({} engine(s), dispatch {})",
                "Running".blue().bold(),
                script.name().white().bold(),
                driver.engine_count(),
                driver.mode()
            );

            let summary = driver.run(&script).await;
            let shutdown = driver.shutdown().await;
            print_summary(&summary);
            shutdown?;

            match summary.counts.failed() {
                0 => Ok(()),
                failed => Err(Error::RecordsFailed(failed)),
            }
        }

        Commands::Engine { name } => remote::serve(&name, ShellEngine::new()).await,

        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Get {
                section,
                item,
                sources,
            } => {
                let resolver = build_resolver(&sources)?;
                match resolver.lookup(&section, &item) {
                    Some(value) => println!("{}", value),
                    None => println!("{} {}.{} is not set", "✗".red(), section, item),
                }
                Ok(())
            }

            ConfigCommands::Paths { sources } => {
                let resolver = build_resolver(&sources)?;
                for (i, path) in resolver.all_paths().iter().enumerate() {
                    let path = if path.is_empty() { "(none)" } else { path.as_str() };
                    println!("  {}. {}", i, path);
                }
                Ok(())
            }
        },
    }
}

/// Build the configuration chain for a command
///
/// Command-line overrides are the primary store. Then the environment,
/// each `--config` file in order, and finally the default config file.
pub fn build_resolver(sources: &SourceArgs) -> Result<ConfigResolver> {
    let mut resolver = ConfigResolver::new();

    let mut overrides = MapSource::new(COMMAND_LINE_SOURCE);
    for spec in &sources.overrides {
        overrides.parse_override(spec)?;
    }
    resolver.set_source(overrides);

    for path in &sources.configs {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        resolver.add_source(TomlSource::open(path)?);
    }

    if let Some(default) = paths::config_path() {
        resolver.add_source(TomlSource::open(default)?);
    }

    resolver.insert_source(EnvSource::new(ENV_PREFIX));

    tracing::debug!(paths = %resolver.joined_paths(), "Configuration chain");
    Ok(resolver)
}

/// Open an engine from a `--engine` value
async fn open_engine(spec: &str, timeout: Option<Duration>) -> Result<Box<dyn EngineHandle>> {
    let spec = spec.trim();
    match spec.split_once(':') {
        None if spec.eq_ignore_ascii_case("shell") => Ok(Box::new(
            InProcessEngine::spawn("shell", ShellEngine::new()).with_timeout(timeout),
        )),
        Some((kind, name)) if kind.eq_ignore_ascii_case("remote") && !name.trim().is_empty() => {
            let engine = RemoteEngine::connect(name.trim()).await?;
            Ok(Box::new(engine.with_timeout(timeout)))
        }
        _ => Err(Error::UnknownEngine(spec.to_string())),
    }
}

/// Debug hook that waits for Enter on stdin
pub struct StdinPause {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinPause {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinPause {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DebugHook for StdinPause {
    async fn pause(&mut self, record: &TestRecord) {
        eprintln!(
            "{} {} [{}] {}",
            "Paused".yellow().bold(),
            record.location().dimmed(),
            record.class,
            record.payload
        );
        eprintln!("  Press Enter to continue");
        if let Err(e) = self.lines.next_line().await {
            tracing::warn!("Could not read stdin: {}", e);
        }
    }
}

fn print_summary(summary: &RunSummary) {
    let counts = &summary.counts;
    println!();
    println!("{}", "Summary:".cyan());
    println!("  Records:       {}", counts.records);
    println!("  Passed:        {}", counts.passed.to_string().green());
    println!("  Warnings:      {}", counts.warnings.to_string().yellow());
    println!("  Failures:      {}", counts.failures.to_string().red());
    println!("  IO failures:   {}", counts.io_failures.to_string().red());
    println!("  Not executed:  {}", counts.not_executed);
    println!("  Skipped:       {}", counts.skipped);
    if summary.exited_early {
        println!("  {}", "Table exited early".dimmed());
    }

    if counts.failed() == 0 {
        println!("\n{} {}", "✓".green().bold(), "Run Passed".green().bold());
    } else {
        println!("\n{} {}", "✗".red().bold(), "Run Failed".red().bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args(configs: Vec<PathBuf>, overrides: &[&str]) -> SourceArgs {
        SourceArgs {
            configs,
            overrides: overrides.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_command_line_beats_files_and_files_keep_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.toml");
        let second = dir.path().join("second.toml");
        std::fs::write(&first, "[Driver]\nDispatchMode = \"all\"\nSeparator = \"|\"\n").unwrap();
        std::fs::write(&second, "[Driver]\nSeparator = \";\"\nDebug = 1\n").unwrap();

        let resolver = build_resolver(&args(
            vec![first, second],
            &["Driver.DispatchMode=first"],
        ))
        .unwrap();

        assert_eq!(resolver.lookup("Driver", "DispatchMode").as_deref(), Some("first"));
        assert_eq!(resolver.lookup("Driver", "Separator").as_deref(), Some("|"));
        assert_eq!(resolver.lookup("Driver", "Debug").as_deref(), Some("1"));

        let paths = resolver.all_paths();
        assert_eq!(paths[0], COMMAND_LINE_SOURCE);
        assert_eq!(paths[1], "env:TESTDRIVER_*");
        assert!(paths[2].ends_with("first.toml"));
        assert!(paths[3].ends_with("second.toml"));
    }

    #[test]
    fn test_bad_override_is_rejected() {
        let err = build_resolver(&args(vec![], &["DriverDebug=1"])).unwrap_err();
        assert!(matches!(err, Error::InvalidOverride(_)));
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = build_resolver(&args(vec![dir.path().join("absent.toml")], &[])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_unknown_engine_is_rejected() {
        for spec in ["browser", "remote:", "local:x"] {
            let err = open_engine(spec, None).await.err().unwrap();
            assert!(matches!(err, Error::UnknownEngine(_)), "{spec}");
        }
    }

    #[tokio::test]
    async fn test_shell_engine_opens() {
        let mut engine = open_engine("Shell", None).await.unwrap();
        assert_eq!(engine.name(), "shell");
        engine.shutdown().await.unwrap();
    }
}
