//! Cross-platform socket and configuration paths
//!
//! Unix/macOS: engine sockets live under $XDG_RUNTIME_DIR or /tmp
//! Windows: engines listen on named pipes \\.\pipe\testdriver-<engine>-<username>

use std::io;
use std::path::PathBuf;

/// Application name used for directories and socket prefixes
const APP_NAME: &str = "testdriver";

/// File name of the default configuration store
const CONFIG_FILE: &str = "driver.toml";

/// Get the socket path for a served engine
///
/// - Unix: `$XDG_RUNTIME_DIR/testdriver/<engine>.sock` or `/tmp/testdriver-<uid>/<engine>.sock`
/// - Windows: a bare name converted to a named pipe by the interprocess crate
#[cfg(unix)]
pub fn engine_socket_path(engine: &str) -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir)
            .join(APP_NAME)
            .join(format!("{}.sock", engine));
    }

    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/tmp/{}-{}", APP_NAME, uid)).join(format!("{}.sock", engine))
}

#[cfg(windows)]
pub fn engine_socket_path(engine: &str) -> PathBuf {
    PathBuf::from(engine_socket_name(engine))
}

/// Get the socket name for interprocess LocalSocketName
#[cfg(unix)]
pub fn engine_socket_name(engine: &str) -> String {
    engine_socket_path(engine).to_string_lossy().into_owned()
}

#[cfg(windows)]
pub fn engine_socket_name(engine: &str) -> String {
    let username = std::env::var("USERNAME").unwrap_or_else(|_| "default".to_string());
    format!("{}-{}-{}", APP_NAME, engine, username)
}

/// Ensure the socket directory exists with owner-only permissions
#[cfg(unix)]
pub fn ensure_socket_dir(engine: &str) -> io::Result<PathBuf> {
    let socket = engine_socket_path(engine);
    let dir = socket.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "Invalid socket path")
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }

    Ok(dir.to_path_buf())
}

#[cfg(windows)]
pub fn ensure_socket_dir(_engine: &str) -> io::Result<PathBuf> {
    Ok(PathBuf::new())
}

/// Remove a stale engine socket if it exists
#[cfg(unix)]
pub fn remove_socket(engine: &str) -> io::Result<()> {
    let path = engine_socket_path(engine);
    if path.exists() {
        std::fs::remove_file(&path)?;
    }
    Ok(())
}

#[cfg(windows)]
pub fn remove_socket(_engine: &str) -> io::Result<()> {
    Ok(())
}

/// Get the configuration directory path
///
/// - Linux: `~/.config/testdriver/`
/// - macOS: `~/Library/Application Support/testdriver/`
/// - Windows: `%APPDATA%\testdriver\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the default configuration store
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_FILE))
}

/// Get the path to the log directory
pub fn log_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.data_dir().join("logs"))
}
