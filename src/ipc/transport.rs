//! Local-socket link between a driver and a served engine
//!
//! An engine started with `testdriver engine --name <name>` listens on its
//! own socket, a Unix domain socket in the runtime directory or a named pipe
//! on Windows. Drivers reach it with `--engine remote:<name>`. Every request
//! and response crosses the link as one frame: a little-endian `u32` byte
//! count followed by that many bytes of JSON.

use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::common::paths;

/// Largest frame either side accepts; a record with its status is far smaller
const MAX_FRAME_SIZE: u32 = 10 * 1024 * 1024;

#[cfg(unix)]
pub mod platform {
    pub use interprocess::local_socket::tokio::{prelude::*, Listener, Stream};
    pub use interprocess::local_socket::{GenericFilePath, ListenerOptions};
}

#[cfg(windows)]
pub mod platform {
    pub use interprocess::local_socket::tokio::{prelude::*, Listener, Stream};
    pub use interprocess::local_socket::{GenericNamespaced, ListenerOptions};
}

use platform::*;

/// Connected driver/engine link
pub use platform::Stream;

/// Open the socket `engine` is served on
///
/// A socket file left behind by an engine that did not stop cleanly is
/// replaced. On Unix the new socket is readable by the owner only.
pub async fn create_listener(engine: &str) -> io::Result<Listener> {
    paths::ensure_socket_dir(engine)?;
    paths::remove_socket(engine)?;

    let name = paths::engine_socket_name(engine);

    #[cfg(unix)]
    let listener = {
        let name = name.to_fs_name::<GenericFilePath>()?;
        ListenerOptions::new().name(name).create_tokio()?
    };

    #[cfg(windows)]
    let listener = {
        let name = name.to_ns_name::<GenericNamespaced>()?;
        ListenerOptions::new().name(name).create_tokio()?
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let path = paths::engine_socket_path(engine);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(listener)
}

/// Dial the engine served as `engine`
///
/// Fails with `NotFound` or `ConnectionRefused` when no engine is listening.
pub async fn connect(engine: &str) -> io::Result<Stream> {
    let name = paths::engine_socket_name(engine);

    #[cfg(unix)]
    let stream = {
        let name = name.to_fs_name::<GenericFilePath>()?;
        Stream::connect(name).await?
    };

    #[cfg(windows)]
    let stream = {
        let name = name.to_ns_name::<GenericNamespaced>()?;
        Stream::connect(name).await?
    };

    Ok(stream)
}

/// Write one frame and flush it
pub async fn send_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    let len = u32::try_from(data.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_SIZE)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Frame of {} bytes exceeds the link limit", data.len()),
            )
        })?;

    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await
}

/// Read one frame
///
/// A link closed before the length prefix reads as `UnexpectedEof`, which
/// both sides treat as the peer hanging up.
pub async fn recv_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> io::Result<Vec<u8>> {
    let len = reader.read_u32_le().await?;
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Frame of {} bytes exceeds the link limit", len),
        ));
    }

    let mut data = vec![0u8; len as usize];
    reader.read_exact(&mut data).await?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_are_length_prefixed() {
        let (mut a, mut b) = tokio::io::duplex(64);
        send_frame(&mut a, b"{\"id\":1}").await.unwrap();
        let data = recv_frame(&mut b).await.unwrap();
        assert_eq!(data, b"{\"id\":1}");
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&(MAX_FRAME_SIZE + 1).to_le_bytes());
        let mut reader = std::io::Cursor::new(frame);
        let err = recv_frame(&mut reader).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_oversized_frame_is_not_sent() {
        let mut sink = Vec::new();
        let data = vec![b' '; MAX_FRAME_SIZE as usize + 1];
        let err = send_frame(&mut sink, &data).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_eof_before_frame_is_unexpected_eof() {
        let mut reader = std::io::Cursor::new(Vec::<u8>::new());
        let err = recv_frame(&mut reader).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
