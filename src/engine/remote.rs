//! Engines served from another process over the local-socket transport
//!
//! The driver side is [`RemoteEngine`]; the engine side is [`serve`] (or
//! [`serve_stream`] for a single already-connected stream). Both speak the
//! length-prefixed JSON protocol in [`crate::ipc::protocol`].

use std::time::Duration;

use interprocess::local_socket::traits::tokio::Listener as ListenerTrait;
use tokio::io::{AsyncRead, AsyncWrite, BufReader, ReadHalf, WriteHalf};

use crate::common::error::IpcError;
use crate::common::{paths, Error, Result};
use crate::ipc::protocol::{Command, Request, Response};
use crate::ipc::transport::{self, Stream};
use crate::record::{RecordStatus, TestRecord};

use super::{EngineHandle, RecordProcessor};

/// Driver-side handle to an engine behind a socket
pub struct RemoteEngine<S = Stream> {
    name: String,
    reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    next_id: u64,
    timeout: Option<Duration>,
    shut_down: bool,
    /// Set while a request is unanswered; stays set if the exchange is cut short
    broken: bool,
}

impl RemoteEngine<Stream> {
    /// Connect to the engine served under `name`
    pub async fn connect(name: &str) -> Result<Self> {
        let stream = transport::connect(name).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound
                || e.kind() == std::io::ErrorKind::ConnectionRefused
            {
                Error::EngineNotRunning(name.to_string())
            } else {
                Error::EngineCommunication(e.to_string())
            }
        })?;
        Ok(Self::from_stream(name, stream))
    }
}

impl<S> RemoteEngine<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Wrap an already-connected stream
    pub fn from_stream(name: impl Into<String>, stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            name: name.into(),
            reader,
            writer,
            next_id: 1,
            timeout: None,
            shut_down: false,
            broken: false,
        }
    }

    /// Give up on requests that take longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check that the engine answers
    pub async fn ping(&mut self) -> Result<()> {
        self.send_command(Command::Ping).await.map(|_| ())
    }

    async fn send_command(&mut self, command: Command) -> Result<Response> {
        if self.shut_down {
            return Err(Error::EngineShutdown(self.name.clone()));
        }
        if self.broken {
            return Err(Error::EngineDisconnected(self.name.clone()));
        }
        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.exchange(command)).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(engine = %self.name, ?limit, "Engine did not answer in time, dropping connection");
                    Err(Error::handshake_timeout(&self.name, limit))
                }
            },
            None => self.exchange(command).await,
        }
    }

    async fn exchange(&mut self, command: Command) -> Result<Response> {
        let id = self.next_id;
        self.next_id += 1;

        let request = Request { id, command };
        let json = serde_json::to_vec(&request)?;

        // A late answer or a half-read frame would desync every later request.
        self.broken = true;

        transport::send_frame(&mut self.writer, &json)
            .await
            .map_err(|e| Error::EngineCommunication(e.to_string()))?;

        let response_data = transport::recv_frame(&mut self.reader)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    Error::EngineDisconnected(self.name.clone())
                } else {
                    Error::EngineCommunication(e.to_string())
                }
            })?;

        let response: Response = serde_json::from_slice(&response_data)?;

        if response.id != id {
            return Err(Error::EngineCommunication(format!(
                "Response ID mismatch: expected {}, got {}",
                id, response.id
            )));
        }
        self.broken = false;

        if response.success {
            Ok(response)
        } else {
            let error = response.error.unwrap_or_else(|| IpcError {
                code: "UNKNOWN".to_string(),
                message: "Unknown error".to_string(),
            });
            Err(error.into_error(&self.name))
        }
    }
}

#[async_trait::async_trait]
impl<S> EngineHandle for RemoteEngine<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn dispatch(&mut self, record: &TestRecord) -> Result<RecordStatus> {
        let response = self
            .send_command(Command::Process {
                record: record.clone(),
            })
            .await?;
        response
            .record
            .map(|r| r.status)
            .ok_or_else(|| Error::EngineCommunication("Process response carried no record".to_string()))
    }

    async fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        if self.broken {
            self.shut_down = true;
            tracing::debug!(engine = %self.name, "Connection already dropped, skipping shutdown request");
            return Ok(());
        }
        let result = self.send_command(Command::Shutdown).await;
        self.shut_down = true;
        match result {
            Ok(_) | Err(Error::EngineDisconnected(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Serve requests from one connected driver
///
/// Returns `true` when the driver asked the engine to shut down and
/// `false` when the driver simply went away.
pub async fn serve_stream<S, P>(stream: S, processor: &mut P) -> Result<bool>
where
    S: AsyncRead + AsyncWrite + Unpin,
    P: RecordProcessor,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    loop {
        let request_data = match transport::recv_frame(&mut reader).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                tracing::debug!("Driver disconnected");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        let (response, stop) = match serde_json::from_slice::<Request>(&request_data) {
            Ok(request) => {
                tracing::trace!(id = request.id, command = ?request.command, "Request");
                match request.command {
                    Command::Process { mut record } => {
                        processor.process(&mut record).await;
                        (Response::processed(request.id, record), false)
                    }
                    Command::Ping => (Response::ok(request.id), false),
                    Command::Shutdown => (Response::ok(request.id), true),
                }
            }
            Err(e) => {
                tracing::warn!("Malformed request: {}", e);
                let error = Error::Internal(format!("Malformed request: {}", e));
                (Response::error(0, IpcError::from(&error)), false)
            }
        };

        let json = serde_json::to_vec(&response)?;
        transport::send_frame(&mut writer, &json).await?;

        if stop {
            return Ok(true);
        }
    }
}

/// Listen on the engine's socket and serve drivers one at a time until one
/// of them asks for shutdown or the process is interrupted
pub async fn serve<P: RecordProcessor>(name: &str, mut processor: P) -> Result<()> {
    let listener = transport::create_listener(name).await?;
    tracing::info!(engine = %name, "Engine listening on {}", paths::engine_socket_name(name));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received interrupt, shutting down");
                break;
            }
            accept_result = listener.accept() => {
                match accept_result {
                    Ok(stream) => match serve_stream(stream, &mut processor).await {
                        Ok(true) => {
                            tracing::info!("Shutdown requested, exiting");
                            break;
                        }
                        Ok(false) => {}
                        Err(e) => tracing::error!("Error serving driver: {}", e),
                    },
                    Err(e) => tracing::error!("Accept error: {}", e),
                }
            }
        }
    }

    paths::remove_socket(name)?;
    tracing::info!(engine = %name, "Engine stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::InProcessEngine;
    use crate::record::StatusCode;

    /// Accepts `E, Echo, <text>` and fails `E, Fail, <text>`
    #[derive(Clone)]
    struct Echo;

    #[async_trait::async_trait]
    impl RecordProcessor for Echo {
        async fn process(&mut self, record: &mut TestRecord) {
            let text = record.field(2).unwrap_or_default().to_string();
            match record.command() {
                Some("Echo") => record.set_status(RecordStatus::ok(text)),
                Some("Fail") => record.set_status(RecordStatus::failure(text)),
                _ => {}
            }
        }
    }

    fn remote_echo() -> (RemoteEngine<tokio::io::DuplexStream>, tokio::task::JoinHandle<Result<bool>>) {
        let (driver_side, engine_side) = tokio::io::duplex(4096);
        let server = tokio::spawn(async move {
            let mut processor = Echo;
            serve_stream(engine_side, &mut processor).await
        });
        (RemoteEngine::from_stream("echo", driver_side), server)
    }

    #[tokio::test]
    async fn test_remote_matches_in_process() {
        let (mut remote, server) = remote_echo();
        let mut local = InProcessEngine::spawn("echo", Echo);

        for line in ["E, Echo, hi", "E, Fail, broken", "E, Other, x", "BP"] {
            let record = TestRecord::new(line, ",");
            let a = remote.dispatch(&record).await.unwrap();
            let b = local.dispatch(&record).await.unwrap();
            assert_eq!(a, b, "mismatch for {line}");
        }

        remote.shutdown().await.unwrap();
        local.shutdown().await.unwrap();
        assert!(server.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn test_remote_not_mine_is_not_executed() {
        let (mut remote, _server) = remote_echo();
        remote.ping().await.unwrap();
        let status = remote
            .dispatch(&TestRecord::new("T, W, C, Click", ","))
            .await
            .unwrap();
        assert_eq!(status.code, StatusCode::SCRIPT_NOT_EXECUTED);
    }

    #[tokio::test]
    async fn test_dispatch_after_remote_shutdown_fails() {
        let (mut remote, _server) = remote_echo();
        remote.shutdown().await.unwrap();
        remote.shutdown().await.unwrap();
        let err = remote
            .dispatch(&TestRecord::new("E, Echo, x", ","))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EngineShutdown(_)));
    }

    /// Takes 200 ms over its first record, answers at once after that
    struct SlowStart {
        first: bool,
    }

    #[async_trait::async_trait]
    impl RecordProcessor for SlowStart {
        async fn process(&mut self, record: &mut TestRecord) {
            if std::mem::take(&mut self.first) {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            record.set_status(RecordStatus::ok("done"));
        }
    }

    #[tokio::test]
    async fn test_timed_out_connection_is_dropped() {
        let (driver_side, engine_side) = tokio::io::duplex(4096);
        let _server = tokio::spawn(async move {
            let mut processor = SlowStart { first: true };
            serve_stream(engine_side, &mut processor).await
        });
        let mut remote = RemoteEngine::from_stream("slow", driver_side)
            .with_timeout(Some(Duration::from_millis(50)));

        let err = remote
            .dispatch(&TestRecord::new("E, first", ","))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HandshakeTimeout { .. }));

        // Let the late answer arrive; it must not be read as the next reply.
        tokio::time::sleep(Duration::from_millis(250)).await;
        for _ in 0..3 {
            let err = remote
                .dispatch(&TestRecord::new("E, next", ","))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::EngineDisconnected(ref name) if name == "slow"));
        }

        remote.shutdown().await.unwrap();
        let err = remote
            .dispatch(&TestRecord::new("E, next", ","))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EngineShutdown(_)));
    }

    #[tokio::test]
    async fn test_engine_vanishing_is_disconnect() {
        let (driver_side, engine_side) = tokio::io::duplex(64);
        drop(engine_side);
        let mut remote = RemoteEngine::from_stream("gone", driver_side);
        let err = remote
            .dispatch(&TestRecord::new("E, Echo, x", ","))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::EngineDisconnected(_) | Error::EngineCommunication(_)
        ));
    }

    #[tokio::test]
    async fn test_driver_hangup_ends_serving_without_shutdown() {
        let (driver_side, engine_side) = tokio::io::duplex(64);
        drop(driver_side);
        let mut processor = Echo;
        assert!(!serve_stream(engine_side, &mut processor).await.unwrap());
    }
}
