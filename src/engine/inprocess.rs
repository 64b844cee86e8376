//! Engine running inside the driver process, reached through a handshake

use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::common::{Error, Result};
use crate::record::{RecordStatus, TestRecord};

use super::handshake::{handshake, EngineEvent, HandshakeDriver, HandshakeEngine};
use super::{EngineHandle, RecordProcessor};

/// Engine-side loop: take records from the slot until shutdown
pub async fn serve_handshake<P: RecordProcessor>(mut engine: HandshakeEngine, mut processor: P) {
    tracing::debug!(engine = %engine.name(), "In-process engine started");
    loop {
        match engine.take().await {
            EngineEvent::Record(mut posted) => {
                processor.process(posted.record_mut()).await;
                tracing::trace!(
                    engine = %engine.name(),
                    code = %posted.record().status.code,
                    "Record completed"
                );
                if !posted.complete() {
                    tracing::debug!(engine = %engine.name(), "Driver abandoned record before completion");
                }
            }
            EngineEvent::Shutdown => break,
        }
    }
    tracing::debug!(engine = %engine.name(), "In-process engine stopped");
}

/// [`EngineHandle`] over a handshake with an engine task in this process
pub struct InProcessEngine {
    driver: HandshakeDriver,
    task: Option<JoinHandle<()>>,
    timeout: Option<Duration>,
}

impl InProcessEngine {
    /// Spawn `processor` on its own task and connect to it
    pub fn spawn<P: RecordProcessor + 'static>(name: impl Into<String>, processor: P) -> Self {
        let (driver, engine) = handshake(name);
        let task = tokio::spawn(serve_handshake(engine, processor));
        Self {
            driver,
            task: Some(task),
            timeout: None,
        }
    }

    /// Wrap a handshake whose engine side is served elsewhere
    pub fn from_handshake(driver: HandshakeDriver) -> Self {
        Self {
            driver,
            task: None,
            timeout: None,
        }
    }

    /// Give up on records that take longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_engine_active(&self) -> bool {
        self.driver.is_engine_active()
    }
}

#[async_trait]
impl EngineHandle for InProcessEngine {
    fn name(&self) -> &str {
        self.driver.name()
    }

    async fn dispatch(&mut self, record: &TestRecord) -> Result<RecordStatus> {
        let record = record.clone();
        let done = match self.timeout {
            Some(limit) => self.driver.post_timeout(record, limit).await?,
            None => self.driver.post(record).await?,
        };
        Ok(done.status)
    }

    async fn shutdown(&mut self) -> Result<()> {
        let Some(limit) = self.timeout else {
            self.driver.shutdown().await;
            return match self.task.take() {
                Some(task) => task
                    .await
                    .map_err(|e| Error::engine_failed(self.driver.name(), e)),
                None => Ok(()),
            };
        };

        let delivered = self.driver.shutdown_timeout(limit).await;
        let Some(mut task) = self.task.take() else {
            return Ok(());
        };
        if delivered {
            if let Ok(joined) = tokio::time::timeout(limit, &mut task).await {
                return joined.map_err(|e| Error::engine_failed(self.driver.name(), e));
            }
        }
        tracing::warn!(engine = %self.driver.name(), "Engine task still busy at shutdown, aborting");
        task.abort();
        Ok(())
    }
}
