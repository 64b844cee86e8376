//! Single-slot driver ↔ engine rendezvous
//!
//! One driver side ([`HandshakeDriver`]) and one engine side
//! ([`HandshakeEngine`]) share a slot that holds at most one record. The
//! driver's [`post`](HandshakeDriver::post) does not return until the engine
//! has written a status back, so from the caller's point of view it is a
//! blocking call.
//!
//! The slot is a one-capacity channel plus a reply channel per record.
//! Posts are serialized by a lock held across the whole exchange, so a
//! second post only proceeds after the first one has been consumed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};

use crate::common::{Error, Result};
use crate::record::{RecordStatus, TestRecord};

enum Envelope {
    Record(PostedRecord),
    Shutdown,
}

/// Create a connected driver/engine pair
pub fn handshake(name: impl Into<String>) -> (HandshakeDriver, HandshakeEngine) {
    let name = name.into();
    let (tx, rx) = mpsc::channel(1);
    let engine_active = Arc::new(AtomicBool::new(false));

    let driver = HandshakeDriver {
        name: name.clone(),
        slot: Mutex::new(tx),
        engine_active: engine_active.clone(),
        shut_down: AtomicBool::new(false),
    };
    let engine = HandshakeEngine {
        name,
        inbox: rx,
        engine_active,
        closed: false,
    };
    (driver, engine)
}

/// Driver side of the slot
pub struct HandshakeDriver {
    name: String,
    slot: Mutex<mpsc::Sender<Envelope>>,
    engine_active: Arc<AtomicBool>,
    shut_down: AtomicBool,
}

impl HandshakeDriver {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True while a posted record has not yet been consumed by the driver
    pub fn is_engine_active(&self) -> bool {
        self.engine_active.load(Ordering::SeqCst)
    }

    /// Post a record and wait until the engine has completed it
    ///
    /// Returns the record as the engine left it, status fields filled in.
    /// There is no timeout: an engine that never completes blocks forever.
    pub async fn post(&self, record: TestRecord) -> Result<TestRecord> {
        self.exchange(record).await
    }

    /// Like [`post`](Self::post) but gives up after `timeout`
    ///
    /// The deadline covers the whole exchange: waiting for the slot, placing
    /// the record and waiting for the status. On timeout engine-active is
    /// cleared and a late completion of the abandoned record is discarded.
    pub async fn post_timeout(&self, record: TestRecord, timeout: Duration) -> Result<TestRecord> {
        match tokio::time::timeout(timeout, self.exchange(record)).await {
            Ok(result) => result,
            Err(_) => {
                self.engine_active.store(false, Ordering::SeqCst);
                tracing::warn!(engine = %self.name, limit = ?timeout, "Engine did not complete record in time");
                Err(Error::handshake_timeout(&self.name, timeout))
            }
        }
    }

    /// Tell the engine to stop taking records
    ///
    /// Waits for any in-flight post to finish first. Later posts fail with
    /// [`Error::EngineShutdown`].
    pub async fn shutdown(&self) {
        let slot = self.slot.lock().await;
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(engine = %self.name, "Sending shutdown through handshake");
        // The engine may already be gone; that is as good as shut down.
        let _ = slot.send(Envelope::Shutdown).await;
    }

    /// Like [`shutdown`](Self::shutdown) but gives up after `timeout`
    ///
    /// Returns false when the signal could not be placed in time, which
    /// happens when a hung engine leaves an abandoned record in the slot.
    /// Later posts fail with [`Error::EngineShutdown`] either way.
    pub async fn shutdown_timeout(&self, timeout: Duration) -> bool {
        let delivered = tokio::time::timeout(timeout, self.shutdown()).await.is_ok();
        if !delivered {
            self.shut_down.store(true, Ordering::SeqCst);
            tracing::warn!(engine = %self.name, limit = ?timeout, "Shutdown signal not delivered in time");
        }
        delivered
    }

    async fn exchange(&self, record: TestRecord) -> Result<TestRecord> {
        let slot = self.slot.lock().await;
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(Error::EngineShutdown(self.name.clone()));
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let posted = PostedRecord {
            record,
            reply: reply_tx,
        };

        self.engine_active.store(true, Ordering::SeqCst);
        if slot.send(Envelope::Record(posted)).await.is_err() {
            self.engine_active.store(false, Ordering::SeqCst);
            return Err(Error::EngineShutdown(self.name.clone()));
        }

        let reply = reply_rx.await;

        // The driver, not the engine, clears the flag once it holds the result.
        self.engine_active.store(false, Ordering::SeqCst);
        drop(slot);

        reply.map_err(|_| Error::EngineDisconnected(self.name.clone()))
    }
}

/// What the engine side receives from [`HandshakeEngine::take`]
pub enum EngineEvent {
    Record(PostedRecord),
    Shutdown,
}

/// Engine side of the slot
pub struct HandshakeEngine {
    name: String,
    inbox: mpsc::Receiver<Envelope>,
    engine_active: Arc<AtomicBool>,
    closed: bool,
}

impl HandshakeEngine {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the next posted record
    ///
    /// Returns [`EngineEvent::Shutdown`] once the driver asked for shutdown or
    /// the driver side has been dropped, and on every call after that.
    pub async fn take(&mut self) -> EngineEvent {
        if self.closed {
            return EngineEvent::Shutdown;
        }
        match self.inbox.recv().await {
            Some(Envelope::Record(posted)) => EngineEvent::Record(posted),
            Some(Envelope::Shutdown) | None => {
                self.closed = true;
                self.inbox.close();
                EngineEvent::Shutdown
            }
        }
    }

    /// Mirror of the driver's engine-active flag
    pub fn is_engine_active(&self) -> bool {
        self.engine_active.load(Ordering::SeqCst)
    }
}

/// A record sitting in the slot, owned by the engine until completed
pub struct PostedRecord {
    record: TestRecord,
    reply: oneshot::Sender<TestRecord>,
}

impl PostedRecord {
    pub fn record(&self) -> &TestRecord {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut TestRecord {
        &mut self.record
    }

    /// Write the record back to the driver
    ///
    /// Returns false when the driver stopped waiting (timeout or drop).
    pub fn complete(self) -> bool {
        self.reply.send(self.record).is_ok()
    }

    /// Set the status and write the record back
    pub fn complete_with(mut self, status: RecordStatus) -> bool {
        self.record.set_status(status);
        self.complete()
    }
}
