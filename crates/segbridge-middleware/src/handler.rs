//! Callback capability and the dispatch loop that drives it.
//!
//! A subscriber never registers itself with a transport.  It hands a
//! [`MessageHandler`] to [`spin`], which pulls events from a
//! [`TopicReceiver`] and invokes the handler one event at a time until the
//! [`StopSignal`] fires or the bus closes.

use std::sync::Arc;

use segbridge_types::{BridgeError, Event};
use tokio::sync::watch;
use tracing::warn;

use crate::bus::TopicReceiver;

/// Single-method capability invoked for every delivered event.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, event: Event) -> Result<(), BridgeError>;
}

impl<F> MessageHandler for F
where
    F: Fn(Event) -> Result<(), BridgeError> + Send + Sync,
{
    fn handle(&self, event: Event) -> Result<(), BridgeError> {
        self(event)
    }
}

// ---------------------------------------------------------------------------
// Cooperative shutdown
// ---------------------------------------------------------------------------

/// Requests shutdown.  Cloneable; any clone stops every linked
/// [`StopSignal`].
#[derive(Clone, Debug)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// A new signal linked to this handle.
    pub fn signal(&self) -> StopSignal {
        StopSignal { rx: self.tx.subscribe() }
    }
}

/// Observes a [`StopHandle`].
#[derive(Clone, Debug)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once stop has been requested.  Never resolves if every
    /// handle is dropped without stopping.
    pub async fn stopped(&mut self) {
        if self.rx.wait_for(|stopped| *stopped).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Create a linked handle / signal pair.
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx: Arc::new(tx) }, StopSignal { rx })
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Deliver events from `receiver` to `handler` until stopped or the bus
/// closes.  Handler errors are logged and do not end the loop.
///
/// Returns the number of events handed to `handler`.
pub async fn spin(
    receiver: &mut TopicReceiver,
    handler: &dyn MessageHandler,
    mut stop: StopSignal,
) -> u64 {
    let mut delivered = 0;
    loop {
        if stop.is_stopped() {
            break;
        }
        tokio::select! {
            biased;
            _ = stop.stopped() => break,
            next = receiver.recv() => match next {
                Some(event) => {
                    delivered += 1;
                    if let Err(e) = handler.handle(event) {
                        warn!(topic = receiver.topic(), error = %e, "handler failed");
                    }
                }
                None => break,
            },
        }
    }
    delivered
}
