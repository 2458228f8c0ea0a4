//! The duplex [`Channel`] capability and the in-memory reference transport.
//!
//! The protocol layer is written against the narrow [`Channel`] interface so
//! it never couples to a concrete transport (in-process queues, subprocess
//! pipes, sockets). An endpoint buffers frames sent before
//! [`start`](Channel::start) is called and delivers each incoming frame to
//! the installed handler on its own task, so handlers may complete out of
//! order.
//!
//! [`memory_pair`] provides the stock in-process implementation used by the
//! task spawner and throughout the test suite: two endpoints cross-wired
//! over unbounded tokio mpsc queues.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ChannelError, ChannelResult};
use crate::protocol::Frame;

/// Handler invoked for every incoming frame. Each invocation runs as an
/// independent task.
pub type FrameHandler = Arc<dyn Fn(Frame) -> BoxFuture<'static, ()> + Send + Sync>;

/// Hook invoked once when the peer end disappears (closed or dropped).
pub type CloseHandler = Arc<dyn Fn() + Send + Sync>;

/// One end of a duplex, frame-oriented message channel.
///
/// # Ordering
///
/// Frames sent from one end arrive in send order; because every frame is
/// handled on its own task, *processing* order is not guaranteed across
/// frames. Correlation ids, not arrival order, match responses to requests.
pub trait Channel: Send + Sync {
    /// Enqueues a frame to the peer. Never blocks; the queue is unbounded.
    fn send(&self, frame: Frame) -> ChannelResult<()>;

    /// Installs the frame handler. Must be called before [`start`](Channel::start);
    /// a later call replaces the handler for subsequent frames.
    fn on_frame(&self, handler: FrameHandler);

    /// Installs a hook observing peer loss.
    fn on_close(&self, handler: CloseHandler);

    /// Begins delivering buffered and future frames to the handler.
    fn start(&self);

    /// Closes this end. The peer observes the loss via its close hook.
    fn close(&self);
}

/// Shared handle to a channel end.
pub type ChannelEnd = Arc<dyn Channel>;

// =============================================================================
// In-memory duplex pair
// =============================================================================

/// One end of an in-process duplex channel.
///
/// Created in connected pairs by [`memory_pair`]. Frames sent before the
/// receiving end calls [`start`](Channel::start) sit in the unbounded queue
/// and are delivered once the pump runs.
pub struct MemoryChannel {
    tx: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Frame>>>,
    handler: Arc<Mutex<Option<FrameHandler>>>,
    close_hook: Arc<Mutex<Option<CloseHandler>>>,
    cancel: CancellationToken,
    started: AtomicBool,
}

/// Creates a connected pair of in-memory channel ends.
pub fn memory_pair() -> (ChannelEnd, ChannelEnd) {
    let (tx_ab, rx_ab) = mpsc::unbounded_channel();
    let (tx_ba, rx_ba) = mpsc::unbounded_channel();
    let a = Arc::new(MemoryChannel::new(tx_ab, rx_ba));
    let b = Arc::new(MemoryChannel::new(tx_ba, rx_ab));
    (a, b)
}

impl MemoryChannel {
    fn new(tx: mpsc::UnboundedSender<Frame>, rx: mpsc::UnboundedReceiver<Frame>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            handler: Arc::new(Mutex::new(None)),
            close_hook: Arc::new(Mutex::new(None)),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }
}

impl Channel for MemoryChannel {
    fn send(&self, frame: Frame) -> ChannelResult<()> {
        let guard = self.tx.lock();
        let tx = guard.as_ref().ok_or(ChannelError::Closed)?;
        tx.send(frame).map_err(|_| ChannelError::Closed)
    }

    fn on_frame(&self, handler: FrameHandler) {
        *self.handler.lock() = Some(handler);
    }

    fn on_close(&self, handler: CloseHandler) {
        *self.close_hook.lock() = Some(handler);
    }

    fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(mut rx) = self.rx.lock().take() else {
            return;
        };
        let handler = Arc::clone(&self.handler);
        let close_hook = Arc::clone(&self.close_hook);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    frame = rx.recv() => match frame {
                        Some(frame) => {
                            let handler = handler.lock().clone();
                            if let Some(handler) = handler {
                                tokio::spawn(handler(frame));
                            } else {
                                debug!("Frame arrived with no handler installed — dropped");
                            }
                        }
                        None => {
                            // Peer sender dropped: the other side is gone.
                            let hook = close_hook.lock().take();
                            if let Some(hook) = hook {
                                hook();
                            }
                            break;
                        }
                    },
                }
            }
        });
    }

    fn close(&self) {
        self.cancel.cancel();
        // Dropping the sender lets the peer's pump observe the loss.
        self.tx.lock().take();
        self.rx.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc::unbounded_channel;

    fn collect_handler(tx: mpsc::UnboundedSender<Frame>) -> FrameHandler {
        Arc::new(move |frame| {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(frame);
            })
        })
    }

    #[tokio::test]
    async fn frames_sent_before_start_are_buffered() {
        let (a, b) = memory_pair();
        a.send(Frame::Call {
            id: 1,
            method: "ping".into(),
            args: vec![json!(1)],
        })
        .unwrap();

        let (seen_tx, mut seen_rx) = unbounded_channel();
        b.on_frame(collect_handler(seen_tx));
        b.start();

        let frame = tokio::time::timeout(Duration::from_secs(1), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(frame, Frame::Call { id: 1, .. }));
    }

    #[tokio::test]
    async fn close_is_observed_by_peer() {
        let (a, b) = memory_pair();
        let (closed_tx, mut closed_rx) = unbounded_channel();
        b.on_close(Arc::new(move || {
            let _ = closed_tx.send(());
        }));
        b.on_frame(Arc::new(|_| Box::pin(async {})));
        b.start();

        a.close();
        tokio::time::timeout(Duration::from_secs(1), closed_rx.recv())
            .await
            .expect("close hook should fire")
            .unwrap();
        assert!(b.send(Frame::Teardown { id: 1 }).is_err());
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (a, _b) = memory_pair();
        a.close();
        assert!(matches!(
            a.send(Frame::Teardown { id: 9 }),
            Err(ChannelError::Closed)
        ));
    }
}
