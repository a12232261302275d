//! Per-connection session state and its outbound queue.

use std::sync::atomic::{AtomicU64, Ordering};

use house_common::{ChatFrame, UserId};
use tokio::sync::mpsc;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Receiving half of a session's outbound queue, drained by the writer pump.
///
/// `recv()` yields `None` once the hub has dropped the session, which is the
/// writer's signal to close the connection.
pub type OutboundQueue = mpsc::Receiver<ChatFrame>;

/// An online user's connection as the hub sees it.
///
/// The session holds the only strong sender of its outbound queue, so the
/// queue closes exactly when the hub drops the session.
#[derive(Debug)]
pub struct OnlineSession {
    /// Process-unique id distinguishing successive connections of one user.
    pub session_id: u64,
    pub user_id: UserId,
    pub username: String,
    outbound: mpsc::Sender<ChatFrame>,
}

/// Reason a frame could not be placed on a session's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// The consumer is not keeping up.
    Full,
    /// The session was dropped and its writer is gone or going.
    Closed,
}

impl OnlineSession {
    pub fn new(user_id: UserId, username: impl Into<String>, capacity: usize) -> (Self, OutboundQueue) {
        let (outbound, rx) = mpsc::channel(capacity);
        let session = Self {
            session_id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            user_id,
            username: username.into(),
            outbound,
        };
        (session, rx)
    }

    /// Non-blocking enqueue.
    pub fn try_enqueue(&self, frame: ChatFrame) -> Result<(), EnqueueError> {
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// A handle the reader pump can use to append receipts without keeping
    /// the queue open after the hub lets go of the session.
    pub fn self_sender(&self) -> SelfSender {
        SelfSender {
            weak: self.outbound.downgrade(),
        }
    }
}

/// Weak handle onto a session's own outbound queue.
#[derive(Debug, Clone)]
pub struct SelfSender {
    weak: mpsc::WeakSender<ChatFrame>,
}

impl SelfSender {
    /// Non-blocking enqueue; fails with `Closed` once the session is gone.
    pub fn try_enqueue(&self, frame: ChatFrame) -> Result<(), EnqueueError> {
        let sender = self.weak.upgrade().ok_or(EnqueueError::Closed)?;
        sender.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}
