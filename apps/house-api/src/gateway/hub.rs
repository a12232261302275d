//! The connection hub: sole owner of the online-user table.
//!
//! All mutations go through one command channel drained by a single task, so
//! connect, disconnect and routing never race on the table. Producers hold a
//! cloneable [`HubHandle`].

use std::collections::HashMap;
use std::time::Duration;

use house_common::{ChatFrame, UserId};
use tokio::sync::{mpsc, oneshot};
use tokio::time;

use crate::config::HubConfig;

use super::session::{EnqueueError, OnlineSession, SelfSender};

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("hub is not running")]
    Stopped,
    #[error("hub inbox stayed full for {0:?}")]
    Busy(Duration),
}

#[derive(Debug)]
enum HubCommand {
    Register(OnlineSession),
    Unregister { user_id: UserId, session_id: u64 },
    Route {
        frame: ChatFrame,
        receipt_to: Option<SelfSender>,
    },
    IsOnline(UserId, oneshot::Sender<bool>),
    OnlineCount(oneshot::Sender<usize>),
}

/// The hub control loop. Construct with [`Hub::new`] and spawn [`Hub::run`].
pub struct Hub {
    sessions: HashMap<UserId, OnlineSession>,
    inbox: mpsc::Receiver<HubCommand>,
}

/// Cheap, cloneable entry point into a running [`Hub`].
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
    route_timeout: Duration,
}

impl Hub {
    pub fn new(config: &HubConfig) -> (Hub, HubHandle) {
        let (tx, inbox) = mpsc::channel(config.inbox_capacity);
        let hub = Hub {
            sessions: HashMap::new(),
            inbox,
        };
        let handle = HubHandle {
            tx,
            route_timeout: config.route_timeout,
        };
        (hub, handle)
    }

    /// Process commands until every [`HubHandle`] has been dropped.
    pub async fn run(mut self) {
        tracing::info!("hub started");
        while let Some(cmd) = self.inbox.recv().await {
            self.apply(cmd);
        }
        tracing::info!(online = self.sessions.len(), "hub stopped");
    }

    fn apply(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register(session) => self.register(session),
            HubCommand::Unregister { user_id, session_id } => self.unregister(user_id, session_id),
            HubCommand::Route { frame, receipt_to } => self.route(frame, receipt_to),
            HubCommand::IsOnline(user_id, reply) => {
                let _ = reply.send(self.sessions.contains_key(&user_id));
            }
            HubCommand::OnlineCount(reply) => {
                let _ = reply.send(self.sessions.len());
            }
        }
    }

    fn register(&mut self, session: OnlineSession) {
        let user_id = session.user_id;
        let session_id = session.session_id;
        // Dropping the replaced session closes its queue, which ends its writer.
        if let Some(previous) = self.sessions.insert(user_id, session) {
            tracing::info!(
                user_id,
                session_id,
                evicted_session_id = previous.session_id,
                "replaced existing session"
            );
        } else {
            tracing::info!(user_id, session_id, "client registered");
        }
    }

    fn unregister(&mut self, user_id: UserId, session_id: u64) {
        match self.sessions.get(&user_id) {
            Some(current) if current.session_id == session_id => {
                self.sessions.remove(&user_id);
                tracing::info!(user_id, session_id, "client unregistered");
            }
            _ => {
                tracing::debug!(user_id, session_id, "ignoring unregister of stale session");
            }
        }
    }

    fn route(&mut self, frame: ChatFrame, receipt_to: Option<SelfSender>) {
        let receiver_id = frame.receiver_id;
        let Some(session) = self.sessions.get(&receiver_id) else {
            tracing::debug!(receiver_id, "receiver offline, frame dropped");
            return;
        };

        let receipt = receipt_to.map(|to| (to, ChatFrame::receipt(&frame)));
        match session.try_enqueue(frame) {
            Ok(()) => {
                if let Some((to, receipt)) = receipt {
                    if let Err(reason) = to.try_enqueue(receipt) {
                        tracing::warn!(?reason, receiver_id, "receipt not delivered to sender");
                    }
                }
            }
            Err(reason) => {
                let session_id = session.session_id;
                self.sessions.remove(&receiver_id);
                match reason {
                    EnqueueError::Full => tracing::warn!(
                        user_id = receiver_id,
                        session_id,
                        "outbound queue full, disconnecting slow client"
                    ),
                    EnqueueError::Closed => tracing::debug!(
                        user_id = receiver_id,
                        session_id,
                        "outbound queue already closed, removing session"
                    ),
                }
            }
        }
    }
}

impl HubHandle {
    /// Make `session` the user's live connection, evicting any previous one.
    pub async fn register(&self, session: OnlineSession) -> Result<(), HubError> {
        self.send(HubCommand::Register(session)).await
    }

    /// Remove the user's entry if it still belongs to `session_id`.
    pub async fn unregister(&self, user_id: UserId, session_id: u64) -> Result<(), HubError> {
        self.send(HubCommand::Unregister { user_id, session_id }).await
    }

    /// Hand `frame` to its receiver if they are online.
    ///
    /// Waits at most the configured route timeout for room in the hub inbox.
    /// An offline receiver is not an error.
    pub async fn route(&self, frame: ChatFrame) -> Result<(), HubError> {
        self.send_route(frame, None).await
    }

    /// Like [`route`](Self::route), and once the frame is queued for its
    /// receiver a receipt is appended to the sending connection's own queue.
    /// No receipt is produced when the receiver is offline or was dropped.
    pub async fn route_with_receipt(&self, frame: ChatFrame, sender: SelfSender) -> Result<(), HubError> {
        self.send_route(frame, Some(sender)).await
    }

    async fn send_route(&self, frame: ChatFrame, receipt_to: Option<SelfSender>) -> Result<(), HubError> {
        let cmd = HubCommand::Route { frame, receipt_to };
        match time::timeout(self.route_timeout, self.tx.send(cmd)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(HubError::Stopped),
            Err(_elapsed) => Err(HubError::Busy(self.route_timeout)),
        }
    }

    /// Push a server-originated notification to an online user.
    pub async fn notify(&self, user_id: UserId, content: impl Into<String>) -> Result<(), HubError> {
        self.route(ChatFrame::notification(user_id, content)).await
    }

    pub async fn is_online(&self, user_id: UserId) -> Result<bool, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::IsOnline(user_id, reply)).await?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    pub async fn online_count(&self) -> Result<usize, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::OnlineCount(reply)).await?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    async fn send(&self, cmd: HubCommand) -> Result<(), HubError> {
        self.tx.send(cmd).await.map_err(|_| HubError::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use house_common::FrameKind;
    use tokio::sync::mpsc::error::TryRecvError;

    use super::*;

    fn spawn_hub() -> HubHandle {
        let (hub, handle) = Hub::new(&HubConfig::default());
        tokio::spawn(hub.run());
        handle
    }

    #[tokio::test]
    async fn repeated_register_keeps_one_session() {
        let hub = spawn_hub();

        let mut queues = Vec::new();
        for _ in 0..5 {
            let (session, rx) = OnlineSession::new(1, "alice", 8);
            hub.register(session).await.unwrap();
            queues.push(rx);
        }
        assert_eq!(hub.online_count().await.unwrap(), 1);

        let mut latest = queues.pop().unwrap();
        for mut rx in queues {
            assert!(rx.recv().await.is_none(), "evicted queue must be closed");
        }

        hub.route(ChatFrame::chat(2, 1, "hello")).await.unwrap();
        assert_eq!(latest.recv().await.unwrap().content, "hello");
        assert_eq!(latest.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn stale_unregister_is_ignored() {
        let hub = spawn_hub();

        let (first, _first_rx) = OnlineSession::new(1, "alice", 8);
        let first_id = first.session_id;
        hub.register(first).await.unwrap();

        let (second, mut second_rx) = OnlineSession::new(1, "alice", 8);
        hub.register(second).await.unwrap();

        hub.unregister(1, first_id).await.unwrap();
        assert!(hub.is_online(1).await.unwrap());

        hub.route(ChatFrame::chat(2, 1, "still here")).await.unwrap();
        assert_eq!(second_rx.recv().await.unwrap().content, "still here");
    }

    #[tokio::test]
    async fn unregister_closes_queue() {
        let hub = spawn_hub();

        let (session, mut rx) = OnlineSession::new(3, "carol", 8);
        let session_id = session.session_id;
        hub.register(session).await.unwrap();
        hub.unregister(3, session_id).await.unwrap();

        assert!(rx.recv().await.is_none());
        assert!(!hub.is_online(3).await.unwrap());
    }

    #[tokio::test]
    async fn route_to_offline_user_is_silent() {
        let hub = spawn_hub();

        let result = time::timeout(
            Duration::from_secs(1),
            hub.route(ChatFrame::chat(1, 999, "anyone?")),
        )
        .await
        .expect("route must not block");
        assert!(result.is_ok());
        assert_eq!(hub.online_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn full_queue_disconnects_receiver() {
        let hub = spawn_hub();

        let (session, mut rx) = OnlineSession::new(4, "dave", 1);
        hub.register(session).await.unwrap();

        hub.route(ChatFrame::chat(1, 4, "fits")).await.unwrap();
        time::timeout(Duration::from_secs(1), hub.route(ChatFrame::chat(1, 4, "overflow")))
            .await
            .expect("route must not block on a full queue")
            .unwrap();

        assert!(!hub.is_online(4).await.unwrap());
        assert_eq!(rx.recv().await.unwrap().content, "fits");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn concurrent_registers_for_distinct_users() {
        let hub = spawn_hub();

        let (a, mut rx_a) = OnlineSession::new(10, "a", 8);
        let (b, mut rx_b) = OnlineSession::new(11, "b", 8);
        let (h1, h2) = (hub.clone(), hub.clone());
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { h1.register(a).await }),
            tokio::spawn(async move { h2.register(b).await }),
        );
        r1.unwrap().unwrap();
        r2.unwrap().unwrap();

        hub.route(ChatFrame::chat(11, 10, "to a")).await.unwrap();
        hub.route(ChatFrame::chat(10, 11, "to b")).await.unwrap();

        assert_eq!(rx_a.recv().await.unwrap().content, "to a");
        assert_eq!(rx_b.recv().await.unwrap().content, "to b");
        assert_eq!(hub.online_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn receipt_only_for_delivered_frames() {
        let hub = spawn_hub();

        let (sender, mut sender_rx) = OnlineSession::new(20, "sender", 8);
        let me = sender.self_sender();
        hub.register(sender).await.unwrap();

        hub.route_with_receipt(ChatFrame::chat(20, 21, "nobody home"), me.clone())
            .await
            .unwrap();
        hub.online_count().await.unwrap();
        assert_eq!(sender_rx.try_recv(), Err(TryRecvError::Empty));

        let (receiver, mut receiver_rx) = OnlineSession::new(21, "receiver", 8);
        hub.register(receiver).await.unwrap();
        hub.route_with_receipt(ChatFrame::chat(20, 21, "hi"), me).await.unwrap();

        let delivered = receiver_rx.recv().await.unwrap();
        let receipt = sender_rx.recv().await.unwrap();
        assert_eq!(delivered.kind, FrameKind::Chat);
        assert_eq!(receipt.kind, FrameKind::Receipt);
        assert_eq!(receipt.receiver_id, 21);
        assert_eq!(receipt.timestamp, delivered.timestamp);
    }

    #[tokio::test]
    async fn notify_sends_notification_frame() {
        let hub = spawn_hub();

        let (session, mut rx) = OnlineSession::new(5, "erin", 8);
        hub.register(session).await.unwrap();
        hub.notify(5, "you reached level 2").await.unwrap();

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.kind, FrameKind::Notification);
        assert_eq!(frame.receiver_id, 5);
    }

    #[tokio::test]
    async fn hub_stops_when_handles_dropped() {
        let (hub, handle) = Hub::new(&HubConfig::default());
        let task = tokio::spawn(hub.run());
        drop(handle);
        time::timeout(Duration::from_secs(1), task)
            .await
            .expect("hub should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn route_reports_busy_when_inbox_stays_full() {
        let config = HubConfig {
            inbox_capacity: 1,
            route_timeout: Duration::from_millis(20),
            ..HubConfig::default()
        };
        // Never run the loop, so the inbox fills up.
        let (_hub, handle) = Hub::new(&config);
        handle.route(ChatFrame::chat(1, 2, "queued")).await.unwrap();

        let err = handle.route(ChatFrame::chat(1, 2, "waits")).await.unwrap_err();
        assert!(matches!(err, HubError::Busy(_)));
    }
}
