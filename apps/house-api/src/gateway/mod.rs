//! Realtime chat: the connection hub and the per-client socket pumps.

pub mod hub;
pub mod server;
pub mod session;

pub use hub::{Hub, HubError, HubHandle};
pub use session::{OnlineSession, OutboundQueue, SelfSender};
