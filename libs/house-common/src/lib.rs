pub mod experience;
pub mod frame;
pub mod level;

pub use experience::{ActionKind, DecodeError, ExperienceEvent};
pub use frame::{ChatFrame, FrameKind, InboundFrame};
pub use level::LevelTable;

/// Numeric user identifier shared by the API, the wire frames and the queue.
pub type UserId = i64;

/// Current wall-clock time in Unix seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
