//! Experience-award events carried over the message queue.

use serde::{Deserialize, Serialize};

use crate::{unix_now, UserId};

/// Forum activity that earns experience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Login,
    Post,
    Liked,
    Commented,
}

impl ActionKind {
    /// Experience credited for the action when the caller has no override.
    pub fn default_amount(self) -> i64 {
        match self {
            ActionKind::Login => 1,
            ActionKind::Post => 5,
            ActionKind::Liked => 2,
            ActionKind::Commented => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Login => "login",
            ActionKind::Post => "post",
            ActionKind::Liked => "liked",
            ActionKind::Commented => "commented",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed experience event: {0}")]
    Json(#[from] serde_json::Error),
    #[error("experience amount must be positive, got {0}")]
    NonPositiveAmount(i64),
}

/// Instruction to credit `user_id` with `exp_amount` points.
///
/// Events carry no idempotency key: a redelivered event is credited again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperienceEvent {
    pub user_id: UserId,
    pub action: ActionKind,
    pub exp_amount: i64,
    pub timestamp: i64,
}

impl ExperienceEvent {
    pub fn new(user_id: UserId, action: ActionKind, exp_amount: i64) -> Self {
        Self {
            user_id,
            action,
            exp_amount,
            timestamp: unix_now(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(body: &[u8]) -> Result<Self, DecodeError> {
        let event: ExperienceEvent = serde_json::from_slice(body)?;
        if event.exp_amount <= 0 {
            return Err(DecodeError::NonPositiveAmount(event.exp_amount));
        }
        Ok(event)
    }
}
