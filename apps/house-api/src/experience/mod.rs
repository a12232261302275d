//! Asynchronous experience awards: publisher, broker adapter and the
//! leveling consumer.

pub mod broker;
pub mod memory;
pub mod processor;
pub mod publisher;

pub use processor::{Delivery, Disposition, LevelingProcessor};
pub use publisher::{EventSink, ExperiencePublisher};
