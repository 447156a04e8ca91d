//! Task lifecycle event system
//!
//! This module provides:
//! - `TaskEvent` - emitted on every scheduler state transition
//! - `EventBus` - broadcast channel for distributing events to observers

mod bus;
mod types;

pub use bus::EventBus;
pub use types::{EventEmitter, TaskEvent, TaskState};
