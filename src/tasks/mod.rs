//! Embassy tasks module
//!
//! Contains the async tasks for the firmware, organised by functionality.

pub mod beacon;
pub mod radio;
pub mod wakeup;

pub use beacon::beacon_task;
pub use radio::{radio_irq_task, SharedRadio};
pub use wakeup::{wakeup_task, TimerWakeup};
