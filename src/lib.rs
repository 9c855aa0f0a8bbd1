#![cfg_attr(not(test), no_std)]

pub mod board;
pub mod config;
pub mod events;
pub mod lora;

// Tasks depend on embassy-time and the async HAL, only available with embedded feature
#[cfg(feature = "embedded")]
pub mod tasks;
