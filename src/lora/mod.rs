pub mod controller;
pub mod driver;
pub mod traits;

pub use controller::{RadioController, RadioState, RadioStats, RxBuffer};
pub use driver::{Sx1262Driver, Sx1262Pins};
pub use traits::{
    Bandwidth, CodingRate, DriverEvent, Indicator, LoraError, RadioConfig, RadioDriver,
    RadioEventSink, RxPacket, WakeupTimer,
};
