//! Board-level indicator output

use crate::lora::traits::Indicator;
use embedded_hal::digital::OutputPin;

/// Drives an [`Indicator`] from a GPIO output
pub struct PinIndicator<P: OutputPin> {
    pin: P,
    active_low: bool,
}

impl<P: OutputPin> PinIndicator<P> {
    pub fn active_high(pin: P) -> Self {
        Self {
            pin,
            active_low: false,
        }
    }

    /// For LEDs wired to the supply rail (on when the pin is low)
    pub fn active_low(pin: P) -> Self {
        Self {
            pin,
            active_low: true,
        }
    }
}

impl<P: OutputPin> Indicator for PinIndicator<P> {
    fn set(&mut self, on: bool) {
        let _ = if on != self.active_low {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;

    #[derive(Default)]
    struct RecordingPin {
        high: Option<bool>,
    }

    impl embedded_hal::digital::ErrorType for RecordingPin {
        type Error = Infallible;
    }

    impl OutputPin for RecordingPin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.high = Some(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.high = Some(true);
            Ok(())
        }
    }

    #[test]
    fn test_active_high() {
        let mut led = PinIndicator::active_high(RecordingPin::default());
        led.set(true);
        assert_eq!(led.pin.high, Some(true));
        led.set(false);
        assert_eq!(led.pin.high, Some(false));
    }

    #[test]
    fn test_active_low() {
        let mut led = PinIndicator::active_low(RecordingPin::default());
        led.set(true);
        assert_eq!(led.pin.high, Some(false));
        led.set(false);
        assert_eq!(led.pin.high, Some(true));
    }
}
