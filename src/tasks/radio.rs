//! Radio interrupt task
//!
//! Waits for the SX1262 DIO1 line and feeds every latched event into the
//! controller. This is the only context that runs the controller's event
//! handlers.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Timer};
use embedded_hal_async::digital::Wait;

use crate::events::EventNotifier;
use crate::lora::{Indicator, RadioController, RadioDriver, WakeupTimer};

/// Controller shared between the interrupt task and the application
///
/// Async lock: driver I/O runs with interrupts enabled.
pub type SharedRadio<D, N, I, W> = Mutex<CriticalSectionRawMutex, RadioController<D, N, I, W>>;

/// Back-off when DIO1 is high but no event could be read
const IRQ_RETRY_MS: u64 = 1;

/// Task that services radio interrupts
pub async fn radio_irq_task<P, D, N, I, W>(mut dio1: P, radio: &SharedRadio<D, N, I, W>) -> !
where
    P: Wait,
    D: RadioDriver,
    N: EventNotifier,
    I: Indicator,
    W: WakeupTimer,
{
    loop {
        if dio1.wait_for_high().await.is_err() {
            log::warn!("LoRa: DIO1 wait failed");
            Timer::after(Duration::from_millis(IRQ_RETRY_MS)).await;
            continue;
        }

        // Drain everything the radio has latched
        let mut handled = 0u32;
        {
            let mut radio = radio.lock().await;
            while radio.service_irq() {
                handled += 1;
            }
        }

        if handled == 0 {
            Timer::after(Duration::from_millis(IRQ_RETRY_MS)).await;
        }
    }
}
