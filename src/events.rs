//! Application notification channel
//!
//! The radio controller runs in the radio interrupt context and the
//! application consumer runs in its own task. The only hand-off between the
//! two is an [`AppEvent`] delivered through an [`EventNotifier`].

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

/// Event delivered to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    /// A transmission completed (`success`) or timed out
    TransmitFinished { success: bool },
    /// A packet is waiting in the receive buffer
    DataReceived,
    /// The periodic re-send interval elapsed
    Wakeup,
}

/// Cross-context wake primitive
///
/// Implementations must be callable from the interrupt context, so `notify`
/// never blocks.
pub trait EventNotifier {
    fn notify(&self, event: AppEvent);
}

impl<T: EventNotifier + ?Sized> EventNotifier for &T {
    fn notify(&self, event: AppEvent) {
        (**self).notify(event)
    }
}

/// Single slot, the latest event wins
impl<M: RawMutex> EventNotifier for Signal<M, AppEvent> {
    fn notify(&self, event: AppEvent) {
        self.signal(event);
    }
}

/// Bounded queue, events are dropped when the consumer falls behind
impl<M: RawMutex, const N: usize> EventNotifier for Channel<M, AppEvent, N> {
    fn notify(&self, event: AppEvent) {
        if self.try_send(event).is_err() {
            log::warn!("Event queue full, dropping {:?}", event);
        }
    }
}

/// Signal type used between the radio and the application task
pub type AppEventSignal = Signal<CriticalSectionRawMutex, AppEvent>;

/// Global application event signal
///
/// Producer: the radio controller (and the wakeup timer task).
/// Consumer: the application task.
pub static APP_EVENTS: AppEventSignal = Signal::new();
