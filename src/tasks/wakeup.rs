//! Periodic wakeup timer
//!
//! The controller starts and stops the timer from `init`; the task turns the
//! configured period into [`AppEvent::Wakeup`] notifications.

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};

use crate::events::{AppEvent, EventNotifier};
use crate::lora::WakeupTimer;

/// Requested period, `None` stops the timer
static WAKEUP_PERIOD: Signal<CriticalSectionRawMutex, Option<u32>> = Signal::new();

/// [`WakeupTimer`] backed by [`wakeup_task`]
pub struct TimerWakeup;

impl WakeupTimer for TimerWakeup {
    fn start(&mut self, period_ms: u32) {
        WAKEUP_PERIOD.signal(Some(period_ms));
    }

    fn stop(&mut self) {
        WAKEUP_PERIOD.signal(None);
    }
}

/// Task that signals the application every configured period
///
/// A new period restarts the interval from zero.
pub async fn wakeup_task<N: EventNotifier>(notifier: N) -> ! {
    let mut period = None;

    loop {
        let Some(period_ms) = period else {
            period = WAKEUP_PERIOD.wait().await;
            continue;
        };

        log::debug!("Wakeup: every {} ms", period_ms);
        let period_dur = Duration::from_millis(period_ms as u64);
        loop {
            match select(Timer::after(period_dur), WAKEUP_PERIOD.wait()).await {
                Either::First(()) => notifier.notify(AppEvent::Wakeup),
                Either::Second(new_period) => {
                    period = new_period;
                    break;
                }
            }
        }
    }
}
