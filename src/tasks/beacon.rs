//! Example application task
//!
//! Drains the receive buffer after every `DataReceived`, logs transmit
//! results, and sends a numbered beacon on every periodic wakeup.

use heapless::Vec;

use crate::config::app::BEACON_MARKER;
use crate::config::radio::MAX_LORA_PAYLOAD;
use crate::events::{AppEvent, AppEventSignal, EventNotifier};
use crate::lora::{Indicator, LoraError, RadioDriver, WakeupTimer};

use super::radio::SharedRadio;

/// Task that consumes application events
pub async fn beacon_task<D, N, I, W>(
    radio: &SharedRadio<D, N, I, W>,
    events: &AppEventSignal,
) -> !
where
    D: RadioDriver,
    N: EventNotifier,
    I: Indicator,
    W: WakeupTimer,
{
    let mut sequence: u32 = 0;

    loop {
        match events.wait().await {
            AppEvent::DataReceived => {
                // Copy out before the next packet overwrites the buffer
                let (data, rssi, snr) = {
                    let radio = radio.lock().await;
                    let rx = radio.rx_buffer();
                    let mut data: Vec<u8, MAX_LORA_PAYLOAD> = Vec::new();
                    let _ = data.extend_from_slice(rx.data());
                    (data, rx.rssi(), rx.snr())
                };

                // Log received packet (show as string if valid UTF-8, else length)
                if let Ok(s) = core::str::from_utf8(&data) {
                    log::info!("LoRa RX: '{}' (RSSI: {}, SNR: {})", s, rssi, snr);
                } else {
                    log::info!("LoRa RX: {} bytes (RSSI: {}, SNR: {})", data.len(), rssi, snr);
                }
            }
            AppEvent::TransmitFinished { success: true } => {
                log::info!("LoRa TX: Complete");
            }
            AppEvent::TransmitFinished { success: false } => {
                log::warn!("LoRa TX: Timed out");
            }
            AppEvent::Wakeup => {
                sequence = sequence.wrapping_add(1);
                let mut payload = [0u8; 5];
                payload[0] = BEACON_MARKER;
                payload[1..].copy_from_slice(&sequence.to_be_bytes());

                let result = radio.lock().await.send(&payload);
                match result {
                    Ok(()) => log::debug!("LoRa TX: beacon {} queued", sequence),
                    Err(LoraError::Busy) => {
                        log::debug!("LoRa TX: busy, beacon {} skipped", sequence)
                    }
                    Err(e) => log::warn!("LoRa TX: beacon {} rejected ({:?})", sequence, e),
                }
            }
        }
    }
}
