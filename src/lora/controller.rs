//! Event-driven P2P radio controller
//!
//! Owns the transmit and receive buffers and the radio state. Every terminal
//! driver event re-arms continuous receive, and every transmission is gated
//! by a single channel activity detection (listen-before-talk).
//!
//! ```text
//! Uninitialized --init--> Idle --send--> CadPending --clear--> Transmitting
//!                          ^                 |busy                  |TxDone/TxTimeout
//!                          +-----------------+----------------------+
//! ```

use crate::config::radio::{MAX_LORA_PAYLOAD, RX_CONTINUOUS};
use crate::events::{AppEvent, EventNotifier};
use crate::lora::traits::{
    DriverEvent, Indicator, LoraError, RadioConfig, RadioDriver, RadioEventSink, WakeupTimer,
};
use heapless::Vec;

/// Current phase of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    /// `init` has not completed
    Uninitialized,
    /// Continuous receive, ready to accept a send
    Idle,
    /// CAD running for the buffered packet
    CadPending,
    /// Buffered packet on air
    Transmitting,
}

/// Last accepted packet with its signal metrics
#[derive(Debug, Clone, Default)]
pub struct RxBuffer {
    data: Vec<u8, MAX_LORA_PAYLOAD>,
    rssi: i16,
    snr: i8,
}

impl RxBuffer {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Received Signal Strength Indicator in dBm
    pub fn rssi(&self) -> i16 {
        self.rssi
    }

    /// Signal-to-Noise Ratio in dB
    pub fn snr(&self) -> i8 {
        self.snr
    }

    /// Oversized payloads are rejected and leave the buffer untouched
    fn store(&mut self, payload: &[u8], rssi: i16, snr: i8) -> Result<(), LoraError> {
        if payload.len() > MAX_LORA_PAYLOAD {
            return Err(LoraError::PayloadTooLarge);
        }
        self.data.clear();
        self.data
            .extend_from_slice(payload)
            .map_err(|_| LoraError::PayloadTooLarge)?;
        self.rssi = rssi;
        self.snr = snr;
        Ok(())
    }
}

/// Radio activity counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RadioStats {
    pub tx_ok: u32,
    pub tx_failed: u32,
    /// Send attempts abandoned because CAD saw activity
    pub cad_busy: u32,
    pub rx_ok: u32,
    /// Received packets rejected for exceeding the buffer
    pub rx_dropped: u32,
    pub crc_errors: u32,
    pub rx_timeouts: u32,
}

/// P2P radio controller
///
/// All methods are non-blocking: they program the driver and return, and
/// results arrive later through the [`RadioEventSink`] methods. Callers must
/// serialize access (the firmware keeps the controller behind an
/// embassy async mutex).
pub struct RadioController<D, N, I, W>
where
    D: RadioDriver,
    N: EventNotifier,
    I: Indicator,
    W: WakeupTimer,
{
    driver: D,
    notifier: N,
    indicator: I,
    wakeup: W,
    config: RadioConfig,
    state: RadioState,
    hw_initialised: bool,
    tx: Vec<u8, MAX_LORA_PAYLOAD>,
    rx: RxBuffer,
    last_tx_success: Option<bool>,
    stats: RadioStats,
}

impl<D, N, I, W> RadioController<D, N, I, W>
where
    D: RadioDriver,
    N: EventNotifier,
    I: Indicator,
    W: WakeupTimer,
{
    /// Create a controller; nothing touches the radio until [`Self::init`]
    pub fn new(driver: D, notifier: N, indicator: I, wakeup: W) -> Self {
        Self {
            driver,
            notifier,
            indicator,
            wakeup,
            config: RadioConfig::default(),
            state: RadioState::Uninitialized,
            hw_initialised: false,
            tx: Vec::new(),
            rx: RxBuffer::default(),
            last_tx_success: None,
            stats: RadioStats::default(),
        }
    }

    /// Configure the radio and start continuous receive
    ///
    /// The hardware bring-up runs only on the first successful call; later
    /// calls reapply `config` to the already running radio. A hardware
    /// bring-up failure is reported as [`LoraError::HardwareInit`] and is not
    /// retried.
    pub fn init(&mut self, config: RadioConfig) -> Result<(), LoraError> {
        config.validate()?;

        if !self.hw_initialised {
            if let Err(e) = self.driver.init() {
                log::error!("LoRa: hardware init failed ({:?})", e);
                return Err(LoraError::HardwareInit);
            }
            self.hw_initialised = true;
        }

        let aborted = matches!(
            self.state,
            RadioState::CadPending | RadioState::Transmitting
        );
        self.state = RadioState::Uninitialized;
        if aborted {
            log::warn!("LoRa: re-init aborted the pending transmission");
            self.record_tx_result(false);
        }

        self.driver.sleep()?;
        self.driver.set_channel(config.frequency_hz)?;
        self.driver.set_tx_config(&config.tx_config())?;
        self.driver.set_rx_config(&config.rx_config())?;

        if config.send_repeat_ms > 0 {
            self.wakeup.start(config.send_repeat_ms);
        } else {
            self.wakeup.stop();
        }

        self.driver.receive(RX_CONTINUOUS)?;
        self.indicator.set(false);

        log::info!(
            "LoRa: initialised at {} Hz, SF{}, {} kHz, CR 4/{}, {} dBm",
            config.frequency_hz,
            config.spreading_factor,
            config.bandwidth.khz(),
            config.coding_rate.denominator(),
            config.tx_power_dbm
        );

        self.config = config;
        self.state = RadioState::Idle;
        Ok(())
    }

    /// Queue `data` for a CAD-gated transmission
    ///
    /// `Ok` only means the request was accepted; the outcome is delivered as
    /// [`AppEvent::TransmitFinished`]. Only one transmission can be in
    /// flight, a second request is rejected with [`LoraError::Busy`].
    pub fn send(&mut self, data: &[u8]) -> Result<(), LoraError> {
        if data.len() > MAX_LORA_PAYLOAD {
            return Err(LoraError::PayloadTooLarge);
        }

        match self.state {
            RadioState::Idle => {}
            RadioState::Uninitialized => return Err(LoraError::NotInitialised),
            RadioState::CadPending | RadioState::Transmitting => return Err(LoraError::Busy),
        }

        self.tx.clear();
        self.tx
            .extend_from_slice(data)
            .map_err(|_| LoraError::PayloadTooLarge)?;

        if let Err(e) = self.start_cad() {
            log::warn!("LoRa: failed to start CAD ({:?})", e);
            self.indicator.set(false);
            self.rearm_receive();
            return Err(e);
        }

        log::debug!("LoRa: CAD started for {} bytes", self.tx.len());
        self.state = RadioState::CadPending;
        Ok(())
    }

    /// Handle the radio's pending interrupt, if any
    ///
    /// Returns true if an event was handled, so the caller can drain.
    pub fn service_irq(&mut self) -> bool {
        match self.driver.take_event() {
            Ok(Some(event)) => {
                self.handle_event(event);
                true
            }
            Ok(None) => false,
            Err(e) => {
                log::warn!("LoRa: failed to read interrupt status ({:?})", e);
                false
            }
        }
    }

    /// Route a driver event to the matching handler
    pub fn handle_event(&mut self, event: DriverEvent) {
        match event {
            DriverEvent::TxDone => self.on_tx_done(),
            DriverEvent::TxTimeout => self.on_tx_timeout(),
            DriverEvent::RxDone(packet) => self.on_rx_done(&packet.data, packet.rssi, packet.snr),
            DriverEvent::RxTimeout => self.on_rx_timeout(),
            DriverEvent::RxError => self.on_rx_error(),
            DriverEvent::CadDone { busy } => self.on_cad_done(busy),
        }
    }

    pub fn state(&self) -> RadioState {
        self.state
    }

    pub fn is_initialised(&self) -> bool {
        self.hw_initialised
    }

    /// Last received packet; valid until the next `DataReceived`
    pub fn rx_buffer(&self) -> &RxBuffer {
        &self.rx
    }

    /// Payload of the current (or last) transmission
    pub fn tx_buffer(&self) -> &[u8] {
        &self.tx
    }

    /// Result of the last finished transmission
    pub fn last_tx_success(&self) -> Option<bool> {
        self.last_tx_success
    }

    pub fn stats(&self) -> RadioStats {
        self.stats
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    pub fn wakeup(&self) -> &W {
        &self.wakeup
    }

    fn start_cad(&mut self) -> Result<(), LoraError> {
        self.driver.sleep()?;
        self.driver.set_cad_params(&self.config.cad_params())?;
        self.indicator.set(true);
        self.driver.start_cad()
    }

    /// Put the radio back into continuous receive if nothing is in flight
    fn rearm_receive(&mut self) {
        if let Err(e) = self.driver.receive(RX_CONTINUOUS) {
            log::error!("LoRa: failed to re-arm receive ({:?})", e);
        }
    }

    fn record_tx_result(&mut self, success: bool) {
        self.last_tx_success = Some(success);
        if success {
            self.stats.tx_ok += 1;
        } else {
            self.stats.tx_failed += 1;
        }
        self.indicator.set(false);
        self.notifier.notify(AppEvent::TransmitFinished { success });
    }

    fn finish_tx(&mut self, success: bool) {
        self.record_tx_result(success);
        self.state = RadioState::Idle;
        self.rearm_receive();
    }

    /// Receive-side events keep the state; only an idle radio is re-armed
    fn finish_rx_event(&mut self) {
        match self.state {
            RadioState::Idle => self.rearm_receive(),
            RadioState::Uninitialized => {}
            RadioState::CadPending | RadioState::Transmitting => {
                log::warn!("LoRa: receive event during {:?}, radio left as is", self.state);
            }
        }
    }

    fn ignore_before_init(&self, event: &str) -> bool {
        if self.state == RadioState::Uninitialized {
            log::warn!("LoRa: {} before init, ignored", event);
            return true;
        }
        false
    }
}

impl<D, N, I, W> RadioEventSink for RadioController<D, N, I, W>
where
    D: RadioDriver,
    N: EventNotifier,
    I: Indicator,
    W: WakeupTimer,
{
    fn on_tx_done(&mut self) {
        if self.ignore_before_init("TxDone") {
            return;
        }
        if self.state != RadioState::Transmitting {
            log::warn!("LoRa: stale TxDone in {:?}", self.state);
            self.finish_rx_event();
            return;
        }
        log::debug!("LoRa: TX finished");
        self.finish_tx(true);
    }

    fn on_tx_timeout(&mut self) {
        if self.ignore_before_init("TxTimeout") {
            return;
        }
        if self.state != RadioState::Transmitting {
            log::warn!("LoRa: stale TxTimeout in {:?}", self.state);
            self.finish_rx_event();
            return;
        }
        log::warn!("LoRa: TX timeout");
        self.finish_tx(false);
    }

    fn on_rx_done(&mut self, payload: &[u8], rssi: i16, snr: i8) {
        if self.ignore_before_init("RxDone") {
            return;
        }

        if self.rx.store(payload, rssi, snr).is_ok() {
            log::debug!(
                "LoRa: packet received, size {} rssi {} snr {}",
                payload.len(),
                rssi,
                snr
            );
            self.stats.rx_ok += 1;
            self.notifier.notify(AppEvent::DataReceived);
        } else {
            log::warn!("LoRa: dropping oversized packet of {} bytes", payload.len());
            self.stats.rx_dropped += 1;
        }

        self.finish_rx_event();
    }

    fn on_rx_timeout(&mut self) {
        if self.ignore_before_init("RxTimeout") {
            return;
        }
        log::debug!("LoRa: RX timeout");
        self.stats.rx_timeouts += 1;
        self.finish_rx_event();
    }

    fn on_rx_error(&mut self) {
        if self.ignore_before_init("RxError") {
            return;
        }
        log::debug!("LoRa: dropping packet due to CRC error");
        self.stats.crc_errors += 1;
        self.finish_rx_event();
    }

    fn on_cad_done(&mut self, busy: bool) {
        if self.ignore_before_init("CadDone") {
            return;
        }
        if self.state != RadioState::CadPending {
            log::warn!("LoRa: stale CadDone in {:?}", self.state);
            self.finish_rx_event();
            return;
        }

        if busy {
            log::debug!("LoRa: channel busy, send abandoned");
            self.stats.cad_busy += 1;
            self.indicator.set(false);
            self.state = RadioState::Idle;
            self.rearm_receive();
            return;
        }

        log::debug!("LoRa: channel clear, transmitting");
        match self.driver.send(&self.tx) {
            Ok(()) => self.state = RadioState::Transmitting,
            Err(e) => {
                log::warn!("LoRa: failed to start transmission ({:?})", e);
                self.finish_tx(false);
            }
        }
    }
}
