//! LoRa radio capabilities for abstraction and testability
//!
//! The controller talks to the transceiver only through [`RadioDriver`] and
//! receives its asynchronous results through [`RadioEventSink`], so the real
//! SX1262 driver can be swapped with a mock for testing.

use crate::config::{lora_defaults, radio};
use heapless::Vec;

/// Errors that can occur during LoRa operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoraError {
    /// First hardware bring-up failed
    HardwareInit,
    /// Invalid configuration
    InvalidConfig,
    /// Payload longer than the radio buffer
    PayloadTooLarge,
    /// Radio not initialised
    NotInitialised,
    /// A CAD or transmission is already in flight
    Busy,
    /// SPI communication error
    SpiError,
    /// Radio busy timeout
    BusyTimeout,
    /// Reception failed
    ReceiveFailed,
}

/// LoRa signal bandwidth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bandwidth {
    Khz125,
    Khz250,
    Khz500,
}

impl Bandwidth {
    /// Map the settings index (0 = 125 kHz, 1 = 250 kHz, 2 = 500 kHz)
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Khz125),
            1 => Some(Self::Khz250),
            2 => Some(Self::Khz500),
            _ => None,
        }
    }

    pub fn khz(self) -> u32 {
        match self {
            Self::Khz125 => 125,
            Self::Khz250 => 250,
            Self::Khz500 => 500,
        }
    }
}

/// LoRa forward error correction rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodingRate {
    Cr4_5,
    Cr4_6,
    Cr4_7,
    Cr4_8,
}

impl CodingRate {
    /// Map the settings index (1 = 4/5 ... 4 = 4/8)
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            1 => Some(Self::Cr4_5),
            2 => Some(Self::Cr4_6),
            3 => Some(Self::Cr4_7),
            4 => Some(Self::Cr4_8),
            _ => None,
        }
    }

    /// Coding rate denominator (5-8 for 4/5 to 4/8)
    pub fn denominator(self) -> u8 {
        match self {
            Self::Cr4_5 => 5,
            Self::Cr4_6 => 6,
            Self::Cr4_7 => 7,
            Self::Cr4_8 => 8,
        }
    }
}

/// P2P session parameters
///
/// Applied as a whole by `RadioController::init`; there is no way to change a
/// single field on a running controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioConfig {
    /// Centre frequency in Hz
    pub frequency_hz: u32,
    pub bandwidth: Bandwidth,
    /// Spreading factor (5-12)
    pub spreading_factor: u8,
    pub coding_rate: CodingRate,
    /// Transmit power in dBm (-9 to +22)
    pub tx_power_dbm: i8,
    /// Preamble length in symbols
    pub preamble_length: u16,
    /// Symbols the receiver waits for a preamble before timing out
    pub symbol_timeout: u16,
    /// Periodic re-send interval in milliseconds, 0 disables it
    pub send_repeat_ms: u32,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            frequency_hz: lora_defaults::FREQUENCY_HZ,
            bandwidth: Bandwidth::from_index(lora_defaults::BANDWIDTH_INDEX)
                .unwrap_or(Bandwidth::Khz125),
            spreading_factor: lora_defaults::SPREADING_FACTOR,
            coding_rate: CodingRate::from_index(lora_defaults::CODING_RATE_INDEX)
                .unwrap_or(CodingRate::Cr4_5),
            tx_power_dbm: lora_defaults::TX_POWER_DBM,
            preamble_length: lora_defaults::PREAMBLE_LENGTH,
            symbol_timeout: lora_defaults::SYMBOL_TIMEOUT,
            send_repeat_ms: lora_defaults::SEND_REPEAT_MS,
        }
    }
}

impl RadioConfig {
    /// Check the parameters against what the SX126x family accepts
    pub fn validate(&self) -> Result<(), LoraError> {
        if !(5..=12).contains(&self.spreading_factor) {
            return Err(LoraError::InvalidConfig);
        }
        if !(-9..=22).contains(&self.tx_power_dbm) {
            return Err(LoraError::InvalidConfig);
        }
        if !(150_000_000..=960_000_000).contains(&self.frequency_hz) {
            return Err(LoraError::InvalidConfig);
        }
        if self.preamble_length == 0 {
            return Err(LoraError::InvalidConfig);
        }
        Ok(())
    }

    /// Transmit parameters, always with the fixed transmit timeout budget
    pub fn tx_config(&self) -> TxConfig {
        TxConfig {
            power_dbm: self.tx_power_dbm,
            bandwidth: self.bandwidth,
            spreading_factor: self.spreading_factor,
            coding_rate: self.coding_rate,
            preamble_length: self.preamble_length,
            crc_on: true,
            timeout_ms: radio::TX_TIMEOUT_MS,
        }
    }

    /// Receive parameters, always continuous with CRC checking
    pub fn rx_config(&self) -> RxConfig {
        RxConfig {
            bandwidth: self.bandwidth,
            spreading_factor: self.spreading_factor,
            coding_rate: self.coding_rate,
            preamble_length: self.preamble_length,
            symbol_timeout: self.symbol_timeout,
            continuous: true,
            crc_on: true,
        }
    }

    /// Listen-before-talk parameters for the configured spreading factor
    pub fn cad_params(&self) -> CadParams {
        CadParams {
            symbols: CadSymbols::Eight,
            det_peak: self.spreading_factor + radio::CAD_DET_PEAK_OFFSET,
            det_min: radio::CAD_DET_MIN,
            exit_mode: CadExitMode::CadOnly,
            timeout: 0,
        }
    }
}

/// Transmit configuration handed to the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxConfig {
    pub power_dbm: i8,
    pub bandwidth: Bandwidth,
    pub spreading_factor: u8,
    pub coding_rate: CodingRate,
    pub preamble_length: u16,
    pub crc_on: bool,
    /// Time the driver waits for TxDone before raising TxTimeout
    pub timeout_ms: u32,
}

/// Receive configuration handed to the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxConfig {
    pub bandwidth: Bandwidth,
    pub spreading_factor: u8,
    pub coding_rate: CodingRate,
    pub preamble_length: u16,
    pub symbol_timeout: u16,
    pub continuous: bool,
    pub crc_on: bool,
}

/// Number of symbols used for channel activity detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CadSymbols {
    One,
    Two,
    Four,
    Eight,
    Sixteen,
}

/// What the radio does once CAD finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CadExitMode {
    /// Return to standby and report the result
    CadOnly,
    /// Stay in receive if activity was detected
    CadRx,
}

/// Channel activity detection parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CadParams {
    pub symbols: CadSymbols,
    pub det_peak: u8,
    pub det_min: u8,
    pub exit_mode: CadExitMode,
    pub timeout: u32,
}

/// Received packet with metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxPacket {
    /// Received data
    pub data: Vec<u8, { radio::MAX_LORA_PAYLOAD }>,
    /// Received Signal Strength Indicator in dBm
    pub rssi: i16,
    /// Signal-to-Noise Ratio in dB
    pub snr: i8,
}

/// Completion of an outstanding radio operation
///
/// The driver reports exactly one of these per operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    TxDone,
    TxTimeout,
    RxDone(RxPacket),
    RxTimeout,
    /// CRC or header error on a received frame
    RxError,
    /// CAD finished; `busy` is true if activity was detected
    CadDone { busy: bool },
}

/// Abstract LoRa radio driver
///
/// Every operation only starts the radio and returns; completion is reported
/// later through [`RadioDriver::take_event`] once the radio raises its
/// interrupt line.
pub trait RadioDriver {
    /// One-time hardware bring-up
    fn init(&mut self) -> Result<(), LoraError>;

    /// Put the radio to sleep, aborting any running operation
    fn sleep(&mut self) -> Result<(), LoraError>;

    /// Set the centre frequency
    fn set_channel(&mut self, frequency_hz: u32) -> Result<(), LoraError>;

    fn set_tx_config(&mut self, config: &TxConfig) -> Result<(), LoraError>;

    fn set_rx_config(&mut self, config: &RxConfig) -> Result<(), LoraError>;

    fn set_cad_params(&mut self, params: &CadParams) -> Result<(), LoraError>;

    /// Start transmitting `data`
    fn send(&mut self, data: &[u8]) -> Result<(), LoraError>;

    /// Start receiving; a timeout of 0 selects continuous receive
    fn receive(&mut self, timeout_ms: u32) -> Result<(), LoraError>;

    /// Start channel activity detection
    fn start_cad(&mut self) -> Result<(), LoraError>;

    /// Read and clear the pending interrupt, if any
    fn take_event(&mut self) -> Result<Option<DriverEvent>, LoraError>;
}

/// Receiver of radio events, one method per event kind
pub trait RadioEventSink {
    fn on_tx_done(&mut self);

    fn on_tx_timeout(&mut self);

    fn on_rx_done(&mut self, payload: &[u8], rssi: i16, snr: i8);

    fn on_rx_timeout(&mut self);

    /// CRC failure on a received frame
    fn on_rx_error(&mut self);

    fn on_cad_done(&mut self, busy: bool);
}

/// Binary board indicator showing transmit-pending vs idle
pub trait Indicator {
    fn set(&mut self, on: bool);
}

/// Periodic timer that wakes the application to re-send
pub trait WakeupTimer {
    /// Start (or restart) with the given period
    fn start(&mut self, period_ms: u32);

    fn stop(&mut self);
}

#[cfg(test)]
pub mod mock {
    //! Mock radio driver and board collaborators for testing

    use super::*;

    /// A driver operation recorded by [`MockRadioDriver`]
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum DriverCall {
        Init,
        Sleep,
        SetChannel(u32),
        SetTxConfig(TxConfig),
        SetRxConfig(RxConfig),
        SetCadParams(CadParams),
        Send(Vec<u8, { radio::MAX_LORA_PAYLOAD }>),
        Receive(u32),
        StartCad,
    }

    /// Mock radio driver for unit testing
    pub struct MockRadioDriver {
        /// Record of driver operations in call order
        calls: Vec<DriverCall, 64>,
        /// Events queued to be returned by take_event()
        events: Vec<DriverEvent, 8>,
        /// Error to return from init()
        init_error: Option<LoraError>,
        /// Error to return on next send
        next_send_error: Option<LoraError>,
        /// Error to return on next start_cad
        next_cad_error: Option<LoraError>,
        /// Error to return on next sleep
        next_sleep_error: Option<LoraError>,
    }

    impl MockRadioDriver {
        /// Create a new mock driver
        pub fn new() -> Self {
            Self {
                calls: Vec::new(),
                events: Vec::new(),
                init_error: None,
                next_send_error: None,
                next_cad_error: None,
                next_sleep_error: None,
            }
        }

        /// Make every init() call fail with `error`
        pub fn fail_init(&mut self, error: LoraError) {
            self.init_error = Some(error);
        }

        pub fn set_next_send_error(&mut self, error: LoraError) {
            self.next_send_error = Some(error);
        }

        pub fn set_next_cad_error(&mut self, error: LoraError) {
            self.next_cad_error = Some(error);
        }

        pub fn set_next_sleep_error(&mut self, error: LoraError) {
            self.next_sleep_error = Some(error);
        }

        /// Queue an event to be returned by the next take_event() call
        pub fn queue_event(&mut self, event: DriverEvent) {
            let _ = self.events.push(event);
        }

        /// All recorded operations
        pub fn calls(&self) -> &[DriverCall] {
            &self.calls
        }

        pub fn clear_calls(&mut self) {
            self.calls.clear();
        }

        pub fn last_call(&self) -> Option<&DriverCall> {
            self.calls.last()
        }

        /// Number of recorded operations matching `f`
        pub fn count(&self, f: impl Fn(&DriverCall) -> bool) -> usize {
            self.calls.iter().filter(|c| f(c)).count()
        }

        /// Payloads handed to send(), oldest first
        pub fn sent_payloads(&self) -> impl Iterator<Item = &[u8]> {
            self.calls.iter().filter_map(|c| match c {
                DriverCall::Send(data) => Some(data.as_slice()),
                _ => None,
            })
        }

        fn record(&mut self, call: DriverCall) {
            let _ = self.calls.push(call);
        }
    }

    impl Default for MockRadioDriver {
        fn default() -> Self {
            Self::new()
        }
    }

    impl RadioDriver for MockRadioDriver {
        fn init(&mut self) -> Result<(), LoraError> {
            self.record(DriverCall::Init);
            match self.init_error {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }

        fn sleep(&mut self) -> Result<(), LoraError> {
            self.record(DriverCall::Sleep);
            match self.next_sleep_error.take() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }

        fn set_channel(&mut self, frequency_hz: u32) -> Result<(), LoraError> {
            self.record(DriverCall::SetChannel(frequency_hz));
            Ok(())
        }

        fn set_tx_config(&mut self, config: &TxConfig) -> Result<(), LoraError> {
            self.record(DriverCall::SetTxConfig(*config));
            Ok(())
        }

        fn set_rx_config(&mut self, config: &RxConfig) -> Result<(), LoraError> {
            self.record(DriverCall::SetRxConfig(*config));
            Ok(())
        }

        fn set_cad_params(&mut self, params: &CadParams) -> Result<(), LoraError> {
            self.record(DriverCall::SetCadParams(*params));
            Ok(())
        }

        fn send(&mut self, data: &[u8]) -> Result<(), LoraError> {
            if let Some(error) = self.next_send_error.take() {
                return Err(error);
            }

            let mut packet = Vec::new();
            packet
                .extend_from_slice(data)
                .map_err(|_| LoraError::PayloadTooLarge)?;
            self.record(DriverCall::Send(packet));
            Ok(())
        }

        fn receive(&mut self, timeout_ms: u32) -> Result<(), LoraError> {
            self.record(DriverCall::Receive(timeout_ms));
            Ok(())
        }

        fn start_cad(&mut self) -> Result<(), LoraError> {
            if let Some(error) = self.next_cad_error.take() {
                return Err(error);
            }
            self.record(DriverCall::StartCad);
            Ok(())
        }

        fn take_event(&mut self) -> Result<Option<DriverEvent>, LoraError> {
            // Pop from front (FIFO order)
            if self.events.is_empty() {
                return Ok(None);
            }
            Ok(Some(self.events.remove(0)))
        }
    }

    /// Indicator that remembers every level it was set to
    #[derive(Default)]
    pub struct MockIndicator {
        pub history: Vec<bool, 32>,
    }

    impl MockIndicator {
        pub fn is_on(&self) -> bool {
            self.history.last().copied().unwrap_or(false)
        }
    }

    impl Indicator for MockIndicator {
        fn set(&mut self, on: bool) {
            let _ = self.history.push(on);
        }
    }

    /// Wakeup timer that records its current period
    #[derive(Default)]
    pub struct MockWakeupTimer {
        pub period_ms: Option<u32>,
        pub starts: usize,
    }

    impl WakeupTimer for MockWakeupTimer {
        fn start(&mut self, period_ms: u32) {
            self.period_ms = Some(period_ms);
            self.starts += 1;
        }

        fn stop(&mut self) {
            self.period_ms = None;
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_mock_records_send() {
            let mut driver = MockRadioDriver::new();

            driver.send(&[0x01, 0x02, 0x03]).unwrap();

            let sent: std::vec::Vec<&[u8]> = driver.sent_payloads().collect();
            assert_eq!(sent, vec![&[0x01, 0x02, 0x03][..]]);
        }

        #[test]
        fn test_mock_send_error_is_one_shot() {
            let mut driver = MockRadioDriver::new();
            driver.set_next_send_error(LoraError::SpiError);

            assert_eq!(driver.send(&[0x01]), Err(LoraError::SpiError));
            driver.send(&[0x02]).unwrap();
            assert_eq!(driver.sent_payloads().count(), 1);
        }

        #[test]
        fn test_mock_events_fifo() {
            let mut driver = MockRadioDriver::new();
            driver.queue_event(DriverEvent::CadDone { busy: false });
            driver.queue_event(DriverEvent::TxDone);

            assert_eq!(
                driver.take_event(),
                Ok(Some(DriverEvent::CadDone { busy: false }))
            );
            assert_eq!(driver.take_event(), Ok(Some(DriverEvent::TxDone)));
            assert_eq!(driver.take_event(), Ok(None));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RadioConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.frequency_hz, 868_100_000);
        assert_eq!(config.bandwidth, Bandwidth::Khz125);
        assert_eq!(config.coding_rate, CodingRate::Cr4_5);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let bad_sf = RadioConfig {
            spreading_factor: 13,
            ..Default::default()
        };
        assert_eq!(bad_sf.validate(), Err(LoraError::InvalidConfig));

        let bad_power = RadioConfig {
            tx_power_dbm: 23,
            ..Default::default()
        };
        assert_eq!(bad_power.validate(), Err(LoraError::InvalidConfig));

        let bad_freq = RadioConfig {
            frequency_hz: 2_400_000_000,
            ..Default::default()
        };
        assert_eq!(bad_freq.validate(), Err(LoraError::InvalidConfig));

        let no_preamble = RadioConfig {
            preamble_length: 0,
            ..Default::default()
        };
        assert_eq!(no_preamble.validate(), Err(LoraError::InvalidConfig));
    }

    #[test]
    fn test_derived_driver_configs() {
        let config = RadioConfig {
            spreading_factor: 9,
            symbol_timeout: 12,
            ..Default::default()
        };

        let tx = config.tx_config();
        assert_eq!(tx.timeout_ms, 5000);
        assert!(tx.crc_on);
        assert_eq!(tx.power_dbm, 14);

        let rx = config.rx_config();
        assert!(rx.continuous);
        assert!(rx.crc_on);
        assert_eq!(rx.symbol_timeout, 12);

        let cad = config.cad_params();
        assert_eq!(cad.symbols, CadSymbols::Eight);
        assert_eq!(cad.det_peak, 22);
        assert_eq!(cad.det_min, 10);
        assert_eq!(cad.exit_mode, CadExitMode::CadOnly);
    }

    #[test]
    fn test_settings_indices() {
        assert_eq!(Bandwidth::from_index(2), Some(Bandwidth::Khz500));
        assert_eq!(Bandwidth::from_index(3), None);
        assert_eq!(CodingRate::from_index(0), None);
        assert_eq!(CodingRate::from_index(4).map(CodingRate::denominator), Some(8));
    }
}
