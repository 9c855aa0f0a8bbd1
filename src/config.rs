//! Hardware configuration constants for the ESP32-S3 with WIO-SX1262

/// LED pin (transmit indicator, active low)
pub mod led {
    pub const PIN: u8 = 48;
}

/// SPI pins for LoRa module
pub mod spi {
    pub const SCLK: u8 = 7;
    pub const MISO: u8 = 8;
    pub const MOSI: u8 = 9;
}

/// LoRa control pins
pub mod lora_pins {
    pub const NSS: u8 = 41;
    pub const DIO1: u8 = 39;
    pub const NRST: u8 = 42;
    pub const BUSY: u8 = 40;
}

/// TCXO configuration
pub mod tcxo {
    /// TCXO voltage code for SX1262 register
    /// 0x02 = 1.8V
    pub const VOLTAGE_CODE: u8 = 0x02;

    /// TCXO startup delay in 15.625us steps (~5ms)
    pub const STARTUP_TICKS: u32 = 0x00_0140;
}

/// Default P2P configuration
pub mod lora_defaults {
    /// EU868 channel 1
    pub const FREQUENCY_HZ: u32 = 868_100_000;
    pub const SPREADING_FACTOR: u8 = 7;
    /// Bandwidth index 0 = 125 kHz
    pub const BANDWIDTH_INDEX: u8 = 0;
    /// Coding rate index 1 = 4/5
    pub const CODING_RATE_INDEX: u8 = 1;
    pub const TX_POWER_DBM: i8 = 14;
    pub const PREAMBLE_LENGTH: u16 = 8;
    pub const SYMBOL_TIMEOUT: u16 = 0;
    /// Periodic re-send interval, 0 disables the wakeup timer
    pub const SEND_REPEAT_MS: u32 = 0;
}

/// Radio limits and fixed timing
pub mod radio {
    /// Maximum payload size for a single P2P packet
    pub const MAX_LORA_PAYLOAD: usize = 256;

    /// Transmit timeout budget handed to the driver
    pub const TX_TIMEOUT_MS: u32 = 5000;

    /// Receive timeout value that selects continuous receive
    pub const RX_CONTINUOUS: u32 = 0;

    /// CAD detection peak is spreading factor plus this offset
    pub const CAD_DET_PEAK_OFFSET: u8 = 13;

    /// CAD detection minimum
    pub const CAD_DET_MIN: u8 = 10;

    /// Over-current protection limit in mA
    pub const OCP_LIMIT_MA: u16 = 140;
}

/// Application side
pub mod app {
    /// First byte of the beacon payload sent on every wakeup
    pub const BEACON_MARKER: u8 = 0xB0;
}
