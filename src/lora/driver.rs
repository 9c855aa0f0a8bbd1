//! SX1262 LoRa driver
//!
//! Blocking implementation of [`RadioDriver`] on top of the embedded-hal SPI
//! and GPIO traits. Operations only program the chip and return; completion
//! is read back from the IRQ status register in [`RadioDriver::take_event`]
//! after DIO1 goes high.

use crate::config::radio::{MAX_LORA_PAYLOAD, OCP_LIMIT_MA};
use crate::config::tcxo;
use crate::lora::traits::{
    Bandwidth, CadExitMode, CadParams, CadSymbols, CodingRate, DriverEvent, LoraError,
    RadioDriver, RxConfig, RxPacket, TxConfig,
};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiBus;
use heapless::Vec;

/// SX1262 command opcodes
mod cmd {
    pub const SET_SLEEP: u8 = 0x84;
    pub const SET_STANDBY: u8 = 0x80;
    pub const SET_TX: u8 = 0x83;
    pub const SET_RX: u8 = 0x82;
    pub const SET_CAD: u8 = 0xC5;
    pub const SET_CAD_PARAMS: u8 = 0x88;
    pub const SET_RF_FREQUENCY: u8 = 0x86;
    pub const SET_PACKET_TYPE: u8 = 0x8A;
    pub const SET_MODULATION_PARAMS: u8 = 0x8B;
    pub const SET_PACKET_PARAMS: u8 = 0x8C;
    pub const SET_BUFFER_BASE_ADDRESS: u8 = 0x8F;
    pub const SET_PA_CONFIG: u8 = 0x95;
    pub const SET_DIO3_AS_TCXO_CTRL: u8 = 0x97;
    pub const SET_DIO2_AS_RF_SWITCH_CTRL: u8 = 0x9D;
    pub const SET_TX_PARAMS: u8 = 0x8E;
    pub const SET_LORA_SYMB_NUM_TIMEOUT: u8 = 0xA0;
    pub const STOP_TIMER_ON_PREAMBLE: u8 = 0x9F;
    pub const WRITE_BUFFER: u8 = 0x0E;
    pub const READ_BUFFER: u8 = 0x1E;
    pub const WRITE_REGISTER: u8 = 0x0D;
    pub const GET_RX_BUFFER_STATUS: u8 = 0x13;
    pub const GET_PACKET_STATUS: u8 = 0x14;
    pub const GET_IRQ_STATUS: u8 = 0x12;
    pub const CLEAR_IRQ_STATUS: u8 = 0x02;
    pub const SET_DIO_IRQ_PARAMS: u8 = 0x08;
}

/// SX1262 register addresses
mod reg {
    /// Over-current protection register
    pub const OCP_CONFIGURATION: u16 = 0x08E7;
    /// LoRa sync word, two bytes
    pub const LORA_SYNC_WORD_MSB: u16 = 0x0740;
    pub const LORA_SYNC_WORD_LSB: u16 = 0x0741;
}

/// Private network sync word used by P2P devices
const SYNC_WORD_PRIVATE: u16 = 0x1424;

/// Sleep configuration: warm start keeps the configuration
const SLEEP_WARM_START: u8 = 0x04;

/// Standby modes
const STDBY_RC: u8 = 0x00;

/// LoRa packet type
const PACKET_TYPE_LORA: u8 = 0x01;

/// Largest payload the packet length field can describe
const MAX_PACKET_LEN: usize = u8::MAX as usize;

/// IRQ masks
mod irq {
    pub const TX_DONE: u16 = 0x0001;
    pub const RX_DONE: u16 = 0x0002;
    pub const HEADER_ERR: u16 = 0x0020;
    pub const CRC_ERR: u16 = 0x0040;
    pub const CAD_DONE: u16 = 0x0080;
    pub const CAD_DETECTED: u16 = 0x0100;
    pub const TIMEOUT: u16 = 0x0200;
    pub const ALL: u16 = 0x03FF;
}

/// What the chip was last asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Sleep,
    Standby,
    Tx,
    Rx,
    Cad,
}

/// Interrupt cause decoded from the IRQ status register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IrqKind {
    TxDone,
    TxTimeout,
    RxDone,
    RxTimeout,
    RxError,
    CadDone { busy: bool },
}

/// Decode IRQ flags for the operation that raised them
fn classify_irq(flags: u16, mode: Mode) -> Option<IrqKind> {
    if flags & irq::CAD_DONE != 0 {
        return Some(IrqKind::CadDone {
            busy: flags & irq::CAD_DETECTED != 0,
        });
    }
    if flags & irq::TX_DONE != 0 {
        return Some(IrqKind::TxDone);
    }
    if flags & (irq::CRC_ERR | irq::HEADER_ERR) != 0 {
        return Some(IrqKind::RxError);
    }
    if flags & irq::RX_DONE != 0 {
        return Some(IrqKind::RxDone);
    }
    if flags & irq::TIMEOUT != 0 {
        return Some(if mode == Mode::Tx {
            IrqKind::TxTimeout
        } else {
            IrqKind::RxTimeout
        });
    }
    None
}

/// Frequency = (freq_rf * 2^25) / 32MHz
fn frequency_register(freq_hz: u32) -> u32 {
    ((freq_hz as u64 * (1 << 25)) / 32_000_000) as u32
}

/// Timeouts are counted in 15.625us steps, 64 per millisecond
fn timeout_ticks(timeout_ms: u32) -> u32 {
    timeout_ms.saturating_mul(64).min(0x00FF_FFFF)
}

fn bandwidth_code(bandwidth: Bandwidth) -> u8 {
    match bandwidth {
        Bandwidth::Khz125 => 0x04,
        Bandwidth::Khz250 => 0x05,
        Bandwidth::Khz500 => 0x06,
    }
}

fn coding_rate_code(coding_rate: CodingRate) -> u8 {
    match coding_rate {
        CodingRate::Cr4_5 => 0x01,
        CodingRate::Cr4_6 => 0x02,
        CodingRate::Cr4_7 => 0x03,
        CodingRate::Cr4_8 => 0x04,
    }
}

fn cad_symbols_code(symbols: CadSymbols) -> u8 {
    match symbols {
        CadSymbols::One => 0x00,
        CadSymbols::Two => 0x01,
        CadSymbols::Four => 0x02,
        CadSymbols::Eight => 0x03,
        CadSymbols::Sixteen => 0x04,
    }
}

/// Low data rate optimisation is required once a symbol lasts 16ms or more
fn low_data_rate_optimise(spreading_factor: u8, bandwidth: Bandwidth) -> bool {
    (1u32 << spreading_factor) / bandwidth.khz() >= 16
}

/// Control pins for SX1262
pub struct Sx1262Pins<Nss, Nrst, Busy> {
    pub nss: Nss,
    pub nrst: Nrst,
    pub busy: Busy,
}

/// SX1262 LoRa driver
///
/// Uses SpiBus with manual NSS control. DIO1 is not owned by the driver; the
/// task waiting on it calls `take_event` once it fires.
pub struct Sx1262Driver<Spi, Nss, Nrst, Busy, Dl>
where
    Spi: SpiBus,
    Nss: OutputPin,
    Nrst: OutputPin,
    Busy: InputPin,
    Dl: DelayNs,
{
    spi: Spi,
    nss: Nss,
    nrst: Nrst,
    busy: Busy,
    delay: Dl,
    mode: Mode,
    tx_config: Option<TxConfig>,
    rx_config: Option<RxConfig>,
}

impl<Spi, Nss, Nrst, Busy, Dl> Sx1262Driver<Spi, Nss, Nrst, Busy, Dl>
where
    Spi: SpiBus,
    Nss: OutputPin,
    Nrst: OutputPin,
    Busy: InputPin,
    Dl: DelayNs,
{
    /// Create a new SX1262 driver
    pub fn new(spi: Spi, pins: Sx1262Pins<Nss, Nrst, Busy>, delay: Dl) -> Self {
        Self {
            spi,
            nss: pins.nss,
            nrst: pins.nrst,
            busy: pins.busy,
            delay,
            mode: Mode::Standby,
            tx_config: None,
            rx_config: None,
        }
    }

    /// Reset the radio
    fn reset(&mut self) {
        let _ = self.nrst.set_low();
        self.delay.delay_ms(10);
        let _ = self.nrst.set_high();
        self.delay.delay_ms(20);
    }

    /// Wait for the BUSY pin to go low
    fn wait_not_busy(&mut self) -> Result<(), LoraError> {
        // Poll with timeout
        for _ in 0..1000 {
            if self.busy.is_low().unwrap_or(false) {
                return Ok(());
            }
            self.delay.delay_us(100);
        }
        Err(LoraError::BusyTimeout)
    }

    /// A falling NSS edge wakes the chip from sleep
    fn wake_up(&mut self) -> Result<(), LoraError> {
        let _ = self.nss.set_low();
        self.delay.delay_us(100);
        let _ = self.nss.set_high();
        self.wait_not_busy()?;
        self.mode = Mode::Standby;
        Ok(())
    }

    /// Write a command to the radio
    fn write_command(&mut self, cmd: u8, data: &[u8]) -> Result<(), LoraError> {
        if self.mode == Mode::Sleep {
            self.wake_up()?;
        }
        self.wait_not_busy()?;

        let _ = self.nss.set_low();

        let mut buf = [0u8; 16];
        buf[0] = cmd;
        let len = 1 + data.len().min(15);
        buf[1..len].copy_from_slice(&data[..len - 1]);

        let result = self.spi.write(&buf[..len]).and_then(|_| self.spi.flush());

        let _ = self.nss.set_high();

        result.map_err(|_| LoraError::SpiError)
    }

    /// Read data from the radio
    fn read_command(&mut self, cmd: u8, len: usize) -> Result<[u8; 16], LoraError> {
        if self.mode == Mode::Sleep {
            self.wake_up()?;
        }
        self.wait_not_busy()?;

        let _ = self.nss.set_low();

        // SX1262 requires command byte + NOP byte, then reads
        let mut tx_buf = [0u8; 18];
        let mut rx_buf = [0u8; 18];
        tx_buf[0] = cmd;

        let total_len = 2 + len;
        let result = self
            .spi
            .transfer(&mut rx_buf[..total_len], &tx_buf[..total_len])
            .and_then(|_| self.spi.flush());

        let _ = self.nss.set_high();
        result.map_err(|_| LoraError::SpiError)?;

        // Response starts after status byte (index 2)
        let mut response = [0u8; 16];
        response[..len].copy_from_slice(&rx_buf[2..2 + len]);

        Ok(response)
    }

    /// Write to a register
    fn write_register(&mut self, addr: u16, value: u8) -> Result<(), LoraError> {
        let [hi, lo] = addr.to_be_bytes();
        self.write_command(cmd::WRITE_REGISTER, &[hi, lo, value])
    }

    /// Set current limit (OCP - Over Current Protection)
    fn set_current_limit(&mut self, current_ma: u16) -> Result<(), LoraError> {
        // OCP register value = current_ma / 2.5
        let ocp_value = ((current_ma as u32 * 10) / 25).min(63) as u8;
        self.write_register(reg::OCP_CONFIGURATION, ocp_value)
    }

    fn set_standby(&mut self) -> Result<(), LoraError> {
        self.write_command(cmd::SET_STANDBY, &[STDBY_RC])?;
        self.mode = Mode::Standby;
        Ok(())
    }

    fn set_modulation_params(
        &mut self,
        spreading_factor: u8,
        bandwidth: Bandwidth,
        coding_rate: CodingRate,
    ) -> Result<(), LoraError> {
        let ldro = low_data_rate_optimise(spreading_factor, bandwidth) as u8;
        let data = [
            spreading_factor,
            bandwidth_code(bandwidth),
            coding_rate_code(coding_rate),
            ldro,
        ];
        self.write_command(cmd::SET_MODULATION_PARAMS, &data)
    }

    /// Set packet parameters: explicit header, standard IQ
    fn set_packet_params(
        &mut self,
        preamble_length: u16,
        payload_len: u8,
        crc_on: bool,
    ) -> Result<(), LoraError> {
        let [pre_hi, pre_lo] = preamble_length.to_be_bytes();
        let data = [pre_hi, pre_lo, 0x00, payload_len, crc_on as u8, 0x00];
        self.write_command(cmd::SET_PACKET_PARAMS, &data)
    }

    /// Configure the Power Amplifier for SX1262
    /// Must be called before set_tx_power
    fn configure_pa(&mut self) -> Result<(), LoraError> {
        // paDutyCycle=0x04, hpMax=0x07, deviceSel=0x00 (SX1262), paLut=0x01
        self.write_command(cmd::SET_PA_CONFIG, &[0x04, 0x07, 0x00, 0x01])
    }

    /// Power register maps directly to dBm, two's complement for negatives
    fn set_tx_power(&mut self, power_dbm: i8) -> Result<(), LoraError> {
        // Power, ramp time 200us
        self.write_command(cmd::SET_TX_PARAMS, &[power_dbm as u8, 0x04])
    }

    fn configure_irq(&mut self, irq_mask: u16) -> Result<(), LoraError> {
        let [hi, lo] = irq_mask.to_be_bytes();
        // IRQ mask, DIO1 mask, DIO2 mask, DIO3 mask
        let data = [hi, lo, hi, lo, 0x00, 0x00, 0x00, 0x00];
        self.write_command(cmd::SET_DIO_IRQ_PARAMS, &data)
    }

    fn clear_irq(&mut self, irq_mask: u16) -> Result<(), LoraError> {
        self.write_command(cmd::CLEAR_IRQ_STATUS, &irq_mask.to_be_bytes())
    }

    fn get_irq_status(&mut self) -> Result<u16, LoraError> {
        let result = self.read_command(cmd::GET_IRQ_STATUS, 2)?;
        Ok(u16::from_be_bytes([result[0], result[1]]))
    }

    /// Write data to TX buffer
    fn write_buffer(&mut self, offset: u8, data: &[u8]) -> Result<(), LoraError> {
        self.wait_not_busy()?;

        let _ = self.nss.set_low();

        // Command + offset + data
        let mut buf = [0u8; 2 + MAX_LORA_PAYLOAD];
        buf[0] = cmd::WRITE_BUFFER;
        buf[1] = offset;
        let len = data.len().min(MAX_LORA_PAYLOAD);
        buf[2..2 + len].copy_from_slice(&data[..len]);

        let result = self.spi.write(&buf[..2 + len]).and_then(|_| self.spi.flush());

        let _ = self.nss.set_high();

        result.map_err(|_| LoraError::SpiError)
    }

    /// Read data from RX buffer
    fn read_buffer(
        &mut self,
        offset: u8,
        len: usize,
    ) -> Result<Vec<u8, MAX_LORA_PAYLOAD>, LoraError> {
        self.wait_not_busy()?;

        let _ = self.nss.set_low();

        // Command + offset + NOP + data
        let mut tx_buf = [0u8; 3 + MAX_LORA_PAYLOAD];
        let mut rx_buf = [0u8; 3 + MAX_LORA_PAYLOAD];
        tx_buf[0] = cmd::READ_BUFFER;
        tx_buf[1] = offset;

        let total_len = 3 + len.min(MAX_LORA_PAYLOAD);
        let result = self
            .spi
            .transfer(&mut rx_buf[..total_len], &tx_buf[..total_len])
            .and_then(|_| self.spi.flush());

        let _ = self.nss.set_high();
        result.map_err(|_| LoraError::SpiError)?;

        let mut data = Vec::new();
        data.extend_from_slice(&rx_buf[3..total_len])
            .map_err(|_| LoraError::ReceiveFailed)?;

        Ok(data)
    }

    /// (payload_length, buffer_offset)
    fn get_rx_buffer_status(&mut self) -> Result<(u8, u8), LoraError> {
        let result = self.read_command(cmd::GET_RX_BUFFER_STATUS, 2)?;
        Ok((result[0], result[1]))
    }

    /// (rssi dBm, snr dB) of the last packet
    fn get_packet_status(&mut self) -> Result<(i16, i8), LoraError> {
        let result = self.read_command(cmd::GET_PACKET_STATUS, 3)?;
        let rssi = -(result[0] as i16) / 2;
        let snr = (result[1] as i8) / 4;
        Ok((rssi, snr))
    }

    fn read_packet(&mut self) -> Result<RxPacket, LoraError> {
        let (payload_len, buffer_offset) = self.get_rx_buffer_status()?;
        let data = self.read_buffer(buffer_offset, payload_len as usize)?;
        let (rssi, snr) = self.get_packet_status()?;
        Ok(RxPacket { data, rssi, snr })
    }
}

impl<Spi, Nss, Nrst, Busy, Dl> RadioDriver for Sx1262Driver<Spi, Nss, Nrst, Busy, Dl>
where
    Spi: SpiBus,
    Nss: OutputPin,
    Nrst: OutputPin,
    Busy: InputPin,
    Dl: DelayNs,
{
    fn init(&mut self) -> Result<(), LoraError> {
        self.reset();
        self.wait_not_busy()?;
        self.set_standby()?;

        // SetDIO3AsTcxoCtrl: voltage code + 24-bit startup timeout
        let [_, t2, t1, t0] = tcxo::STARTUP_TICKS.to_be_bytes();
        self.write_command(cmd::SET_DIO3_AS_TCXO_CTRL, &[tcxo::VOLTAGE_CODE, t2, t1, t0])?;
        self.delay.delay_ms(10);

        self.write_command(cmd::SET_DIO2_AS_RF_SWITCH_CTRL, &[0x01])?;
        self.set_current_limit(OCP_LIMIT_MA)?;
        self.write_command(cmd::SET_PACKET_TYPE, &[PACKET_TYPE_LORA])?;
        self.write_command(cmd::SET_BUFFER_BASE_ADDRESS, &[0x00, 0x00])?;

        let [sync_hi, sync_lo] = SYNC_WORD_PRIVATE.to_be_bytes();
        self.write_register(reg::LORA_SYNC_WORD_MSB, sync_hi)?;
        self.write_register(reg::LORA_SYNC_WORD_LSB, sync_lo)?;

        log::debug!("SX1262: hardware ready");
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), LoraError> {
        if self.mode == Mode::Sleep {
            return Ok(());
        }
        self.write_command(cmd::SET_SLEEP, &[SLEEP_WARM_START])?;
        self.mode = Mode::Sleep;
        // The chip needs 500us before it accepts the wake-up edge
        self.delay.delay_us(500);
        Ok(())
    }

    fn set_channel(&mut self, frequency_hz: u32) -> Result<(), LoraError> {
        self.write_command(
            cmd::SET_RF_FREQUENCY,
            &frequency_register(frequency_hz).to_be_bytes(),
        )
    }

    fn set_tx_config(&mut self, config: &TxConfig) -> Result<(), LoraError> {
        self.set_modulation_params(
            config.spreading_factor,
            config.bandwidth,
            config.coding_rate,
        )?;
        self.configure_pa()?;
        self.set_tx_power(config.power_dbm)?;
        self.tx_config = Some(*config);
        Ok(())
    }

    fn set_rx_config(&mut self, config: &RxConfig) -> Result<(), LoraError> {
        self.set_modulation_params(
            config.spreading_factor,
            config.bandwidth,
            config.coding_rate,
        )?;
        self.write_command(cmd::STOP_TIMER_ON_PREAMBLE, &[0x00])?;
        self.write_command(
            cmd::SET_LORA_SYMB_NUM_TIMEOUT,
            &[config.symbol_timeout.min(248) as u8],
        )?;
        self.rx_config = Some(*config);
        Ok(())
    }

    fn set_cad_params(&mut self, params: &CadParams) -> Result<(), LoraError> {
        let exit_mode = match params.exit_mode {
            CadExitMode::CadOnly => 0x00,
            CadExitMode::CadRx => 0x01,
        };
        let [_, t2, t1, t0] = params.timeout.to_be_bytes();
        let data = [
            cad_symbols_code(params.symbols),
            params.det_peak,
            params.det_min,
            exit_mode,
            t2,
            t1,
            t0,
        ];
        self.write_command(cmd::SET_CAD_PARAMS, &data)
    }

    fn send(&mut self, data: &[u8]) -> Result<(), LoraError> {
        let config = self.tx_config.ok_or(LoraError::NotInitialised)?;
        if data.len() > MAX_PACKET_LEN {
            log::warn!("SX1262: {} byte payload exceeds the packet length field", data.len());
            return Err(LoraError::PayloadTooLarge);
        }

        self.set_standby()?;
        self.set_packet_params(config.preamble_length, data.len() as u8, config.crc_on)?;
        self.write_buffer(0x00, data)?;

        self.configure_irq(irq::TX_DONE | irq::TIMEOUT)?;
        self.clear_irq(irq::ALL)?;

        let [_, t2, t1, t0] = timeout_ticks(config.timeout_ms).to_be_bytes();
        self.write_command(cmd::SET_TX, &[t2, t1, t0])?;
        self.mode = Mode::Tx;
        Ok(())
    }

    fn receive(&mut self, timeout_ms: u32) -> Result<(), LoraError> {
        let config = self.rx_config.ok_or(LoraError::NotInitialised)?;

        self.set_standby()?;
        self.set_packet_params(config.preamble_length, 0xFF, config.crc_on)?;
        self.configure_irq(irq::RX_DONE | irq::TIMEOUT | irq::CRC_ERR | irq::HEADER_ERR)?;
        self.clear_irq(irq::ALL)?;

        // 0xFFFFFF keeps the receiver on after each packet
        let ticks = if timeout_ms == 0 && config.continuous {
            0x00FF_FFFF
        } else {
            timeout_ticks(timeout_ms)
        };
        let [_, t2, t1, t0] = ticks.to_be_bytes();
        self.write_command(cmd::SET_RX, &[t2, t1, t0])?;
        self.mode = Mode::Rx;
        Ok(())
    }

    fn start_cad(&mut self) -> Result<(), LoraError> {
        self.configure_irq(irq::CAD_DONE | irq::CAD_DETECTED)?;
        self.clear_irq(irq::ALL)?;
        self.write_command(cmd::SET_CAD, &[])?;
        self.mode = Mode::Cad;
        Ok(())
    }

    fn take_event(&mut self) -> Result<Option<DriverEvent>, LoraError> {
        if self.mode == Mode::Sleep {
            return Ok(None);
        }

        let flags = self.get_irq_status()?;
        if flags == 0 {
            return Ok(None);
        }
        self.clear_irq(irq::ALL)?;

        let Some(kind) = classify_irq(flags, self.mode) else {
            log::warn!("SX1262: unexpected IRQ flags {:#06x}", flags);
            return Ok(None);
        };

        let event = match kind {
            IrqKind::TxDone => DriverEvent::TxDone,
            IrqKind::TxTimeout => DriverEvent::TxTimeout,
            IrqKind::RxDone => DriverEvent::RxDone(self.read_packet()?),
            IrqKind::RxTimeout => DriverEvent::RxTimeout,
            IrqKind::RxError => DriverEvent::RxError,
            IrqKind::CadDone { busy } => DriverEvent::CadDone { busy },
        };

        // TX and CAD (CAD-only exit) fall back to standby; continuous RX stays on
        if matches!(kind, IrqKind::TxDone | IrqKind::TxTimeout | IrqKind::CadDone { .. }) {
            self.mode = Mode::Standby;
        }

        Ok(Some(event))
    }
}
