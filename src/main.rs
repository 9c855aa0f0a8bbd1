#![no_std]
#![no_main]

// Required for ESP-IDF bootloader compatibility
// Use explicit parameters to ensure correct efuse block revision values
esp_bootloader_esp_idf::esp_app_desc!(
    env!("CARGO_PKG_VERSION"),  // version
    env!("CARGO_PKG_NAME"),     // project_name
    "00:00:00",                 // build_time
    "2025-01-01",               // build_date
    "0.0.0",                    // idf_ver (not using IDF)
    0x10000,                    // mmu_page_size (64KB)
    0,                          // min_efuse_blk_rev_full (accept all)
    u16::MAX                    // max_efuse_blk_rev_full (accept all)
);

use embassy_executor::Spawner;
use embassy_sync::mutex::Mutex;
use esp_backtrace as _;
use esp_hal::delay::Delay;
use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::spi::Mode as SpiMode;
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use esp_hal::Blocking;
use static_cell::StaticCell;

use lora_p2p_radio::board::PinIndicator;
use lora_p2p_radio::events::{AppEventSignal, APP_EVENTS};
use lora_p2p_radio::lora::{RadioConfig, RadioController, Sx1262Driver, Sx1262Pins};
use lora_p2p_radio::tasks::{self, SharedRadio, TimerWakeup};

/// Concrete SX1262 driver on the WIO-SX1262 wiring
type BoardDriver =
    Sx1262Driver<Spi<'static, Blocking>, Output<'static>, Output<'static>, Input<'static>, Delay>;

/// Concrete controller shared between tasks
type BoardRadio =
    SharedRadio<BoardDriver, &'static AppEventSignal, PinIndicator<Output<'static>>, TimerWakeup>;

/// Static executor for embassy
static EXECUTOR: StaticCell<esp_rtos::embassy::Executor> = StaticCell::new();

/// Static cell for the radio controller (needed for 'static lifetime)
static RADIO: StaticCell<BoardRadio> = StaticCell::new();

/// Beacon interval; 0 leaves the radio purely listening
const SEND_REPEAT_MS: u32 = 30_000;

#[esp_hal::main]
fn main() -> ! {
    esp_println::logger::init_logger(log::LevelFilter::Debug);

    let peripherals = esp_hal::init(esp_hal::Config::default());

    // Transmit indicator LED (active low, off)
    let led = Output::new(peripherals.GPIO48, Level::High, OutputConfig::default());

    // Initialise the RTOS scheduler with timer - MUST be done before any async operations
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // Configure SPI for LoRa
    let spi = Spi::new(
        peripherals.SPI2,
        SpiConfig::default()
            .with_frequency(Rate::from_mhz(1))
            .with_mode(SpiMode::_0),
    )
    .unwrap()
    .with_sck(peripherals.GPIO7)
    .with_miso(peripherals.GPIO8)
    .with_mosi(peripherals.GPIO9);

    // Configure LoRa control pins
    let nss = Output::new(peripherals.GPIO41, Level::High, OutputConfig::default());
    let dio1 = Input::new(peripherals.GPIO39, InputConfig::default().with_pull(Pull::Down));
    let nrst = Output::new(peripherals.GPIO42, Level::High, OutputConfig::default());
    let busy = Input::new(peripherals.GPIO40, InputConfig::default().with_pull(Pull::Down));

    let lora_pins = Sx1262Pins { nss, nrst, busy };
    let driver = Sx1262Driver::new(spi, lora_pins, Delay::new());

    let mut controller = RadioController::new(
        driver,
        &APP_EVENTS,
        PinIndicator::active_low(led),
        TimerWakeup,
    );

    let config = RadioConfig {
        send_repeat_ms: SEND_REPEAT_MS,
        ..RadioConfig::default()
    };
    if let Err(e) = controller.init(config) {
        panic!("LoRa init failed: {:?}", e);
    }

    let radio: &'static BoardRadio = RADIO.init(Mutex::new(controller));

    // Create and run the embassy executor
    let executor = EXECUTOR.init(esp_rtos::embassy::Executor::new());
    executor.run(|spawner| {
        spawner.must_spawn(async_main(spawner, dio1, radio));
    })
}

#[embassy_executor::task]
async fn async_main(spawner: Spawner, dio1: Input<'static>, radio: &'static BoardRadio) {
    spawner.spawn(radio_irq_task(dio1, radio)).unwrap();
    spawner.spawn(wakeup_task()).unwrap();
    spawner.spawn(beacon_task(radio)).unwrap();
    log::info!("LoRa P2P node running");
}

/// Task that services SX1262 interrupts
#[embassy_executor::task]
async fn radio_irq_task(dio1: Input<'static>, radio: &'static BoardRadio) {
    tasks::radio_irq_task(dio1, radio).await
}

/// Task that turns the wakeup period into application events
#[embassy_executor::task]
async fn wakeup_task() {
    tasks::wakeup_task(&APP_EVENTS).await
}

/// Task that consumes application events
#[embassy_executor::task]
async fn beacon_task(radio: &'static BoardRadio) {
    tasks::beacon_task(radio, &APP_EVENTS).await
}
