#![deny(unsafe_code)]
#![no_main]
#![no_std]

use embassy_executor::Spawner;
use embassy_time::{Delay, Timer};

use esp_hal::{
    gpio::{Level, Output},
    timer::timg::TimerGroup,
    uart::{Config, Error as UartError, Uart, UartTx},
    Async,
};

use defmt::{error, info};
use esp_backtrace as _;
use esp_println as _;

use am982_board::{
    board::{Led, ResetLines, StatusLeds},
    error::Result,
    pins::get_board_pins_v1,
    rtk::{base_sequence, run_sequence, BaseMode},
};

// Surveyed antenna position; switch to `BaseMode::SurveyTime` for a new site.
const BASE_MODE: BaseMode = BaseMode::Position {
    latitude: -36.848_461_2,
    longitude: 174.763_336_1,
    altitude: 41.27,
};

async fn configure_base(com1: &mut UartTx<'static, Async>) -> Result<(), UartError> {
    let sequence = base_sequence(&BASE_MODE)?;
    info!("configuring rtk base");
    run_sequence(com1, &mut Delay, &sequence).await
}

#[esp_hal_embassy::main]
async fn main(_spawner: Spawner) {
    info!("Initializing");

    let peripherals = esp_hal::init(esp_hal::Config::default());

    let pins = get_board_pins_v1(peripherals);

    let timg0 = TimerGroup::new(pins.timg);

    esp_hal_embassy::init(timg0.timer0);

    info!("Initializing complete");

    let mut leds = StatusLeds::new(
        Output::new(pins.led_run, Level::Low),
        Output::new(pins.led_err, Level::Low),
    );
    let mut resets = ResetLines::new(
        Output::new(pins.rtk_rst, Level::High),
        Output::new(pins.imu_rst, Level::Low),
        Delay,
    );
    resets.reset_rtk().await.ok();

    // COM1 only. The receiver streams RTCM out of COM3 straight into the
    // LoRa module, so there is no correction path through this chip.
    let com1 = Uart::new_with_config(
        pins.com1_uart,
        Config::default().baudrate(115_200),
        pins.com1_rx,
        pins.com1_tx,
    )
    .unwrap()
    .into_async();

    let (_, mut com1_tx) = com1.split();

    let healthy = match configure_base(&mut com1_tx).await {
        Ok(()) => true,
        Err(e) => {
            error!("rtk base configuration failed: {:?}", e);
            leds.on(Led::Error).ok();
            false
        }
    };

    if healthy {
        info!("base configured");
    }

    loop {
        if healthy {
            leds.on(Led::Run).ok();
        }
        Timer::after_millis(500).await;
        leds.off(Led::Run).ok();
        Timer::after_millis(500).await;
    }
}
