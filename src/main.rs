#![deny(unsafe_code)]
#![no_main]
#![no_std]

use embassy_executor::{task, Spawner};
use embassy_time::{Delay, Timer};

use esp_hal::{
    gpio::{Input, Level, Output, Pull},
    i2c::master::{Config as I2cConfig, I2c},
    timer::timg::TimerGroup,
    uart::{Config, Uart, UartRx, UartTx},
    Async,
};

use defmt::{error, info, warn};
use esp_backtrace as _;
use esp_println as _;

use am982_board::{
    board::{Led, ResetLines, StatusLeds},
    imu::{ImuConfig, Mpu6050},
    lora::{ConfigHandshake, LoraMode, LoraRadio, NetworkIdentity, DEFAULT_QUERY_TIMEOUT_MS},
    pins::get_board_pins_v1,
    rtk::{RoverRate, RtkReceiver},
    telemetry::{self, TELEMETRY},
};

static HANDSHAKE: ConfigHandshake = ConfigHandshake::new();

const ROVER_RATE: RoverRate = RoverRate::Hz10;
const LORA_IDENTITY: NetworkIdentity = NetworkIdentity::new(0x0001, 0x17);
const TELEMETRY_PERIOD_MS: u64 = 1_000;

type Rtk = RtkReceiver<UartTx<'static, Async>, UartTx<'static, Async>, Delay>;

/// Owns LoRa RX. Configuration replies complete the handshake; everything
/// else is correction data from the base and goes to the receiver's COM3.
#[task]
async fn lora_receive(mut rx: UartRx<'static, Async>, mut rtk: Rtk) -> ! {
    let mut buf = [0u8; 128];
    loop {
        match rx.read_async(&mut buf).await {
            Ok(0) => {}
            Ok(len) => {
                let frame = &buf[..len];
                if !HANDSHAKE.on_reply_received(frame) {
                    if let Err(e) = rtk.send_base_data(frame).await {
                        warn!("correction forward failed: {:?}", e);
                    }
                }
            }
            Err(e) => warn!("lora rx error: {:?}", e),
        }
    }
}

#[esp_hal_embassy::main]
async fn main(spawner: Spawner) {
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

    resets.reset_imu().await.ok();
    resets.reset_rtk().await.ok();

    // IMU
    let i2c = I2c::new(pins.i2c, I2cConfig::default())
        .with_sda(pins.i2c_sda)
        .with_scl(pins.i2c_scl)
        .into_async();

    let mut imu = Mpu6050::new(i2c);
    if let Err(e) = imu.configure(&ImuConfig::default()).await {
        error!("imu configuration failed: {:?}", e);
        leds.on(Led::Error).ok();
    }

    // RTK receiver: COM1 takes commands, COM3 takes corrections
    let com1 = Uart::new_with_config(
        pins.com1_uart,
        Config::default().baudrate(115_200),
        pins.com1_rx,
        pins.com1_tx,
    )
    .unwrap()
    .into_async();

    let com3 = Uart::new_with_config(
        pins.com3_uart,
        Config::default().baudrate(115_200),
        pins.com3_rx,
        pins.com3_tx,
    )
    .unwrap()
    .into_async();

    let (_, com1_tx) = com1.split();
    let (_, com3_tx) = com3.split();

    let mut rtk = RtkReceiver::new(com1_tx, com3_tx, Delay);
    if let Err(e) = rtk.configure_rover(ROVER_RATE).await {
        error!("rtk configuration failed: {:?}", e);
        leds.on(Led::Error).ok();
    }

    // LoRa
    let lora_config = Config::default().baudrate(9_600);
    let lora_uart = Uart::new_with_config(
        pins.lora_uart,
        lora_config,
        pins.lora_uart_rx,
        pins.lora_uart_tx,
    )
    .unwrap()
    .into_async();

    let (lora_rx, lora_tx) = lora_uart.split();

    // This task owns LoRa RX and, from here on, the receiver
    spawner.spawn(lora_receive(lora_rx, rtk)).unwrap();

    let mut radio = LoraRadio::new(
        lora_tx,
        Output::new(pins.lora_m0, Level::Low),
        Output::new(pins.lora_m1, Level::Low),
        Input::new(pins.lora_aux, Pull::Up),
        Delay,
        &HANDSHAKE,
    );
    radio.set_mode(LoraMode::Normal).ok();

    if let Err(e) = radio.set_address_and_channel(LORA_IDENTITY).await {
        error!("lora configuration failed: {:?}", e);
        leds.on(Led::Error).ok();
    }

    match radio
        .query_address_and_channel(DEFAULT_QUERY_TIMEOUT_MS)
        .await
    {
        Ok(identity) => {
            if identity != LORA_IDENTITY {
                warn!("lora identity mismatch: {:?}", identity);
            }
            TELEMETRY.lock().await.identity = Some(identity);
        }
        Err(e) => warn!("lora read back failed: {:?}", e),
    }

    leds.on(Led::Run).ok();

    loop {
        let sample = match imu.read_all().await {
            Ok(sample) => Some(sample),
            Err(e) => {
                warn!("imu read failed: {:?}", e);
                None
            }
        };

        let frame = {
            let mut state = TELEMETRY.lock().await;
            state.sequence = state.sequence.wrapping_add(1);
            state.imu = sample;
            telemetry::encode(&state)
        };

        match frame {
            Ok(frame) => {
                if let Err(e) = radio.send(&frame).await {
                    warn!("telemetry tx failed: {:?}", e);
                }
            }
            Err(_) => error!("telemetry frame overflow"),
        }

        Timer::after_millis(TELEMETRY_PERIOD_MS).await;
    }
}
