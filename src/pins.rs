use esp_hal::{
    gpio::{AnyPin, Pin},
    peripherals::{Peripherals, I2C0, TIMG0, UART0, UART1, UART2},
};

pub struct BoardPins {
    pub led_run: AnyPin,
    pub led_err: AnyPin,

    pub rtk_rst: AnyPin,
    pub imu_rst: AnyPin,

    pub com1_tx: AnyPin,
    pub com1_rx: AnyPin,

    pub com3_tx: AnyPin,
    pub com3_rx: AnyPin,

    pub lora_uart_tx: AnyPin,
    pub lora_uart_rx: AnyPin,
    pub lora_m0: AnyPin,
    pub lora_m1: AnyPin,
    pub lora_aux: AnyPin,

    pub i2c_sda: AnyPin,
    pub i2c_scl: AnyPin,

    pub timg: TIMG0,
    pub com1_uart: UART0,
    pub com3_uart: UART2,
    pub lora_uart: UART1,
    pub i2c: I2C0,
}

pub fn get_board_pins_v1(p: Peripherals) -> BoardPins {
    BoardPins {
        led_run: p.GPIO38.degrade(),
        led_err: p.GPIO39.degrade(),

        rtk_rst: p.GPIO4.degrade(), // active low
        imu_rst: p.GPIO5.degrade(), // active high

        com1_tx: p.GPIO17.degrade(), // AM982 COM1 RX, commands
        com1_rx: p.GPIO18.degrade(), // AM982 COM1 TX

        com3_tx: p.GPIO15.degrade(), // AM982 COM3 RX, corrections
        com3_rx: p.GPIO16.degrade(), // AM982 COM3 TX

        lora_uart_tx: p.GPIO10.degrade(),
        lora_uart_rx: p.GPIO11.degrade(),
        lora_m0: p.GPIO12.degrade(),
        lora_m1: p.GPIO13.degrade(),
        lora_aux: p.GPIO14.degrade(),

        i2c_sda: p.GPIO8.degrade(),
        i2c_scl: p.GPIO9.degrade(),

        timg: p.TIMG0,
        com1_uart: p.UART0,
        com3_uart: p.UART2,
        lora_uart: p.UART1,
        i2c: p.I2C0,
    }
}
