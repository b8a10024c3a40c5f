//! Board wiring: which peripheral goes where.

use embassy_rp::gpio::{Level, Output};
use embassy_rp::i2c::{self, I2c};
use embassy_rp::peripherals::{DMA_CH0, PIN_23, PIN_24, PIN_25, PIN_29, PIO0, UART0};
use embassy_rp::uart::{self, Async, UartRx};
use embassy_rp::{Peri, bind_interrupts};

use crate::alarm::AlarmOutputs;
use crate::oled::Oled;

bind_interrupts!(struct Irqs {
    UART0_IRQ => uart::InterruptHandler<UART0>;
});

const OLED_I2C_HZ: u32 = 400_000;

/// The four alarm outputs, all active high.
pub struct AlarmLeds {
    red: Output<'static>,
    green: Output<'static>,
    blue: Output<'static>,
    buzzer: Output<'static>,
}

impl AlarmOutputs for AlarmLeds {
    fn set_red(&mut self, on: bool) {
        self.red.set_level(Level::from(on));
    }

    fn set_green(&mut self, on: bool) {
        self.green.set_level(Level::from(on));
    }

    fn set_blue(&mut self, on: bool) {
        self.blue.set_level(Level::from(on));
    }

    fn set_buzzer(&mut self, on: bool) {
        self.buzzer.set_level(Level::from(on));
    }
}

/// Peripherals handed to the cyw43 driver.
pub struct WifiPeripherals {
    pub pin_23: Peri<'static, PIN_23>,
    pub pin_24: Peri<'static, PIN_24>,
    pub pin_25: Peri<'static, PIN_25>,
    pub pin_29: Peri<'static, PIN_29>,
    pub pio0: Peri<'static, PIO0>,
    pub dma_ch0: Peri<'static, DMA_CH0>,
}

pub struct Hardware {
    pub outputs: AlarmLeds,
    pub display: Oled,
    pub console_rx: UartRx<'static, Async>,
    pub wifi: WifiPeripherals,
}

impl Default for Hardware {
    fn default() -> Self {
        let peripherals: embassy_rp::Peripherals =
            embassy_rp::init(embassy_rp::config::Config::default());

        // Idle state: green on, everything else off.
        let outputs = AlarmLeds {
            red: Output::new(peripherals.PIN_13, Level::Low),
            green: Output::new(peripherals.PIN_11, Level::High),
            blue: Output::new(peripherals.PIN_12, Level::Low),
            buzzer: Output::new(peripherals.PIN_10, Level::Low),
        };

        let mut i2c_config = i2c::Config::default();
        i2c_config.frequency = OLED_I2C_HZ;
        let i2c = I2c::new_blocking(
            peripherals.I2C1,
            peripherals.PIN_15,
            peripherals.PIN_14,
            i2c_config,
        );
        let display = Oled::new(i2c);

        let console_rx = UartRx::new(
            peripherals.UART0,
            peripherals.PIN_1,
            Irqs,
            peripherals.DMA_CH1,
            uart::Config::default(),
        );

        let wifi = WifiPeripherals {
            pin_23: peripherals.PIN_23,
            pin_24: peripherals.PIN_24,
            pin_25: peripherals.PIN_25,
            pin_29: peripherals.PIN_29,
            pio0: peripherals.PIO0,
            dma_ch0: peripherals.DMA_CH0,
        };

        Self {
            outputs,
            display,
            console_rx,
            wifi,
        }
    }
}
