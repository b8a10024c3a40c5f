//! SSD1306 128x64 status screen on I2C.

use embassy_rp::i2c::{Blocking, I2c};
use embassy_rp::peripherals::I2C1;
use embedded_graphics::Drawable;
use embedded_graphics::geometry::Point;
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::text::{Alignment, Text};
use ssd1306::mode::BufferedGraphicsMode;
use ssd1306::prelude::{DisplayConfig, DisplayRotation, DisplaySize128x64, I2CInterface};
use ssd1306::{I2CDisplayInterface, Ssd1306};

use crate::alarm::StatusDisplay;
use crate::{Error, Result};

type Driver = Ssd1306<
    I2CInterface<I2c<'static, I2C1, Blocking>>,
    DisplaySize128x64,
    BufferedGraphicsMode<DisplaySize128x64>,
>;

const CENTER_X: i32 = 64;
const SINGLE_LINE_Y: i32 = 36;
const TWO_LINES_Y: [i32; 2] = [28, 42];

/// The status screen, at I2C address 0x3C.
pub struct Oled {
    display: Driver,
}

impl Oled {
    #[must_use]
    pub fn new(i2c: I2c<'static, I2C1, Blocking>) -> Self {
        let interface = I2CDisplayInterface::new(i2c);
        let display = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();
        Self { display }
    }

    /// Sends the controller its power-up sequence and blanks the screen.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StatusDisplay`] if the controller does not answer.
    pub fn init(&mut self) -> Result<()> {
        self.display.init().map_err(|_| Error::StatusDisplay)?;
        self.show(&[])
    }

    fn show(&mut self, lines: &[&str]) -> Result<()> {
        self.display.clear_buffer();
        let style = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);
        let baselines: &[i32] = match lines.len() {
            1 => &[SINGLE_LINE_Y],
            _ => &TWO_LINES_Y,
        };
        for (line, &y) in lines.iter().zip(baselines) {
            Text::with_alignment(line, Point::new(CENTER_X, y), style, Alignment::Center)
                .draw(&mut self.display)
                .map_err(|_| Error::StatusDisplay)?;
        }
        self.display.flush().map_err(|_| Error::StatusDisplay)
    }
}

impl StatusDisplay for Oled {
    fn show_status(&mut self, active: bool) -> Result<()> {
        if active {
            self.show(&["EVACUAR"])
        } else {
            self.show(&["Sistema em", "repouso"])
        }
    }

    fn show_ap_disabled(&mut self) -> Result<()> {
        self.show(&["AP Desativado"])
    }
}
