//! Keystrokes from the UART console.
//!
//! A background task reads UART0 one byte at a time and queues the bytes; the supervisor
//! drains the queue without blocking through [`Console::poll_key`].

use defmt::{debug, info, warn};
use embassy_executor::Spawner;
use embassy_rp::uart::{Async, UartRx};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel as EmbassyChannel;

use crate::Result;
use crate::supervisor::Console;

pub type ConsoleKeys = EmbassyChannel<CriticalSectionRawMutex, u8, 8>;

/// Non-blocking view of the keys typed on the UART console.
pub struct UartConsole {
    keys: &'static ConsoleKeys,
}

impl UartConsole {
    #[must_use]
    pub const fn keys() -> ConsoleKeys {
        EmbassyChannel::new()
    }

    /// Spawns the reader task on `rx`.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader task could not be spawned.
    pub fn new(
        rx: UartRx<'static, Async>,
        keys: &'static ConsoleKeys,
        spawner: Spawner,
    ) -> Result<Self> {
        let token = console_task(rx, keys)?;
        spawner.spawn(token);
        Ok(Self { keys })
    }
}

impl Console for UartConsole {
    fn poll_key(&mut self) -> Option<u8> {
        self.keys.try_receive().ok()
    }
}

#[embassy_executor::task]
async fn console_task(mut rx: UartRx<'static, Async>, keys: &'static ConsoleKeys) -> ! {
    info!("Console reader started");
    let mut byte = [0u8; 1];
    loop {
        match rx.read(&mut byte).await {
            Ok(()) => {
                let [key] = byte;
                if keys.try_send(key).is_err() {
                    debug!("Console key {} dropped", key);
                }
            }
            Err(err) => warn!("Console read error: {:?}", err),
        }
    }
}
