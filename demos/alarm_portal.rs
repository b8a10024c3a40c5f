//! Alarm portal firmware for the Pico W.
//!
//! Connect to the access point (default `PICO_ALARME_AP` / `picoalarme123`), open any web
//! page and the captive portal lands on the alarm controls. Press `d` or `q` on UART0 to
//! shut the portal down.

#![cfg(feature = "wifi")]
#![no_std]
#![no_main]
#![allow(clippy::future_not_send, reason = "single-threaded")]

use alarm_portal::Result;
use alarm_portal::alarm::AlarmSwitch;
use alarm_portal::ap_config::{ApCredentials, ApIdentity};
use alarm_portal::console::{ConsoleKeys, UartConsole};
use alarm_portal::hardware::Hardware;
use alarm_portal::http_server::HttpServer;
use alarm_portal::supervisor::{EmbassyClock, EmbassyServices, ExitCode, ServerLinks, Supervisor};
use alarm_portal::wifi_ap;
use defmt::{error, info, warn};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_time::Timer;
use panic_probe as _;

static ALARM: AlarmSwitch = AlarmSwitch::new();
static HTTP_SERVER: HttpServer<'static> = HttpServer::new(ApIdentity::DEFAULT, &ALARM);
static SERVER_LINKS: ServerLinks = ServerLinks::new();
static CONSOLE_KEYS: ConsoleKeys = UartConsole::keys();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) -> ! {
    let exit_code = match inner_main(spawner).await {
        Ok(exit_code) => exit_code,
        Err(err) => {
            error!("Startup failed: {}", defmt::Display2Format(&err));
            ExitCode::InitFailed
        }
    };
    info!("Alarm portal exited with code {}", exit_code.code());
    loop {
        Timer::after_secs(3600).await;
    }
}

async fn inner_main(spawner: Spawner) -> Result<ExitCode> {
    info!("Starting alarm portal");
    let credentials = ApCredentials::from_build_env()?;
    let identity = ApIdentity::DEFAULT;

    let Hardware {
        outputs,
        mut display,
        console_rx,
        wifi,
    } = Hardware::default();
    if let Err(err) = display.init() {
        warn!("OLED not responding: {}", defmt::Display2Format(&err));
    }
    let console = UartConsole::new(console_rx, &CONSOLE_KEYS, spawner)?;

    let (stack, radio) = wifi_ap::start(wifi, identity, spawner).await?;
    let services = EmbassyServices::new(spawner, stack, identity, &HTTP_SERVER, &SERVER_LINKS);

    let mut supervisor = Supervisor::new(
        radio,
        services,
        outputs,
        display,
        console,
        EmbassyClock,
        credentials,
        &ALARM,
    );
    let exit_code = supervisor.run().await;
    // Let the last log lines and the farewell screen settle.
    Timer::after_millis(10).await;
    Ok(exit_code)
}
