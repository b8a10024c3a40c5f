//! cyw43 bring-up for soft-AP mode.
//!
//! [`start`] powers the radio, loads its firmware and puts an `embassy-net` stack on it with
//! the gateway address configured statically. The access point itself is only started when
//! the supervisor calls [`ApRadio::enable_ap`], after every server is listening.

use cyw43_pio::{DEFAULT_CLOCK_DIVIDER, PioSpi};
use defmt::info;
use embassy_executor::Spawner;
use embassy_net::{Config, Ipv4Cidr, Stack, StackResources, StaticConfigV4};
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Level, Output};
use embassy_rp::peripherals::{DMA_CH0, PIO0};
use embassy_rp::pio::{InterruptHandler, Pio};
use static_cell::StaticCell;

use crate::Result;
use crate::ap_config::{AP_CHANNEL, ApCredentials, ApIdentity};
use crate::hardware::WifiPeripherals;
use crate::supervisor::ApRadio;

bind_interrupts!(struct Irqs {
    PIO0_IRQ_0 => InterruptHandler<PIO0>;
});

/// cyw43 GPIO wired to the onboard LED.
const ONBOARD_LED: u8 = 0;

/// Three UDP servers, four HTTP listeners and some headroom.
const SOCKET_COUNT: usize = 10;

/// The soft-AP side of the cyw43 driver.
pub struct AccessPoint {
    control: cyw43::Control<'static>,
}

/// Brings the radio up and returns the network stack with the radio that will carry it.
///
/// # Errors
///
/// Returns an error if a driver task could not be spawned.
pub async fn start(
    wifi: WifiPeripherals,
    identity: ApIdentity,
    spawner: Spawner,
) -> Result<(Stack<'static>, AccessPoint)> {
    info!("WiFi device initializing in AP mode");

    let fw = cyw43_firmware::CYW43_43439A0;
    let clm = cyw43_firmware::CYW43_43439A0_CLM;

    let pwr = Output::new(wifi.pin_23, Level::Low);
    let cs = Output::new(wifi.pin_25, Level::High);
    let mut pio = Pio::new(wifi.pio0, Irqs);
    let spi = PioSpi::new(
        &mut pio.common,
        pio.sm0,
        DEFAULT_CLOCK_DIVIDER,
        pio.irq0,
        cs,
        wifi.pin_24,
        wifi.pin_29,
        wifi.dma_ch0,
    );

    static STATE: StaticCell<cyw43::State> = StaticCell::new();
    let state = STATE.init(cyw43::State::new());
    let (net_device, mut control, runner) = cyw43::new(state, pwr, spi, fw).await;
    spawner.spawn(wifi_task(runner)?);

    control.init(clm).await;
    control
        .set_power_management(cyw43::PowerManagementMode::PowerSave)
        .await;

    let gateway = identity.gateway();
    let mask_bits = u32::from(identity.netmask()).leading_ones();
    let prefix_len = u8::try_from(mask_bits).unwrap_or(24);
    let config = Config::ipv4_static(StaticConfigV4 {
        address: Ipv4Cidr::new(gateway, prefix_len),
        gateway: Some(gateway),
        dns_servers: Default::default(),
    });

    static RESOURCES: StaticCell<StackResources<SOCKET_COUNT>> = StaticCell::new();
    let (stack, runner) = embassy_net::new(
        net_device,
        config,
        RESOURCES.init(StackResources::new()),
        0x0bad_cafe_dead_beef,
    );
    spawner.spawn(net_task(runner)?);
    info!("Network stack up at {}", defmt::Display2Format(&gateway));

    Ok((stack, AccessPoint { control }))
}

impl ApRadio for AccessPoint {
    async fn enable_ap(&mut self, credentials: &ApCredentials) -> Result<()> {
        info!("Starting AP mode: {}", credentials.ssid());
        self.control
            .start_ap_wpa2(credentials.ssid(), credentials.passphrase(), AP_CHANNEL)
            .await;
        self.control.gpio_set(ONBOARD_LED, true).await;
        Ok(())
    }

    async fn disable_ap(&mut self) {
        self.control.close_ap().await;
        self.control.gpio_set(ONBOARD_LED, false).await;
        info!("AP mode stopped");
    }

    async fn deinit(&mut self) {
        self.control
            .set_power_management(cyw43::PowerManagementMode::SuperSave)
            .await;
        info!("WiFi radio parked");
    }
}

#[embassy_executor::task]
async fn wifi_task(
    runner: cyw43::Runner<'static, Output<'static>, PioSpi<'static, PIO0, 0, DMA_CH0>>,
) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn net_task(mut runner: embassy_net::Runner<'static, cyw43::NetDriver<'static>>) -> ! {
    runner.run().await
}
