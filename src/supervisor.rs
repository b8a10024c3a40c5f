//! Program lifecycle: bring the portal up, keep it pumped, tear it down on a console key.
//!
//! [`Supervisor`] is generic over its collaborators so the whole lifecycle can be exercised
//! on the host with fakes. The firmware plugs in the cyw43 radio, the embassy server tasks,
//! the GPIO outputs, the OLED and the UART console.

#![allow(clippy::future_not_send, reason = "single-threaded")]

use crate::Result;
use crate::alarm::{AlarmOutputs, AlarmPolicy, AlarmSwitch, StatusDisplay, shutdown_outputs};
use crate::ap_config::ApCredentials;

/// The soft-AP radio.
#[allow(async_fn_in_trait, reason = "single-threaded embedded")]
pub trait ApRadio {
    /// Starts broadcasting the WPA2 network described by `credentials`.
    ///
    /// # Errors
    ///
    /// Returns an error if the radio refused to start the access point.
    async fn enable_ap(&mut self, credentials: &ApCredentials) -> Result<()>;

    async fn disable_ap(&mut self);

    /// Releases the radio driver. Called last.
    async fn deinit(&mut self);
}

/// The DHCP, DNS and HTTP servers plus the network stack they run on.
#[allow(async_fn_in_trait, reason = "single-threaded embedded")]
pub trait NetworkServices {
    /// # Errors
    ///
    /// Returns an error if the DHCP server could not bind UDP/67.
    async fn start_dhcp(&mut self) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the DNS server could not bind UDP/53.
    async fn start_dns(&mut self) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the HTTP server could not listen on TCP/80.
    async fn start_http(&mut self) -> Result<()>;

    async fn stop_http(&mut self);
    async fn stop_dns(&mut self);
    async fn stop_dhcp(&mut self);

    /// Gives the stack one turn. Never waits longer than
    /// [`PUMP_INTERVAL`](crate::shared_constants::PUMP_INTERVAL).
    async fn pump(&mut self);
}

/// Non-blocking source of console keystrokes.
pub trait Console {
    fn poll_key(&mut self) -> Option<u8>;
}

/// Monotonic milliseconds since boot.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Keys that end the program.
#[must_use]
pub const fn is_shutdown_key(key: u8) -> bool {
    matches!(key, b'd' | b'D' | b'q' | b'Q')
}

/// How [`Supervisor::run`] ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ExitCode {
    /// Shut down from the console after a full teardown.
    Clean,
    /// Something failed during bring-up; whatever had started was stopped again.
    InitFailed,
}

impl ExitCode {
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Clean => 0,
            Self::InitFailed => 1,
        }
    }
}

/// Servers that are up, in start order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Started {
    Dhcp,
    Dns,
    Http,
}

/// Owns every collaborator for the life of the program.
pub struct Supervisor<'a, R, N, O, D, C, K> {
    radio: R,
    services: N,
    outputs: O,
    display: D,
    console: C,
    clock: K,
    credentials: ApCredentials,
    alarm: &'a AlarmSwitch,
    policy: AlarmPolicy,
    ap_running: bool,
    shutdown: bool,
}

impl<'a, R, N, O, D, C, K> Supervisor<'a, R, N, O, D, C, K>
where
    R: ApRadio,
    N: NetworkServices,
    O: AlarmOutputs,
    D: StatusDisplay,
    C: Console,
    K: Clock,
{
    #[expect(
        clippy::too_many_arguments,
        reason = "one argument per collaborator"
    )]
    pub const fn new(
        radio: R,
        services: N,
        outputs: O,
        display: D,
        console: C,
        clock: K,
        credentials: ApCredentials,
        alarm: &'a AlarmSwitch,
    ) -> Self {
        Self {
            radio,
            services,
            outputs,
            display,
            console,
            clock,
            credentials,
            alarm,
            policy: AlarmPolicy::new(),
            ap_running: false,
            shutdown: false,
        }
    }

    /// Brings everything up, pumps until a shutdown key arrives, then tears down.
    ///
    /// On a bring-up failure nothing is pumped: the servers already started are stopped in
    /// reverse order and [`ExitCode::InitFailed`] is returned.
    pub async fn run(&mut self) -> ExitCode {
        if let Err(_err) = self.init().await {
            #[cfg(feature = "defmt")]
            defmt::error!("Bring-up failed: {}", defmt::Display2Format(&_err));
            return ExitCode::InitFailed;
        }

        #[cfg(feature = "defmt")]
        defmt::info!(
            "Access point '{}' ready. Press 'd' or 'q' to shut down",
            self.credentials.ssid()
        );
        while !self.shutdown {
            self.step().await;
        }

        self.teardown().await;
        ExitCode::Clean
    }

    /// One steady-state iteration: pump the stack, follow the alarm, read the console.
    pub async fn step(&mut self) {
        self.services.pump().await;

        if let Err(_err) = self.policy.pump(
            self.clock.now_ms(),
            self.alarm.is_active(),
            &mut self.outputs,
            &mut self.display,
        ) {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "Status screen not updated: {}",
                defmt::Display2Format(&_err)
            );
        }

        if self.console.poll_key().is_some_and(is_shutdown_key) {
            #[cfg(feature = "defmt")]
            defmt::info!("Shutdown requested from the console");
            self.shutdown = true;
        }
    }

    async fn init(&mut self) -> Result<()> {
        self.policy.apply_idle(&mut self.outputs, false);

        self.services.start_dhcp().await?;
        if let Err(err) = self.services.start_dns().await {
            self.unwind(Started::Dhcp).await;
            return Err(err);
        }
        if let Err(err) = self.services.start_http().await {
            self.unwind(Started::Dns).await;
            return Err(err);
        }
        if let Err(err) = self.radio.enable_ap(&self.credentials).await {
            self.unwind(Started::Http).await;
            return Err(err);
        }

        self.ap_running = true;
        self.outputs.set_blue(true);
        if let Err(_err) = self.display.show_status(self.alarm.is_active()) {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "Initial status screen failed: {}",
                defmt::Display2Format(&_err)
            );
        }
        Ok(())
    }

    /// Stops every server up to and including `last`, newest first.
    async fn unwind(&mut self, last: Started) {
        if last >= Started::Http {
            self.services.stop_http().await;
        }
        if last >= Started::Dns {
            self.services.stop_dns().await;
        }
        self.services.stop_dhcp().await;
        self.outputs.set_blue(false);
    }

    async fn teardown(&mut self) {
        #[cfg(feature = "defmt")]
        defmt::info!("Shutting down");
        self.services.stop_http().await;
        self.services.stop_dns().await;
        self.services.stop_dhcp().await;

        self.radio.disable_ap().await;
        self.ap_running = false;
        self.outputs.set_blue(false);
        shutdown_outputs(&mut self.outputs);
        if let Err(_err) = self.display.show_ap_disabled() {
            #[cfg(feature = "defmt")]
            defmt::warn!("Farewell screen failed: {}", defmt::Display2Format(&_err));
        }

        self.policy = AlarmPolicy::new();
        self.radio.deinit().await;
    }

    #[must_use]
    pub const fn ap_running(&self) -> bool {
        self.ap_running
    }

    #[must_use]
    pub const fn policy(&self) -> &AlarmPolicy {
        &self.policy
    }

    #[must_use]
    pub const fn services(&self) -> &N {
        &self.services
    }

    #[must_use]
    pub const fn outputs(&self) -> &O {
        &self.outputs
    }

    #[must_use]
    pub const fn display(&self) -> &D {
        &self.display
    }
}

#[cfg(not(feature = "host"))]
pub use embassy::{EmbassyClock, ServerLinks};

#[cfg(all(feature = "wifi", not(feature = "host")))]
pub use embassy::EmbassyServices;

#[cfg(not(feature = "host"))]
mod embassy {
    use embassy_time::Instant;

    use super::Clock;
    use crate::service::ServiceLink;

    /// [`Clock`] backed by the embassy time driver.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct EmbassyClock;

    impl Clock for EmbassyClock {
        fn now_ms(&self) -> u64 {
            Instant::now().as_millis()
        }
    }

    /// One [`ServiceLink`] per server task.
    pub struct ServerLinks {
        pub dhcp: ServiceLink,
        pub dns: ServiceLink,
        pub http: ServiceLink,
    }

    impl ServerLinks {
        #[must_use]
        pub const fn new() -> Self {
            Self {
                dhcp: ServiceLink::new(),
                dns: ServiceLink::new(),
                http: ServiceLink::new(),
            }
        }
    }

    impl Default for ServerLinks {
        fn default() -> Self {
            Self::new()
        }
    }

    #[cfg(feature = "wifi")]
    pub use services::EmbassyServices;

    #[cfg(feature = "wifi")]
    mod services {
        use embassy_executor::Spawner;
        use embassy_net::Stack;
        use embassy_time::{Timer, with_timeout};

        use super::ServerLinks;
        use crate::ap_config::ApIdentity;
        use crate::dhcp_server::dhcp_server_task;
        use crate::dns_server::dns_server_task;
        use crate::http_server::{HttpServer, http_server_task};
        use crate::service::ServiceLink;
        use crate::shared_constants::{PUMP_INTERVAL, SERVICE_START_TIMEOUT};
        use crate::supervisor::NetworkServices;
        use crate::{Error, Result};

        /// [`NetworkServices`] as embassy tasks on a shared [`Stack`].
        ///
        /// The stack itself runs in its own task, so [`pump`](NetworkServices::pump) only
        /// yields for one [`PUMP_INTERVAL`].
        pub struct EmbassyServices {
            spawner: Spawner,
            stack: Stack<'static>,
            identity: ApIdentity,
            http: &'static HttpServer<'static>,
            links: &'static ServerLinks,
        }

        impl EmbassyServices {
            #[must_use]
            pub const fn new(
                spawner: Spawner,
                stack: Stack<'static>,
                identity: ApIdentity,
                http: &'static HttpServer<'static>,
                links: &'static ServerLinks,
            ) -> Self {
                Self {
                    spawner,
                    stack,
                    identity,
                    http,
                    links,
                }
            }
        }

        /// A task that neither binds nor fails within [`SERVICE_START_TIMEOUT`] counts as failed.
        async fn started(link: &ServiceLink) -> Result<()> {
            with_timeout(SERVICE_START_TIMEOUT, link.wait_started())
                .await
                .map_err(|_| Error::ServiceStart)?
        }

        async fn stop(link: &ServiceLink) {
            link.request_stop();
            link.wait_stopped().await;
        }

        impl NetworkServices for EmbassyServices {
            async fn start_dhcp(&mut self) -> Result<()> {
                let token = dhcp_server_task(self.stack, self.identity, &self.links.dhcp)?;
                self.spawner.spawn(token);
                started(&self.links.dhcp).await
            }

            async fn start_dns(&mut self) -> Result<()> {
                let token = dns_server_task(self.stack, self.identity.gateway(), &self.links.dns)?;
                self.spawner.spawn(token);
                started(&self.links.dns).await
            }

            async fn start_http(&mut self) -> Result<()> {
                let token = http_server_task(self.stack, self.http, &self.links.http)?;
                self.spawner.spawn(token);
                started(&self.links.http).await
            }

            async fn stop_http(&mut self) {
                stop(&self.links.http).await;
            }

            async fn stop_dns(&mut self) {
                stop(&self.links.dns).await;
            }

            async fn stop_dhcp(&mut self) {
                stop(&self.links.dhcp).await;
            }

            async fn pump(&mut self) {
                Timer::after(PUMP_INTERVAL).await;
            }
        }
    }
}
