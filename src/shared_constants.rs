use embassy_time::Duration;

pub const DHCP_SERVER_PORT: u16 = 67;
pub const DHCP_CLIENT_PORT: u16 = 68;
pub const DNS_SERVER_PORT: u16 = 53;
pub const HTTP_PORT: u16 = 80;

/// Fixed DHCP lease duration.
pub const LEASE_SECONDS: u32 = 86_400;

/// Red LED and buzzer toggle period while the alarm is active.
pub const BLINK_MS: u64 = 500;

pub const POLL_SECONDS: u64 = 5;

/// An HTTP connection with no traffic for this long is closed.
pub const HTTP_IDLE_TIMEOUT: Duration = Duration::from_secs(2 * POLL_SECONDS);

/// Upper bound on how long the supervisor sleeps between pump iterations.
pub const PUMP_INTERVAL: Duration = Duration::from_millis(10);

/// Number of HTTP connections that may be open at once.
pub const HTTP_BACKLOG: usize = 4;

/// How long a server task gets to bind its port before start-up is abandoned.
pub const SERVICE_START_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a unicast datagram may wait for address resolution before it is purged.
pub const UNICAST_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);
