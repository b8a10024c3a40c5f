//! Soft-AP network identity and credentials.
//!
//! The access point owns `GW_IP` (gateway, DHCP server, DNS server and HTTP server at once)
//! and hands out a pool of [`POOL_SIZE`] consecutive addresses starting at last octet
//! [`BASE_OCTET`].

use core::net::Ipv4Addr;

use crate::{Error, Result};

pub const GW_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);
pub const NETMASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);
pub const BASE_OCTET: u8 = 16;
pub const POOL_SIZE: usize = 8;

/// Wi-Fi channel the soft-AP is started on.
pub const AP_CHANNEL: u8 = 1;

/// SSID baked in at build time (`AP_SSID`, default `PICO_ALARME_AP`).
pub const AP_SSID: &str = env!("AP_SSID");

/// WPA2 passphrase baked in at build time (`AP_PASS`, default `picoalarme123`).
pub const AP_PASS: &str = env!("AP_PASS");

const SSID_LEN: core::ops::RangeInclusive<usize> = 1..=32;
const PASSPHRASE_LEN: core::ops::RangeInclusive<usize> = 8..=63;

/// Addressing of the soft-AP network.
///
/// Slot `i` of the DHCP lease table always maps to the gateway address with its last octet
/// replaced by `base_octet + i`; [`pool_address`](Self::pool_address) and
/// [`pool_slot`](Self::pool_slot) are the two directions of that mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApIdentity {
    gateway: Ipv4Addr,
    netmask: Ipv4Addr,
    base_octet: u8,
}

impl ApIdentity {
    /// 192.168.4.1/24 with a pool of 192.168.4.16 - 192.168.4.23.
    pub const DEFAULT: Self = Self::new(GW_IP, NETMASK, BASE_OCTET);

    /// # Panics
    ///
    /// Panics (at compile time when used in a `const`) if the pool would run past last
    /// octet 254.
    #[must_use]
    pub const fn new(gateway: Ipv4Addr, netmask: Ipv4Addr, base_octet: u8) -> Self {
        let pool_end = match (base_octet as usize).checked_add(POOL_SIZE) {
            Some(end) => end,
            None => usize::MAX,
        };
        assert!(
            pool_end <= 255,
            "address pool must end below the broadcast octet"
        );
        Self {
            gateway,
            netmask,
            base_octet,
        }
    }

    #[must_use]
    pub const fn gateway(&self) -> Ipv4Addr {
        self.gateway
    }

    #[must_use]
    pub const fn netmask(&self) -> Ipv4Addr {
        self.netmask
    }

    #[must_use]
    pub const fn base_octet(&self) -> u8 {
        self.base_octet
    }

    /// Address leased through table slot `slot`, or `None` outside the pool.
    #[must_use]
    pub fn pool_address(&self, slot: usize) -> Option<Ipv4Addr> {
        if slot >= POOL_SIZE {
            return None;
        }
        let offset = u8::try_from(slot).ok()?;
        let [a, b, c, _] = self.gateway.octets();
        Some(Ipv4Addr::new(a, b, c, self.base_octet.checked_add(offset)?))
    }

    /// Table slot that leases `ip`, or `None` if `ip` is not a pool address.
    #[must_use]
    pub fn pool_slot(&self, ip: Ipv4Addr) -> Option<usize> {
        let [a, b, c, d] = ip.octets();
        let [ga, gb, gc, _] = self.gateway.octets();
        if (a, b, c) != (ga, gb, gc) {
            return None;
        }
        let slot = usize::from(d.checked_sub(self.base_octet)?);
        (slot < POOL_SIZE).then_some(slot)
    }
}

impl Default for ApIdentity {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Validated WPA2 soft-AP credentials.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApCredentials {
    ssid: &'static str,
    passphrase: &'static str,
}

impl ApCredentials {
    /// # Errors
    ///
    /// Returns [`Error::InvalidSsid`] unless the SSID is 1-32 bytes and
    /// [`Error::InvalidPassphrase`] unless the passphrase is 8-63 bytes.
    pub fn new(ssid: &'static str, passphrase: &'static str) -> Result<Self> {
        if !SSID_LEN.contains(&ssid.len()) {
            return Err(Error::InvalidSsid { len: ssid.len() });
        }
        if !PASSPHRASE_LEN.contains(&passphrase.len()) {
            return Err(Error::InvalidPassphrase {
                len: passphrase.len(),
            });
        }
        Ok(Self { ssid, passphrase })
    }

    /// Credentials baked in by the build script.
    ///
    /// # Errors
    ///
    /// See [`ApCredentials::new`].
    pub fn from_build_env() -> Result<Self> {
        Self::new(AP_SSID, AP_PASS)
    }

    #[must_use]
    pub const fn ssid(&self) -> &'static str {
        self.ssid
    }

    #[must_use]
    pub const fn passphrase(&self) -> &'static str {
        self.passphrase
    }
}
