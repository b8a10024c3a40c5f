//! DHCP server for the soft-AP.
//!
//! Answers DISCOVER with OFFER and REQUEST with ACK from a fixed [`LeaseTable`] of
//! [`POOL_SIZE`] slots. Slot `i` always leases the pool address `BASE_OCTET + i`, so the
//! table index is the client's IP. Everything else (DECLINE, RELEASE, INFORM, malformed
//! messages, an exhausted pool) is dropped and left to client retransmission; no NAK is sent.

#![allow(clippy::future_not_send, reason = "single-threaded")]

use core::fmt;
use core::net::{Ipv4Addr, SocketAddrV4};

use crate::ap_config::{ApIdentity, POOL_SIZE};
use crate::shared_constants::{DHCP_CLIENT_PORT, LEASE_SECONDS};
use crate::udp_shim::{Datagram, DatagramHandler, Outgoing};

const BOOTREQUEST: u8 = 1;
const BOOTREPLY: u8 = 2;

const FLAGS_OFFSET: usize = 10;
const CIADDR_OFFSET: usize = 12;
const YIADDR_OFFSET: usize = 16;
const SIADDR_OFFSET: usize = 20;
const CHADDR_OFFSET: usize = 28;

/// `op` through `file`; the magic cookie and the options follow.
pub const FIXED_PART_LEN: usize = 236;
const OPTIONS_OFFSET: usize = FIXED_PART_LEN + MAGIC_COOKIE.len();
pub const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];

/// Fixed part plus a full 312-byte options area.
pub const MESSAGE_MAX_LEN: usize = FIXED_PART_LEN + 312;

/// Largest reply this server writes: fixed part, cookie, six options and END.
pub const REPLY_MAX_LEN: usize = OPTIONS_OFFSET + 3 + 5 * 6 + 1;

const BROADCAST_FLAG: u16 = 0x8000;

const OPT_PAD: u8 = 0;
const OPT_SUBNET_MASK: u8 = 1;
const OPT_ROUTER: u8 = 3;
const OPT_DNS: u8 = 6;
const OPT_LEASE_TIME: u8 = 51;
const OPT_MESSAGE_TYPE: u8 = 53;
const OPT_SERVER_ID: u8 = 54;
const OPT_END: u8 = 255;

/// DHCP message types (option 53).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl MessageType {
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::Discover,
            2 => Self::Offer,
            3 => Self::Request,
            4 => Self::Decline,
            5 => Self::Ack,
            6 => Self::Nak,
            7 => Self::Release,
            8 => Self::Inform,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// Ethernet hardware address. All zeros marks a free lease slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const UNSET: Self = Self([0; 6]);

    #[must_use]
    pub fn is_unset(&self) -> bool {
        *self == Self::UNSET
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [b0, b1, b2, b3, b4, b5] = self.0;
        write!(
            formatter,
            "{b0:02x}:{b1:02x}:{b2:02x}:{b3:02x}:{b4:02x}:{b5:02x}"
        )
    }
}

/// Upper 16 bits of a millisecond clock, about 65.5 s per tick.
#[must_use]
#[expect(
    clippy::cast_possible_truncation,
    reason = "keeping the low 16 bits of the shifted clock is the encoding"
)]
pub const fn coarse_timestamp(ms: u64) -> u16 {
    (ms >> 16) as u16
}

const LEASE_MS: u64 = LEASE_SECONDS as u64 * 1000;

/// Coarse expiry of a lease committed at `now_ms`.
#[must_use]
pub const fn lease_expiry(now_ms: u64) -> u16 {
    coarse_timestamp(now_ms.wrapping_add(LEASE_MS))
}

/// Whether a coarse `expiry` lies in the past.
///
/// The expiry is widened to the last millisecond of its tick and compared with a signed 32-bit
/// difference against the low half of the clock, which stays correct across wrap of the
/// 32-bit millisecond counter.
#[must_use]
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    reason = "signed wrapping difference"
)]
pub const fn lease_expired(expiry: u16, now_ms: u64) -> bool {
    let deadline = ((expiry as u32) << 16) | 0xFFFF;
    (deadline.wrapping_sub(now_ms as u32) as i32) < 0
}

/// One slot of the lease table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Lease {
    mac: MacAddress,
    expiry: u16,
}

impl Lease {
    pub const FREE: Self = Self {
        mac: MacAddress::UNSET,
        expiry: 0,
    };

    #[must_use]
    pub const fn mac(&self) -> MacAddress {
        self.mac
    }

    /// Coarse expiry timestamp; zero means the lease was never issued.
    #[must_use]
    pub const fn expiry(&self) -> u16 {
        self.expiry
    }

    /// A slot can be handed to a new client once it is empty or its lease has run out.
    #[must_use]
    pub fn is_free_for_reuse(&self, now_ms: u64) -> bool {
        self.mac.is_unset() || lease_expired(self.expiry, now_ms)
    }

    const fn is_issued(self) -> bool {
        self.expiry != 0
    }
}

/// Fixed array of leases indexed by pool slot. No MAC ever occupies two slots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaseTable {
    slots: [Lease; POOL_SIZE],
}

impl LeaseTable {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [Lease::FREE; POOL_SIZE],
        }
    }

    #[must_use]
    pub fn lease(&self, slot: usize) -> Option<&Lease> {
        self.slots.get(slot)
    }

    #[must_use]
    pub fn slot_of(&self, mac: MacAddress) -> Option<usize> {
        self.slots.iter().position(|lease| lease.mac == mac)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Lease> {
        self.slots.iter()
    }

    /// One pass: the client's own slot wins, otherwise the first reusable slot is bound to it.
    /// Issued leases found expired along the way are cleared.
    fn select_for_discover(&mut self, mac: MacAddress, now_ms: u64) -> Option<usize> {
        let mut free = None;
        for (index, lease) in self.slots.iter_mut().enumerate() {
            if lease.mac == mac {
                return Some(index);
            }
            if lease.is_issued() && lease_expired(lease.expiry, now_ms) {
                *lease = Lease::FREE;
            }
            if free.is_none() && lease.is_free_for_reuse(now_ms) {
                free = Some(index);
            }
        }
        let index = free?;
        self.bind(index, mac)
    }

    fn select_for_request(&mut self, mac: MacAddress, now_ms: u64) -> Option<usize> {
        if let Some(index) = self.slot_of(mac) {
            return Some(index);
        }
        let index = self
            .slots
            .iter()
            .position(|lease| lease.is_free_for_reuse(now_ms))?;
        self.bind(index, mac)
    }

    fn bind(&mut self, index: usize, mac: MacAddress) -> Option<usize> {
        *self.slots.get_mut(index)? = Lease { mac, expiry: 0 };
        Some(index)
    }

    fn commit(&mut self, index: usize, now_ms: u64) -> Option<()> {
        self.slots.get_mut(index)?.expiry = lease_expiry(now_ms);
        Some(())
    }
}

impl Default for LeaseTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Lease-table owner and reply builder.
pub struct DhcpServer {
    identity: ApIdentity,
    leases: LeaseTable,
}

impl DhcpServer {
    #[must_use]
    pub const fn new(identity: ApIdentity) -> Self {
        Self {
            identity,
            leases: LeaseTable::new(),
        }
    }

    #[must_use]
    pub const fn leases(&self) -> &LeaseTable {
        &self.leases
    }

    /// Processes one inbound message and writes the reply, if any, into `reply`.
    ///
    /// Returns `None` whenever the message is to be dropped.
    pub fn handle(&mut self, now_ms: u64, request: &[u8], reply: &mut [u8]) -> Option<Outgoing> {
        let fixed = request.get(..OPTIONS_OFFSET)?;
        if fixed.get(FIXED_PART_LEN..)? != MAGIC_COOKIE || fixed.first() != Some(&BOOTREQUEST) {
            return None;
        }
        let message_type = message_type(request)?;
        let mac = client_mac(fixed)?;
        if mac.is_unset() {
            return None;
        }

        let (reply_type, slot) = match message_type {
            MessageType::Discover => (
                MessageType::Offer,
                self.leases.select_for_discover(mac, now_ms)?,
            ),
            MessageType::Request => {
                let slot = self.leases.select_for_request(mac, now_ms)?;
                self.leases.commit(slot, now_ms)?;
                (MessageType::Ack, slot)
            }
            _other => {
                #[cfg(feature = "defmt")]
                defmt::debug!(
                    "DHCP {} from {} ignored",
                    _other,
                    defmt::Display2Format(&mac)
                );
                return None;
            }
        };

        let yiaddr = self.identity.pool_address(slot)?;
        debug_assert_eq!(self.identity.pool_slot(yiaddr), Some(slot));
        let len = self.write_reply(fixed, reply, reply_type, yiaddr)?;

        let unicast = reply_type == MessageType::Ack
            && read_u16(fixed, FLAGS_OFFSET)? & BROADCAST_FLAG == 0
            && read_ipv4(fixed, CIADDR_OFFSET)?.is_unspecified();
        let broadcast = SocketAddrV4::new(Ipv4Addr::BROADCAST, DHCP_CLIENT_PORT);
        let (destination, fallback) = if unicast {
            (SocketAddrV4::new(yiaddr, DHCP_CLIENT_PORT), Some(broadcast))
        } else {
            (broadcast, None)
        };

        #[cfg(feature = "defmt")]
        defmt::info!(
            "DHCP {} {} -> {} ({})",
            reply_type,
            defmt::Display2Format(&mac),
            defmt::Display2Format(&yiaddr),
            if unicast { "unicast" } else { "broadcast" }
        );

        Some(Outgoing {
            len,
            destination,
            egress: None,
            fallback,
        })
    }

    fn write_reply(
        &self,
        fixed: &[u8],
        reply: &mut [u8],
        reply_type: MessageType,
        yiaddr: Ipv4Addr,
    ) -> Option<usize> {
        reply.get_mut(..OPTIONS_OFFSET)?.copy_from_slice(fixed);
        *reply.first_mut()? = BOOTREPLY;
        write_ipv4(reply, YIADDR_OFFSET, yiaddr)?;
        write_ipv4(reply, SIADDR_OFFSET, self.identity.gateway())?;

        let message_type = [reply_type.code()];
        let server = self.identity.gateway().octets();
        let netmask = self.identity.netmask().octets();
        let lease_time = LEASE_SECONDS.to_be_bytes();
        let options: [(u8, &[u8]); 6] = [
            (OPT_MESSAGE_TYPE, &message_type),
            (OPT_SERVER_ID, &server),
            (OPT_SUBNET_MASK, &netmask),
            (OPT_ROUTER, &server),
            (OPT_DNS, &server),
            (OPT_LEASE_TIME, &lease_time),
        ];

        let mut len = OPTIONS_OFFSET;
        for (code, payload) in options {
            let written = append_option(reply.get_mut(len..)?, code, payload)?;
        len = len.checked_add(written)?;
        }
        *reply.get_mut(len)? = OPT_END;
        len.checked_add(1)
    }
}

impl DatagramHandler for DhcpServer {
    fn on_datagram(
        &mut self,
        now_ms: u64,
        datagram: &Datagram<'_>,
        reply: &mut [u8],
    ) -> Option<Outgoing> {
        self.handle(now_ms, datagram.payload, reply)
    }
}

/// Walks the options area for a one-byte option 53 with a known value.
fn message_type(message: &[u8]) -> Option<MessageType> {
    let mut options = message.get(OPTIONS_OFFSET..)?;
    loop {
        match options {
            [] | [OPT_END, ..] | [_] => return None,
            [OPT_PAD, rest @ ..] => options = rest,
            [code, len, rest @ ..] => {
                let (value, tail) = rest.split_at_checked(usize::from(*len))?;
                if *code == OPT_MESSAGE_TYPE {
                    return match value {
                        [kind] => MessageType::from_code(*kind),
                        _ => None,
                    };
                }
                options = tail;
            }
        }
    }
}

/// First six bytes of `chaddr`; `hlen` is not consulted.
fn client_mac(fixed: &[u8]) -> Option<MacAddress> {
    let bytes = fixed.get(CHADDR_OFFSET..CHADDR_OFFSET + 6)?;
    Some(MacAddress(bytes.try_into().ok()?))
}

fn read_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    let field = bytes.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_be_bytes(field.try_into().ok()?))
}

fn read_ipv4(bytes: &[u8], offset: usize) -> Option<Ipv4Addr> {
    let field: [u8; 4] = bytes.get(offset..offset.checked_add(4)?)?.try_into().ok()?;
    Some(Ipv4Addr::from(field))
}

fn write_ipv4(bytes: &mut [u8], offset: usize, ip: Ipv4Addr) -> Option<()> {
    bytes
        .get_mut(offset..offset.checked_add(4)?)?
        .copy_from_slice(&ip.octets());
    Some(())
}

fn append_option(dest: &mut [u8], code: u8, payload: &[u8]) -> Option<usize> {
    let len = u8::try_from(payload.len()).ok()?;
    let needed = payload.len().checked_add(2)?;
    let (header, body) = dest.get_mut(..needed)?.split_at_mut(2);
    header.copy_from_slice(&[code, len]);
    body.copy_from_slice(payload);
    Some(needed)
}

#[cfg(all(feature = "wifi", not(feature = "host")))]
pub use task::dhcp_server_task;

#[cfg(all(feature = "wifi", not(feature = "host")))]
mod task {
    use defmt::{Display2Format, error, info};
    use embassy_futures::select::select;
    use embassy_net::Stack;
    use embassy_time::Instant;

    use super::{DhcpServer, MESSAGE_MAX_LEN, REPLY_MAX_LEN};
    use crate::ap_config::ApIdentity;
    use crate::service::ServiceLink;
    use crate::shared_constants::DHCP_SERVER_PORT;
    use crate::udp_shim::{UdpBuffers, UdpEndpoint, serve};

    /// Serves DHCP on UDP/67 until `link` asks it to stop.
    #[embassy_executor::task]
    pub async fn dhcp_server_task(
        stack: Stack<'static>,
        identity: ApIdentity,
        link: &'static ServiceLink,
    ) {
        let mut buffers = UdpBuffers::new();
        let mut endpoint = UdpEndpoint::open(stack, &mut buffers);
        if let Err(err) = endpoint.bind(DHCP_SERVER_PORT) {
            error!("DHCP server failed to bind: {}", Display2Format(&err));
            link.report_started(Err(err));
            return;
        }
        link.report_started(Ok(()));
        info!(
            "DHCP server listening on {}",
            Display2Format(&identity.gateway())
        );

        let mut server = DhcpServer::new(identity);
        let mut frame = [0u8; MESSAGE_MAX_LEN];
        let mut reply = [0u8; REPLY_MAX_LEN];
        select(
            serve(&mut endpoint, &mut server, &mut frame, &mut reply, || {
                Instant::now().as_millis()
            }),
            link.stop_requested(),
        )
        .await;

        endpoint.close();
        info!("DHCP server stopped");
        link.report_stopped();
    }
}
