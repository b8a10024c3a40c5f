//! Datagram plumbing shared by the DHCP and DNS servers.
//!
//! A server is a [`DatagramHandler`]: it sees one [`Datagram`] at a time and may fill a reply
//! buffer. [`serve`] moves datagrams between a [`DatagramEndpoint`] and a handler. On hardware
//! the endpoint is a [`UdpEndpoint`] over the embassy-net stack; tests substitute their own.

#![allow(clippy::future_not_send, reason = "single-threaded")]

use core::net::{Ipv4Addr, SocketAddrV4};

use crate::{Error, Result};

/// One inbound datagram, borrowed from the endpoint's receive buffer.
#[derive(Clone, Copy, Debug)]
pub struct Datagram<'a> {
    pub payload: &'a [u8],
    pub source: SocketAddrV4,
    /// Local address the datagram was delivered to, when the stack reports it.
    pub ingress: Option<Ipv4Addr>,
}

/// A reply the handler wrote into the reply buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Outgoing {
    pub len: usize,
    pub destination: SocketAddrV4,
    /// Local address to send from; `None` lets the stack choose.
    pub egress: Option<Ipv4Addr>,
    /// Where to send the reply instead if `destination` turns out to be unreachable.
    pub fallback: Option<SocketAddrV4>,
}

/// Metadata for a datagram that [`DatagramEndpoint::recv`] placed in the caller's buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Received {
    pub len: usize,
    pub source: SocketAddrV4,
    pub ingress: Option<Ipv4Addr>,
}

/// Receiver bound to one endpoint.
///
/// Called once per datagram and runs to completion. The payload borrow ends when the call
/// returns, so nothing inbound can be retained.
pub trait DatagramHandler {
    fn on_datagram(
        &mut self,
        now_ms: u64,
        datagram: &Datagram<'_>,
        reply: &mut [u8],
    ) -> Option<Outgoing>;
}

/// A bound UDP endpoint.
#[allow(async_fn_in_trait, reason = "single-threaded executor")]
pub trait DatagramEndpoint {
    /// Waits for the next datagram and copies it into `buf`.
    ///
    /// # Errors
    ///
    /// [`Error::EndpointClosed`] once the endpoint can deliver nothing more; any other error
    /// affects only the datagram being received.
    async fn recv(&mut self, buf: &mut [u8]) -> Result<Received>;

    /// Copies `bytes` into one datagram for `destination`.
    ///
    /// # Errors
    ///
    /// [`Error::SendFailed`] if the stack refused the datagram. [`Error::Undeliverable`] if a
    /// unicast datagram never left because its destination did not resolve; the endpoint has
    /// discarded it and accepts further sends.
    async fn send(
        &mut self,
        bytes: &[u8],
        destination: SocketAddrV4,
        egress: Option<Ipv4Addr>,
    ) -> Result<usize>;
}

/// Dispatches every datagram arriving on `endpoint` to `handler` and sends its replies.
///
/// Runs until the endpoint reports [`Error::EndpointClosed`]. A datagram that fails to arrive
/// or a reply that fails to send is dropped; the client is expected to retransmit. An
/// undeliverable reply goes once more to its [`Outgoing::fallback`], if it has one.
pub async fn serve<E, H>(
    endpoint: &mut E,
    handler: &mut H,
    rx: &mut [u8],
    tx: &mut [u8],
    mut now_ms: impl FnMut() -> u64,
) where
    E: DatagramEndpoint,
    H: DatagramHandler,
{
    loop {
        let received = match endpoint.recv(rx).await {
            Ok(received) => received,
            Err(Error::EndpointClosed) => return,
            Err(_err) => {
                #[cfg(feature = "defmt")]
                defmt::debug!(
                    "datagram dropped on receive: {}",
                    defmt::Display2Format(&_err)
                );
                continue;
            }
        };
        let Some(payload) = rx.get(..received.len) else {
            continue;
        };
        let datagram = Datagram {
            payload,
            source: received.source,
            ingress: received.ingress,
        };
        let Some(outgoing) = handler.on_datagram(now_ms(), &datagram, tx) else {
            continue;
        };
        let Some(reply) = tx.get(..outgoing.len) else {
            continue;
        };
        let first = endpoint
            .send(reply, outgoing.destination, outgoing.egress)
            .await;
        let sent = match (first, outgoing.fallback) {
            (Err(Error::Undeliverable), Some(fallback)) => {
                #[cfg(feature = "defmt")]
                defmt::debug!(
                    "{} unreachable, resending to {}",
                    defmt::Display2Format(&outgoing.destination),
                    defmt::Display2Format(&fallback)
                );
                endpoint.send(reply, fallback, outgoing.egress).await
            }
            (first, _) => first,
        };
        if let Err(_err) = sent {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "reply to {} dropped: {}",
                defmt::Display2Format(&outgoing.destination),
                defmt::Display2Format(&_err)
            );
        }
    }
}

#[cfg(all(feature = "wifi", not(feature = "host")))]
pub use embassy::{UdpBuffers, UdpEndpoint};

#[cfg(all(feature = "wifi", not(feature = "host")))]
mod embassy {
    use core::net::{Ipv4Addr, SocketAddrV4};

    use embassy_net::udp::{PacketMetadata, UdpMetadata, UdpSocket};
    use embassy_net::{IpAddress, IpEndpoint, Stack};
    use embassy_time::with_timeout;

    use super::{DatagramEndpoint, Received};
    use crate::shared_constants::UNICAST_DRAIN_TIMEOUT;
    use crate::{Error, Result};

    const PACKETS: usize = 4;
    const BUFFER_LEN: usize = 1024;

    /// Socket storage for one [`UdpEndpoint`].
    pub struct UdpBuffers {
        rx_meta: [PacketMetadata; PACKETS],
        rx: [u8; BUFFER_LEN],
        tx_meta: [PacketMetadata; PACKETS],
        tx: [u8; BUFFER_LEN],
    }

    impl UdpBuffers {
        #[must_use]
        pub const fn new() -> Self {
            Self {
                rx_meta: [PacketMetadata::EMPTY; PACKETS],
                rx: [0; BUFFER_LEN],
                tx_meta: [PacketMetadata::EMPTY; PACKETS],
                tx: [0; BUFFER_LEN],
            }
        }
    }

    impl Default for UdpBuffers {
        fn default() -> Self {
            Self::new()
        }
    }

    /// An embassy-net UDP socket seen as a [`DatagramEndpoint`].
    pub struct UdpEndpoint<'d> {
        socket: UdpSocket<'d>,
        port: Option<u16>,
    }

    impl<'d> UdpEndpoint<'d> {
        #[must_use]
        pub fn open(stack: Stack<'d>, buffers: &'d mut UdpBuffers) -> Self {
            let UdpBuffers {
                rx_meta,
                rx,
                tx_meta,
                tx,
            } = buffers;
            Self {
                socket: UdpSocket::new(stack, rx_meta, rx, tx_meta, tx),
                port: None,
            }
        }

        /// # Errors
        ///
        /// [`Error::BindFailed`] if the port is taken or invalid.
        pub fn bind(&mut self, port: u16) -> Result<()> {
            self.socket
                .bind(port)
                .map_err(|_| Error::BindFailed { port })?;
            self.port = Some(port);
            Ok(())
        }

        /// Drops everything queued on the socket by closing it and binding the same port again.
        fn purge(&mut self) -> Result<()> {
            self.socket.close();
            match self.port {
                Some(port) => self.bind(port),
                None => Ok(()),
            }
        }

        pub fn close(mut self) {
            self.socket.close();
        }
    }

    #[allow(
        irrefutable_let_patterns,
        unreachable_patterns,
        reason = "IpAddress has a single variant when IPv6 is disabled"
    )]
    fn ipv4(address: IpAddress) -> Option<Ipv4Addr> {
        match address {
            IpAddress::Ipv4(v4) => Some(v4),
            _ => None,
        }
    }

    impl DatagramEndpoint for UdpEndpoint<'_> {
        async fn recv(&mut self, buf: &mut [u8]) -> Result<Received> {
            let (len, meta) = self
                .socket
                .recv_from(buf)
                .await
                .map_err(|_| Error::ReceiveFailed)?;
            let source = ipv4(meta.endpoint.addr).ok_or(Error::ReceiveFailed)?;
            Ok(Received {
                len,
                source: SocketAddrV4::new(source, meta.endpoint.port),
                ingress: meta.local_address.and_then(ipv4),
            })
        }

        async fn send(
            &mut self,
            bytes: &[u8],
            destination: SocketAddrV4,
            egress: Option<Ipv4Addr>,
        ) -> Result<usize> {
            let endpoint = IpEndpoint::new(IpAddress::Ipv4(*destination.ip()), destination.port());
            let mut meta = UdpMetadata::from(endpoint);
            meta.local_address = egress.map(IpAddress::Ipv4);
            self.socket
                .send_to(bytes, meta)
                .await
                .map_err(|_| Error::SendFailed)?;
            if destination.ip().is_broadcast() {
                return Ok(bytes.len());
            }
            // A unicast datagram whose neighbor never resolves stays at the head of the
            // transmit queue and holds back every datagram queued after it.
            if with_timeout(UNICAST_DRAIN_TIMEOUT, self.socket.flush())
                .await
                .is_err()
            {
                self.purge()?;
                return Err(Error::Undeliverable);
            }
            Ok(bytes.len())
        }
    }
}
