//! Host-level tests for the datagram pump.

use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddrV4};

use alarm_portal::ap_config::{ApIdentity, GW_IP};
use alarm_portal::dhcp_server::{self, DhcpServer, MAGIC_COOKIE};
use alarm_portal::dns_server::{self, DnsServer};
use alarm_portal::udp_shim::{DatagramEndpoint, Received, serve};
use alarm_portal::{Error, Result};
use embassy_futures::block_on;

struct Sent {
    bytes: Vec<u8>,
    destination: SocketAddrV4,
}

/// Replays scripted receive results, then reports the endpoint closed.
#[derive(Default)]
struct ScriptedEndpoint {
    inbound: VecDeque<Result<(Vec<u8>, SocketAddrV4)>>,
    sent: Vec<Sent>,
    attempts: Vec<SocketAddrV4>,
    fail_sends: bool,
    unreachable: Vec<Ipv4Addr>,
}

impl ScriptedEndpoint {
    fn push(&mut self, payload: Vec<u8>, source: SocketAddrV4) {
        self.inbound.push_back(Ok((payload, source)));
    }
}

impl DatagramEndpoint for ScriptedEndpoint {
    async fn recv(&mut self, buf: &mut [u8]) -> Result<Received> {
        let (payload, source) = self
            .inbound
            .pop_front()
            .unwrap_or(Err(Error::EndpointClosed))?;
        let len = payload.len().min(buf.len());
        buf[..len].copy_from_slice(&payload[..len]);
        Ok(Received {
            len,
            source,
            ingress: Some(GW_IP),
        })
    }

    async fn send(
        &mut self,
        bytes: &[u8],
        destination: SocketAddrV4,
        _egress: Option<Ipv4Addr>,
    ) -> Result<usize> {
        self.attempts.push(destination);
        if self.unreachable.contains(destination.ip()) {
            return Err(Error::Undeliverable);
        }
        if self.fail_sends {
            return Err(Error::SendFailed);
        }
        self.sent.push(Sent {
            bytes: bytes.to_vec(),
            destination,
        });
        Ok(bytes.len())
    }
}

fn dns_query(id: u16) -> Vec<u8> {
    let mut query = id.to_be_bytes().to_vec();
    query.extend_from_slice(&[0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0]);
    query.extend_from_slice(&[4, b't', b'e', b's', b't', 0, 0, 1, 0, 1]);
    query
}

fn client(last: u8, port: u16) -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::new(192, 168, 4, last), port)
}

fn dhcp_broadcast() -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::BROADCAST, 68)
}

fn dhcp_message(kind: u8, mac_tail: u8) -> Vec<u8> {
    let mut message = vec![0u8; 236];
    message[0] = 1;
    message[28..34].copy_from_slice(&[0x02, 0, 0, 0, 0, mac_tail]);
    message.extend_from_slice(&MAGIC_COOKIE);
    message.extend_from_slice(&[53, 1, kind, 255]);
    message
}

#[test]
fn every_query_is_answered_in_order() {
    let mut endpoint = ScriptedEndpoint::default();
    endpoint.push(dns_query(1), client(16, 5000));
    endpoint.push(dns_query(2), client(17, 5001));
    let mut server = DnsServer::new(GW_IP);
    let mut rx = [0u8; 512];
    let mut tx = [0u8; dns_server::REPLY_MAX_LEN];

    block_on(serve(&mut endpoint, &mut server, &mut rx, &mut tx, || 0));

    assert_eq!(endpoint.sent.len(), 2);
    assert_eq!(endpoint.sent[0].destination, client(16, 5000));
    assert_eq!(endpoint.sent[0].bytes[..2], [0, 1]);
    assert_eq!(endpoint.sent[1].destination, client(17, 5001));
    assert_eq!(endpoint.sent[1].bytes[..2], [0, 2]);
}

#[test]
fn dropped_datagrams_do_not_stop_the_loop() {
    let mut endpoint = ScriptedEndpoint::default();
    endpoint.push(vec![0xFF; 5], client(16, 5000));
    endpoint.inbound.push_back(Err(Error::ReceiveFailed));
    endpoint.push(dns_query(3), client(18, 5002));
    let mut server = DnsServer::new(GW_IP);
    let mut rx = [0u8; 512];
    let mut tx = [0u8; dns_server::REPLY_MAX_LEN];

    block_on(serve(&mut endpoint, &mut server, &mut rx, &mut tx, || 0));

    assert_eq!(endpoint.sent.len(), 1);
    assert_eq!(endpoint.sent[0].destination, client(18, 5002));
}

#[test]
fn send_failures_are_swallowed() {
    let mut endpoint = ScriptedEndpoint {
        fail_sends: true,
        ..ScriptedEndpoint::default()
    };
    endpoint.push(dns_query(4), client(16, 5000));
    endpoint.push(dns_query(5), client(16, 5000));
    let mut server = DnsServer::new(GW_IP);
    let mut rx = [0u8; 512];
    let mut tx = [0u8; dns_server::REPLY_MAX_LEN];

    block_on(serve(&mut endpoint, &mut server, &mut rx, &mut tx, || 0));

    assert!(endpoint.inbound.is_empty());
    assert!(endpoint.sent.is_empty());
}

#[test]
fn handler_sees_the_clock_and_picks_the_destination() {
    let from_client = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 68);
    let mut endpoint = ScriptedEndpoint::default();
    endpoint.push(dhcp_message(1, 0x09), from_client);
    let mut server = DhcpServer::new(ApIdentity::DEFAULT);
    let mut rx = [0u8; dhcp_server::MESSAGE_MAX_LEN];
    let mut tx = [0u8; dhcp_server::REPLY_MAX_LEN];
    let mut ticks = 0;

    block_on(serve(&mut endpoint, &mut server, &mut rx, &mut tx, || {
        ticks += 1;
        5_000
    }));

    assert_eq!(ticks, 1);
    assert_eq!(endpoint.sent.len(), 1);
    assert_eq!(endpoint.sent[0].destination, dhcp_broadcast());
    assert_eq!(
        server.leases().lease(0).map(|lease| lease.expiry()),
        Some(0),
    );
}

#[test]
fn unreachable_ack_is_broadcast_and_later_replies_still_go_out() {
    let from_client = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 68);
    let mut endpoint = ScriptedEndpoint::default();
    endpoint.push(dhcp_message(1, 0x0A), from_client);
    endpoint.push(dhcp_message(3, 0x0A), from_client);
    endpoint.push(dhcp_message(1, 0x0B), from_client);
    let mut server = DhcpServer::new(ApIdentity::DEFAULT);
    let leased = ApIdentity::DEFAULT.pool_address(0).unwrap();
    endpoint.unreachable.push(leased);
    let mut rx = [0u8; dhcp_server::MESSAGE_MAX_LEN];
    let mut tx = [0u8; dhcp_server::REPLY_MAX_LEN];

    block_on(serve(&mut endpoint, &mut server, &mut rx, &mut tx, || 1_000));

    let unicast_ack = SocketAddrV4::new(leased, 68);
    let expected = [
        dhcp_broadcast(),
        unicast_ack,
        dhcp_broadcast(),
        dhcp_broadcast(),
    ];
    assert_eq!(endpoint.attempts, expected);
    assert_eq!(endpoint.sent.len(), 3);
    let ack = &endpoint.sent[1].bytes;
    assert_eq!(
        ack[16..20],
        leased.octets(),
        "ACK resent with the same lease",
    );
    assert_eq!(ack[242], 5, "message type ACK");
    let offer = &endpoint.sent[2];
    assert_eq!(offer.destination, dhcp_broadcast());
    assert_eq!(offer.bytes[28..34], [0x02, 0, 0, 0, 0, 0x0B]);
    assert_eq!(offer.bytes[242], 2, "message type OFFER");
}

#[test]
fn unreachable_reply_without_fallback_is_dropped() {
    let mut endpoint = ScriptedEndpoint::default();
    endpoint.unreachable.push(Ipv4Addr::new(192, 168, 4, 16));
    endpoint.push(dns_query(6), client(16, 5000));
    endpoint.push(dns_query(7), client(17, 5001));
    let mut server = DnsServer::new(GW_IP);
    let mut rx = [0u8; 512];
    let mut tx = [0u8; dns_server::REPLY_MAX_LEN];

    block_on(serve(&mut endpoint, &mut server, &mut rx, &mut tx, || 0));

    assert_eq!(endpoint.attempts, [client(16, 5000), client(17, 5001)]);
    assert_eq!(endpoint.sent.len(), 1);
    assert_eq!(endpoint.sent[0].bytes[..2], [0, 7]);
}
