//! Catch-all DNS server for the captive portal.
//!
//! Every standard query gets the same answer: one A record pointing at the gateway, so phones
//! and laptops probing for connectivity land on the alarm page.

#![allow(clippy::future_not_send, reason = "single-threaded")]

use core::net::Ipv4Addr;

use crate::udp_shim::{Datagram, DatagramHandler, Outgoing};

pub const HEADER_LEN: usize = 12;
const MAX_LABEL_LEN: usize = 63;
/// Length octets and terminator included.
const MAX_NAME_LEN: usize = 255;
const QTYPE_QCLASS_LEN: usize = 4;
const ANSWER_LEN: usize = 16;

/// Largest reply: header, longest question, one answer.
pub const REPLY_MAX_LEN: usize = HEADER_LEN + MAX_NAME_LEN + QTYPE_QCLASS_LEN + ANSWER_LEN;

const FLAG_QR: u16 = 0x8000;
const FLAG_OPCODE: u16 = 0x7800;
const FLAG_AA: u16 = 0x0400;
const FLAG_RD: u16 = 0x0100;
const FLAG_RA: u16 = 0x0080;

const TTL_SECONDS: u32 = 60;

/// End offset of the first question (name, qtype and qclass), or `None` if it is truncated or
/// its name breaks the label or name length limits.
#[must_use]
pub fn question_end(query: &[u8]) -> Option<usize> {
    let mut offset = HEADER_LEN;
    loop {
        let label_len = usize::from(*query.get(offset)?);
        if label_len == 0 {
            offset = offset.checked_add(1)?;
            break;
        }
        // Also rejects compression pointers, which have no place in a question.
        if label_len > MAX_LABEL_LEN {
            return None;
        }
        offset = offset.checked_add(label_len)?.checked_add(1)?;
        if offset.checked_sub(HEADER_LEN)? > MAX_NAME_LEN {
            return None;
        }
    }
    if offset.checked_sub(HEADER_LEN)? > MAX_NAME_LEN {
        return None;
    }
    let end = offset.checked_add(QTYPE_QCLASS_LEN)?;
    (end <= query.len()).then_some(end)
}

/// Writes the answer to `query` into `reply` and returns its length.
///
/// The id and the question are copied verbatim. Flags become QR, AA and RA, with the
/// client's RD bit echoed back. Anything after the first question is discarded. Returns
/// `None` for anything that is not a standard query with at least one well-formed question.
#[must_use]
pub fn build_response(query: &[u8], answer: Ipv4Addr, reply: &mut [u8]) -> Option<usize> {
    if query.len() < HEADER_LEN {
        return None;
    }
    let &[id_hi, id_lo, flags_hi, flags_lo, qd_hi, qd_lo, ..] = query else {
        return None;
    };
    let flags = u16::from_be_bytes([flags_hi, flags_lo]);
    if flags & (FLAG_QR | FLAG_OPCODE) != 0 || u16::from_be_bytes([qd_hi, qd_lo]) < 1 {
        return None;
    }
    let question_end = question_end(query)?;

    let out = reply.get_mut(..question_end.checked_add(ANSWER_LEN)?)?;
    let (question, answer_bytes) = out.split_at_mut(question_end);
    question.copy_from_slice(query.get(..question_end)?);

    let [reply_flags_hi, reply_flags_lo] =
        (FLAG_QR | FLAG_AA | FLAG_RA | (flags & FLAG_RD)).to_be_bytes();
    question.get_mut(..HEADER_LEN)?.copy_from_slice(&[
        id_hi,
        id_lo,
        reply_flags_hi,
        reply_flags_lo,
        0,
        1, // qdcount
        0,
        1, // ancount
        0,
        0,
        0,
        0,
    ]);

    let [ttl0, ttl1, ttl2, ttl3] = TTL_SECONDS.to_be_bytes();
    let [a, b, c, d] = answer.octets();
    answer_bytes.copy_from_slice(&[
        0xC0, 0x0C, // pointer to the question name
        0x00, 0x01, // A
        0x00, 0x01, // IN
        ttl0, ttl1, ttl2, ttl3, //
        0x00, 0x04, // RDLENGTH
        a, b, c, d,
    ]);

    Some(out.len())
}

/// Answers every query on its endpoint with `answer`.
pub struct DnsServer {
    answer: Ipv4Addr,
}

impl DnsServer {
    #[must_use]
    pub const fn new(answer: Ipv4Addr) -> Self {
        Self { answer }
    }
}

impl DatagramHandler for DnsServer {
    fn on_datagram(
        &mut self,
        _now_ms: u64,
        datagram: &Datagram<'_>,
        reply: &mut [u8],
    ) -> Option<Outgoing> {
        let len = build_response(datagram.payload, self.answer, reply)?;
        #[cfg(feature = "defmt")]
        defmt::debug!(
            "DNS query from {} answered",
            defmt::Display2Format(&datagram.source)
        );
        Some(Outgoing {
            len,
            destination: datagram.source,
            egress: None,
            fallback: None,
        })
    }
}

#[cfg(all(feature = "wifi", not(feature = "host")))]
pub use task::dns_server_task;

#[cfg(all(feature = "wifi", not(feature = "host")))]
mod task {
    use core::net::Ipv4Addr;

    use defmt::{Display2Format, error, info};
    use embassy_futures::select::select;
    use embassy_net::Stack;
    use embassy_time::Instant;

    use super::{DnsServer, REPLY_MAX_LEN};
    use crate::service::ServiceLink;
    use crate::shared_constants::DNS_SERVER_PORT;
    use crate::udp_shim::{UdpBuffers, UdpEndpoint, serve};

    /// Serves DNS on UDP/53, answering everything with `answer`, until `link` asks it to stop.
    #[embassy_executor::task]
    pub async fn dns_server_task(
        stack: Stack<'static>,
        answer: Ipv4Addr,
        link: &'static ServiceLink,
    ) {
        let mut buffers = UdpBuffers::new();
        let mut endpoint = UdpEndpoint::open(stack, &mut buffers);
        if let Err(err) = endpoint.bind(DNS_SERVER_PORT) {
            error!("DNS server failed to bind: {}", Display2Format(&err));
            link.report_started(Err(err));
            return;
        }
        link.report_started(Ok(()));
        info!(
            "DNS server started - responding with {}",
            Display2Format(&answer)
        );

        let mut server = DnsServer::new(answer);
        let mut frame = [0u8; 512];
        let mut reply = [0u8; REPLY_MAX_LEN];
        select(
            serve(&mut endpoint, &mut server, &mut frame, &mut reply, || {
                Instant::now().as_millis()
            }),
            link.stop_requested(),
        )
        .await;

        endpoint.close();
        info!("DNS server stopped");
        link.report_stopped();
    }
}
