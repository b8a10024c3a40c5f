//! Host-level tests for the catch-all DNS server.

use std::net::{Ipv4Addr, SocketAddrV4};

use alarm_portal::ap_config::GW_IP;
use alarm_portal::dns_server::{DnsServer, REPLY_MAX_LEN, build_response, question_end};
use alarm_portal::udp_shim::{Datagram, DatagramHandler};

fn encode_name(name: &str) -> Vec<u8> {
    let mut encoded = Vec::new();
    for label in name.split('.').filter(|label| !label.is_empty()) {
        encoded.push(u8::try_from(label.len()).unwrap());
        encoded.extend_from_slice(label.as_bytes());
    }
    encoded.push(0);
    encoded
}

fn query(id: u16, flags: u16, name: &str, qtype: u16) -> Vec<u8> {
    let mut query = Vec::new();
    query.extend_from_slice(&id.to_be_bytes());
    query.extend_from_slice(&flags.to_be_bytes());
    query.extend_from_slice(&[0, 1, 0, 0, 0, 0, 0, 0]);
    query.extend_from_slice(&encode_name(name));
    query.extend_from_slice(&qtype.to_be_bytes());
    query.extend_from_slice(&[0, 1]);
    query
}

fn answer(query: &[u8]) -> Option<Vec<u8>> {
    let mut reply = [0u8; REPLY_MAX_LEN];
    let len = build_response(query, GW_IP, &mut reply)?;
    Some(reply[..len].to_vec())
}

#[test]
fn catch_all_answer_matches_wire_format() {
    let query = query(0x1234, 0x0100, "www.example.com.", 1);
    let response = answer(&query).expect("response");

    let mut expected = vec![0x12, 0x34, 0x85, 0x80, 0, 1, 0, 1, 0, 0, 0, 0];
    expected.extend_from_slice(&query[12..]);
    expected.extend_from_slice(&[
        0xC0, 0x0C, 0, 1, 0, 1, 0, 0, 0, 60, 0, 4, 0xC0, 0xA8, 0x04, 0x01,
    ]);
    assert_eq!(response, expected);
}

#[test]
fn any_name_and_type_gets_the_gateway() {
    let long_label = "a".repeat(63);
    let names = [
        "connectivitycheck.gstatic.com",
        "captive.apple.com",
        "x",
        long_label.as_str(),
    ];
    for (index, name) in names.iter().enumerate() {
        for qtype in [1, 28, 255] {
            let id = u16::try_from(index).unwrap();
            let query = query(id, 0x0100, name, qtype);
            let response = answer(&query).expect("response");
            let question_len = query.len() - 12;
            assert_eq!(response[..2], id.to_be_bytes());
            assert_eq!(
                response[12..12 + question_len],
                query[12..],
                "question echoed for {name}",
            );
            assert_eq!(response[response.len() - 4..], [192, 168, 4, 1]);
        }
    }
}

#[test]
fn recursion_desired_is_echoed() {
    let response = answer(&query(1, 0x0000, "example.com", 1)).expect("response");
    assert_eq!(response[2..4], [0x84, 0x80]);
}

#[test]
fn trailing_records_are_discarded() {
    let mut query = query(9, 0x0100, "example.com", 1);
    query[11] = 1; // arcount
    let plain_len = query.len();
    query.extend_from_slice(&[0, 0, 41, 0x10, 0, 0, 0, 0, 0, 0, 0]);

    let response = answer(&query).expect("response");
    assert_eq!(response[10..12], [0, 0], "arcount zeroed");
    assert_eq!(response.len(), plain_len + 16);
}

#[test]
fn non_queries_and_broken_questions_are_dropped() {
    assert!(
        answer(&[0x12, 0x34, 0x01, 0x00, 0, 1]).is_none(),
        "short header",
    );
    assert!(
        answer(&query(1, 0x8180, "example.com", 1)).is_none(),
        "response",
    );
    assert!(
        answer(&query(1, 0x2800, "example.com", 1)).is_none(),
        "update opcode",
    );

    let mut no_question = query(1, 0x0100, "example.com", 1);
    no_question[5] = 0;
    assert!(answer(&no_question).is_none(), "qdcount 0");

    let complete = query(1, 0x0100, "example.com", 1);
    assert!(
        answer(&complete[..complete.len() - 1]).is_none(),
        "qclass cut",
    );
    assert!(answer(&complete[..16]).is_none(), "name cut");

    let mut long_label = query(1, 0x0100, "example.com", 1);
    long_label[12] = 64;
    assert!(answer(&long_label).is_none(), "label over 63");

    let mut pointer = query(1, 0x0100, "example.com", 1);
    pointer[12] = 0xC0;
    assert!(
        answer(&pointer).is_none(),
        "compression pointer in question",
    );
}

#[test]
fn name_longer_than_255_is_dropped() {
    let label = "b".repeat(63);
    let long_name = [label.as_str(); 5].join(".");
    let query = query(1, 0x0100, &long_name, 1);
    assert_eq!(question_end(&query), None);

    let fits = [label.as_str(); 3].join(".");
    let query = self::query(1, 0x0100, &fits, 1);
    assert_eq!(question_end(&query), Some(query.len()));
}

#[test]
fn reply_goes_back_to_the_sender() {
    let mut server = DnsServer::new(GW_IP);
    let query = query(0xBEEF, 0x0100, "neverssl.com", 1);
    let source = SocketAddrV4::new(Ipv4Addr::new(192, 168, 4, 17), 53_211);
    let datagram = Datagram {
        payload: &query,
        source,
        ingress: Some(GW_IP),
    };
    let mut reply = [0u8; REPLY_MAX_LEN];
    let outgoing = server.on_datagram(0, &datagram, &mut reply).expect("reply");
    assert_eq!(outgoing.destination, source);
    assert_eq!(outgoing.len, query.len() + 16);
    assert_eq!(reply[..2], [0xBE, 0xEF]);
}
