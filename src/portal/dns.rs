//! Captive-portal DNS responder.
//!
//! Answers every A-record query with the access point's own address so
//! any browser probe lands on the provisioning UI. Serviced once per
//! portal tick from a non-blocking UDP socket; it must never block the
//! loop.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use log::{debug, info, warn};

/// TTL of every answer, in seconds. Short, so clients re-resolve quickly
/// once the device leaves configuration mode.
pub const DNS_TTL_SECS: u32 = 30;

const DNS_PORT: u16 = 53;

/// Upper bound on datagrams answered per tick, to bound tick duration
/// under a query flood.
const MAX_ANSWERS_PER_TICK: usize = 8;

const QTYPE_A: u16 = 1;

// ───────────────────────────────────────────────────────────────
// Wire-level parsing / building (pure, host-testable)
// ───────────────────────────────────────────────────────────────

pub struct DnsQuestion {
    /// Length of the question section (name + type + class).
    pub len: usize,
    pub qtype: u16,
    pub name: heapless::String<253>,
}

/// Parse the first question out of a DNS query datagram.
pub fn parse_question(packet: &[u8]) -> Option<DnsQuestion> {
    if packet.len() < 12 {
        return None;
    }

    let mut idx = 12;
    let mut name = heapless::String::<253>::new();

    loop {
        let label_len = *packet.get(idx)? as usize;
        idx += 1;
        if label_len == 0 {
            break;
        }
        if idx + label_len > packet.len() {
            return None;
        }
        let label = core::str::from_utf8(&packet[idx..idx + label_len]).ok()?;
        if !name.is_empty() {
            name.push('.').ok()?;
        }
        name.push_str(label).ok()?;
        idx += label_len;
    }

    if idx + 4 > packet.len() {
        return None;
    }

    let qtype = u16::from_be_bytes([packet[idx], packet[idx + 1]]);
    idx += 4;

    Some(DnsQuestion {
        len: idx - 12,
        qtype,
        name,
    })
}

/// Build an A-record answer pointing at `answer_ip`, echoing the query's
/// id and question section. Returns the response length.
pub fn build_response(
    query: &[u8],
    response: &mut [u8],
    answer_ip: Ipv4Addr,
    question: &DnsQuestion,
) -> Option<usize> {
    if query.len() < 12 || response.len() < 12 {
        return None;
    }

    let question_end = 12 + question.len;
    if response.len() < question_end + 16 || query.len() < question_end {
        return None;
    }

    response[..question_end].fill(0);
    response[0..2].copy_from_slice(&query[0..2]);
    response[2] = 0x81; // standard response + recursion available
    response[3] = 0x80;
    response[4..6].copy_from_slice(&query[4..6]); // QDCOUNT
    response[6..8].copy_from_slice(&1u16.to_be_bytes()); // ANCOUNT

    // NSCOUNT and ARCOUNT remain zero

    response[12..question_end].copy_from_slice(&query[12..question_end]);

    let mut offset = question_end;
    response[offset] = 0xC0;
    response[offset + 1] = 0x0C; // pointer to question name
    response[offset + 2..offset + 4].copy_from_slice(&QTYPE_A.to_be_bytes());
    response[offset + 4..offset + 6].copy_from_slice(&1u16.to_be_bytes()); // class IN
    response[offset + 6..offset + 10].copy_from_slice(&DNS_TTL_SECS.to_be_bytes());
    response[offset + 10..offset + 12].copy_from_slice(&4u16.to_be_bytes());
    response[offset + 12..offset + 16].copy_from_slice(&answer_ip.octets());
    offset += 16;

    Some(offset)
}

// ───────────────────────────────────────────────────────────────
// Responder
// ───────────────────────────────────────────────────────────────

/// Non-blocking DNS responder bound to port 53.
pub struct DnsResponder {
    socket: UdpSocket,
    answer_ip: Ipv4Addr,
}

impl DnsResponder {
    /// Bind the responder. All names resolve to `answer_ip`.
    pub fn bind(answer_ip: Ipv4Addr) -> io::Result<Self> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DNS_PORT))?;
        socket.set_nonblocking(true)?;
        info!("DNS responder up, answering * -> {answer_ip}");
        Ok(Self { socket, answer_ip })
    }

    /// Drain and answer queued queries, bounded per tick. Never blocks.
    pub fn process_pending(&mut self) {
        let mut query = [0u8; 512];
        let mut response = [0u8; 512];

        for _ in 0..MAX_ANSWERS_PER_TICK {
            let (len, peer) = match self.socket.recv_from(&mut query) {
                Ok(received) => received,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    warn!("DNS recv error: {e}");
                    return;
                }
            };

            let Some(question) = parse_question(&query[..len]) else {
                debug!("ignoring malformed DNS query from {peer}");
                continue;
            };
            if question.qtype != QTYPE_A {
                continue;
            }
            let Some(resp_len) =
                build_response(&query[..len], &mut response, self.answer_ip, &question)
            else {
                continue;
            };

            debug!("DNS {} -> {}", question.name, self.answer_ip);
            if let Err(e) = self.socket.send_to(&response[..resp_len], peer) {
                warn!("DNS send error: {e}");
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-built query for `captive.example`, qtype A.
    fn query_for(name: &str) -> Vec<u8> {
        let mut q = vec![
            0x12, 0x34, // id
            0x01, 0x00, // standard query, recursion desired
            0x00, 0x01, // QDCOUNT
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        for label in name.split('.') {
            q.push(label.len() as u8);
            q.extend_from_slice(label.as_bytes());
        }
        q.push(0);
        q.extend_from_slice(&QTYPE_A.to_be_bytes());
        q.extend_from_slice(&1u16.to_be_bytes());
        q
    }

    #[test]
    fn parses_question_name() {
        let q = query_for("captive.example");
        let question = parse_question(&q).unwrap();
        assert_eq!(question.name.as_str(), "captive.example");
        assert_eq!(question.qtype, QTYPE_A);
    }

    #[test]
    fn rejects_truncated_packet() {
        let q = query_for("host.lan");
        assert!(parse_question(&q[..8]).is_none());
        assert!(parse_question(&q[..q.len() - 3]).is_none());
    }

    #[test]
    fn response_carries_answer_ip_and_ttl() {
        let q = query_for("connectivitycheck.gstatic.com");
        let question = parse_question(&q).unwrap();
        let mut response = [0u8; 512];
        let ip = Ipv4Addr::new(192, 168, 4, 1);

        let len = build_response(&q, &mut response, ip, &question).unwrap();
        let response = &response[..len];

        // Echoed id, answer count of one.
        assert_eq!(&response[0..2], &q[0..2]);
        assert_eq!(u16::from_be_bytes([response[6], response[7]]), 1);

        // Answer record trailer: TTL then RDLENGTH=4 then the address.
        let answer = &response[len - 16..];
        let ttl = u32::from_be_bytes([answer[6], answer[7], answer[8], answer[9]]);
        assert_eq!(ttl, DNS_TTL_SECS);
        assert_eq!(&answer[12..16], &ip.octets());
    }

    #[test]
    fn every_name_gets_the_same_answer() {
        let ip = Ipv4Addr::new(192, 168, 4, 1);
        for name in ["evil.example", "www.msftconnecttest.com", "a.b.c.d.e"] {
            let q = query_for(name);
            let question = parse_question(&q).unwrap();
            let mut response = [0u8; 512];
            let len = build_response(&q, &mut response, ip, &question).unwrap();
            assert_eq!(&response[len - 4..len], &ip.octets());
        }
    }
}
