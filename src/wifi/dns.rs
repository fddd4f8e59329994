/*
 *  wifi/dns.rs
 *
 *  PinFrame - ink at a glance
 *  (c) 2024-26 PinFrame project
 *
 *  Captive-portal DNS catch-all - answers every A query with the portal IP
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::net::Ipv4Addr;

use log::{debug, info, warn};
use tokio::net::UdpSocket;

/// Answer TTL in seconds.
const ANSWER_TTL: u32 = 60;

/// Minimum length of a DNS query: 12-byte header, 1-byte root name, 4
/// bytes of qtype/qclass.
const MIN_QUERY_LEN: usize = 17;

/// Build the fixed A-record response for a query, preserving its
/// transaction id and question section. Returns None for packets that are
/// not plain queries with at least one question.
pub fn build_response(query: &[u8], ip: Ipv4Addr) -> Option<Vec<u8>> {
    if query.len() < MIN_QUERY_LEN {
        return None;
    }

    let flags = u16::from_be_bytes([query[2], query[3]]);
    // QR bit set means this is already a response
    if flags & 0x8000 != 0 {
        return None;
    }

    let qdcount = u16::from_be_bytes([query[4], query[5]]);
    if qdcount == 0 {
        return None;
    }

    // Walk the first question's name labels to find the section end
    let mut pos = 12;
    loop {
        let len = *query.get(pos)? as usize;
        if len == 0 {
            pos += 1;
            break;
        }
        // Compressed names cannot appear in a question we echo back
        if len & 0xC0 != 0 {
            return None;
        }
        pos += 1 + len;
    }
    // qtype + qclass
    let question_end = pos + 4;
    if query.len() < question_end {
        return None;
    }

    let mut response = Vec::with_capacity(question_end + 16);

    // Header: copy the transaction id, set QR|AA, answer count 1
    response.extend_from_slice(&query[0..2]);
    response.extend_from_slice(&0x8400u16.to_be_bytes()); // QR=1 AA=1
    response.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    response.extend_from_slice(&1u16.to_be_bytes()); // ANCOUNT
    response.extend_from_slice(&0u16.to_be_bytes()); // NSCOUNT
    response.extend_from_slice(&0u16.to_be_bytes()); // ARCOUNT

    // Question section, verbatim
    response.extend_from_slice(&query[12..question_end]);

    // Answer: pointer to the question name, A IN TTL=60, 4-byte address
    response.extend_from_slice(&[0xC0, 0x0C]);
    response.extend_from_slice(&1u16.to_be_bytes()); // TYPE A
    response.extend_from_slice(&1u16.to_be_bytes()); // CLASS IN
    response.extend_from_slice(&ANSWER_TTL.to_be_bytes());
    response.extend_from_slice(&4u16.to_be_bytes()); // RDLENGTH
    response.extend_from_slice(&ip.octets());

    Some(response)
}

/// Serve the catch-all on UDP/53 (or any bound port) until the task is
/// aborted. Every queried name resolves to `redirect_ip`.
pub async fn serve(socket: UdpSocket, redirect_ip: Ipv4Addr) {
    info!(
        "Captive-portal DNS catch-all on {} -> {}",
        socket.local_addr().map(|a| a.to_string()).unwrap_or_default(),
        redirect_ip
    );

    let mut buf = [0u8; 512];
    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                warn!("DNS recv failed: {}", e);
                continue;
            }
        };

        match build_response(&buf[..len], redirect_ip) {
            Some(response) => {
                if let Err(e) = socket.send_to(&response, peer).await {
                    warn!("DNS send to {} failed: {}", peer, e);
                }
            }
            None => debug!("Ignoring malformed DNS packet from {}", peer),
        }
    }
}

/// Portal hook that runs the DNS catch-all while the portal is active.
///
/// Binding UDP/53 needs elevated privileges on hosts; failures are logged
/// and the portal keeps working for clients with manual addressing.
pub struct DnsPortal {
    port: u16,
    redirect_ip: Ipv4Addr,
    task: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl DnsPortal {
    pub fn new(port: u16, redirect_ip: Ipv4Addr) -> Self {
        Self {
            port,
            redirect_ip,
            task: std::sync::Mutex::new(None),
        }
    }
}

impl crate::wifi::fsm::PortalControl for DnsPortal {
    fn start(&self) {
        let mut task = self.task.lock().unwrap();
        if task.is_some() {
            return;
        }
        let port = self.port;
        let redirect_ip = self.redirect_ip;
        *task = Some(tokio::spawn(async move {
            match UdpSocket::bind(("0.0.0.0", port)).await {
                Ok(socket) => serve(socket, redirect_ip).await,
                Err(e) => warn!("Could not bind DNS catch-all on port {}: {}", port, e),
            }
        }));
    }

    fn stop(&self) {
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
            info!("Captive-portal DNS catch-all stopped");
        }
    }
}
