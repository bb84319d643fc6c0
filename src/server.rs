//! Directory server state machine: dispatches inbound messages, updates the
//! index, replies via RDT. EXIT produces no reply; every other method does.
//! Malformed or unknown-method messages get a `400 ERROR` reply whenever
//! there is a usable return address to send it to.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::codec::{self, ClientMethod, ServerMessage};
use crate::error::{CodecError, RdtError, ServerError};
use crate::index::DirectoryIndex;
use crate::rdt::{Rdt, WrappingCounter};

/// Clients always receive replies on this fixed UDP port.
pub const FIXED_CLIENT_UDP_PORT: u16 = 60001;

const ACTIVITY_TIMEOUT: Duration = Duration::from_secs(3600);

/// Directory server: owns the index and activity tracker, dispatches
/// messages delivered by `rdt`, and replies through the same transport.
pub struct DirectoryServer {
    rdt: Arc<Rdt>,
    index: DirectoryIndex,
    activity: Mutex<HashMap<(String, String), Instant>>,
    comm_id: WrappingCounter,
    reply_port: u16,
}

impl DirectoryServer {
    /// Truncates the directory (a fresh, empty index): there is no path that
    /// loads prior state. Replies go to the real client port,
    /// `FIXED_CLIENT_UDP_PORT`.
    pub fn new(rdt: Arc<Rdt>) -> Self {
        Self::with_reply_port(rdt, FIXED_CLIENT_UDP_PORT)
    }

    /// As `new`, but replies to `reply_port` instead of the real client port
    /// — only needed by tests that run several client/server loopback pairs
    /// in one process and can't all bind `FIXED_CLIENT_UDP_PORT`.
    pub fn with_reply_port(rdt: Arc<Rdt>, reply_port: u16) -> Self {
        Self {
            rdt,
            index: DirectoryIndex::new(),
            activity: Mutex::new(HashMap::new()),
            comm_id: WrappingCounter::random(),
            reply_port,
        }
    }

    pub fn connected_client_count(&self) -> usize {
        self.index.distinct_clients().len()
    }

    /// Runs one iteration of the dispatch loop: evicts idle clients, then
    /// waits up to the transport's configured receive timeout for one
    /// inbound message. An empty receive queue is not an error at this
    /// level; the caller just loops again.
    pub fn tick(&self) -> Result<(), ServerError> {
        self.evict_idle_clients();
        match self.rdt.receive() {
            Ok(bytes) => self.dispatch(&bytes),
            Err(RdtError::EmptyQueue) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Scans the activity tracker for hosts idle past `ACTIVITY_TIMEOUT` and
    /// evicts them. Guarded by `self.activity`'s lock for the whole scan, so
    /// concurrent packet workers never observe a half-evicted tracker.
    fn evict_idle_clients(&self) {
        let now = Instant::now();
        let mut activity = self.activity.lock().unwrap();
        let stale: Vec<(String, String)> = activity
            .iter()
            .filter(|(_, &last)| now.duration_since(last) > ACTIVITY_TIMEOUT)
            .map(|(key, _)| key.clone())
            .collect();
        for (host_id, host_ip) in stale {
            println!("Remove host from database: {host_id}");
            self.index.remove_host(&host_id);
            activity.remove(&(host_id, host_ip));
        }
    }

    fn dispatch(&self, bytes: &[u8]) -> Result<(), ServerError> {
        let text = String::from_utf8_lossy(bytes);
        let message = match codec::decode_client_message(&text) {
            Ok(m) => m,
            Err(e) => {
                eprintln!("***malformed message: {e}");
                return self.reply_to_malformed_message(&text, &e);
            }
        };

        let key = (message.host_id.clone(), message.host_ip.clone());
        self.activity.lock().unwrap().insert(key.clone(), Instant::now());

        let reply = match &message.method {
            ClientMethod::Ident => {
                println!(
                    "==>Server received IDENT message from {} @ {}.",
                    message.host_id, message.host_ip
                );
                Some(ServerMessage::IdentOk {
                    host_id: message.host_id.clone(),
                })
            }
            ClientMethod::Inform(entries) => {
                println!(
                    "==>Server received INFORM message from {} @ {}.",
                    message.host_id, message.host_ip
                );
                let n = self.index.add(&message.host_id, &message.host_ip, entries);
                println!("\t-->Added {n} entries to the database.");
                Some(ServerMessage::Ok {
                    method: "INFORM".to_string(),
                    count: n as u64,
                })
            }
            ClientMethod::Query { substring, host } => {
                println!(
                    "==>Server received QUERY message from {} @ {}.",
                    message.host_id, message.host_ip
                );
                let results = self
                    .index
                    .query(&message.host_id, substring, host.as_deref());
                println!("\t-->Server found {} query matches.", results.len());
                Some(ServerMessage::QueryResponse { results })
            }
            ClientMethod::Remove(entries) => {
                println!(
                    "==>Server received REMOVE message from {} @ {}.",
                    message.host_id, message.host_ip
                );
                let n = self.index.remove_files(&message.host_id, entries);
                println!("\t-->Removed {n} entries from the database.");
                Some(ServerMessage::Ok {
                    method: "REMOVE".to_string(),
                    count: n as u64,
                })
            }
            ClientMethod::Exit => {
                println!(
                    "==>Server received EXIT message from {} @ {}.",
                    message.host_id, message.host_ip
                );
                let n = self.index.remove_host(&message.host_id);
                self.activity.lock().unwrap().remove(&key);
                println!(
                    "\t-->Removed {} from the database ({n} entries).",
                    message.host_id
                );
                None
            }
        };

        if let Some(reply) = reply {
            self.send_reply(&message.host_id, &message.host_ip, reply)?;
        }
        Ok(())
    }

    fn send_reply(
        &self,
        client_id: &str,
        client_ip: &str,
        reply: ServerMessage,
    ) -> Result<(), ServerError> {
        let addr: SocketAddr = format!("{client_ip}:{}", self.reply_port)
            .parse()
            .map_err(|_| RdtError::MalformedPacket(format!("bad client ip {client_ip:?}")))?;
        println!("\t-->Sending {reply:?} message to {client_id}.");
        let comm_id = self.comm_id.next();
        self.rdt.send(comm_id, reply.encode().as_bytes(), addr)?;
        Ok(())
    }

    /// Replies `400 ERROR` to a message that failed to decode. A reply
    /// requires a usable `host_id`/`host_ip`, so this best-effort-parses
    /// just the header line tokens; a message that doesn't even have those
    /// is dropped silently, since there is nowhere to send a reply.
    fn reply_to_malformed_message(
        &self,
        text: &str,
        reason: &CodecError,
    ) -> Result<(), ServerError> {
        let header_line = match text.split("\r\n").find(|l| !l.is_empty()) {
            Some(l) => l,
            None => return Ok(()),
        };
        let tokens: Vec<&str> = header_line.split(' ').collect();
        if tokens.len() < 3 {
            return Ok(());
        }
        let (method, client_id, client_ip) = (tokens[0], tokens[1], tokens[2]);
        self.activity
            .lock()
            .unwrap()
            .insert((client_id.to_string(), client_ip.to_string()), Instant::now());
        let reply = ServerMessage::Error {
            method: method.to_string(),
            error_msg: reason.to_string(),
        };
        self.send_reply(client_id, client_ip, reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ClientMessage, ClientMethod};
    use crate::host::HostId;
    use crate::rdt::RdtConfig;
    use std::net::SocketAddr;

    fn loopback_pair(port: u16) -> (Arc<DirectoryServer>, Arc<Rdt>) {
        let server_rdt = Rdt::with_config(
            HostId::new("server0001"),
            RdtConfig {
                receive_timeout: Duration::from_millis(500),
                ..RdtConfig::default()
            },
        )
        .unwrap();
        server_rdt.start_listener(port).unwrap();
        let client_listen_port = port + 1;
        let server = Arc::new(DirectoryServer::with_reply_port(
            Arc::clone(&server_rdt),
            client_listen_port,
        ));

        let client_rdt = Rdt::with_config(
            HostId::new("alpha1234"),
            RdtConfig {
                receive_timeout: Duration::from_secs(2),
                ..RdtConfig::default()
            },
        )
        .unwrap();
        client_rdt.start_listener(client_listen_port).unwrap();

        (server, client_rdt)
    }

    fn send_and_await_reply(
        client_rdt: &Rdt,
        comm_id: u32,
        server_addr: SocketAddr,
        msg: ClientMessage,
    ) -> crate::codec::ServerMessage {
        // comm_id must differ across calls sharing one client_rdt: the
        // server's reassembler closes `(host_id, comm_id)` after the first
        // delivery and would silently drop a repeat.
        let ok = client_rdt
            .send(comm_id, msg.encode().as_bytes(), server_addr)
            .unwrap();
        assert!(ok);
        let reply_bytes = client_rdt.receive().unwrap();
        codec::decode_server_message(&String::from_utf8_lossy(&reply_bytes)).unwrap()
    }

    #[test]
    fn ident_registers_activity_and_echoes_host_id() {
        let port = 55210;
        let (server, client_rdt) = loopback_pair(port);
        let server_thread = {
            let server = Arc::clone(&server);
            std::thread::spawn(move || server.tick().unwrap())
        };
        let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
        let reply = send_and_await_reply(
            &client_rdt,
            1,
            addr,
            ClientMessage {
                host_id: "alpha1234".into(),
                host_ip: "127.0.0.1".into(),
                method: ClientMethod::Ident,
            },
        );
        server_thread.join().unwrap();
        assert_eq!(
            reply,
            crate::codec::ServerMessage::IdentOk {
                host_id: "alpha1234".into()
            }
        );
    }

    #[test]
    fn inform_then_query_excludes_self_and_finds_match_from_other_host() {
        let port = 55220;
        let (server, client_rdt) = loopback_pair(port);
        let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();

        let server_for_inform = Arc::clone(&server);
        let t1 = std::thread::spawn(move || server_for_inform.tick().unwrap());
        send_and_await_reply(
            &client_rdt,
            1,
            addr,
            ClientMessage {
                host_id: "alpha1234".into(),
                host_ip: "127.0.0.1".into(),
                method: ClientMethod::Inform(vec![
                    ("song a.mp3".to_string(), 1000),
                    ("b.mp3".to_string(), 2000),
                ]),
            },
        );
        t1.join().unwrap();

        let server_for_self_query = Arc::clone(&server);
        let t2 = std::thread::spawn(move || server_for_self_query.tick().unwrap());
        let self_query = send_and_await_reply(
            &client_rdt,
            2,
            addr,
            ClientMessage {
                host_id: "alpha1234".into(),
                host_ip: "127.0.0.1".into(),
                method: ClientMethod::Query {
                    substring: "song".into(),
                    host: None,
                },
            },
        );
        t2.join().unwrap();
        assert_eq!(
            self_query,
            crate::codec::ServerMessage::QueryResponse { results: vec![] }
        );

        // a different requester does see alpha1234's files. The directory
        // server identifies hosts by the message body's `host_id`/`host_ip`
        // fields, not by UDP source address, so reusing the same listening
        // socket to pose as `beta9999` exercises the real server-side
        // self-exclusion path without standing up a second bound socket.
        let server_for_other_query = Arc::clone(&server);
        let t3 = std::thread::spawn(move || server_for_other_query.tick().unwrap());
        let other_query = send_and_await_reply(
            &client_rdt,
            3,
            addr,
            ClientMessage {
                host_id: "beta9999".into(),
                host_ip: "127.0.0.1".into(),
                method: ClientMethod::Query {
                    substring: "song".into(),
                    host: None,
                },
            },
        );
        t3.join().unwrap();
        match other_query {
            crate::codec::ServerMessage::QueryResponse { results } => {
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].0, "alpha1234");
                assert_eq!(results[0].2, "song a.mp3");
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }
}
