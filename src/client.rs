//! Client session: sends IDENT/INFORM/QUERY/REMOVE/EXIT, tracks the query
//! buffer. Each operation validates the response shape before accepting it:
//! IDENT succeeds only on status `202` with the echoed host_id equal to
//! this session's own; INFORM/REMOVE succeed only on status `200` with the
//! expected method token; QUERY succeeds only on status `800` (`400 ERROR`
//! is surfaced identically to any other bad response).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::codec::{self, ClientMessage, ClientMethod, ServerMessage};
use crate::error::ClientError;
use crate::host::HostId;
use crate::rdt::{Rdt, WrappingCounter};

/// One query match: `(host_id, host_ip, filename, filesize)`.
pub type QueryResult = (String, String, String, u64);

/// Holds `host_id`, `host_ip`, connection state, and the most recent query
/// results for one client process.
pub struct ClientSession {
    host_id: HostId,
    host_ip: String,
    rdt: Arc<Rdt>,
    comm_id: WrappingCounter,
    connected: AtomicBool,
    shared_files: Mutex<Vec<(String, u64)>>,
    query_buffer: Mutex<Vec<QueryResult>>,
}

impl ClientSession {
    pub fn new(host_id: HostId, host_ip: String, rdt: Arc<Rdt>) -> Self {
        Self {
            host_id,
            host_ip,
            rdt,
            comm_id: WrappingCounter::random(),
            connected: AtomicBool::new(false),
            shared_files: Mutex::new(Vec::new()),
            query_buffer: Mutex::new(Vec::new()),
        }
    }

    pub fn host_id(&self) -> &HostId {
        &self.host_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn shared_file_count(&self) -> usize {
        self.shared_files.lock().unwrap().len()
    }

    fn send_and_await(&self, server_addr: SocketAddr, msg: &ClientMessage) -> Result<ServerMessage, ClientError> {
        self.rdt.drain_queue();
        let comm_id = self.comm_id.next();
        let sent = self.rdt.send(comm_id, msg.encode().as_bytes(), server_addr)?;
        if !sent {
            return Err(ClientError::SendFailed);
        }
        let reply_bytes = self.rdt.receive()?;
        let reply = codec::decode_server_message(&String::from_utf8_lossy(&reply_bytes))?;
        Ok(reply)
    }

    /// Registers with the directory server. Resets `connected` to false
    /// before transmitting; only a matching `202 IDENTOK` sets it back.
    pub fn ident(&self, server_addr: SocketAddr) -> Result<(), ClientError> {
        self.connected.store(false, Ordering::SeqCst);
        println!("==>Sending IDENT message to server.");
        let msg = ClientMessage {
            host_id: self.host_id.to_string(),
            host_ip: self.host_ip.clone(),
            method: ClientMethod::Ident,
        };
        let reply = self.send_and_await(server_addr, &msg).map_err(|e| {
            println!("\t-->Failed to deliver IDENT message!");
            e
        })?;
        println!("\t-->Sent IDENT message successfully!");
        match reply {
            ServerMessage::IdentOk { host_id } if host_id == self.host_id.as_str() => {
                println!("\t-->Received IDENTOK message from server.");
                self.connected.store(true, Ordering::SeqCst);
                Ok(())
            }
            other => {
                println!("\t-->Could not connect to server.");
                Err(ClientError::BadResponse {
                    expected: "202 IDENTOK echoing our host_id",
                    got: format!("{other:?}"),
                })
            }
        }
    }

    /// Informs the server of `files` shared by this host. Requires a prior
    /// successful `ident`.
    pub fn share(
        &self,
        server_addr: SocketAddr,
        files: Vec<(String, u64)>,
    ) -> Result<u64, ClientError> {
        if !self.is_connected() {
            println!("You are not connected to a server! Please connect and try again.");
            return Err(ClientError::NotConnected);
        }
        println!("==>Sending INFORM message to server.");
        let msg = ClientMessage {
            host_id: self.host_id.to_string(),
            host_ip: self.host_ip.clone(),
            method: ClientMethod::Inform(files.clone()),
        };
        let reply = self.send_and_await(server_addr, &msg).map_err(|e| {
            println!("\t-->Failed to deliver INFORM message!");
            e
        })?;
        println!("\t-->Sent INFORM message successfully!");
        match reply {
            ServerMessage::Ok { method, count } if method == "INFORM" => {
                println!("\t-->Shared {count} files with server.");
                self.shared_files.lock().unwrap().extend(files);
                Ok(count)
            }
            other => {
                println!("\t-->Failed to share files with server.");
                Err(ClientError::BadResponse {
                    expected: "200 OK INFORM <n>",
                    got: format!("{other:?}"),
                })
            }
        }
    }

    /// Queries the server for files whose name contains `substring`,
    /// optionally restricted to `host`. Overwrites the query buffer on
    /// success.
    pub fn query(
        &self,
        server_addr: SocketAddr,
        substring: &str,
        host: Option<&str>,
    ) -> Result<usize, ClientError> {
        if !self.is_connected() {
            println!("You are not connected to a server! Please connect and try again.");
            return Err(ClientError::NotConnected);
        }
        println!("==>Sending QUERY message to server.");
        let msg = ClientMessage {
            host_id: self.host_id.to_string(),
            host_ip: self.host_ip.clone(),
            method: ClientMethod::Query {
                substring: substring.to_string(),
                host: host.map(str::to_string),
            },
        };
        let reply = self.send_and_await(server_addr, &msg).map_err(|e| {
            println!("\t-->Failed to deliver QUERY message!");
            e
        })?;
        println!("\t-->Sent QUERY message successfully!");
        match reply {
            ServerMessage::QueryResponse { results } => {
                println!("\t-->Received QUERY response from server.");
                let count = results.len();
                *self.query_buffer.lock().unwrap() = results;
                Ok(count)
            }
            other => {
                println!("\t-->Failed to receive QUERY response from server.");
                Err(ClientError::BadResponse {
                    expected: "800 QUERYRESPONSE",
                    got: format!("{other:?}"),
                })
            }
        }
    }

    /// Removes previously-informed `files` from the server's index.
    pub fn remove(
        &self,
        server_addr: SocketAddr,
        files: Vec<(String, u64)>,
    ) -> Result<u64, ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        println!("==>Sending REMOVE message to server.");
        let msg = ClientMessage {
            host_id: self.host_id.to_string(),
            host_ip: self.host_ip.clone(),
            method: ClientMethod::Remove(files),
        };
        let reply = self.send_and_await(server_addr, &msg).map_err(|e| {
            println!("\t-->Failed to deliver REMOVE message!");
            e
        })?;
        println!("\t-->Sent REMOVE message successfully!");
        match reply {
            ServerMessage::Ok { method, count } if method == "REMOVE" => Ok(count),
            other => Err(ClientError::BadResponse {
                expected: "200 OK REMOVE <n>",
                got: format!("{other:?}"),
            }),
        }
    }

    /// Tells the server to drop every entry for this host. EXIT produces no
    /// reply, so this does not wait on the receive queue; success here only
    /// means the fragments were acknowledged.
    pub fn exit(&self, server_addr: SocketAddr) -> Result<(), ClientError> {
        println!("==>Sending EXIT message to server.");
        let msg = ClientMessage {
            host_id: self.host_id.to_string(),
            host_ip: self.host_ip.clone(),
            method: ClientMethod::Exit,
        };
        let comm_id = self.comm_id.next();
        let sent = self.rdt.send(comm_id, msg.encode().as_bytes(), server_addr)?;
        if !sent {
            println!("\t-->Failed to deliver EXIT message!");
            return Err(ClientError::SendFailed);
        }
        println!("\t-->Sent EXIT message successfully!");
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Looks up one result from the most recent query by index, for `GET`.
    pub fn query_result(&self, index: usize) -> Result<QueryResult, ClientError> {
        self.query_buffer
            .lock()
            .unwrap()
            .get(index)
            .cloned()
            .ok_or(ClientError::NoSuchQueryResult(index))
    }

    pub fn query_result_count(&self) -> usize {
        self.query_buffer.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdt::RdtConfig;
    use std::time::Duration;

    fn rdt_pair(server_port: u16, client_port: u16) -> (Arc<Rdt>, Arc<Rdt>) {
        let server_rdt = Rdt::with_config(
            HostId::new("server0001"),
            RdtConfig {
                receive_timeout: Duration::from_millis(500),
                ..RdtConfig::default()
            },
        )
        .unwrap();
        server_rdt.start_listener(server_port).unwrap();

        let client_rdt = Rdt::with_config(
            HostId::new("alpha1234"),
            RdtConfig {
                receive_timeout: Duration::from_secs(2),
                ..RdtConfig::default()
            },
        )
        .unwrap();
        client_rdt.start_listener(client_port).unwrap();

        (server_rdt, client_rdt)
    }

    #[test]
    fn ident_against_a_manually_scripted_server_sets_connected() {
        let server_port = 55310;
        let client_port = 55311;
        let (server_rdt, client_rdt) = rdt_pair(server_port, client_port);
        let session = ClientSession::new(
            HostId::new("alpha1234"),
            "127.0.0.1".to_string(),
            Arc::clone(&client_rdt),
        );

        let server_echo = std::thread::spawn(move || {
            let inbound = server_rdt.receive().unwrap();
            let request = codec::decode_client_message(&String::from_utf8_lossy(&inbound)).unwrap();
            assert_eq!(request.host_id, "alpha1234");
            let reply = ServerMessage::IdentOk {
                host_id: request.host_id,
            };
            let client_addr: SocketAddr = format!("127.0.0.1:{client_port}").parse().unwrap();
            server_rdt.send(1, reply.encode().as_bytes(), client_addr).unwrap();
        });

        let server_addr: SocketAddr = format!("127.0.0.1:{server_port}").parse().unwrap();
        session.ident(server_addr).unwrap();
        server_echo.join().unwrap();
        assert!(session.is_connected());
    }

    #[test]
    fn ident_with_mismatched_echoed_host_id_is_rejected() {
        let server_port = 55320;
        let client_port = 55321;
        let (server_rdt, client_rdt) = rdt_pair(server_port, client_port);
        let session = ClientSession::new(
            HostId::new("alpha1234"),
            "127.0.0.1".to_string(),
            Arc::clone(&client_rdt),
        );

        let server_echo = std::thread::spawn(move || {
            let _ = server_rdt.receive().unwrap();
            let reply = ServerMessage::IdentOk {
                host_id: "wrong-host".to_string(),
            };
            let client_addr: SocketAddr = format!("127.0.0.1:{client_port}").parse().unwrap();
            server_rdt.send(1, reply.encode().as_bytes(), client_addr).unwrap();
        });

        let server_addr: SocketAddr = format!("127.0.0.1:{server_port}").parse().unwrap();
        let err = session.ident(server_addr).unwrap_err();
        server_echo.join().unwrap();
        assert!(matches!(err, ClientError::BadResponse { .. }));
        assert!(!session.is_connected());
    }

    #[test]
    fn share_before_ident_is_rejected_without_touching_the_network() {
        let client_rdt = Rdt::with_config(HostId::new("alpha1234"), RdtConfig::default()).unwrap();
        let session = ClientSession::new(
            HostId::new("alpha1234"),
            "127.0.0.1".to_string(),
            client_rdt,
        );
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let err = session.share(addr, vec![("a.mp3".to_string(), 1)]).unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
    }

    #[test]
    fn query_result_out_of_range_is_reported() {
        let client_rdt = Rdt::with_config(HostId::new("alpha1234"), RdtConfig::default()).unwrap();
        let session = ClientSession::new(
            HostId::new("alpha1234"),
            "127.0.0.1".to_string(),
            client_rdt,
        );
        let err = session.query_result(0).unwrap_err();
        assert!(matches!(err, ClientError::NoSuchQueryResult(0)));
    }
}
