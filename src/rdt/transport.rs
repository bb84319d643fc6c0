//! The reliable datagram transport itself: fragmentation, per-fragment ACK
//! wait with retransmission, RTT-adaptive timeouts, and a reassembling
//! listener.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::RdtError;
use crate::host::HostId;
use crate::rdt::counter::WrappingCounter;
use crate::rdt::packet::{Flags, Packet};
use crate::rdt::reassembly::Reassembler;
use crate::rdt::rtt::RttEstimator;

/// Tunable transport parameters. The defaults match the values used for a
/// plain demonstration deployment; callers needing a larger MTU or a
/// different retry/timeout budget can override any of them.
#[derive(Debug, Clone)]
pub struct RdtConfig {
    /// Maximum payload bytes per fragment.
    pub mtu: usize,
    /// Retransmission attempts per fragment before `send` gives up.
    pub max_retries: u32,
    /// How long `receive` blocks for a reassembled message before failing
    /// with [`RdtError::EmptyQueue`].
    pub receive_timeout: Duration,
    /// Capacity of the reassembled-message queue.
    pub queue_capacity: usize,
    /// Size of the bounded packet-worker pool: a fixed-size alternative to
    /// spawning one unbounded thread per inbound datagram.
    pub worker_pool_size: usize,
}

impl Default for RdtConfig {
    fn default() -> Self {
        Self {
            mtu: 128,
            max_retries: 3,
            receive_timeout: Duration::from_secs(5),
            queue_capacity: 256,
            worker_pool_size: 8,
        }
    }
}

struct Channels {
    tx: SyncSender<Vec<u8>>,
    rx: Mutex<Receiver<Vec<u8>>>,
}

/// One process's reliable-datagram transport instance: one outbound socket
/// used both for data sends and for emitting acks, and (once
/// [`Rdt::start_listener`] is called) one bound listening socket.
pub struct Rdt {
    host_id: HostId,
    config: RdtConfig,
    // `send_to` is safe to call concurrently from any thread (the OS call
    // itself is concurrency-safe); only the window where a `send` call sets
    // the socket's read timeout and then reads a reply needs exclusivity,
    // since the timeout is shared, racy socket state. `send_lock` guards
    // exactly that window; packet workers emitting acks go straight through
    // `send_sock` without taking it.
    send_sock: UdpSocket,
    send_lock: Mutex<()>,
    listen_sock: Mutex<Option<UdpSocket>>,
    seq_counter: WrappingCounter,
    reassembler: Arc<Reassembler>,
    channels: Channels,
    rtt: Mutex<RttEstimator>,
    closed: AtomicBool,
}

impl Rdt {
    pub fn new(host_id: HostId) -> Result<Arc<Self>, RdtError> {
        Self::with_config(host_id, RdtConfig::default())
    }

    pub fn with_config(host_id: HostId, config: RdtConfig) -> Result<Arc<Self>, RdtError> {
        let send_sock = UdpSocket::bind("0.0.0.0:0")?;
        let (tx, rx) = mpsc::sync_channel(config.queue_capacity.max(1));
        Ok(Arc::new(Self {
            host_id,
            send_sock,
            send_lock: Mutex::new(()),
            listen_sock: Mutex::new(None),
            seq_counter: WrappingCounter::random(),
            reassembler: Arc::new(Reassembler::new()),
            channels: Channels {
                tx,
                rx: Mutex::new(rx),
            },
            rtt: Mutex::new(RttEstimator::new()),
            closed: AtomicBool::new(false),
        }))
    }

    pub fn host_id(&self) -> &HostId {
        &self.host_id
    }

    /// Binds a datagram socket to `port` and begins delivering fully
    /// reassembled messages into the internal bounded queue. Spawns one
    /// listener thread plus a bounded pool of packet-worker threads fed by
    /// a channel.
    pub fn start_listener(self: &Arc<Self>, port: u16) -> Result<(), RdtError> {
        let listen_sock = UdpSocket::bind(("0.0.0.0", port))?;
        *self.listen_sock.lock().unwrap() = Some(listen_sock.try_clone()?);

        let (job_tx, job_rx) = mpsc::channel::<(Vec<u8>, SocketAddr)>();
        let job_rx = Arc::new(Mutex::new(job_rx));

        for _ in 0..self.config.worker_pool_size.max(1) {
            let this = Arc::clone(self);
            let job_rx = Arc::clone(&job_rx);
            thread::spawn(move || loop {
                let job = job_rx.lock().unwrap().recv();
                match job {
                    Ok((data, addr)) => this.handle_inbound_packet(&data, addr),
                    Err(_) => break,
                }
            });
        }

        let this = Arc::clone(self);
        thread::spawn(move || this.listen_loop(listen_sock, job_tx));
        Ok(())
    }

    fn listen_loop(self: Arc<Self>, sock: UdpSocket, job_tx: mpsc::Sender<(Vec<u8>, SocketAddr)>) {
        let mut buf = vec![0u8; self.config.mtu + 256];
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            match sock.recv_from(&mut buf) {
                Ok((n, addr)) => {
                    if job_tx.send((buf[..n].to_vec(), addr)).is_err() {
                        return;
                    }
                }
                Err(_) => {
                    if self.closed.load(Ordering::SeqCst) {
                        return;
                    }
                    continue;
                }
            }
        }
    }

    /// Parses one inbound datagram, immediately acks it, and feeds it into
    /// the reassembler. Runs on a packet-worker thread.
    fn handle_inbound_packet(&self, data: &[u8], addr: SocketAddr) {
        let pkt = match Packet::parse(data) {
            Ok(p) => p,
            Err(_) => return,
        };

        let ack = pkt.ack_for(&self.host_id);
        let _ = self.send_sock.send_to(&ack.encode(), addr);

        if let Some(message) = self.reassembler.process_fragment(
            pkt.host_id.as_str(),
            pkt.comm_id,
            pkt.seq,
            pkt.payload,
            pkt.flags.syn,
            pkt.flags.fin,
        ) {
            let _ = self.channels.tx.try_send(message);
        }
    }

    /// Pops the next reassembled message, blocking up to
    /// `config.receive_timeout`.
    pub fn receive(&self) -> Result<Vec<u8>, RdtError> {
        let rx = self.channels.rx.lock().unwrap();
        rx.recv_timeout(self.config.receive_timeout)
            .map_err(|_| RdtError::EmptyQueue)
    }

    /// Discards any already-queued reassembled messages without blocking.
    /// Callers use this to clear stale responses before issuing a new
    /// request, so a leftover reply from an earlier, unrelated exchange is
    /// never mistaken for the answer to this one.
    pub fn drain_queue(&self) {
        let rx = self.channels.rx.lock().unwrap();
        while rx.try_recv().is_ok() {}
    }

    /// Splits `data` into MTU-sized fragments, transmits each reliably in
    /// turn, and blocks until every fragment is acknowledged or any single
    /// fragment exhausts its retries.
    pub fn send(&self, comm_id: u32, data: &[u8], addr: SocketAddr) -> Result<bool, RdtError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RdtError::Closed);
        }
        for (payload, flags) in self.fragment(data) {
            let seq = self.seq_counter.next();
            let pkt = Packet {
                host_id: self.host_id.clone(),
                comm_id,
                seq,
                flags,
                payload,
            };
            if !self.send_fragment_reliably(&pkt, addr)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn fragment(&self, data: &[u8]) -> Vec<(Vec<u8>, Flags)> {
        if data.is_empty() {
            return vec![(Vec::new(), Flags::syn_fin())];
        }
        let mtu = self.config.mtu.max(1);
        let chunks: Vec<&[u8]> = data.chunks(mtu).collect();
        let last = chunks.len() - 1;
        chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                let flags = match (i == 0, i == last) {
                    (true, true) => Flags::syn_fin(),
                    (true, false) => Flags::syn(),
                    (false, true) => Flags::fin(),
                    (false, false) => Flags::default(),
                };
                (chunk.to_vec(), flags)
            })
            .collect()
    }

    /// Transmits one fragment, retransmitting on timeout up to
    /// `max_retries` times. Returns `Ok(true)` once acknowledged,
    /// `Ok(false)` if retries are exhausted (seq has still been consumed
    /// to avoid ACK aliasing on the next fragment).
    fn send_fragment_reliably(&self, pkt: &Packet, addr: SocketAddr) -> Result<bool, RdtError> {
        let encoded = pkt.encode();
        let mut attempt = 0u32;

        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(RdtError::Closed);
            }
            if attempt >= self.config.max_retries {
                return Ok(false);
            }
            attempt += 1;

            let timeout = self.rtt.lock().unwrap().timeout();
            let sent_at = Instant::now();
            let acked = {
                let _guard = self.send_lock.lock().unwrap();
                self.send_sock.send_to(&encoded, addr)?;
                self.send_sock.set_read_timeout(Some(timeout))?;
                let result = self.wait_for_matching_ack(pkt.seq);
                self.send_sock.set_read_timeout(None)?;
                result
            };

            match acked {
                Some(true) => {
                    if attempt == 1 {
                        self.rtt
                            .lock()
                            .unwrap()
                            .on_first_try_success(sent_at.elapsed());
                    }
                    return Ok(true);
                }
                _ => {
                    self.rtt.lock().unwrap().on_timeout();
                }
            }
        }
    }

    /// Reads from the send socket until an ACK matching `seq` (or a
    /// legacy/malformed ACK with seq 0, accepted for tolerance) arrives,
    /// or the socket read times out. Non-matching ACKs and non-ACK packets
    /// are discarded and the read loop continues within the same timeout
    /// window.
    fn wait_for_matching_ack(&self, seq: u32) -> Option<bool> {
        let mut buf = [0u8; 1024];
        loop {
            // Not using a connected socket, so recv_from (not recv) is the
            // correct call here; the source address is irrelevant to ack
            // matching.
            match self.send_sock.recv_from(&mut buf) {
                Ok((n, _)) => match Packet::parse(&buf[..n]) {
                    Ok(p) if p.flags.ack && (p.seq == seq || p.seq == 0) => return Some(true),
                    _ => continue,
                },
                Err(_) => return None,
            }
        }
    }

    /// Releases both sockets. In-flight `send` calls observe this as a
    /// failure (their next socket operation errors).
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(sock) = self.listen_sock.lock().unwrap().take() {
            let _ = sock.set_nonblocking(true);
            drop(sock);
        }
    }
}
