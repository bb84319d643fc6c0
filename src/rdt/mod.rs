//! Reliable datagram transport: fragmentation, per-fragment ACK with
//! retransmission, RTT-adaptive timeouts, and reassembly.

mod counter;
mod packet;
mod reassembly;
mod rtt;
mod transport;

pub use counter::WrappingCounter;
pub use packet::{Flags, Packet};
pub use transport::{Rdt, RdtConfig};
