//! Wire format for a single RDT datagram: `<host_id> <comm_id> <seq> <flags> <payload>`.
//!
//! The header tokens are ASCII text; the payload is arbitrary bytes (the
//! transport is byte-oriented, even though every payload this crate ever
//! sends happens to be UTF-8 application-protocol text). Parsing therefore
//! works on raw bytes and only decodes the header tokens as UTF-8, splitting
//! on the first four single-space separators.

use crate::error::RdtError;
use crate::host::HostId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub syn: bool,
    pub fin: bool,
    pub ack: bool,
}

impl Flags {
    pub fn syn() -> Self {
        Self {
            syn: true,
            ..Default::default()
        }
    }

    pub fn fin() -> Self {
        Self {
            fin: true,
            ..Default::default()
        }
    }

    pub fn syn_fin() -> Self {
        Self {
            syn: true,
            fin: true,
            ..Default::default()
        }
    }

    /// Same flags, with ACK additionally set — used when echoing a
    /// received packet's flags back as an acknowledgement.
    pub fn with_ack(self) -> Self {
        Self { ack: true, ..self }
    }

    fn encode(&self) -> String {
        let mut s = String::new();
        if self.syn {
            s.push_str("SYN");
        }
        if self.fin {
            s.push_str("FIN");
        }
        if self.ack {
            s.push_str("ACK");
        }
        s
    }

    fn parse(s: &str) -> Self {
        Self {
            syn: s.contains("SYN"),
            fin: s.contains("FIN"),
            ack: s.contains("ACK"),
        }
    }
}

/// One on-the-wire datagram, header plus payload.
#[derive(Debug, Clone)]
pub struct Packet {
    pub host_id: HostId,
    pub comm_id: u32,
    pub seq: u32,
    pub flags: Flags,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = format!(
            "{} {} {} {} ",
            self.host_id,
            self.comm_id,
            self.seq,
            self.flags.encode(),
        )
        .into_bytes();
        out.extend_from_slice(&self.payload);
        out
    }

    /// Splits on the first four single-space bytes: the first four tokens
    /// are the header, everything after the fourth space is payload,
    /// verbatim (including any further space bytes it may contain).
    pub fn parse(bytes: &[u8]) -> Result<Self, RdtError> {
        let mut header_end = [0usize; 4];
        let mut found = 0;
        for (i, b) in bytes.iter().enumerate() {
            if *b == b' ' {
                header_end[found] = i;
                found += 1;
                if found == 4 {
                    break;
                }
            }
        }
        if found < 4 {
            return Err(RdtError::MalformedPacket(format!(
                "expected 4 header separators, found {found}"
            )));
        }

        let host_id = std::str::from_utf8(&bytes[..header_end[0]])
            .map_err(|e| RdtError::MalformedPacket(format!("non-utf8 host_id: {e}")))?;
        let comm_id_tok = std::str::from_utf8(&bytes[header_end[0] + 1..header_end[1]])
            .map_err(|e| RdtError::MalformedPacket(format!("non-utf8 comm_id: {e}")))?;
        let seq_tok = std::str::from_utf8(&bytes[header_end[1] + 1..header_end[2]])
            .map_err(|e| RdtError::MalformedPacket(format!("non-utf8 seq: {e}")))?;
        let flags_tok = std::str::from_utf8(&bytes[header_end[2] + 1..header_end[3]])
            .map_err(|e| RdtError::MalformedPacket(format!("non-utf8 flags: {e}")))?;

        if host_id.is_empty() {
            return Err(RdtError::MalformedPacket("missing host_id".into()));
        }

        let comm_id: u32 = comm_id_tok
            .parse()
            .map_err(|_| RdtError::MalformedPacket(format!("bad comm_id {comm_id_tok:?}")))?;
        let seq: u32 = seq_tok
            .parse()
            .map_err(|_| RdtError::MalformedPacket(format!("bad seq {seq_tok:?}")))?;

        let payload = bytes[header_end[3] + 1..].to_vec();

        Ok(Self {
            host_id: HostId::new(host_id),
            comm_id,
            seq,
            flags: Flags::parse(flags_tok),
            payload,
        })
    }

    /// The ack packet sent in immediate reply to this packet: same header
    /// fields echoed, flags plus ACK, empty payload. Sent from the
    /// sender-side socket, never the listening socket.
    pub fn ack_for(&self, from: &HostId) -> Packet {
        Packet {
            host_id: from.clone(),
            comm_id: self.comm_id,
            seq: self.seq,
            flags: self.flags.with_ack(),
            payload: Vec::new(),
        }
    }
}
