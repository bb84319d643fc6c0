//! Host identity: `<hostname><4-hex-digits>`, chosen once at process start.

use rand::Rng;
use std::fmt;

/// Opaque process identity used as the `host_id` field throughout the
/// transport and application protocol. Never parsed, only compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(String);

impl HostId {
    /// Wraps an existing string as a host id, for tests and for messages
    /// that echo a peer's id back without needing to generate one.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// `<hostname><4 hex digits>`, the suffix drawn uniformly from
    /// `[0, 0xFFFF]`.
    pub fn generate(hostname: &str) -> Self {
        let suffix: u16 = rand::thread_rng().gen_range(0..=0xffff);
        Self(format!("{hostname}{suffix:04x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HostId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for HostId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_id_has_hostname_prefix_and_four_hex_digits() {
        let id = HostId::generate("alpha");
        let s = id.as_str();
        assert!(s.starts_with("alpha"));
        let suffix = &s["alpha".len()..];
        assert_eq!(suffix.len(), 4);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn new_wraps_verbatim() {
        assert_eq!(HostId::new("alpha1234").as_str(), "alpha1234");
    }
}
