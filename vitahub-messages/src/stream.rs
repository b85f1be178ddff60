use serde::{Deserialize, Serialize};

/// Identifier of one telemetry flow (one panadapter, one waterfall, one audio stream).
///
/// Rendered as uppercase hex without padding, which is also the form
/// downstream clients see in frame and tile messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamKey(pub u32);

impl StreamKey {
    /// Uppercase hex bytes, e.g. `0x1A2B` -> `b"1A2B"`.
    pub fn hex_ascii(self) -> Vec<u8> {
        format!("{:X}", self.0).into_bytes()
    }

    /// Parse the `0x40000000` form used by radio status lines. The prefix is optional.
    pub fn parse_hex(s: &str) -> Option<Self> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        u32::from_str_radix(digits, 16).ok().map(Self)
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl From<u32> for StreamKey {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_ascii_is_unpadded_uppercase() {
        assert_eq!(StreamKey(0x1A2B).hex_ascii(), b"1A2B".to_vec());
        assert_eq!(StreamKey(0x4200_00ab).hex_ascii(), b"420000AB".to_vec());
        assert_eq!(StreamKey(0).hex_ascii(), b"0".to_vec());
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(StreamKey::parse_hex("0x40000000"), Some(StreamKey(0x4000_0000)));
        assert_eq!(StreamKey::parse_hex("42000000"), Some(StreamKey(0x4200_0000)));
        assert_eq!(StreamKey::parse_hex("0xZZ"), None);
    }
}
