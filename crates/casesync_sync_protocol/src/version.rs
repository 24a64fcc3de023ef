//! Restore protocol versions.

use std::fmt;

/// A supported restore protocol version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProtocolVersion {
    /// Element-style case blocks.
    #[default]
    V1,
    /// Attribute-style, namespaced case blocks.
    V2,
}

impl ProtocolVersion {
    /// Returns the wire form (`"1.0"`, `"2.0"`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => "1.0",
            Self::V2 => "2.0",
        }
    }

    /// Parses the wire form. Returns `None` for unsupported versions.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "1.0" | "1" => Some(Self::V1),
            "2.0" | "2" => Some(Self::V2),
            _ => None,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_versions() {
        assert_eq!(ProtocolVersion::parse("1.0"), Some(ProtocolVersion::V1));
        assert_eq!(ProtocolVersion::parse("2.0"), Some(ProtocolVersion::V2));
        assert_eq!(ProtocolVersion::parse("3.0"), None);
        assert_eq!(ProtocolVersion::V2.to_string(), "2.0");
    }
}
