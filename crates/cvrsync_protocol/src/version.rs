//! Protocol and schema version gates.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Push protocol version understood by this crate.
pub const PUSH_VERSION: u32 = 1;

/// Pull protocol version understood by this crate.
pub const PULL_VERSION: u32 = 1;

/// Which version a `VersionNotSupported` error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionType {
    /// The client's schema version.
    Schema,
    /// The push protocol version.
    Push,
    /// The pull protocol version.
    Pull,
}

impl fmt::Display for VersionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VersionType::Schema => "schema",
            VersionType::Push => "push",
            VersionType::Pull => "pull",
        })
    }
}

/// Requires an exact schema version match.
pub fn check_schema_version(expected: &str, received: &str) -> ProtocolResult<()> {
    if expected == received {
        Ok(())
    } else {
        Err(ProtocolError::version_not_supported(
            VersionType::Schema,
            received,
        ))
    }
}

pub(crate) fn check_protocol_version(
    version_type: VersionType,
    expected: u32,
    received: u32,
) -> ProtocolResult<()> {
    if expected == received {
        Ok(())
    } else {
        Err(ProtocolError::version_not_supported(version_type, received))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_gate_is_exact() {
        assert!(check_schema_version("3", "3").is_ok());
        let err = check_schema_version("3", "3.0").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::VersionNotSupported {
                version_type: VersionType::Schema,
                received: "3.0".into(),
            }
        );
    }

    #[test]
    fn version_type_wire_names() {
        assert_eq!(serde_json::to_string(&VersionType::Pull).unwrap(), "\"pull\"");
        assert_eq!(VersionType::Push.to_string(), "push");
    }
}
