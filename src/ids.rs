//! Identifier types for agents and modules.
//!
//! Agents are identified by the UUID the chat backend assigns on start.
//! Modules are identified by their opaque on-chain object id (a hex string),
//! which is also the key of the module content in the module store.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a running agent on the chat backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct AgentId(pub Uuid);

impl AgentId {
    /// Wrap an existing UUID.
    #[inline]
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Create a random identifier, mostly useful for local tooling.
    #[inline]
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Borrow the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AgentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Opaque on-chain module identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    /// Wrap a raw identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ModuleId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id_parse_trims() {
        let raw = "b850bc30-45f8-0041-a00a-83df46d8555d";
        let parsed: Result<AgentId, _> = format!("  {raw}\n").parse();
        assert_eq!(parsed.map(|id| id.to_string()).ok().as_deref(), Some(raw));
    }

    #[test]
    fn test_agent_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<AgentId>().is_err());
    }

    #[test]
    fn test_module_id_serializes_as_plain_string() {
        let id = ModuleId::new("0x8d4e");
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, "\"0x8d4e\"");
    }
}
