//! Module type taxonomy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kind of configuration fragment a module provides to an agent.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    /// Base character definition.
    Character,
    /// Additional knowledge entries; several may be selected at once.
    Knowledge,
    /// Voice settings.
    Speech,
    /// Tone of voice.
    Tone,
    /// Conversation history store.
    Memory,
}

impl ModuleType {
    /// Every module type, in build-screen order.
    pub const ALL: [Self; 5] = [
        Self::Character,
        Self::Knowledge,
        Self::Speech,
        Self::Tone,
        Self::Memory,
    ];

    /// Stable string form used on chain and in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Knowledge => "knowledge",
            Self::Speech => "speech",
            Self::Tone => "tone",
            Self::Memory => "memory",
        }
    }

    /// Whether more than one module of this type can be selected.
    #[must_use]
    pub const fn is_multi_valued(self) -> bool {
        matches!(self, Self::Knowledge)
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown module type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown module type: {0}")]
pub struct ModuleTypeParseError(pub String);

impl FromStr for ModuleType {
    type Err = ModuleTypeParseError;

    /// Chain objects carry the type in arbitrary case, so matching is case-insensitive.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "character" => Ok(Self::Character),
            "knowledge" => Ok(Self::Knowledge),
            "speech" => Ok(Self::Speech),
            "tone" => Ok(Self::Tone),
            "memory" => Ok(Self::Memory),
            _ => Err(ModuleTypeParseError(value.to_string())),
        }
    }
}
