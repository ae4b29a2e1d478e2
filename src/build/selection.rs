//! The build configuration: which owned modules make up the next agent.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::modules::{ModuleRef, ModuleType, OwnedModules};

/// Rule for selecting speech and tone modules together.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairingPolicy {
    /// Speech and tone are independent.
    #[default]
    Relaxed,
    /// Speech and tone are either both selected or both absent.
    Strict,
}

impl PairingPolicy {
    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Relaxed => "relaxed",
            Self::Strict => "strict",
        }
    }
}

impl fmt::Display for PairingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown pairing policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown pairing policy {0:?}, expected \"relaxed\" or \"strict\"")]
pub struct PairingPolicyParseError(pub String);

impl FromStr for PairingPolicy {
    type Err = PairingPolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relaxed" => Ok(Self::Relaxed),
            "strict" => Ok(Self::Strict),
            _ => Err(PairingPolicyParseError(s.to_string())),
        }
    }
}

/// Selected modules, one slot per type; knowledge holds several.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Base character.
    pub character: Option<ModuleRef>,
    /// Extra knowledge.
    pub knowledge: Vec<ModuleRef>,
    /// Voice settings.
    pub speech: Option<ModuleRef>,
    /// Tone.
    pub tone: Option<ModuleRef>,
    /// Memory module backing the conversation.
    pub memory: Option<ModuleRef>,
}

impl BuildConfig {
    fn slot_mut(&mut self, module_type: ModuleType) -> Option<&mut Option<ModuleRef>> {
        match module_type {
            ModuleType::Character => Some(&mut self.character),
            ModuleType::Speech => Some(&mut self.speech),
            ModuleType::Tone => Some(&mut self.tone),
            ModuleType::Memory => Some(&mut self.memory),
            ModuleType::Knowledge => None,
        }
    }

    /// The module selected for a single-valued type.
    #[must_use]
    pub const fn slot(&self, module_type: ModuleType) -> Option<&ModuleRef> {
        match module_type {
            ModuleType::Character => self.character.as_ref(),
            ModuleType::Speech => self.speech.as_ref(),
            ModuleType::Tone => self.tone.as_ref(),
            ModuleType::Memory => self.memory.as_ref(),
            ModuleType::Knowledge => None,
        }
    }

    /// Whether the module with this on-chain id is selected under `module_type`.
    #[must_use]
    pub fn is_selected(&self, module_type: ModuleType, on_chain_id: &str) -> bool {
        if module_type.is_multi_valued() {
            self.knowledge.iter().any(|m| m.on_chain_id == on_chain_id)
        } else {
            self.slot(module_type)
                .is_some_and(|m| m.on_chain_id == on_chain_id)
        }
    }

    /// Put a module in its slot. Knowledge accumulates, other types replace.
    pub fn select(&mut self, module: ModuleRef) {
        let module_type = module.module_type;
        if let Some(slot) = self.slot_mut(module_type) {
            *slot = Some(module);
        } else if let Some(existing) = self
            .knowledge
            .iter_mut()
            .find(|m| m.on_chain_id == module.on_chain_id)
        {
            *existing = module;
        } else {
            self.knowledge.push(module);
        }
    }

    /// Clear a slot, or drop one knowledge entry by on-chain id.
    ///
    /// Single-valued slots are cleared whatever `on_chain_id` is. For
    /// knowledge only the matching entry goes, and an id that is not selected
    /// changes nothing.
    pub fn remove(&mut self, module_type: ModuleType, on_chain_id: &str) {
        if let Some(slot) = self.slot_mut(module_type) {
            *slot = None;
        } else {
            self.knowledge.retain(|m| m.on_chain_id != on_chain_id);
        }
    }

    /// Drop every selection that is no longer owned.
    ///
    /// Returns whether anything changed.
    pub fn reconcile(&mut self, owned: &OwnedModules) -> bool {
        let before = self.clone();

        for module_type in ModuleType::ALL {
            if let Some(slot) = self.slot_mut(module_type) {
                let still_owned = slot
                    .as_ref()
                    .is_some_and(|m| owned.owns(module_type, &m.on_chain_id));
                if !still_owned {
                    *slot = None;
                }
            }
        }
        self.knowledge
            .retain(|m| owned.owns(ModuleType::Knowledge, &m.on_chain_id));

        *self != before
    }

    /// Whether an agent can be built from this selection.
    #[must_use]
    pub const fn can_instantiate(&self, policy: PairingPolicy) -> bool {
        if self.character.is_none() || self.memory.is_none() {
            return false;
        }
        match policy {
            PairingPolicy::Relaxed => true,
            PairingPolicy::Strict => self.speech.is_some() == self.tone.is_some(),
        }
    }
}
