//! Assembling an agent from owned modules.
//!
//! - `selection`: the saved build configuration and the pairing policy
//! - `character`: composing the character document from the selection
//! - `reconciler`: keeping the selection in line with ownership, and
//!   starting the agent

pub mod character;
pub mod reconciler;
pub mod selection;

pub use character::compose_character;
pub use reconciler::BuildReconciler;
pub use selection::{BuildConfig, PairingPolicy, PairingPolicyParseError};
