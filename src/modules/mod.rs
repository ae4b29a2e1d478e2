//! On-chain module types and their client-side representations.
//!
//! - `kind`: the five module types
//! - `owned`: owned module instances, grouped by type
//! - `upload`: validation of user-supplied module uploads

pub mod kind;
pub mod owned;
pub mod upload;

pub use kind::{ModuleType, ModuleTypeParseError};
pub use owned::{ModuleRef, OwnedModules, categorize_instances};
pub use upload::{FieldError, ModuleUpload};
