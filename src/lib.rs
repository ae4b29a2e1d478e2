//! Client library for chatting with composable agents whose conversation
//! history lives in a memory module.

// Strict lint discipline
#![deny(unsafe_code)] // No unsafe code
#![deny(missing_docs)] // Every public item is documented
#![deny(dead_code)] // No unused code
#![deny(non_camel_case_types)]
#![deny(unused_imports)]
#![deny(unused_variables)]
#![deny(unused_must_use)] // Results and Options are handled explicitly
#![deny(non_snake_case)]
#![deny(non_upper_case_globals)]
#![deny(nonstandard_style)]
#![forbid(unsafe_op_in_unsafe_fn)]

// Clippy
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![deny(clippy::unwrap_used)] // No unwrap() outside tests
#![deny(clippy::expect_used)] // No expect() outside tests
#![deny(clippy::panic)]
#![deny(clippy::print_stdout)] // Output goes through tracing; binaries print
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::missing_const_for_fn)]
#![deny(clippy::unwrap_in_result)]
#![deny(clippy::module_inception)]
#![deny(clippy::redundant_clone)]
#![deny(clippy::shadow_unrelated)]
#![deny(clippy::too_many_arguments)]
#![deny(clippy::cognitive_complexity)]
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::shadow_unrelated,
        clippy::too_many_lines,
        clippy::significant_drop_tightening
    )
)]

// Robustness
#![deny(overflowing_literals)]

/// Clients for the chat backend and the module store.
#[allow(
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::future_not_send
)]
pub mod api;
/// Building an agent from owned modules.
#[allow(
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::option_if_let_else
)]
pub mod build;
/// Conversations with an agent.
#[allow(
    clippy::module_name_repetitions,
    clippy::significant_drop_tightening,
    clippy::missing_const_for_fn
)]
pub mod chat;
/// Runtime configuration.
#[allow(clippy::missing_errors_doc)]
pub mod config;
/// Error types.
pub mod error;
/// Agent and module identifiers.
pub mod ids;
/// Module types, owned instances and uploads.
#[allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]
pub mod modules;
/// Local module store server.
#[allow(
    clippy::missing_errors_doc,
    clippy::missing_const_for_fn,
    clippy::unused_async,
    clippy::needless_pass_by_value
)]
pub mod server;
/// Entry helpers for the module store binary.
pub mod start_module_store;
/// Client-side persisted state.
#[allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]
pub mod storage;

pub use config::ClientConfig;
pub use error::{BabError, BabResult};
pub use ids::{AgentId, ModuleId};
