//! Local module store server.
//! Run with: cargo run --bin bab-module-store

use std::process::ExitCode;

use bab_agent::start_module_store;

fn main() -> ExitCode {
    start_module_store::run()
}
