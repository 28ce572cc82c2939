//! Rustle Adhoc - scriptable ad-hoc Ansible sessions
//!
//! This crate runs Ansible modules against inventory host patterns from Rust,
//! keeps facts and variables per host between calls, and summarizes the
//! per-host results of every call.

pub mod config;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod invocation;
pub mod response;
pub mod session;
pub mod store;
pub mod template;
pub mod variables;

pub use config::SessionConfig;
pub use engine::{AnsibleEngine, ModuleEngine};
pub use error::{AdhocError, EngineError, InventoryError, Result};
pub use inventory::{AnsibleInventory, Inventory, InventorySource, StaticInventory};
pub use invocation::{CallArgs, Invocation, RunnerOptions};
pub use response::{EngineOutput, HostResult, ModuleResponse};
pub use session::Session;
pub use store::HostStore;
pub use template::TemplateRenderer;
pub use variables::{PatternVars, VarsSource};
