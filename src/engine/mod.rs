pub mod ansible;

pub use ansible::{parse_json_callback, AnsibleEngine};

use async_trait::async_trait;

use crate::error::EngineError;
use crate::invocation::Invocation;
use crate::response::EngineOutput;

/// Executes a module call on the resolved hosts and reports per-host results.
///
/// Failures on individual hosts belong in the output (`failed` flags or the
/// `dark` map); an `Err` means the engine itself could not run.
#[async_trait]
pub trait ModuleEngine: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<EngineOutput, EngineError>;
}
