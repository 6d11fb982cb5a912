// Query Executor Module
//
// Pull-based execution: every operator implements `Executor` and yields
// one row per `next` call.

pub mod context;
pub mod engine;
pub mod operators;
pub mod result;

pub use context::ExecutorContext;
pub use engine::ExecutionEngine;
pub use result::{DataValue, ExecutionError, ExecutionResult, Tuple};

use crate::catalog::Schema;
use crate::common::types::Rid;

/// The uniform operator interface: `init` prepares state and takes any
/// one-shot locks; `next` pulls the next row until it returns `None`.
pub trait Executor: Send {
    fn init(&mut self) -> ExecutionResult<()>;

    fn next(&mut self) -> ExecutionResult<Option<(Tuple, Rid)>>;

    fn output_schema(&self) -> &Schema;
}
