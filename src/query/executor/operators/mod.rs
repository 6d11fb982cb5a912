// Query Operators
//
// The iterator-model operators. Each one implements `Executor`; the
// engine wires them together from a plan tree.

pub mod delete;
pub mod index_scan;
pub mod insert;
pub mod limit;
pub mod nested_index_join;
pub mod nested_loop_join;
pub mod seq_scan;
pub mod sort;
pub mod topn;
pub mod values;

pub use delete::DeleteExecutor;
pub use index_scan::IndexScanExecutor;
pub use insert::InsertExecutor;
pub use limit::LimitExecutor;
pub use nested_index_join::NestedIndexJoinExecutor;
pub use nested_loop_join::NestedLoopJoinExecutor;
pub use seq_scan::SeqScanExecutor;
pub use sort::SortExecutor;
pub use topn::TopNExecutor;
pub use values::ValuesExecutor;
