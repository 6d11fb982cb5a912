// B+Tree Index Module
//
// A paged B+Tree over the buffer pool. Readers crab down the tree with
// per-page read latches; writers keep the chain of unsafe ancestors
// write-latched until the mutation is proved local.

pub mod error;
pub mod index;
pub mod node;
pub mod serialization;

pub use error::BTreeError;
pub use index::{BTreeIndex, TreeIterator};
pub use node::BTreeNode;
pub use serialization::{deserialize_node, serialize_node};
