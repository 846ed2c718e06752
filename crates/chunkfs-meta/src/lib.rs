#![warn(missing_docs)]

//! ChunkFS metadata subsystem: directory-tree model, filesystem scanning,
//! path resolution and JSON snapshot persistence.

pub mod error;
pub mod node;
pub mod pathres;
pub mod scan;
pub mod tree;

pub use error::{MetaError, MetaResult};
pub use node::{is_root_path, join_path, FileNode, NodeKind, PATH_SEPARATOR};
pub use pathres::{parse_path, MAX_PATH_DEPTH};
pub use scan::{ScanOptions, ScanStats};
pub use tree::DirectoryTree;
