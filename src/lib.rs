//! xdbi — a graph-aware, file-backed JSON entity store with per-graph
//! advisory locking, merge-on-add / cascading-delete CRUD, edge
//! discovery, three-way JSON merge, and a federation layer over
//! direct, remote, and multi-source backends.

pub mod builders;
pub mod config;
pub mod db_interface;
pub mod document;
pub mod engine;
pub mod error;
pub mod federation;
pub mod http_server;
pub mod layout;
pub mod lock;
pub mod merge;
pub mod observability;
pub mod types;
pub mod validation;
pub mod wrappers;

pub use builders::EntityBuilder;
pub use db_interface::{DbInterface, DirectInterface, RemoteInterface};
pub use document::Edge;
pub use engine::StorageEngine;
pub use error::{Result, XdbiError};
pub use federation::{FederatedInterface, ImportServer};
pub use layout::Layout;
pub use lock::{GraphLock, GraphLockGuard, LockedGraph};
pub use merge::three_way_merge;
pub use observability::{init_logging, init_logging_with_level, Operation};
pub use types::{uri_to_uuid, DeletePolicy, GraphName};
pub use wrappers::TracedInterface;
