//! Inventory resolution core for the homelab MCP tools.
//!
//! Turns a hierarchical host/group inventory into immutable snapshots that
//! every service adapter reads from:
//!
//! - [`parser`]: YAML document -> ordered groups and host records
//! - [`graph`]: group nesting, cycle detection, ancestor chains
//! - [`merge`]: per-host variable precedence
//! - [`capability`]: capability table and host index
//! - [`projection`]: sorted enum lists for tool-parameter schemas
//! - [`snapshot`]: the resolved view and its lookups
//! - [`cache`]: hot-reloadable cache, shared or isolated per owner
//!
//! ## Shared Types
//!
//! - [`InventoryConfig`]: YAML/env configuration
//! - [`InventoryError`]: error taxonomy for loads and lookups

pub mod config;
pub mod error;
pub mod source;

// Pipeline stages
pub mod capability;
pub mod graph;
pub mod merge;
pub mod parser;
pub mod projection;
pub mod snapshot;

pub mod cache;

pub use cache::{CacheMode, InventoryCache, InventoryHandle};
pub use capability::{Capability, CapabilityIndex, CapabilityTable, Predicate};
pub use config::{CapabilityGroups, InventoryConfig};
pub use error::{InventoryError, InventoryResult, LoadError};
pub use graph::{GroupGraph, ALL_GROUP};
pub use merge::MergedHostConfig;
pub use parser::{parse_document, GroupDef, HostRecord, InventoryDocument, VarMap};
pub use projection::{normalize_host_name, EnumProjection};
pub use snapshot::{GroupView, InventorySummary, ResolveOptions, Snapshot};
pub use source::{FileSource, InventorySource, MemorySource};
