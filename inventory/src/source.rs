//! Byte sources the resolver reads inventory documents from.

use std::{
    io,
    path::{Path, PathBuf},
};

use parking_lot::RwLock;

use crate::error::{InventoryError, InventoryResult};

/// Where inventory bytes come from.
///
/// `describe()` doubles as the identity of the source in the shared cache
/// registry, so two sources describing themselves identically are treated as
/// the same inventory.
pub trait InventorySource: Send + Sync {
    fn read(&self) -> InventoryResult<Vec<u8>>;

    fn describe(&self) -> String;
}

/// Inventory file on local disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InventorySource for FileSource {
    fn read(&self) -> InventoryResult<Vec<u8>> {
        std::fs::read(&self.path).map_err(|e| {
            let reason = match e.kind() {
                io::ErrorKind::NotFound => "file does not exist".to_string(),
                _ => e.to_string(),
            };
            InventoryError::SourceNotFound {
                location: self.path.display().to_string(),
                reason,
            }
        })
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// In-memory inventory whose contents can be swapped at runtime.
pub struct MemorySource {
    name: String,
    bytes: RwLock<Option<Vec<u8>>>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: RwLock::new(Some(bytes.into())),
        }
    }

    /// A source that reports `SourceNotFound` until `set` is called.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bytes: RwLock::new(None),
        }
    }

    pub fn set(&self, bytes: impl Into<Vec<u8>>) {
        *self.bytes.write() = Some(bytes.into());
    }

    pub fn clear(&self) {
        *self.bytes.write() = None;
    }
}

impl InventorySource for MemorySource {
    fn read(&self) -> InventoryResult<Vec<u8>> {
        self.bytes
            .read()
            .clone()
            .ok_or_else(|| InventoryError::SourceNotFound {
                location: self.describe(),
                reason: "no content".to_string(),
            })
    }

    fn describe(&self) -> String {
        format!("memory:{}", self.name)
    }
}
