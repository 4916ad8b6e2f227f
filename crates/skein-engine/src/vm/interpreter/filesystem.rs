//! Filesystem capability
//!
//! Instances reach files only through a `FileSystem` handed to them by the
//! host. The capability is shared by `Arc` across clones.

use crate::vm::{VmError, VmResult};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// File access granted to an instance
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// Read a file
    fn read_file(&self, path: &str) -> VmResult<Vec<u8>>;

    /// Write (create or truncate) a file
    fn write_file(&self, path: &str, data: &[u8]) -> VmResult<()>;
}

/// Filesystem rooted at a host directory
#[derive(Debug, Clone)]
pub struct DirFileSystem {
    root: PathBuf,
}

impl DirFileSystem {
    /// Root a filesystem at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> VmResult<PathBuf> {
        let mut resolved = self.root.clone();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir | Component::RootDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(VmError::runtime(format!("path escapes root: {}", path)));
                }
            }
        }
        Ok(resolved)
    }
}

impl FileSystem for DirFileSystem {
    fn read_file(&self, path: &str) -> VmResult<Vec<u8>> {
        let full = self.resolve(path)?;
        std::fs::read(&full).map_err(|e| VmError::runtime(format!("{}: {}", path, e)))
    }

    fn write_file(&self, path: &str, data: &[u8]) -> VmResult<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| VmError::runtime(format!("{}: {}", path, e)))?;
        }
        std::fs::write(&full, data).map_err(|e| VmError::runtime(format!("{}: {}", path, e)))
    }
}
