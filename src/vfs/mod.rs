// src/vfs/mod.rs
//! Virtual per-task filesystem
//!
//! - **Virtual File**: one readable or writable stream per slot
//! - **Pipe**: bounded in-memory byte channel for streaming outputs
//! - **Path**: task ids and `in/<id>` / `out/<id>` resolution
//! - **Registry**: concurrent map from task id to its two files
//! - **WASI dir**: the registry exposed as a guest preopen
//!
//! # Architecture
//!
//! ```text
//! guest path_open("in/abc") ──→ RegistryDir ──→ FilesystemRegistry
//!                                                 ├── inputs["abc"]  → reader
//!                                                 └── outputs["abc"] → writer ──→ pipe ──→ drainer
//! ```

pub mod path;
pub mod pipe;
pub mod registry;
pub mod virtual_file;
pub mod wasi_dir;

pub use path::{TaskId, VirtualPath};
pub use pipe::{pipe, PipeReader, PipeWriter};
pub use registry::FilesystemRegistry;
pub use virtual_file::{Direction, FileStat, VirtualFile};
pub use wasi_dir::{GuestFile, RegistryDir};
