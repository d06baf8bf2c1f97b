// src/vfs/wasi_dir.rs
//! WASI preview1 adapter exposing the registry as a preopened directory
//!
//! The guest's `path_open` calls land in [`RegistryDir::open_file`], which
//! resolves the relative path through [`FilesystemRegistry::open`]. The
//! returned [`GuestFile`] forwards `fd_read`/`fd_write` to the virtual file and
//! closes it when the guest closes the descriptor.

use crate::utils::errors::BridgeError;
use crate::vfs::registry::FilesystemRegistry;
use crate::vfs::virtual_file::VirtualFile;
use std::any::Any;
use std::io::{self, IoSlice, IoSliceMut};
use std::sync::Arc;
use tracing::{debug, trace};
use wasi_common::dir::{OpenResult, WasiDir};
use wasi_common::file::{FdFlags, FileType, Filestat, OFlags, WasiFile};
use wasi_common::{Error, ErrorExt};

/// Preopened directory backed by the task registry
pub struct RegistryDir {
    registry: Arc<FilesystemRegistry>,
}

impl RegistryDir {
    pub fn new(registry: Arc<FilesystemRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait::async_trait]
impl WasiDir for RegistryDir {
    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn open_file(
        &self,
        _symlink_follow: bool,
        path: &str,
        oflags: OFlags,
        _read: bool,
        _write: bool,
        _fdflags: FdFlags,
    ) -> Result<OpenResult, Error> {
        if oflags.contains(OFlags::DIRECTORY) {
            return Err(Error::not_dir());
        }
        // Every resolvable path already exists
        if oflags.contains(OFlags::CREATE | OFlags::EXCLUSIVE) {
            return Err(Error::exist());
        }

        let file = self.registry.open(path).map_err(|e| {
            debug!("Guest open of {:?} rejected: {}", path, e);
            to_wasi_error(&e)
        })?;

        trace!("Guest opened {}", path);
        Ok(OpenResult::File(Box::new(GuestFile::new(file))))
    }

    async fn get_filestat(&self) -> Result<Filestat, Error> {
        Ok(synthetic_filestat(FileType::Directory))
    }

    async fn get_path_filestat(
        &self,
        path: &str,
        _follow_symlinks: bool,
    ) -> Result<Filestat, Error> {
        self.registry
            .open(path)
            .map(|_| synthetic_filestat(FileType::RegularFile))
            .map_err(|e| to_wasi_error(&e))
    }
}

/// Guest-side handle to a virtual file
pub struct GuestFile {
    file: Arc<VirtualFile>,
}

impl GuestFile {
    pub fn new(file: Arc<VirtualFile>) -> Self {
        Self { file }
    }
}

impl Drop for GuestFile {
    fn drop(&mut self) {
        if let Err(e) = self.file.close() {
            debug!("Closing virtual file {} failed: {}", self.file.name(), e);
        }
    }
}

#[async_trait::async_trait]
impl WasiFile for GuestFile {
    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn get_filetype(&self) -> Result<FileType, Error> {
        Ok(FileType::RegularFile)
    }

    async fn get_filestat(&self) -> Result<Filestat, Error> {
        Ok(synthetic_filestat(FileType::RegularFile))
    }

    async fn read_vectored<'a>(&self, bufs: &mut [IoSliceMut<'a>]) -> Result<u64, Error> {
        match bufs.iter_mut().find(|b| !b.is_empty()) {
            Some(buf) => self
                .file
                .read(buf)
                .map(|n| n as u64)
                .map_err(|e| io_to_wasi_error(&e)),
            None => Ok(0),
        }
    }

    async fn write_vectored<'a>(&self, bufs: &[IoSlice<'a>]) -> Result<u64, Error> {
        let mut total = 0u64;
        for buf in bufs {
            let mut offset = 0;
            while offset < buf.len() {
                let n = self
                    .file
                    .write(&buf[offset..])
                    .map_err(|e| io_to_wasi_error(&e))?;
                if n == 0 {
                    return Err(Error::io());
                }
                offset += n;
            }
            total += buf.len() as u64;
        }
        Ok(total)
    }
}

fn synthetic_filestat(filetype: FileType) -> Filestat {
    Filestat {
        device_id: 0,
        inode: 0,
        filetype,
        nlink: 1,
        size: 0,
        atim: None,
        mtim: None,
        ctim: None,
    }
}

fn to_wasi_error(err: &BridgeError) -> Error {
    match err {
        BridgeError::NotFound(_) => Error::not_found(),
        BridgeError::PermissionDenied(_) => Error::perm(),
        _ => Error::io(),
    }
}

fn io_to_wasi_error(err: &io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::PermissionDenied => Error::badf(),
        _ => Error::io(),
    }
}
