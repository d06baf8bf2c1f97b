// src/vfs/registry.rs
//! Registry mapping `direction/task-id` paths to virtual files
//!
//! Registration and lookup share one lock, so a registration can never be
//! observed half-done by a concurrent open. The lock covers the maps only:
//! byte I/O on a resolved file happens outside it.

use crate::utils::errors::{BridgeError, Result};
use crate::vfs::path::{TaskId, VirtualPath};
use crate::vfs::virtual_file::{Direction, VirtualFile};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

#[derive(Default)]
struct RegistryMaps {
    inputs: HashMap<TaskId, Arc<VirtualFile>>,
    outputs: HashMap<TaskId, Arc<VirtualFile>>,
}

/// Per-batch virtual filesystem shared by every runtime instance
#[derive(Default)]
pub struct FilesystemRegistry {
    maps: Mutex<RegistryMaps>,
}

impl FilesystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the input/output pair for a task
    pub fn register(
        &self,
        task_id: impl Into<TaskId>,
        input: VirtualFile,
        output: VirtualFile,
    ) -> Result<()> {
        let task_id = task_id.into();
        task_id.validate()?;

        if input.direction() != Direction::Read {
            return Err(BridgeError::DirectionMismatch {
                task_id: task_id.to_string(),
                slot: "input",
                expected: "read-only",
            });
        }
        if output.direction() != Direction::Write {
            return Err(BridgeError::DirectionMismatch {
                task_id: task_id.to_string(),
                slot: "output",
                expected: "write-only",
            });
        }

        let mut maps = self.maps.lock();
        if maps.inputs.contains_key(&task_id) || maps.outputs.contains_key(&task_id) {
            warn!("Rejected duplicate registration for task {}", task_id);
            return Err(BridgeError::AlreadyRegistered(task_id.to_string()));
        }

        trace!("Registering virtual files for task {}", task_id);
        maps.inputs.insert(task_id.clone(), Arc::new(input));
        maps.outputs.insert(task_id, Arc::new(output));
        Ok(())
    }

    /// Resolve a guest path such as `in/<id>` or `out/<id>`
    pub fn open(&self, path: &str) -> Result<Arc<VirtualFile>> {
        let VirtualPath { direction, task_id } = VirtualPath::parse(path)?;
        self.open_task(direction, &task_id)
            .ok_or_else(|| BridgeError::NotFound(path.to_string()))
    }

    /// Look up one side of a task directly
    pub fn open_task(&self, direction: Direction, task_id: &TaskId) -> Option<Arc<VirtualFile>> {
        let maps = self.maps.lock();
        let map = match direction {
            Direction::Read => &maps.inputs,
            Direction::Write => &maps.outputs,
        };
        map.get(task_id).cloned()
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.maps.lock().inputs.contains_key(task_id)
    }

    /// Number of registered tasks
    pub fn len(&self) -> usize {
        self.maps.lock().inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close both files of a task so any drain observes end-of-stream
    pub fn close_task(&self, task_id: &TaskId) {
        let files = {
            let maps = self.maps.lock();
            (maps.inputs.get(task_id).cloned(), maps.outputs.get(task_id).cloned())
        };

        for file in [files.0, files.1].into_iter().flatten() {
            if let Err(e) = file.close() {
                debug!("Closing {} for task {} failed: {}", file.name(), task_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::pipe::pipe;
    use bytes::{Buf, Bytes};
    use std::io::{self, Read, Write};
    use std::thread;

    fn input(data: &'static [u8]) -> VirtualFile {
        VirtualFile::reader("in", Bytes::from_static(data).reader())
    }

    fn output() -> VirtualFile {
        VirtualFile::writer("out", io::sink())
    }

    #[test]
    fn test_register_and_open() {
        let registry = FilesystemRegistry::new();
        registry.register("abc", input(b"seed"), output()).unwrap();

        let file = registry.open("in/abc").unwrap();
        let mut data = Vec::new();
        (&*file).read_to_end(&mut data).unwrap();
        assert_eq!(data, b"seed");

        let out = registry.open("out/abc").unwrap();
        assert_eq!(out.direction(), Direction::Write);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_single_registration() {
        let registry = FilesystemRegistry::new();
        registry.register("abc", input(b"first"), output()).unwrap();

        let err = registry
            .register("abc", input(b"second"), output())
            .unwrap_err();
        assert!(matches!(err, BridgeError::AlreadyRegistered(_)));

        // First registration is still the one resolved
        let file = registry.open("in/abc").unwrap();
        let mut data = Vec::new();
        (&*file).read_to_end(&mut data).unwrap();
        assert_eq!(data, b"first");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_path_validation() {
        let registry = FilesystemRegistry::new();
        registry.register("t", input(b""), output()).unwrap();

        for path in ["in", "in/a/b", "x/t"] {
            assert!(matches!(
                registry.open(path),
                Err(BridgeError::PermissionDenied(_))
            ));
        }
        assert!(matches!(
            registry.open("in/unregistered-id"),
            Err(BridgeError::NotFound(_))
        ));
    }

    #[test]
    fn test_direction_mismatch_rejected_without_insert() {
        let registry = FilesystemRegistry::new();
        let err = registry.register("abc", output(), output()).unwrap_err();
        assert!(matches!(err, BridgeError::DirectionMismatch { slot: "input", .. }));

        let err = registry.register("abc", input(b""), input(b"")).unwrap_err();
        assert!(matches!(err, BridgeError::DirectionMismatch { slot: "output", .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_invalid_task_id_rejected() {
        let registry = FilesystemRegistry::new();
        assert!(matches!(
            registry.register("a/b", input(b""), output()),
            Err(BridgeError::InvalidTaskId(_))
        ));
        assert!(matches!(
            registry.register("", input(b""), output()),
            Err(BridgeError::InvalidTaskId(_))
        ));
    }

    #[test]
    fn test_close_task_ends_stream() {
        let registry = FilesystemRegistry::new();
        let (writer, mut reader) = pipe(2);
        registry
            .register("abc", input(b""), VirtualFile::writer("out", writer))
            .unwrap();

        let out = registry.open("out/abc").unwrap();
        (&*out).write_all(b"partial").unwrap();
        registry.close_task(&TaskId::from("abc"));
        registry.close_task(&TaskId::from("abc"));

        let mut data = Vec::new();
        reader.read_to_end(&mut data).unwrap();
        assert_eq!(data, b"partial");
    }

    #[test]
    fn test_concurrent_registration_is_exclusive() {
        let registry = Arc::new(FilesystemRegistry::new());
        let mut handles = vec![];

        // Eight threads race to register the same ten ids
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                (0..10)
                    .filter(|i| {
                        registry
                            .register(format!("task{}", i), input(b""), output())
                            .is_ok()
                    })
                    .count()
            }));
        }

        let wins: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(wins, 10);
        assert_eq!(registry.len(), 10);
    }
}
