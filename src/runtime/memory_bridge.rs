// src/runtime/memory_bridge.rs
//! Host/guest memory protocol
//!
//! Passing a task id into the guest takes three steps against the guest's
//! own linear memory:
//!
//! ```text
//! allocate(len) ──→ ptr        guest allocator export
//! write(ptr, id bytes)         host copy into linear memory
//! invoke(ptr, len)             guest entry export, blocks until done
//! ```
//!
//! The bridge never frees the allocation unless the guest provides a release
//! export. When it does, the allocation is released after every invoke, failed
//! or not, and an invoke error wins over a release error. The three steps form
//! one unit: another dispatch against the same
//! linear memory must not run between them.

use crate::utils::errors::{BridgeError, Result};
use crate::vfs::path::TaskId;
use serde::{Deserialize, Serialize};

/// Guest-owned region returned by the allocator export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestAllocation {
    /// Offset into guest linear memory
    pub ptr: u32,

    /// Requested length in bytes
    pub len: u32,
}

/// Calling convention every guest must support
pub trait GuestBridge {
    /// Ask the guest allocator for `size` bytes
    fn allocate(&mut self, size: u32) -> Result<GuestAllocation>;

    /// Copy `bytes` into guest memory at `ptr`
    fn write(&mut self, ptr: u32, bytes: &[u8]) -> Result<()>;

    /// Call the guest entry point with `(ptr, len)`
    fn invoke(&mut self, ptr: u32, len: u32) -> Result<()>;

    /// Hand an allocation back to the guest, when it supports that
    fn release(&mut self, _allocation: GuestAllocation) -> Result<()> {
        Ok(())
    }

    /// Transfer a task id and run the guest on it
    fn dispatch(&mut self, task_id: &TaskId) -> Result<()> {
        let bytes = task_id.as_bytes();
        let len = u32::try_from(bytes.len()).map_err(|_| BridgeError::PayloadTooLarge(bytes.len()))?;

        let allocation = self.allocate(len)?;
        self.write(allocation.ptr, bytes)?;
        let invoked = self.invoke(allocation.ptr, allocation.len);
        let released = self.release(allocation);
        invoked.and(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bump-allocating fake with a fixed-size memory
    struct FakeGuest {
        memory: Vec<u8>,
        next: u32,
        received: Vec<String>,
        released: usize,
        fail_invoke: bool,
        fail_release: bool,
    }

    impl FakeGuest {
        fn new(size: usize) -> Self {
            Self {
                memory: vec![0; size],
                next: 0,
                received: Vec::new(),
                released: 0,
                fail_invoke: false,
                fail_release: false,
            }
        }
    }

    impl GuestBridge for FakeGuest {
        fn allocate(&mut self, size: u32) -> Result<GuestAllocation> {
            let ptr = self.next;
            self.next += size;
            Ok(GuestAllocation { ptr, len: size })
        }

        fn write(&mut self, ptr: u32, bytes: &[u8]) -> Result<()> {
            let start = ptr as usize;
            let end = start + bytes.len();
            if end > self.memory.len() {
                return Err(BridgeError::MemoryOutOfRange {
                    ptr,
                    len: bytes.len(),
                    memory_size: self.memory.len(),
                });
            }
            self.memory[start..end].copy_from_slice(bytes);
            Ok(())
        }

        fn invoke(&mut self, ptr: u32, len: u32) -> Result<()> {
            let start = ptr as usize;
            let id = &self.memory[start..start + len as usize];
            self.received.push(String::from_utf8_lossy(id).into_owned());
            if self.fail_invoke {
                return Err(BridgeError::GuestInvocationFailure {
                    export: "do".to_string(),
                    reason: "unreachable".to_string(),
                });
            }
            Ok(())
        }

        fn release(&mut self, _allocation: GuestAllocation) -> Result<()> {
            self.released += 1;
            if self.fail_release {
                return Err(BridgeError::GuestInvocationFailure {
                    export: "free".to_string(),
                    reason: "unreachable".to_string(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn test_dispatch_transfers_id_bytes() {
        let mut guest = FakeGuest::new(64);
        guest.dispatch(&TaskId::from("abc")).unwrap();
        guest.dispatch(&TaskId::from("defg")).unwrap();

        assert_eq!(guest.received, vec!["abc", "defg"]);
        assert_eq!(guest.released, 2);
        assert_eq!(guest.next, 7);
    }

    #[test]
    fn test_dispatch_stops_on_out_of_range_write() {
        let mut guest = FakeGuest::new(4);
        let err = guest.dispatch(&TaskId::from("too-long")).unwrap_err();

        assert!(matches!(err, BridgeError::MemoryOutOfRange { .. }));
        assert!(err.is_fatal());
        assert!(guest.received.is_empty());
        assert_eq!(guest.released, 0);
    }

    #[test]
    fn test_failed_invoke_still_releases() {
        let mut guest = FakeGuest::new(64);
        guest.fail_invoke = true;
        let err = guest.dispatch(&TaskId::from("abc")).unwrap_err();

        assert!(matches!(err, BridgeError::GuestInvocationFailure { ref export, .. } if export == "do"));
        assert_eq!(guest.received, vec!["abc"]);
        assert_eq!(guest.released, 1);
    }

    #[test]
    fn test_invoke_error_wins_over_release_error() {
        let mut guest = FakeGuest::new(64);
        guest.fail_invoke = true;
        guest.fail_release = true;
        let err = guest.dispatch(&TaskId::from("abc")).unwrap_err();
        assert!(matches!(err, BridgeError::GuestInvocationFailure { ref export, .. } if export == "do"));

        guest.fail_invoke = false;
        let err = guest.dispatch(&TaskId::from("abc")).unwrap_err();
        assert!(matches!(err, BridgeError::GuestInvocationFailure { ref export, .. } if export == "free"));
        assert_eq!(guest.released, 2);
    }
}
