// tests/common/mod.rs
//! Shared fixtures for integration tests

#![allow(dead_code)]

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use sandbox_bridge::harness::guests::REFERENCE_COPY_GUEST;
use sandbox_bridge::runtime::{GuestModule, RuntimeConfig};
use sandbox_bridge::vfs::TaskId;
use std::sync::Arc;

/// Ids starting with this byte trigger the misbehaving variants
pub const POISON_PREFIX: char = '!';

/// Allocation size (id length) on which the bad allocator misbehaves
pub const BAD_ALLOC_LEN: usize = 5;

const ENTRY_ANCHOR: &str = "(local $n i32)\n    (if (i32.gt_u (local.get $len) (i32.const 1000)) (then (return)))";
const MALLOC_ANCHOR: &str = "(local $have i32)\n";

fn patch(anchor: &str, insert: &str) -> String {
    assert!(REFERENCE_COPY_GUEST.contains(anchor), "anchor missing from reference guest");
    REFERENCE_COPY_GUEST.replacen(anchor, &format!("{}\n    {}", anchor, insert), 1)
}

/// Copy guest that traps on ids starting with `!`
pub fn trapping_guest() -> String {
    patch(
        ENTRY_ANCHOR,
        "(if (i32.eq (i32.load8_u (local.get $ptr)) (i32.const 33)) (then unreachable))",
    )
}

/// Copy guest that never returns on ids starting with `!`
pub fn spinning_guest() -> String {
    patch(
        ENTRY_ANCHOR,
        "(if (i32.eq (i32.load8_u (local.get $ptr)) (i32.const 33)) (then (loop $spin (br $spin))))",
    )
}

/// Copy guest whose allocator returns an unmapped pointer for 5-byte requests
pub fn bad_allocator_guest() -> String {
    patch(
        MALLOC_ANCHOR,
        "(if (i32.eq (local.get $size) (i32.const 5)) (then (return (i32.const 0x7fff0000))))",
    )
}

pub fn quiet_config() -> RuntimeConfig {
    RuntimeConfig {
        inherit_stdin: false,
        inherit_stdout: false,
        inherit_stderr: false,
        ..Default::default()
    }
}

pub fn reference_module(config: RuntimeConfig) -> Arc<GuestModule> {
    Arc::new(GuestModule::reference(config).unwrap())
}

pub fn module_from_wat(config: RuntimeConfig, wat: &str) -> Arc<GuestModule> {
    Arc::new(GuestModule::from_bytes(config, wat.as_bytes()).unwrap())
}

pub fn random_payload(rng: &mut StdRng, size: usize) -> Bytes {
    let mut payload = vec![0u8; size];
    rng.fill_bytes(&mut payload);
    Bytes::from(payload)
}

/// `count` generated ids with `size`-byte payloads
pub fn payloads(count: usize, size: usize, seed: u64) -> Vec<(TaskId, Bytes)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (TaskId::generate(), random_payload(&mut rng, size)))
        .collect()
}
