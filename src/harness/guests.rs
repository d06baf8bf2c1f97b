// src/harness/guests.rs
//! Built-in guest modules
//!
//! The reference guest is a plain WASI preview1 module in text form. It
//! exports the default calling convention (`my_malloc`, `do`, `memory`) plus
//! `my_free` and a `_start` that reads newline-delimited ids from stdin.
//!
//! Memory layout:
//!
//! ```text
//! 0       "in/"
//! 8       "out/"
//! 64      iovec { buf, len }
//! 72      nread / nwritten
//! 76      opened fd
//! 128     path scratch (prefix + id, up to 1024 bytes)
//! 2048    copy buffer (4 KiB)
//! 16384   stdin line buffer (16 KiB)
//! 65536   bump heap for my_malloc
//! ```

/// Copies `in/<id>` to `out/<id>` for every id it is handed
pub const REFERENCE_COPY_GUEST: &str = r#"
(module
  (import "wasi_snapshot_preview1" "path_open"
    (func $path_open (param i32 i32 i32 i32 i32 i64 i64 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_read"
    (func $fd_read (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_close"
    (func $fd_close (param i32) (result i32)))

  (memory (export "memory") 4)
  (data (i32.const 0) "in/")
  (data (i32.const 8) "out/")

  (global $heap (mut i32) (i32.const 65536))

  (func (export "my_malloc") (param $size i32) (result i32)
    (local $ptr i32)
    (local $end i32)
    (local $have i32)
    (local.set $ptr (global.get $heap))
    (local.set $end (i32.add (local.get $ptr) (local.get $size)))
    (local.set $have (i32.mul (memory.size) (i32.const 65536)))
    (if (i32.gt_u (local.get $end) (local.get $have))
      (then
        (if (i32.eq
              (memory.grow
                (i32.add
                  (i32.shr_u (i32.sub (local.get $end) (local.get $have)) (i32.const 16))
                  (i32.const 1)))
              (i32.const -1))
          (then unreachable))))
    (global.set $heap (i32.and (i32.add (local.get $end) (i32.const 7)) (i32.const -8)))
    (local.get $ptr))

  (func (export "my_free") (param $ptr i32)
    (if (i32.lt_u (local.get $ptr) (global.get $heap))
      (then (global.set $heap (local.get $ptr)))))

  (func $do (export "do") (param $ptr i32) (param $len i32)
    (local $in i32)
    (local $out i32)
    (local $n i32)
    (if (i32.gt_u (local.get $len) (i32.const 1000)) (then (return)))

    (memory.copy (i32.const 128) (i32.const 0) (i32.const 3))
    (memory.copy (i32.const 131) (local.get $ptr) (local.get $len))
    (if (call $path_open (i32.const 3) (i32.const 0)
          (i32.const 128) (i32.add (local.get $len) (i32.const 3))
          (i32.const 0) (i64.const 2) (i64.const 0) (i32.const 0) (i32.const 76))
      (then (return)))
    (local.set $in (i32.load (i32.const 76)))

    (memory.copy (i32.const 128) (i32.const 8) (i32.const 4))
    (memory.copy (i32.const 132) (local.get $ptr) (local.get $len))
    (if (call $path_open (i32.const 3) (i32.const 0)
          (i32.const 128) (i32.add (local.get $len) (i32.const 4))
          (i32.const 0) (i64.const 64) (i64.const 0) (i32.const 0) (i32.const 76))
      (then
        (drop (call $fd_close (local.get $in)))
        (return)))
    (local.set $out (i32.load (i32.const 76)))

    (block $done
      (loop $copy
        (i32.store (i32.const 64) (i32.const 2048))
        (i32.store (i32.const 68) (i32.const 4096))
        (br_if $done (call $fd_read (local.get $in) (i32.const 64) (i32.const 1) (i32.const 72)))
        (local.set $n (i32.load (i32.const 72)))
        (br_if $done (i32.eqz (local.get $n)))

        (i32.store (i32.const 64) (i32.const 2048))
        (i32.store (i32.const 68) (local.get $n))
        (block $written
          (loop $write
            (br_if $done (call $fd_write (local.get $out) (i32.const 64) (i32.const 1) (i32.const 72)))
            (br_if $done (i32.eqz (i32.load (i32.const 72))))
            (i32.store (i32.const 64) (i32.add (i32.load (i32.const 64)) (i32.load (i32.const 72))))
            (i32.store (i32.const 68) (i32.sub (i32.load (i32.const 68)) (i32.load (i32.const 72))))
            (br_if $written (i32.eqz (i32.load (i32.const 68))))
            (br $write)))
        (br $copy)))

    (drop (call $fd_close (local.get $in)))
    (drop (call $fd_close (local.get $out))))

  (func $dispatch_line (param $start i32) (param $end i32)
    (if (i32.gt_u (local.get $end) (local.get $start))
      (then
        (call $do
          (i32.add (i32.const 16384) (local.get $start))
          (i32.sub (local.get $end) (local.get $start))))))

  (func (export "_start")
    (local $len i32)
    (local $pos i32)
    (local $line i32)
    (local $n i32)
    (block $eof
      (loop $fill
        (i32.store (i32.const 64) (i32.add (i32.const 16384) (local.get $len)))
        (i32.store (i32.const 68) (i32.sub (i32.const 16384) (local.get $len)))
        (br_if $eof (call $fd_read (i32.const 0) (i32.const 64) (i32.const 1) (i32.const 72)))
        (local.set $n (i32.load (i32.const 72)))
        (br_if $eof (i32.eqz (local.get $n)))
        (local.set $len (i32.add (local.get $len) (local.get $n)))

        (local.set $line (i32.const 0))
        (local.set $pos (i32.const 0))
        (block $scanned
          (loop $scan
            (br_if $scanned (i32.ge_u (local.get $pos) (local.get $len)))
            (if (i32.eq (i32.load8_u (i32.add (i32.const 16384) (local.get $pos))) (i32.const 10))
              (then
                (call $dispatch_line (local.get $line) (local.get $pos))
                (local.set $line (i32.add (local.get $pos) (i32.const 1)))))
            (local.set $pos (i32.add (local.get $pos) (i32.const 1)))
            (br $scan)))

        (local.set $len (i32.sub (local.get $len) (local.get $line)))
        (memory.copy
          (i32.const 16384)
          (i32.add (i32.const 16384) (local.get $line))
          (local.get $len))
        (br $fill)))
    (call $dispatch_line (i32.const 0) (local.get $len)))
)
"#;
