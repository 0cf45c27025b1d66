//! Tests for zero-copy I/O
//!
//! These tests verify:
//! - update_begin/buffer_mut/update_end round trips through both fetch paths
//! - Nothing is visible before update_end succeeds
//! - A failed status or dropped handle releases reserved space
//! - fetch_begin exposes stored bytes read-only
//! - Phase and index misuse is rejected

use epochkv::config::Config;
use epochkv::engine::Engine;
use epochkv::{ContainerId, IoDesc, KvError, ObjectId, Recx};

// =============================================================================
// Helper Functions
// =============================================================================

const COH: ContainerId = ContainerId::from_u128(4);
const OID: ObjectId = ObjectId::new(0, 4);

fn zc_put(engine: &Engine, epoch: u64, dkey: &[u8], iods: &[IoDesc], values: &[&[u8]]) {
    let mut handle = engine.update_begin(COH, OID, epoch, dkey, iods).unwrap();
    for (i, value) in values.iter().enumerate() {
        handle.buffer_mut(i).unwrap().copy_from_slice(value);
    }
    engine.update_end(handle, Ok(())).unwrap();
}

fn buffered_get(engine: &Engine, epoch: u64, dkey: &[u8], akey: &str) -> epochkv::Result<Vec<u8>> {
    let mut iods = [IoDesc::new(akey, Recx::any(0, 1))];
    let mut bufs = [Vec::new()];
    engine.fetch(COH, OID, epoch, dkey, &mut iods, &mut bufs)?;
    Ok(bufs[0].clone())
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_zero_copy_update_then_buffered_fetch() {
    let engine = Engine::in_memory().unwrap();
    let iods = [IoDesc::new("a", Recx::single(0, 5))];

    zc_put(&engine, 1, b"d", &iods, &[b"hello"]);

    assert_eq!(buffered_get(&engine, 1, b"d", "a").unwrap(), b"hello");
}

#[test]
fn test_buffered_update_then_zero_copy_fetch() {
    let engine = Engine::in_memory().unwrap();
    let iods = [
        IoDesc::new("a", Recx::single(0, 3)),
        IoDesc::new("b", Recx::new(0, 2, 2)),
    ];
    engine.update(COH, OID, 1, b"d", &iods, &[b"abc", b"wxyz"]).unwrap();

    let fetch_iods = [IoDesc::new("b", Recx::any(0, 2)), IoDesc::new("a", Recx::any(0, 1))];
    let handle = engine.fetch_begin(COH, OID, 1, b"d", &fetch_iods).unwrap();

    assert!(!handle.is_update());
    assert_eq!(handle.buffer_count(), 2);
    assert_eq!(handle.buffer(0).unwrap(), b"wxyz");
    assert_eq!(handle.buffer(1).unwrap(), b"abc");
    assert_eq!(handle.iods()[0].recx.rsize, 2);
    assert_eq!(handle.iods()[1].recx.rsize, 3);

    engine.fetch_end(handle).unwrap();
}

#[test]
fn test_zero_copy_matches_buffered_path() {
    let engine = Engine::in_memory().unwrap();
    let payload: Vec<u8> = (0..64).collect();
    let iods = [IoDesc::new("a", Recx::new(0, 4, 16))];

    engine.update(COH, OID, 1, b"buffered", &iods, &[&payload[..]]).unwrap();
    zc_put(&engine, 1, b"zero-copy", &iods, &[&payload[..]]);

    let fetch_iods = [IoDesc::new("a", Recx::any(0, 4))];
    let a = engine.fetch_begin(COH, OID, 1, b"buffered", &fetch_iods).unwrap();
    let b = engine.fetch_begin(COH, OID, 1, b"zero-copy", &fetch_iods).unwrap();

    assert_eq!(a.buffer(0).unwrap(), b.buffer(0).unwrap());
    assert_eq!(a.buffer(0).unwrap(), &payload[..]);

    engine.fetch_end(a).unwrap();
    engine.fetch_end(b).unwrap();
}

#[test]
fn test_update_buffers_sized_to_extent() {
    let engine = Engine::in_memory().unwrap();
    let iods = [IoDesc::new("a", Recx::new(0, 3, 8)), IoDesc::new("b", Recx::single(0, 1))];

    let mut handle = engine.update_begin(COH, OID, 1, b"d", &iods).unwrap();

    assert!(handle.is_update());
    assert_eq!(handle.epoch(), 1);
    assert_eq!(handle.buffer_mut(0).unwrap().len(), 24);
    assert_eq!(handle.buffer_mut(1).unwrap().len(), 1);
    assert!(handle.buffer(0).unwrap().iter().all(|b| *b == 0));

    engine.update_end(handle, Ok(())).unwrap();
}

// =============================================================================
// Visibility Tests
// =============================================================================

#[test]
fn test_update_invisible_until_end() {
    let engine = Engine::in_memory().unwrap();
    let iods = [IoDesc::new("a", Recx::single(0, 4))];

    let mut handle = engine.update_begin(COH, OID, 1, b"d", &iods).unwrap();
    handle.buffer_mut(0).unwrap().copy_from_slice(b"data");

    assert!(buffered_get(&engine, 1, b"d", "a").unwrap_err().is_not_found());

    engine.update_end(handle, Ok(())).unwrap();
    assert_eq!(buffered_get(&engine, 1, b"d", "a").unwrap(), b"data");
}

#[test]
fn test_fetch_handle_keeps_its_snapshot() {
    let engine = Engine::in_memory().unwrap();
    let iods = [IoDesc::new("a", Recx::single(0, 3))];
    engine.update(COH, OID, 5, b"d", &iods, &[b"old"]).unwrap();

    let handle = engine
        .fetch_begin(COH, OID, 5, b"d", &[IoDesc::new("a", Recx::any(0, 1))])
        .unwrap();
    engine.update(COH, OID, 5, b"d", &iods, &[b"new"]).unwrap();

    assert_eq!(handle.buffer(0).unwrap(), b"old");
    engine.fetch_end(handle).unwrap();
    assert_eq!(buffered_get(&engine, 5, b"d", "a").unwrap(), b"new");
}

// =============================================================================
// Failure and Release Tests
// =============================================================================

#[test]
fn test_update_end_with_error_discards() {
    let engine = Engine::in_memory().unwrap();
    let iods = [IoDesc::new("a", Recx::single(0, 8))];

    let mut handle = engine.update_begin(COH, OID, 1, b"d", &iods).unwrap();
    handle.buffer_mut(0).unwrap().copy_from_slice(b"discard!");
    assert_eq!(engine.space_used(), 8);

    let err = engine
        .update_end(handle, Err(KvError::Internal("caller aborted".to_string())))
        .unwrap_err();

    assert!(matches!(err, KvError::Internal(_)));
    assert_eq!(engine.space_used(), 0);
    assert!(buffered_get(&engine, 1, b"d", "a").unwrap_err().is_not_found());
}

#[test]
fn test_dropped_handle_releases_space() {
    let engine = Engine::in_memory().unwrap();
    let iods = [IoDesc::new("a", Recx::single(0, 8))];

    let handle = engine.update_begin(COH, OID, 1, b"d", &iods).unwrap();
    assert_eq!(engine.space_used(), 8);
    drop(handle);

    assert_eq!(engine.space_used(), 0);
    assert_eq!(engine.object_cache().pinned(), 0);
}

#[test]
fn test_update_begin_out_of_space() {
    let engine = Engine::open(Config::builder().pool_capacity(16).build()).unwrap();
    let iods = [IoDesc::new("a", Recx::single(0, 17))];

    let err = engine.update_begin(COH, OID, 1, b"d", &iods).unwrap_err();

    assert!(matches!(err, KvError::OutOfSpace { requested: 17, available: 16 }));
    assert_eq!(engine.object_count(COH), 0);
    assert!(engine.object_cache().is_empty());
}

#[test]
fn test_fetch_begin_missing_not_found() {
    let engine = Engine::in_memory().unwrap();

    let err = engine
        .fetch_begin(COH, OID, 1, b"d", &[IoDesc::new("a", Recx::any(0, 1))])
        .unwrap_err();

    assert!(err.is_not_found());
}

// =============================================================================
// Misuse Tests
// =============================================================================

#[test]
fn test_fetch_buffers_are_read_only() {
    let engine = Engine::in_memory().unwrap();
    let iods = [IoDesc::new("a", Recx::single(0, 1))];
    engine.update(COH, OID, 1, b"d", &iods, &[b"x"]).unwrap();

    let mut handle = engine.fetch_begin(COH, OID, 1, b"d", &iods).unwrap();

    assert!(matches!(handle.buffer_mut(0), Err(KvError::InvalidArgument(_))));
    engine.fetch_end(handle).unwrap();
}

#[test]
fn test_buffer_index_out_of_range() {
    let engine = Engine::in_memory().unwrap();
    let iods = [IoDesc::new("a", Recx::single(0, 1))];

    let mut handle = engine.update_begin(COH, OID, 1, b"d", &iods).unwrap();

    assert!(matches!(handle.buffer_mut(1), Err(KvError::InvalidArgument(_))));
    assert!(matches!(handle.buffer(5), Err(KvError::InvalidArgument(_))));
    engine.update_end(handle, Ok(())).unwrap();
}

#[test]
fn test_end_with_wrong_phase_is_invalid() {
    let engine = Engine::in_memory().unwrap();
    let iods = [IoDesc::new("a", Recx::single(0, 1))];
    engine.update(COH, OID, 1, b"d", &iods, &[b"x"]).unwrap();

    let fetch = engine.fetch_begin(COH, OID, 1, b"d", &iods).unwrap();
    assert!(matches!(engine.update_end(fetch, Ok(())), Err(KvError::InvalidArgument(_))));

    let update = engine.update_begin(COH, OID, 2, b"d", &iods).unwrap();
    assert!(matches!(engine.fetch_end(update), Err(KvError::InvalidArgument(_))));

    // Neither handle took effect or kept space
    assert_eq!(engine.space_used(), 1);
    assert_eq!(engine.object_cache().pinned(), 0);
}

#[test]
fn test_update_begin_validates_descriptors() {
    let engine = Engine::in_memory().unwrap();

    let any_size = [IoDesc::new("a", Recx::any(0, 1))];
    assert!(matches!(
        engine.update_begin(COH, OID, 1, b"d", &any_size),
        Err(KvError::InvalidArgument(_))
    ));
    assert!(matches!(
        engine.update_begin(COH, OID, 1, b"", &[IoDesc::new("a", Recx::single(0, 1))]),
        Err(KvError::InvalidArgument(_))
    ));
}
