//! Tests for pool space accounting
//!
//! These tests verify:
//! - Reservations commit, or return their bytes when dropped
//! - Reservations never overshoot capacity, even concurrently
//! - A pool sized for K records refuses the (K+1)-th, keeping the K
//! - Same-epoch replacement returns the replaced bytes
//! - Filling a pool ends in OutOfSpace with every earlier write intact

use std::sync::Arc;

use epochkv::config::Config;
use epochkv::engine::Engine;
use epochkv::storage::SpaceManager;
use epochkv::{ContainerId, IoDesc, KvError, ObjectId, Recx};

// =============================================================================
// Helper Functions
// =============================================================================

const COH: ContainerId = ContainerId::from_u128(5);
const OID: ObjectId = ObjectId::new(0, 5);

fn engine_with_capacity(capacity: u64) -> Engine {
    Engine::open(Config::builder().pool_capacity(capacity).build()).unwrap()
}

fn put_record(engine: &Engine, epoch: u64, dkey: &[u8], value: &[u8]) -> epochkv::Result<()> {
    let iod = IoDesc::new("akey", Recx::single(0, value.len() as u64));
    engine.update(COH, OID, epoch, dkey, &[iod], &[value])
}

fn get_record(engine: &Engine, dkey: &[u8]) -> Vec<u8> {
    let mut iods = [IoDesc::new("akey", Recx::any(0, 1))];
    let mut bufs = [Vec::new()];
    engine
        .fetch(COH, OID, u64::MAX, dkey, &mut iods, &mut bufs)
        .unwrap();
    bufs[0].clone()
}

// =============================================================================
// SpaceManager Tests
// =============================================================================

#[test]
fn test_reserve_and_commit() {
    let space = SpaceManager::new(100);

    let reservation = space.reserve(40).unwrap();
    assert_eq!(reservation.len(), 40);
    assert_eq!(space.used(), 40);

    reservation.commit();
    assert_eq!(space.used(), 40);
    assert_eq!(space.available(), 60);
}

#[test]
fn test_dropped_reservation_returns_bytes() {
    let space = SpaceManager::new(100);

    {
        let _reservation = space.reserve(70).unwrap();
        assert_eq!(space.available(), 30);
    }

    assert_eq!(space.used(), 0);
}

#[test]
fn test_reserve_beyond_capacity() {
    let space = SpaceManager::new(100);
    space.charge(90).unwrap();

    let err = space.reserve(11).unwrap_err();

    assert!(matches!(err, KvError::OutOfSpace { requested: 11, available: 10 }));
    assert!(space.reserve(10).is_ok());
}

#[test]
fn test_release_returns_committed_bytes() {
    let space = SpaceManager::new(100);
    space.charge(50).unwrap();

    space.release(20);

    assert_eq!(space.used(), 30);
}

#[test]
fn test_zero_length_reservation() {
    let space = SpaceManager::new(1);
    space.charge(1).unwrap();

    let reservation = space.reserve(0).unwrap();

    assert!(reservation.is_empty());
    drop(reservation);
    assert_eq!(space.used(), 1);
}

#[test]
fn test_concurrent_reservations_never_overshoot() {
    let space = SpaceManager::new(1000);
    let granted = std::sync::atomic::AtomicU64::new(0);

    crossbeam::scope(|s| {
        for _ in 0..8 {
            let space = Arc::clone(&space);
            let granted = &granted;
            s.spawn(move |_| {
                for _ in 0..50 {
                    if let Ok(r) = space.reserve(7) {
                        r.commit();
                        granted.fetch_add(7, std::sync::atomic::Ordering::SeqCst);
                    }
                }
            });
        }
    })
    .unwrap();

    let granted = granted.load(std::sync::atomic::Ordering::SeqCst);
    assert_eq!(space.used(), granted);
    assert!(granted <= 1000);
    assert_eq!(granted, 994);
}

// =============================================================================
// Engine Capacity Tests
// =============================================================================

#[test]
fn test_k_plus_one_records_out_of_space() {
    const K: u64 = 16;
    const RSIZE: u64 = 64;
    let engine = engine_with_capacity(K * RSIZE);

    for i in 0..K {
        let value = vec![i as u8; RSIZE as usize];
        put_record(&engine, i + 1, format!("dkey{}", i).as_bytes(), &value).unwrap();
    }

    let err = put_record(&engine, K + 1, b"one too many", &[0xaa; RSIZE as usize]).unwrap_err();
    assert!(matches!(err, KvError::OutOfSpace { requested: RSIZE, available: 0 }));

    for i in 0..K {
        assert_eq!(get_record(&engine, format!("dkey{}", i).as_bytes()), vec![i as u8; RSIZE as usize]);
    }
}

#[test]
fn test_out_of_space_multi_extent_update_writes_nothing() {
    let engine = engine_with_capacity(10);
    let iods = [
        IoDesc::new("a", Recx::single(0, 6)),
        IoDesc::new("b", Recx::single(0, 6)),
    ];

    let err = engine
        .update(COH, OID, 1, b"d", &iods, &[b"123456", b"abcdef"])
        .unwrap_err();

    assert!(matches!(err, KvError::OutOfSpace { requested: 12, .. }));
    assert_eq!(engine.space_used(), 0);
    let mut fetch = [IoDesc::new("a", Recx::any(0, 1))];
    let mut bufs = [Vec::new()];
    assert!(engine
        .fetch(COH, OID, 1, b"d", &mut fetch, &mut bufs)
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_same_epoch_replacement_returns_bytes() {
    let engine = engine_with_capacity(100);

    put_record(&engine, 1, b"d", &[1; 60]).unwrap();
    put_record(&engine, 1, b"d", &[2; 60]).unwrap();
    assert_eq!(engine.space_used(), 60);

    put_record(&engine, 1, b"d", &[3; 10]).unwrap();
    assert_eq!(engine.space_used(), 10);
}

#[test]
fn test_newer_epoch_keeps_old_version_charged() {
    let engine = engine_with_capacity(100);

    put_record(&engine, 1, b"d", &[1; 60]).unwrap();
    let err = put_record(&engine, 2, b"d", &[2; 60]).unwrap_err();

    assert!(matches!(err, KvError::OutOfSpace { .. }));
    assert_eq!(get_record(&engine, b"d"), vec![1; 60]);
}

#[test]
fn test_fill_pool_until_out_of_space() {
    let engine = engine_with_capacity(16 * 1024 * 1024);
    let value = vec![0x5a; 64 * 1024];

    let mut written = 0u64;
    let err = loop {
        let dkey = format!("fill{:05}", written);
        match put_record(&engine, written + 1, dkey.as_bytes(), &value) {
            Ok(()) => written += 1,
            Err(e) => break e,
        }
    };

    assert!(matches!(err, KvError::OutOfSpace { .. }));
    assert_eq!(written, 256);
    assert_eq!(engine.space_available(), 0);
    assert_eq!(get_record(&engine, b"fill00000"), value);
    assert_eq!(get_record(&engine, b"fill00255"), value);
}
