//! Tests for punch (epoch-scoped logical delete)
//!
//! These tests verify:
//! - A punch hides older versions from its epoch onward
//! - Reads below the punch epoch still see the older value
//! - A later update revives the extent
//! - Punches are invisible to iterators inside their window
//! - Punches cost no pool space

use epochkv::engine::Engine;
use epochkv::{ContainerId, EpochRange, IoDesc, IterEntry, IterKind, IterParam, ObjectId, Recx};

// =============================================================================
// Helper Functions
// =============================================================================

const COH: ContainerId = ContainerId::from_bytes([7; 16]);
const OID: ObjectId = ObjectId { hi: 0, lo: 42 };

fn put(engine: &Engine, epoch: u64, dkey: &[u8], akey: &[u8], value: &[u8]) {
    let iod = IoDesc::new(akey, Recx::single(0, value.len() as u64));
    engine.update(COH, OID, epoch, dkey, &[iod], &[value]).unwrap();
}

fn punch(engine: &Engine, epoch: u64, dkey: &[u8], akey: &[u8]) {
    let iod = IoDesc::new(akey, Recx::single(0, 0));
    engine.punch(COH, OID, epoch, dkey, &[iod]).unwrap();
}

fn get(engine: &Engine, epoch: u64, dkey: &[u8], akey: &[u8]) -> Option<Vec<u8>> {
    let mut iods = [IoDesc::new(akey, Recx::any(0, 1))];
    let mut bufs = [Vec::new()];
    match engine.fetch(COH, OID, epoch, dkey, &mut iods, &mut bufs) {
        Ok(()) => Some(bufs[0].clone()),
        Err(e) if e.is_not_found() => None,
        Err(e) => panic!("unexpected fetch error: {}", e),
    }
}

fn dkeys(engine: &Engine, epr: EpochRange) -> Vec<Vec<u8>> {
    let param = IterParam::new(COH).object(OID).epoch_range(epr);
    let mut cursor = engine.iter_prepare(IterKind::Dkey, &param).unwrap();
    let mut out = Vec::new();
    if cursor.probe(None).is_err() {
        return out;
    }
    loop {
        let (entry, _) = cursor.fetch().unwrap();
        if let IterEntry::Dkey(key) = entry {
            out.push(key);
        }
        if cursor.next().is_err() {
            break;
        }
    }
    out
}

// =============================================================================
// Punch Ordering Tests
// =============================================================================

#[test]
fn test_punch_hides_value_from_its_epoch() {
    let engine = Engine::in_memory().unwrap();

    put(&engine, 10, b"d", b"a", b"value");
    punch(&engine, 20, b"d", b"a");

    assert_eq!(get(&engine, 20, b"d", b"a"), None);
    assert_eq!(get(&engine, 100, b"d", b"a"), None);
}

#[test]
fn test_punch_preserves_history_below_its_epoch() {
    let engine = Engine::in_memory().unwrap();

    put(&engine, 10, b"d", b"a", b"value");
    punch(&engine, 20, b"d", b"a");

    assert_eq!(get(&engine, 10, b"d", b"a"), Some(b"value".to_vec()));
    assert_eq!(get(&engine, 19, b"d", b"a"), Some(b"value".to_vec()));
}

#[test]
fn test_update_after_punch_revives() {
    let engine = Engine::in_memory().unwrap();

    put(&engine, 10, b"d", b"a", b"first");
    punch(&engine, 20, b"d", b"a");
    put(&engine, 30, b"d", b"a", b"second");

    assert_eq!(get(&engine, 25, b"d", b"a"), None);
    assert_eq!(get(&engine, 30, b"d", b"a"), Some(b"second".to_vec()));
}

#[test]
fn test_punch_of_never_written_key() {
    let engine = Engine::in_memory().unwrap();

    punch(&engine, 5, b"d", b"ghost");

    assert_eq!(get(&engine, 5, b"d", b"ghost"), None);
    assert_eq!(engine.space_used(), 0);
}

#[test]
fn test_punch_only_touches_named_akey() {
    let engine = Engine::in_memory().unwrap();

    put(&engine, 1, b"d", b"keep", b"k");
    put(&engine, 1, b"d", b"drop", b"x");
    punch(&engine, 2, b"d", b"drop");

    assert_eq!(get(&engine, 2, b"d", b"keep"), Some(b"k".to_vec()));
    assert_eq!(get(&engine, 2, b"d", b"drop"), None);
}

#[test]
fn test_punch_rsize_is_forced_to_zero() {
    let engine = Engine::in_memory().unwrap();
    put(&engine, 1, b"d", b"a", b"value");

    // The descriptor's rsize is ignored by punch
    let iod = IoDesc::new("a", Recx::single(0, 5));
    engine.punch(COH, OID, 2, b"d", &[iod]).unwrap();

    assert_eq!(get(&engine, 2, b"d", b"a"), None);
}

// =============================================================================
// Iteration Visibility Tests
// =============================================================================

#[test]
fn test_punched_dkey_hidden_from_iteration() {
    let engine = Engine::in_memory().unwrap();

    put(&engine, 1, b"alive", b"a", b"x");
    put(&engine, 1, b"dead", b"a", b"y");
    punch(&engine, 5, b"dead", b"a");

    assert_eq!(dkeys(&engine, EpochRange::full()), vec![b"alive".to_vec()]);
}

#[test]
fn test_punched_dkey_visible_in_earlier_window() {
    let engine = Engine::in_memory().unwrap();

    put(&engine, 1, b"alive", b"a", b"x");
    put(&engine, 1, b"dead", b"a", b"y");
    punch(&engine, 5, b"dead", b"a");

    assert_eq!(
        dkeys(&engine, EpochRange::upto(4)),
        vec![b"alive".to_vec(), b"dead".to_vec()]
    );
}

#[test]
fn test_dkey_with_one_live_akey_stays_visible() {
    let engine = Engine::in_memory().unwrap();

    put(&engine, 1, b"d", b"a1", b"x");
    put(&engine, 1, b"d", b"a2", b"y");
    punch(&engine, 2, b"d", b"a1");

    assert_eq!(dkeys(&engine, EpochRange::full()), vec![b"d".to_vec()]);
}

// =============================================================================
// Space Accounting Tests
// =============================================================================

#[test]
fn test_punch_consumes_no_space() {
    let engine = Engine::in_memory().unwrap();
    put(&engine, 1, b"d", b"a", b"0123456789");
    let used = engine.space_used();

    punch(&engine, 2, b"d", b"a");

    assert_eq!(engine.space_used(), used);
}

#[test]
fn test_same_epoch_punch_releases_replaced_value() {
    let engine = Engine::in_memory().unwrap();
    put(&engine, 1, b"d", b"a", b"0123456789");
    assert_eq!(engine.space_used(), 10);

    punch(&engine, 1, b"d", b"a");

    assert_eq!(engine.space_used(), 0);
}
