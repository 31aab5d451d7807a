use super::*;

fn checkpoints(n: u32) -> Vec<(u32, u64, Option<u64>)> {
    (0..n).map(|d| (d, d as u64 * 3, Some(d as u64 * 7))).collect()
}

#[test]
fn test_build_empty() {
    let ladder = SkipLadder::build(&[], 16, 8, 4);
    assert!(ladder.is_empty());
}

#[test]
fn test_build_single_level_below_stride() {
    let cps = checkpoints(10);
    let ladder = SkipLadder::build(&cps, 16, 8, 4);
    assert_eq!(ladder.levels.len(), 1);
    assert!(ladder.levels[0].entries.is_empty());
}

#[test]
fn test_build_l1_populated() {
    let cps = checkpoints(100);
    let ladder = SkipLadder::build(&cps, 16, 8, 4);
    assert_eq!(ladder.levels[0].entries.len(), 100 / 16);
    assert_eq!(ladder.levels[0].entries[0].doc_id, 15);
    assert_eq!(ladder.levels[0].entries[0].doc_index, 15);
}

#[test]
fn test_seek_finds_entry_preceding_target() {
    let cps = checkpoints(1000);
    let ladder = SkipLadder::build(&cps, 16, 8, 4);
    assert!(ladder.levels.len() > 1);
    let found = ladder.seek(500).unwrap();
    assert!(found.doc_id < 500);
    // Must be the deepest (largest) L1 entry strictly below target.
    assert!(found.doc_id >= 500 - 16);
}

#[test]
fn test_seek_before_first_entry_returns_none() {
    let cps = checkpoints(1000);
    let ladder = SkipLadder::build(&cps, 16, 8, 4);
    assert!(ladder.seek(0).is_none());
    assert!(ladder.seek(15).is_none());
}

#[test]
fn test_seek_matches_linear_scan_across_many_targets() {
    let cps = checkpoints(2000);
    let ladder = SkipLadder::build(&cps, 16, 8, 4);
    for target in [20u32, 17, 500, 999, 1999, 1000] {
        let expected = ladder.levels[0].entries.iter().rev().find(|e| e.doc_id < target).copied();
        assert_eq!(ladder.seek(target), expected, "target={}", target);
    }
}
