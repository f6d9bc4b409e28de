//! Evidence chain and seed registry, persisted and reopened

use std::fs;
use std::path::Path;

use serde_json::{Map, Value, json};
use verity_ledger::{
    ChainIntegrityError, EvidenceRecord, EvidenceRegistry, GENESIS, LedgerError, SeedRegistry,
    derive_seed, verify_file,
};

fn metadata(score: f64) -> Map<String, Value> {
    let Value::Object(map) = json!({"score": score, "policy_unit_id": "plan_2024"}) else {
        unreachable!()
    };
    map
}

fn read_records(path: &Path) -> Vec<EvidenceRecord> {
    serde_json::from_slice(&fs::read(path).expect("read ledger")).expect("decode ledger")
}

fn write_records(path: &Path, records: &[EvidenceRecord]) {
    fs::write(path, serde_json::to_vec_pretty(records).expect("encode")).expect("write ledger");
}

fn seeded_ledger(path: &Path, count: usize) {
    let ledger = EvidenceRegistry::load(path).unwrap();
    for i in 0..count {
        ledger
            .append(
                "score.coherence",
                vec![format!("output_sha256:{i:064x}")],
                metadata(i as f64 / 10.0),
            )
            .unwrap();
    }
}

#[test]
fn chain_links_from_genesis_and_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("evidence.json");

    let ledger = EvidenceRegistry::load(&path).unwrap();
    let first = ledger
        .append("extract.entities", vec!["entity:ACME".to_string()], metadata(0.5))
        .unwrap();
    let second = ledger
        .append("score.coherence", vec!["final_score:0.8".to_string()], metadata(0.8))
        .unwrap();
    assert_eq!(first.index, 0);
    assert_eq!(first.previous_hash, GENESIS);
    assert_eq!(second.index, 1);
    assert_eq!(second.previous_hash, first.entry_hash);
    drop(ledger);

    let reopened = EvidenceRegistry::load(&path).unwrap();
    assert_eq!(reopened.len(), 2);
    assert_eq!(reopened.last_hash(), second.entry_hash);
    let third = reopened
        .append("report.summary", Vec::new(), Map::new())
        .unwrap();
    assert_eq!(third.index, 2);
    assert_eq!(third.previous_hash, second.entry_hash);
    assert_eq!(verify_file(&path).unwrap(), 3);
}

#[test]
fn edited_metadata_is_a_hash_mismatch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("evidence.json");
    seeded_ledger(&path, 3);

    let mut records = read_records(&path);
    records[1].metadata.insert("score".to_string(), json!(0.99));
    write_records(&path, &records);

    let err = verify_file(&path).unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        LedgerError::Chain(ChainIntegrityError::HashMismatch { index: 1, .. })
    ));
}

#[test]
fn rehashed_forgery_breaks_the_next_link() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("evidence.json");
    seeded_ledger(&path, 3);

    let mut records = read_records(&path);
    records[1].evidence = vec!["output_sha256:forged".to_string()];
    records[1].entry_hash = records[1].compute_hash();
    write_records(&path, &records);

    let Err(LedgerError::Chain(err)) = verify_file(&path) else {
        panic!("expected a chain error");
    };
    assert_eq!(err.index(), 2);
    assert!(matches!(err, ChainIntegrityError::BrokenLink { .. }));
}

#[test]
fn deleted_record_is_an_index_gap() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("evidence.json");
    seeded_ledger(&path, 3);

    let mut records = read_records(&path);
    records.remove(1);
    write_records(&path, &records);

    assert!(matches!(
        verify_file(&path),
        Err(LedgerError::Chain(ChainIntegrityError::IndexMismatch {
            position: 1,
            found: 2
        }))
    ));
}

#[test]
fn tampered_ledger_cannot_be_opened_for_writes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("evidence.json");
    seeded_ledger(&path, 2);

    let mut records = read_records(&path);
    records[0].timestamp = "2020-01-01T00:00:00.000000Z".to_string();
    write_records(&path, &records);

    let err = EvidenceRegistry::load(&path).err().expect("open must fail");
    assert!(err.is_fatal());
    // the file is left exactly as found
    assert_eq!(read_records(&path), records);
}

#[test]
fn seeds_are_stable_per_component_and_audited() {
    let numpy = derive_seed("plan_2024:exec_001:numpy");
    assert_eq!(numpy, derive_seed("plan_2024:exec_001:numpy"));
    assert_ne!(numpy, derive_seed("plan_2024:exec_001:python"));

    let a = SeedRegistry::new();
    let b = SeedRegistry::new();
    let seeds = a.seeds_for_context("plan_2024", "exec_001");
    assert_eq!(seeds, b.seeds_for_context("plan_2024", "exec_001"));
    assert_eq!(seeds["numpy"], numpy);
    assert_eq!(seeds.len(), 5);

    // cached lookups are not audited twice
    a.seeds_for_context("plan_2024", "exec_001");
    a.get_seed("plan_2024", "exec_002", "numpy");
    assert_eq!(a.audit_log().len(), 6);

    let manifest = a.manifest_entry(Some("plan_2024"), Some("exec_001"));
    assert_eq!(manifest.seeds_generated, 5);
    assert_eq!(manifest.seeds_by_component, seeds);
    assert_eq!(manifest.correlation_id.as_deref(), Some("exec_001"));
}
