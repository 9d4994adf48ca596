use std::path::Path;

use proptest::prelude::*;

use assetgate_core::chain::compute_event_hash;
use assetgate_core::model::{AuditEvent, CustodyAction, Decision};
use assetgate_engine::{AuditLedger, CandidateEvent};

fn candidate(asset_id: u64, actor: u64) -> CandidateEvent {
    CandidateEvent {
        asset_id,
        actor_user_id: actor,
        action: CustodyAction::CheckOut,
        decision: Decision::Allow,
        site_id: Some(1),
        target_user_id: None,
        approval_id: None,
        verification_summary: Some("{\"schema_version\":1}".to_string()),
    }
}

fn populate(path: &Path, events: usize) {
    let ledger = AuditLedger::open_or_create(path).expect("open");
    for i in 0..events {
        ledger
            .append(candidate(i as u64 % 5, i as u64 % 3))
            .expect("append");
    }
}

fn read_records(path: &Path) -> Vec<AuditEvent> {
    let bytes = std::fs::read(path).expect("read file");
    let mut events = Vec::new();
    let mut pos = 0usize;
    while pos + 4 <= bytes.len() {
        let len = u32::from_le_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
            as usize;
        pos += 4;
        events.push(serde_json::from_slice(&bytes[pos..pos + len]).expect("decode record"));
        pos += len;
    }
    events
}

fn write_records(path: &Path, events: &[AuditEvent]) {
    let mut bytes = Vec::new();
    for event in events {
        let payload = serde_json::to_vec(event).expect("encode record");
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&payload);
    }
    std::fs::write(path, bytes).expect("rewrite file");
}

#[test]
fn unmodified_ledger_verifies_and_verification_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("audit.log");
    populate(&path, 12);

    let ledger = AuditLedger::open_or_create(&path).expect("reopen");
    let before = std::fs::read(&path).expect("bytes");

    let first = ledger.verify_chain();
    let second = ledger.verify_chain();
    assert!(first.valid, "{}", first.message);
    assert_eq!(first.total_events, 12);
    assert_eq!(first.verified_events, 12);
    assert_eq!(first, second);

    // Pure read: the file is untouched.
    assert_eq!(std::fs::read(&path).expect("bytes"), before);
}

#[test]
fn field_edit_is_detected_at_the_edited_event() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("audit.log");
    populate(&path, 8);

    let mut events = read_records(&path);
    events[4].decision = Decision::Deny;
    write_records(&path, &events);

    let report = AuditLedger::open_or_create(&path).expect("reopen").verify_chain();
    assert!(!report.valid);
    assert_eq!(report.first_broken_id, Some(5));
    assert_eq!(report.verified_events, 4);
    assert!(report.message.contains("hash mismatch"));
}

#[test]
fn consistent_rewrite_is_detected_one_link_downstream() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("audit.log");
    populate(&path, 8);

    // Re-hash the edited event so it self-verifies; linkage then breaks at
    // the next event.
    let mut events = read_records(&path);
    events[4].actor_user_id = 999;
    events[4].hash = compute_event_hash(&events[4]).expect("rehash");
    write_records(&path, &events);

    let report = AuditLedger::open_or_create(&path).expect("reopen").verify_chain();
    assert!(!report.valid);
    assert_eq!(report.first_broken_id, Some(6));
    assert!(report.message.contains("prev_hash mismatch"));
}

#[test]
fn snapshot_payload_edit_is_detected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("audit.log");
    populate(&path, 5);

    let mut events = read_records(&path);
    events[2].verification_summary = Some("{\"schema_version\":2}".to_string());
    write_records(&path, &events);

    let report = AuditLedger::open_or_create(&path).expect("reopen").verify_chain();
    assert!(!report.valid);
    assert_eq!(report.first_broken_id, Some(3));
}

#[test]
fn deleted_event_is_detected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("audit.log");
    populate(&path, 6);

    let mut events = read_records(&path);
    events.remove(2);
    write_records(&path, &events);

    let report = AuditLedger::open_or_create(&path).expect("reopen").verify_chain();
    assert!(!report.valid);
    // The third slot now holds event 4.
    assert_eq!(report.first_broken_id, Some(4));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn any_single_field_edit_below_the_head_is_detected(
        total in 2usize..20,
        target_hint in 0usize..20,
        field in 0u8..4,
    ) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("audit.log");
        populate(&path, total);

        // The chain head has no successor anchoring it, so edit below it.
        let target = target_hint % (total - 1);
        let mut events = read_records(&path);
        match field {
            0 => events[target].decision = Decision::StepUp,
            1 => events[target].asset_id += 1_000,
            2 => events[target].site_id = None,
            _ => events[target].verification_summary = None,
        }
        // Half the cases also re-hash the edited record.
        if target % 2 == 0 {
            events[target].hash = compute_event_hash(&events[target]).expect("rehash");
        }
        write_records(&path, &events);

        let report = AuditLedger::open_or_create(&path).expect("reopen").verify_chain();
        prop_assert!(!report.valid);
        let broken = report.first_broken_id.expect("broken id");
        let edited_id = target as u64 + 1;
        prop_assert!(broken == edited_id || broken == edited_id + 1);
    }
}
