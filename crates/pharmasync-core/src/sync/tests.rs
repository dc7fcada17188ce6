use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::time::Instant;

use super::*;
use crate::db::{records, Seed};
use crate::models::{Fields, LocalRecord, SyncStatus};
use crate::remote::{FailureRule, MemoryRemoteStore, RemoteDocument, RemoteOp};
use crate::schema::{
    MEDICATIONS, MODIFIED_FIELD, PATIENTS, STOCK_ADJUSTMENTS, STOCK_RECEIPTS, STOCK_RETURNS,
};
use crate::stock::IssuanceLine;
use crate::Error;

fn fields(value: serde_json::Value) -> Fields {
    value.as_object().cloned().unwrap()
}

async fn engine() -> (SyncEngine<MemoryRemoteStore>, MemoryRemoteStore) {
    let store = LocalStore::open_in_memory().await.unwrap();
    let remote = MemoryRemoteStore::new();
    (SyncEngine::new(store, remote.clone()), remote)
}

async fn completed(engine: &SyncEngine<MemoryRemoteStore>) -> SyncReport {
    match engine.sync().await.unwrap() {
        SyncOutcome::Completed(report) => report,
        SyncOutcome::Skipped => panic!("sync pass was skipped"),
    }
}

async fn raw(engine: &SyncEngine<MemoryRemoteStore>, local_id: i64) -> Option<LocalRecord> {
    let db = engine.store().lock().await;
    records::get(db.connection(), &MEDICATIONS, local_id)
        .await
        .unwrap()
}

async fn add_medication(engine: &SyncEngine<MemoryRemoteStore>, name: &str) -> LocalRecord {
    engine
        .store()
        .create_record(&MEDICATIONS, &fields(json!({"name": name})))
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_push_creates_document_under_pregenerated_id() {
    let (engine, remote) = engine().await;
    let record = add_medication(&engine, "Amlodipine 5mg").await;
    let remote_doc_id = record.remote_doc_id.clone().unwrap();

    let report = completed(&engine).await;
    let medications = report.entity("medications").unwrap();
    assert_eq!(medications.push.created, 1);
    assert_eq!(medications.pull.unchanged, 1);

    let document = remote.document("medications", &remote_doc_id).unwrap();
    assert_eq!(document["name"], json!("Amlodipine 5mg"));
    assert_eq!(document[MODIFIED_FIELD], json!(record.last_modified_local));
    assert!(!document.contains_key("local_id"));
    assert!(!document.contains_key("sync_status"));
    assert!(!document.contains_key("remote_doc_id"));

    let local = raw(&engine, record.local_id).await.unwrap();
    assert_eq!(local.sync_status, SyncStatus::Synced);
    assert_eq!(local.remote_doc_id, Some(remote_doc_id));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_replayed_create_does_not_duplicate() {
    let (engine, remote) = engine().await;
    let record = add_medication(&engine, "Losartan 50mg").await;
    completed(&engine).await;

    // The remote create succeeded but the local commit was lost.
    {
        let db = engine.store().lock().await;
        let status = SyncStatus::PendingCreate;
        records::set_status(db.connection(), &MEDICATIONS, record.local_id, status)
            .await
            .unwrap();
    }
    let report = completed(&engine).await;

    assert_eq!(report.entity("medications").unwrap().push.created, 1);
    assert_eq!(remote.calls(RemoteOp::Create), 2);
    assert_eq!(remote.documents("medications").len(), 1);
    assert_eq!(
        raw(&engine, record.local_id).await.unwrap().sync_status,
        SyncStatus::Synced
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_one_failed_create_does_not_block_siblings() {
    let (engine, remote) = engine().await;
    let first = add_medication(&engine, "Aspirin 100mg").await;
    let second = add_medication(&engine, "Warfarin 5mg").await;
    let third = add_medication(&engine, "Digoxin 0.25mg").await;
    remote.inject_failure(
        FailureRule::new(RemoteOp::Create).id(second.remote_doc_id.clone().unwrap()),
    );

    let report = completed(&engine).await;
    let push = report.entity("medications").unwrap().push;
    assert_eq!(push.created, 2);
    assert_eq!(push.failed, 1);
    assert!(!push.transaction_failed);

    assert_eq!(raw(&engine, first.local_id).await.unwrap().sync_status, SyncStatus::Synced);
    assert_eq!(
        raw(&engine, second.local_id).await.unwrap().sync_status,
        SyncStatus::PendingCreate
    );
    assert_eq!(raw(&engine, third.local_id).await.unwrap().sync_status, SyncStatus::Synced);
    assert_eq!(remote.documents("medications").len(), 2);

    remote.clear_failures();
    completed(&engine).await;
    assert_eq!(raw(&engine, second.local_id).await.unwrap().sync_status, SyncStatus::Synced);
    assert_eq!(remote.documents("medications").len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_repeated_passes_converge() {
    let (engine, remote) = engine().await;
    let record = engine
        .store()
        .create_record(
            &MEDICATIONS,
            &fields(json!({"name": "Levothyroxine", "unit_price": 0.5, "reorder_level": 10})),
        )
        .await
        .unwrap();
    let remote_doc_id = record.remote_doc_id.clone().unwrap();
    completed(&engine).await;

    let local_before = raw(&engine, record.local_id).await.unwrap();
    let remote_before = remote.document("medications", &remote_doc_id).unwrap();

    for _ in 0..2 {
        let report = completed(&engine).await;
        let medications = report.entity("medications").unwrap();
        assert_eq!(medications.push.pushed(), 0);
        assert_eq!(medications.pull.changed(), 0);
        assert_eq!(medications.pull.unchanged, 1);
    }

    let local_after = raw(&engine, record.local_id).await.unwrap();
    assert_eq!(local_after, local_before);
    assert_eq!(local_after.sync_status, SyncStatus::Synced);
    assert_eq!(remote.document("medications", &remote_doc_id).unwrap(), remote_before);

    let mut expected = local_after.fields.clone();
    expected.insert(MODIFIED_FIELD.to_string(), json!(local_after.last_modified_local));
    assert_eq!(remote_before, expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_seeded_rows_link_by_natural_key() {
    let (engine, remote) = engine().await;
    let seed = Seed::parse(
        r#"{
            "medications": [{"name": "Paracetamol 500mg", "unit": "tablet"}],
            "patients": [{"first_name": "Ana", "last_name": "Silva"}]
        }"#,
    )
    .unwrap();
    assert_eq!(engine.store().apply_seed(&seed).await.unwrap(), 2);

    remote.put_document(
        "medications",
        RemoteDocument::new(
            "remote-paracetamol",
            fields(json!({"name": "Paracetamol 500mg", "unit": "box", MODIFIED_FIELD: 500})),
        ),
    );
    remote.put_document(
        "patients",
        RemoteDocument::new(
            "remote-ana",
            fields(json!({
                "first_name": "Ana",
                "last_name": "Silva",
                "phone": "555-0101",
                MODIFIED_FIELD: 700
            })),
        ),
    );
    remote.put_document(
        "patients",
        RemoteDocument::new(
            "remote-ana-costa",
            fields(json!({"first_name": "Ana", "last_name": "Costa", MODIFIED_FIELD: 700})),
        ),
    );

    let report = completed(&engine).await;
    assert_eq!(report.entity("medications").unwrap().pull.linked, 1);
    assert_eq!(report.entity("patients").unwrap().pull.linked, 1);
    assert_eq!(report.entity("patients").unwrap().pull.inserted, 1);

    let medications = engine.store().list_records(&MEDICATIONS).await.unwrap();
    assert_eq!(medications.len(), 1);
    assert_eq!(medications[0].remote_doc_id.as_deref(), Some("remote-paracetamol"));
    assert_eq!(medications[0].sync_status, SyncStatus::Synced);
    assert_eq!(medications[0].text("unit"), Some("box"));
    assert_eq!(medications[0].last_modified_local, 500);

    let patients = engine.store().list_records(&PATIENTS).await.unwrap();
    assert_eq!(patients.len(), 2);
    let ana = patients
        .iter()
        .find(|patient| patient.remote_doc_id.as_deref() == Some("remote-ana"))
        .unwrap();
    assert_eq!(ana.text("phone"), Some("555-0101"));

    // Nothing was pushed back as a duplicate.
    assert_eq!(remote.documents("medications").len(), 1);
    assert_eq!(remote.documents("patients").len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_strictly_newer_remote_overwrites_local() {
    let (engine, remote) = engine().await;
    let record = add_medication(&engine, "Prednisone 5mg").await;
    let remote_doc_id = record.remote_doc_id.clone().unwrap();
    completed(&engine).await;

    let newer = record.last_modified_local + 1_000;
    remote.put_document(
        "medications",
        RemoteDocument::new(
            remote_doc_id.clone(),
            fields(json!({
                "name": "Prednisolone 5mg",
                "category": "steroid",
                MODIFIED_FIELD: newer
            })),
        ),
    );

    let report = completed(&engine).await;
    assert_eq!(report.entity("medications").unwrap().pull.overwritten, 1);

    let local = raw(&engine, record.local_id).await.unwrap();
    assert_eq!(local.local_id, record.local_id);
    assert_eq!(local.remote_doc_id, Some(remote_doc_id));
    assert_eq!(local.text("name"), Some("Prednisolone 5mg"));
    assert_eq!(local.text("category"), Some("steroid"));
    assert_eq!(local.last_modified_local, newer);
    assert_eq!(local.sync_status, SyncStatus::Synced);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_older_remote_does_not_clobber_local_edit() {
    let (engine, remote) = engine().await;
    let record = add_medication(&engine, "Clopidogrel").await;
    let remote_doc_id = record.remote_doc_id.clone().unwrap();
    completed(&engine).await;

    let edited = engine
        .store()
        .update_record(&MEDICATIONS, record.local_id, &fields(json!({"reorder_level": 12})))
        .await
        .unwrap();
    assert_eq!(edited.sync_status, SyncStatus::PendingUpdate);

    // Another client renamed it, stamped before our edit; our update cannot
    // reach the remote store this pass.
    remote.put_document(
        "medications",
        RemoteDocument::new(
            remote_doc_id.clone(),
            fields(json!({
                "name": "Renamed elsewhere",
                MODIFIED_FIELD: record.last_modified_local
            })),
        ),
    );
    remote.inject_failure(FailureRule::new(RemoteOp::Update).times(1));

    let report = completed(&engine).await;
    let medications = report.entity("medications").unwrap();
    assert_eq!(medications.push.failed, 1);
    assert_eq!(medications.pull.conflicts, 1);

    let local = raw(&engine, record.local_id).await.unwrap();
    assert_eq!(local.text("name"), Some("Clopidogrel"));
    assert_eq!(local.integer("reorder_level"), Some(12));
    assert_eq!(local.sync_status, SyncStatus::PendingUpdate);

    let conflicts = engine.store().list_conflicts(10).await.unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].remote_doc_id, remote_doc_id);
    assert_eq!(conflicts[0].local_modified_at, edited.last_modified_local);
    assert_eq!(conflicts[0].incoming_modified_at, record.last_modified_local);

    // The queued edit wins once it is pushed.
    completed(&engine).await;
    let document = remote.document("medications", &remote_doc_id).unwrap();
    assert_eq!(document["name"], json!("Clopidogrel"));
    assert_eq!(document["reorder_level"], json!(12));
    assert_eq!(raw(&engine, record.local_id).await.unwrap().sync_status, SyncStatus::Synced);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remote_delete_propagates_locally() {
    let (engine, remote) = engine().await;
    let record = add_medication(&engine, "Ranitidine").await;
    completed(&engine).await;

    remote.remove_document("medications", record.remote_doc_id.as_deref().unwrap());
    let report = completed(&engine).await;

    assert_eq!(report.entity("medications").unwrap().pull.removed, 1);
    assert!(raw(&engine, record.local_id).await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_local_delete_of_remotely_deleted_row_converges() {
    let (engine, remote) = engine().await;
    let kept_queued = add_medication(&engine, "Cimetidine").await;
    let already_gone = add_medication(&engine, "Famotidine").await;
    completed(&engine).await;

    for record in [&kept_queued, &already_gone] {
        engine
            .store()
            .delete_record(&MEDICATIONS, record.local_id)
            .await
            .unwrap();
        remote.remove_document("medications", record.remote_doc_id.as_deref().unwrap());
    }
    remote.inject_failure(
        FailureRule::new(RemoteOp::Delete)
            .id(kept_queued.remote_doc_id.clone().unwrap())
            .times(1),
    );

    let report = completed(&engine).await;
    let medications = report.entity("medications").unwrap();
    assert_eq!(medications.push.deleted, 1);
    assert_eq!(medications.push.failed, 1);
    assert_eq!(medications.pull.removed, 0);

    assert!(raw(&engine, already_gone.local_id).await.is_none());
    // Still queued: pull leaves pending deletes to the push path.
    assert_eq!(
        raw(&engine, kept_queued.local_id).await.unwrap().sync_status,
        SyncStatus::PendingDelete
    );

    completed(&engine).await;
    assert!(raw(&engine, kept_queued.local_id).await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_references_are_translated_between_clients() {
    let (engine, remote) = engine().await;
    let medication = add_medication(&engine, "Enalapril 10mg").await;
    let receipt = engine
        .store()
        .create_record(
            &STOCK_RECEIPTS,
            &fields(json!({
                "medication_id": medication.local_id,
                "quantity": 30,
                "received_at": 1
            })),
        )
        .await
        .unwrap();
    engine
        .store()
        .record_issuance(
            &fields(json!({"issued_at": 2})),
            &[IssuanceLine {
                medication_id: medication.local_id,
                quantity: 4,
            }],
        )
        .await
        .unwrap();
    completed(&engine).await;

    let medication_doc_id = medication.remote_doc_id.clone().unwrap();
    let receipt_doc = remote
        .document("stock_receipts", receipt.remote_doc_id.as_deref().unwrap())
        .unwrap();
    assert_eq!(receipt_doc["medication_id"], json!(medication_doc_id));
    let line_doc = &remote.documents("issuance_lines")[0];
    assert_eq!(line_doc.fields["medication_id"], json!(medication_doc_id));

    // A second client with its own local ids.
    let other_store = LocalStore::open_in_memory().await.unwrap();
    other_store
        .create_record(&PATIENTS, &fields(json!({"first_name": "Local", "last_name": "Only"})))
        .await
        .unwrap();
    other_store
        .create_record(&MEDICATIONS, &fields(json!({"name": "Shifts local ids"})))
        .await
        .unwrap();
    let other = SyncEngine::new(other_store, remote.clone());
    completed(&other).await;

    let other_medication = other
        .store()
        .find_by_remote_id(&MEDICATIONS, &medication_doc_id)
        .await
        .unwrap()
        .unwrap();
    assert_ne!(other_medication.local_id, medication.local_id);

    let other_receipt = other
        .store()
        .find_by_remote_id(&STOCK_RECEIPTS, receipt.remote_doc_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(other_receipt.integer("medication_id"), Some(other_medication.local_id));

    assert_eq!(
        other.store().stock_level(other_medication.local_id).await.unwrap().on_hand(),
        26
    );
    assert_eq!(
        engine.store().stock_level(medication.local_id).await.unwrap().on_hand(),
        26
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unresolved_remote_reference_is_skipped_until_resolved() {
    let (engine, remote) = engine().await;
    remote.put_document(
        "stock_receipts",
        RemoteDocument::new(
            "receipt-1",
            fields(json!({
                "medication_id": "late-medication",
                "quantity": 9,
                "received_at": 1,
                MODIFIED_FIELD: 10
            })),
        ),
    );
    remote.put_document(
        "stock_receipts",
        RemoteDocument::new(
            "receipt-bad",
            fields(json!({"medication_id": null, "quantity": "nine", "received_at": 1})),
        ),
    );

    let report = completed(&engine).await;
    assert_eq!(report.entity("stock_receipts").unwrap().pull.skipped, 2);
    assert!(engine.store().list_records(&STOCK_RECEIPTS).await.unwrap().is_empty());

    remote.put_document(
        "medications",
        RemoteDocument::new("late-medication", fields(json!({"name": "Late", MODIFIED_FIELD: 5}))),
    );
    let report = completed(&engine).await;
    assert_eq!(report.entity("stock_receipts").unwrap().pull.inserted, 1);
    assert_eq!(report.entity("stock_receipts").unwrap().pull.skipped, 1);

    let medication = engine
        .store()
        .find_by_remote_id(&MEDICATIONS, "late-medication")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        engine.store().stock_level(medication.local_id).await.unwrap().on_hand(),
        9
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_without_remote_id_is_pushed_as_create() {
    let (engine, remote) = engine().await;
    let seed = Seed::parse(r#"{"medications": [{"name": "Seeded only"}]}"#).unwrap();
    engine.store().apply_seed(&seed).await.unwrap();
    let seeded = engine.store().list_records(&MEDICATIONS).await.unwrap().remove(0);

    let edited = engine
        .store()
        .update_record(&MEDICATIONS, seeded.local_id, &fields(json!({"unit": "vial"})))
        .await
        .unwrap();
    assert_eq!(edited.sync_status, SyncStatus::PendingUpdate);
    assert!(edited.remote_doc_id.is_none());

    let report = completed(&engine).await;
    assert_eq!(report.entity("medications").unwrap().push.created, 1);
    assert_eq!(remote.calls(RemoteOp::Update), 0);

    let local = raw(&engine, seeded.local_id).await.unwrap();
    assert_eq!(local.sync_status, SyncStatus::Synced);
    let document = remote
        .document("medications", local.remote_doc_id.as_deref().unwrap())
        .unwrap();
    assert_eq!(document["unit"], json!("vial"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_create_of_unlinked_update_keeps_its_new_id() {
    let (engine, remote) = engine().await;
    let seed = Seed::parse(r#"{"medications": [{"name": "Seeded only"}]}"#).unwrap();
    engine.store().apply_seed(&seed).await.unwrap();
    let seeded = engine.store().list_records(&MEDICATIONS).await.unwrap().remove(0);
    engine
        .store()
        .update_record(&MEDICATIONS, seeded.local_id, &fields(json!({"unit": "vial"})))
        .await
        .unwrap();
    remote.inject_failure(FailureRule::new(RemoteOp::Create).times(1));

    completed(&engine).await;
    let queued = raw(&engine, seeded.local_id).await.unwrap();
    assert_eq!(queued.sync_status, SyncStatus::PendingCreate);
    let remote_doc_id = queued.remote_doc_id.clone().unwrap();

    completed(&engine).await;
    let local = raw(&engine, seeded.local_id).await.unwrap();
    assert_eq!(local.remote_doc_id, Some(remote_doc_id));
    assert_eq!(local.sync_status, SyncStatus::Synced);
    assert_eq!(remote.documents("medications").len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_delete_without_remote_id_is_removed_locally() {
    let (engine, remote) = engine().await;
    let seed = Seed::parse(r#"{"medications": [{"name": "Never synced"}]}"#).unwrap();
    engine.store().apply_seed(&seed).await.unwrap();
    let seeded = engine.store().list_records(&MEDICATIONS).await.unwrap().remove(0);
    engine
        .store()
        .delete_record(&MEDICATIONS, seeded.local_id)
        .await
        .unwrap();

    let report = completed(&engine).await;
    assert_eq!(report.entity("medications").unwrap().push.deleted, 1);
    assert_eq!(remote.calls(RemoteOp::Delete), 0);
    assert!(raw(&engine, seeded.local_id).await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_trigger_is_dropped() {
    let (engine, remote) = engine().await;
    add_medication(&engine, "Slow network").await;
    remote.set_latency(Some(Duration::from_millis(20)));

    let (first, second) = tokio::join!(engine.sync(), async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        engine.sync().await
    });

    assert!(matches!(first.unwrap(), SyncOutcome::Completed(_)));
    assert_eq!(second.unwrap(), SyncOutcome::Skipped);
    assert!(!engine.is_running());
    assert_eq!(engine.state(), SyncState::Synced);

    // The guard is released afterwards.
    remote.set_latency(None);
    assert!(matches!(engine.sync().await.unwrap(), SyncOutcome::Completed(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_list_failure_aborts_pass_but_keeps_earlier_mappings() {
    let (engine, remote) = engine().await;
    let medication = add_medication(&engine, "Furosemide 40mg").await;
    let receipt = engine
        .store()
        .create_record(
            &STOCK_RECEIPTS,
            &fields(json!({"medication_id": medication.local_id, "quantity": 3, "received_at": 1})),
        )
        .await
        .unwrap();
    let returned = engine
        .store()
        .create_record(
            &STOCK_RETURNS,
            &fields(json!({"medication_id": medication.local_id, "quantity": 1, "returned_at": 2})),
        )
        .await
        .unwrap();
    remote.inject_failure(FailureRule::new(RemoteOp::ListAll).collection("stock_receipts"));

    let mut state = engine.subscribe();
    let err = engine.sync().await.unwrap_err();
    assert!(matches!(err, Error::Remote(_)));
    assert_eq!(*state.borrow_and_update(), SyncState::Error);

    assert_eq!(raw(&engine, medication.local_id).await.unwrap().sync_status, SyncStatus::Synced);
    // Push of the failing mapping committed before its pull.
    let receipt_row = engine
        .store()
        .get_record(&STOCK_RECEIPTS, receipt.local_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(receipt_row.sync_status, SyncStatus::Synced);
    // Later mappings were not reached.
    let returned_row = engine
        .store()
        .get_record(&STOCK_RETURNS, returned.local_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(returned_row.sync_status, SyncStatus::PendingCreate);
    assert!(remote.documents("stock_returns").is_empty());

    remote.clear_failures();
    completed(&engine).await;
    assert_eq!(engine.state(), SyncState::Synced);
    assert_eq!(remote.documents("stock_returns").len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stock_survives_a_round_trip() {
    let (engine, remote) = engine().await;
    let store = engine.store().clone();
    let medication = add_medication(&engine, "Amoxicillin 250mg").await;
    let id = medication.local_id;

    for (quantity, at) in [(10, 1), (5, 2)] {
        store
            .create_record(
                &STOCK_RECEIPTS,
                &fields(json!({"medication_id": id, "quantity": quantity, "received_at": at})),
            )
            .await
            .unwrap();
    }
    store
        .record_issuance(
            &fields(json!({"issued_at": 3})),
            &[IssuanceLine { medication_id: id, quantity: 3 }],
        )
        .await
        .unwrap();
    store
        .create_record(
            &STOCK_RETURNS,
            &fields(json!({"medication_id": id, "quantity": 1, "returned_at": 4})),
        )
        .await
        .unwrap();
    store
        .create_record(
            &STOCK_ADJUSTMENTS,
            &fields(json!({
                "medication_id": id,
                "quantity": -2,
                "adjusted_at": 5,
                "reason": "breakage"
            })),
        )
        .await
        .unwrap();
    assert_eq!(store.stock_level(id).await.unwrap().on_hand(), 11);

    completed(&engine).await;
    completed(&engine).await;
    assert_eq!(store.stock_level(id).await.unwrap().on_hand(), 11);
    assert_eq!(remote.documents("stock_adjustments")[0].fields["quantity"], json!(-2));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_local_writes_proceed_during_push() {
    let (engine, remote) = engine().await;
    for name in ["Atorvastatin 20mg", "Simvastatin 40mg", "Rosuvastatin 10mg"] {
        add_medication(&engine, name).await;
    }
    remote.set_latency(Some(Duration::from_millis(300)));

    let started = Instant::now();
    let (outcome, waited) = tokio::join!(engine.sync(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let issued = Instant::now();
        engine
            .store()
            .create_record(&PATIENTS, &fields(json!({"first_name": "Walk", "last_name": "In"})))
            .await
            .unwrap();
        issued.elapsed()
    });
    let pass = started.elapsed();

    assert!(matches!(outcome.unwrap(), SyncOutcome::Completed(_)));
    assert!(pass >= Duration::from_millis(900));
    assert!(
        waited < Duration::from_millis(150),
        "local write waited {waited:?} during a {pass:?} pass"
    );
    assert_eq!(remote.documents("medications").len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_edit_during_push_stays_queued() {
    let (engine, remote) = engine().await;
    let record = add_medication(&engine, "Bisoprolol 5mg").await;
    let remote_doc_id = record.remote_doc_id.clone().unwrap();
    remote.set_latency(Some(Duration::from_millis(200)));

    let (report, edited) = tokio::join!(completed(&engine), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        engine
            .store()
            .update_record(&MEDICATIONS, record.local_id, &fields(json!({"reorder_level": 5})))
            .await
            .unwrap()
    });

    assert_eq!(report.entity("medications").unwrap().push.created, 1);
    let local = raw(&engine, record.local_id).await.unwrap();
    assert_eq!(local.sync_status, SyncStatus::PendingCreate);
    assert_eq!(local.last_modified_local, edited.last_modified_local);
    assert_eq!(local.integer("reorder_level"), Some(5));
    let document = remote.document("medications", &remote_doc_id).unwrap();
    assert!(!document.contains_key("reorder_level"));

    remote.set_latency(None);
    completed(&engine).await;
    let document = remote.document("medications", &remote_doc_id).unwrap();
    assert_eq!(document["reorder_level"], json!(5));
    assert_eq!(
        raw(&engine, record.local_id).await.unwrap().sync_status,
        SyncStatus::Synced
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_acknowledgement_rolls_back_push_and_pass_continues() {
    let (engine, remote) = engine().await;
    let first = add_medication(&engine, "Aspirin 100mg").await;
    let second = add_medication(&engine, "Warfarin 5mg").await;
    let patient = engine
        .store()
        .create_record(&PATIENTS, &fields(json!({"first_name": "Rui", "last_name": "Lopes"})))
        .await
        .unwrap();
    {
        let db = engine.store().lock().await;
        db.execute(
            "CREATE TRIGGER refuse_ack BEFORE UPDATE OF sync_status ON medications
             WHEN NEW.sync_status = 'synced' AND OLD.name = 'Warfarin 5mg'
             BEGIN SELECT RAISE(ABORT, 'acknowledgement refused'); END",
            (),
        )
        .await
        .unwrap();
    }

    let report = completed(&engine).await;
    let medications = report.entity("medications").unwrap();
    assert!(medications.push.transaction_failed);
    assert_eq!(medications.push.pushed(), 0);
    // Both creates reached the remote store before the local commit failed.
    assert_eq!(remote.documents("medications").len(), 2);
    for record in [&first, &second] {
        assert_eq!(
            raw(&engine, record.local_id).await.unwrap().sync_status,
            SyncStatus::PendingCreate
        );
    }

    let patients = report.entity("patients").unwrap();
    assert!(!patients.push.transaction_failed);
    assert_eq!(patients.push.created, 1);
    let patient = engine
        .store()
        .get_record(&PATIENTS, patient.local_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(patient.sync_status, SyncStatus::Synced);

    {
        let db = engine.store().lock().await;
        db.execute("DROP TRIGGER refuse_ack", ()).await.unwrap();
    }
    let report = completed(&engine).await;
    assert_eq!(report.entity("medications").unwrap().push.created, 2);
    assert_eq!(remote.documents("medications").len(), 2);
    for record in [&first, &second] {
        assert_eq!(
            raw(&engine, record.local_id).await.unwrap().sync_status,
            SyncStatus::Synced
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_seeded_row_without_twin_is_pushed_with_its_references() {
    let (engine, remote) = engine().await;
    let seed = Seed::parse(r#"{"medications": [{"name": "Seeded only"}]}"#).unwrap();
    engine.store().apply_seed(&seed).await.unwrap();
    let seeded = engine.store().list_records(&MEDICATIONS).await.unwrap().remove(0);
    let receipt = engine
        .store()
        .create_record(
            &STOCK_RECEIPTS,
            &fields(json!({"medication_id": seeded.local_id, "quantity": 12, "received_at": 1})),
        )
        .await
        .unwrap();

    let report = completed(&engine).await;
    assert_eq!(report.entity("medications").unwrap().pull.queued, 1);
    completed(&engine).await;

    let medication = raw(&engine, seeded.local_id).await.unwrap();
    assert_eq!(medication.sync_status, SyncStatus::Synced);
    let medication_doc_id = medication.remote_doc_id.unwrap();
    assert_eq!(remote.documents("medications").len(), 1);
    assert_eq!(remote.documents("stock_receipts").len(), 1);

    let receipt = engine
        .store()
        .get_record(&STOCK_RECEIPTS, receipt.local_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(receipt.sync_status, SyncStatus::Synced);
    let receipt_doc = remote
        .document("stock_receipts", receipt.remote_doc_id.as_deref().unwrap())
        .unwrap();
    assert_eq!(receipt_doc["medication_id"], json!(medication_doc_id));
}

mod scheduling {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn runs_at_startup_and_on_request() {
        let (engine, remote) = engine().await;
        let scheduler = SyncScheduler::new(&engine, None);
        let trigger = scheduler.trigger();

        scheduler
            .run(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                trigger.request();
                tokio::time::sleep(Duration::from_millis(50)).await;
            })
            .await;

        assert_eq!(remote.calls(RemoteOp::ListAll), 2 * ENTITY_MAPPINGS.len());
        assert_eq!(engine.state(), SyncState::Synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn runs_on_interval() {
        let (engine, remote) = engine().await;
        let scheduler = SyncScheduler::new(&engine, Some(Duration::from_millis(20)));

        scheduler
            .run(tokio::time::sleep(Duration::from_millis(90)))
            .await;

        assert!(remote.calls(RemoteOp::ListAll) >= 2 * ENTITY_MAPPINGS.len());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_mode_skips_remote_calls() {
        let (engine, remote) = engine().await;
        add_medication(&engine, "Queued while offline").await;
        let config =
            crate::config::SyncConfig::new("https://docs.example.com").with_offline_mode(true);
        let scheduler = SyncScheduler::from_config(&engine, &config);

        scheduler.run_once().await;
        assert_eq!(engine.state(), SyncState::Offline);
        assert_eq!(remote.calls(RemoteOp::Create), 0);
        assert_eq!(remote.calls(RemoteOp::ListAll), 0);

        scheduler.set_offline_mode(false);
        scheduler.run_once().await;
        assert_eq!(engine.state(), SyncState::Synced);
        assert_eq!(remote.documents("medications").len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn request_during_a_pass_is_dropped() {
        let (engine, remote) = engine().await;
        remote.set_latency(Some(Duration::from_millis(100)));
        let scheduler = SyncScheduler::new(&engine, None);
        let trigger = scheduler.trigger();
        let shutdown = tokio::time::sleep(Duration::from_millis(1_500));

        tokio::join!(scheduler.run(shutdown), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            assert!(engine.is_running());
            trigger.request();
        });

        assert_eq!(remote.calls(RemoteOp::ListAll), ENTITY_MAPPINGS.len());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn interval_restarts_after_a_slow_pass() {
        let (engine, remote) = engine().await;
        remote.set_latency(Some(Duration::from_millis(50)));
        let scheduler = SyncScheduler::new(&engine, Some(Duration::from_millis(200)));

        // The startup pass outlasts one period; the missed tick is not replayed.
        scheduler
            .run(tokio::time::sleep(Duration::from_millis(450)))
            .await;

        assert_eq!(remote.calls(RemoteOp::ListAll), ENTITY_MAPPINGS.len());
    }
}
