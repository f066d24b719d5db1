mod common;

use common::{Recorder, RecordingPersister, RecordingRenderer};
use conveyor::reconcile::Reconciler;
use conveyor::state::{OperationalState, StateStore};
use conveyor::topic::AssetId;
use serde_json::json;
use std::sync::Arc;

fn reconciler(recorder: &Arc<Recorder>, store: StateStore) -> Reconciler {
    Reconciler::new(
        AssetId::new("68d65911e6179110444b78bb").unwrap(),
        store,
        Arc::new(RecordingPersister(Arc::clone(recorder))),
        Arc::new(RecordingRenderer(Arc::clone(recorder))),
    )
}

#[tokio::test]
async fn test_first_second_and_partial_message_sequence() {
    let recorder = Arc::new(Recorder::default());
    let mut reconciler = reconciler(&recorder, StateStore::new());

    // First message: both fields are first-seen
    let first = reconciler
        .handle_payload(br#"{"motor_on": true, "battery_level": 80}"#)
        .unwrap();
    first.persist.unwrap().await.unwrap();

    let expected: OperationalState = [("motor_on", json!(true)), ("battery_level", json!(80))]
        .into_iter()
        .collect();
    assert_eq!(first.merged, expected);
    assert_eq!(
        first.diff.field_names().collect::<Vec<_>>(),
        vec!["battery_level", "motor_on"]
    );
    assert_eq!(recorder.saves().len(), 1);
    assert_eq!(recorder.saves()[0].0, "68d65911e6179110444b78bb");
    assert_eq!(recorder.notify_count(), 1);

    // Identical re-send: rendered, not persisted, no notification
    let second = reconciler
        .handle_payload(br#"{"motor_on": true, "battery_level": 80}"#)
        .unwrap();
    assert!(second.diff.is_empty());
    assert!(second.persist.is_none());
    assert_eq!(recorder.saves().len(), 1);
    assert_eq!(recorder.renders().len(), 2);
    assert_eq!(recorder.notify_count(), 1);

    // Partial update: only the changed field is persisted
    let third = reconciler
        .handle_payload(br#"{"battery_level": 75}"#)
        .unwrap();
    third.persist.unwrap().await.unwrap();

    assert_eq!(third.merged.get("motor_on"), Some(&json!(true)));
    assert_eq!(third.merged.get("battery_level"), Some(&json!(75)));
    assert_eq!(
        third.diff.field_names().collect::<Vec<_>>(),
        vec!["battery_level"]
    );
    assert_eq!(recorder.saves()[1].1.get("battery_level"), Some(&json!(75)));
    assert_eq!(recorder.saves()[1].1.len(), 1);
    assert_eq!(recorder.notify_count(), 2);
}

#[tokio::test]
async fn test_unchanged_message_against_seed_skips_persistence() {
    let recorder = Arc::new(Recorder::default());
    let seed: OperationalState = [("a", json!(1)), ("b", json!(2))].into_iter().collect();
    let mut reconciler = reconciler(&recorder, StateStore::seeded(seed.clone()));

    let outcome = reconciler.handle_payload(br#"{"a": 1}"#).unwrap();

    assert!(outcome.diff.is_empty());
    assert!(recorder.saves().is_empty());
    assert_eq!(recorder.renders(), vec![seed]);
    assert_eq!(recorder.notify_count(), 0);
    assert!(reconciler.store().last_seen().is_some());
}

#[tokio::test]
async fn test_persistence_failure_does_not_roll_back() {
    let recorder = Arc::new(Recorder::failing());
    let mut reconciler = reconciler(&recorder, StateStore::new());

    let outcome = reconciler.handle_payload(br#"{"vibration": 2.5}"#).unwrap();
    // The task logs the failure and completes normally
    outcome.persist.unwrap().await.unwrap();

    assert_eq!(recorder.saves().len(), 1);
    assert_eq!(
        reconciler.store().persisted().get("vibration"),
        Some(&json!(2.5))
    );

    // Baseline already advanced: the same value is not re-sent
    let again = reconciler.handle_payload(br#"{"vibration": 2.5}"#).unwrap();
    assert!(again.persist.is_none());
    assert_eq!(recorder.saves().len(), 1);
}

#[tokio::test]
async fn test_integer_and_float_forms_are_equal() {
    let recorder = Arc::new(Recorder::default());
    let mut reconciler = reconciler(&recorder, StateStore::new());

    reconciler.handle_payload(br#"{"battery_level": 80}"#).unwrap();
    let outcome = reconciler
        .handle_payload(br#"{"battery_level": 80.0}"#)
        .unwrap();

    assert!(outcome.diff.is_empty());
}

#[tokio::test]
async fn test_malformed_payloads_are_dropped() {
    let recorder = Arc::new(Recorder::default());
    let mut reconciler = reconciler(&recorder, StateStore::new());

    for payload in [&b"not json"[..], b"[1, 2]", b"42", b"\"text\"", b"null"] {
        assert!(reconciler.handle_payload(payload).is_err());
    }

    assert!(reconciler.store().canonical().is_empty());
    assert!(recorder.renders().is_empty());
    assert!(recorder.saves().is_empty());

    // Engine keeps going afterwards
    let outcome = reconciler.handle_payload(br#"{"load_level": 10}"#).unwrap();
    assert_eq!(outcome.diff.len(), 1);
}

#[tokio::test]
async fn test_mixed_casing_converges_on_one_field() {
    let recorder = Arc::new(Recorder::default());
    let mut reconciler = reconciler(&recorder, StateStore::new());

    reconciler
        .handle_payload(br#"{"conveyor_count": 3}"#)
        .unwrap();
    let outcome = reconciler
        .handle_payload(br#"{"conveyorCount": 3, "energyConsumption": 12.5}"#)
        .unwrap();

    assert_eq!(outcome.merged.len(), 2);
    assert_eq!(
        outcome.diff.field_names().collect::<Vec<_>>(),
        vec!["energy_consumption"]
    );
}
