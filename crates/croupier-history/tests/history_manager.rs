//! HistoryManager and HistoryReader integration tests against an
//! in-memory host resource.

use std::sync::Arc;

use croupier_core::keys;
use croupier_core::{DataItems, HistoryRecord};
use croupier_history::codec::{decode_counter, decode_flag, decode_history_record};
use croupier_history::manager::write_step_pair;
use croupier_history::{
    ConcurrentHistoryRecorder, HistoryConfig, HistoryError, HistoryManager, HistoryReader,
};
use croupier_test_utils::fixtures::meters;
use croupier_test_utils::InMemoryResource;

// ── Helpers ─────────────────────────────────────────────────────

fn shell_with_state(state: &str) -> Arc<ConcurrentHistoryRecorder> {
    let shell = Arc::new(ConcurrentHistoryRecorder::new());
    shell.start_presentation_state(state, &DataItems::new().with("bank", "credit", 500));
    shell
}

/// Present `state` with `data` and close the step, as a coplayer does on
/// presentation start followed by a state transition.
fn record_step(
    manager: &mut HistoryManager,
    resource: &InMemoryResource,
    state: &str,
    data: &DataItems,
) -> Option<u32> {
    resource.in_transaction(|| {
        manager.stage_update(data, resource).unwrap();
        manager.begin_history_step(state, resource).unwrap();
        manager.end_history_step(resource).unwrap()
    })
}

// ── Gate ────────────────────────────────────────────────────────

#[test]
fn disable_twice_is_idempotent() {
    let resource = InMemoryResource::new();
    let mut manager = HistoryManager::new(shell_with_state("Idle"), HistoryConfig::default());

    for _ in 0..2 {
        resource.in_transaction(|| manager.disable_history_write(&resource).unwrap());
        assert!(!manager.is_write_enabled());
        assert_eq!(manager.marked_state(), None);
        assert!(!decode_flag(&resource.get(keys::HISTORY_WRITE_ENABLED).unwrap()).unwrap());
    }
}

#[test]
fn disabled_writer_ignores_steps() {
    let resource = InMemoryResource::new();
    let mut manager = HistoryManager::new(shell_with_state("Idle"), HistoryConfig::default());
    resource.in_transaction(|| manager.disable_history_write(&resource).unwrap());

    assert_eq!(record_step(&mut manager, &resource, "Spin", &meters(&[("win", 5)])), None);
    assert!(!resource.contains("Step1"));

    resource.in_transaction(|| manager.enable_history_write(&resource).unwrap());
    assert_eq!(record_step(&mut manager, &resource, "Spin", &meters(&[("win", 5)])), Some(1));
}

#[test]
fn end_without_begin_is_a_no_op() {
    let resource = InMemoryResource::new();
    let mut manager = HistoryManager::new(shell_with_state("Idle"), HistoryConfig::default());
    let written = resource.in_transaction(|| manager.end_history_step(&resource).unwrap());
    assert_eq!(written, None);
    assert_eq!(manager.step_count(), 0);
}

// ── Numbering ───────────────────────────────────────────────────

#[test]
fn step_numbers_are_gapless_within_a_cycle() {
    let resource = InMemoryResource::new();
    let mut manager = HistoryManager::new(shell_with_state("Idle"), HistoryConfig::default());

    let steps: Vec<_> = (0..5)
        .map(|i| record_step(&mut manager, &resource, "Spin", &meters(&[("win", i)])))
        .collect();
    assert_eq!(steps, vec![Some(1), Some(2), Some(3), Some(4), Some(5)]);
    assert_eq!(decode_counter(&resource.get(keys::STEPS).unwrap()).unwrap(), 5);

    resource.in_transaction(|| manager.clear_tracked_data(&resource).unwrap());
    assert!(!resource.contains("Step1"));
    assert!(!resource.contains("Shell/Step5"));
    assert!(!resource.contains(keys::STEPS));
    assert_eq!(record_step(&mut manager, &resource, "Spin", &meters(&[])), Some(1));
}

#[test]
fn coplayer_records_hold_diffs_and_shell_records_snapshots() {
    let resource = InMemoryResource::new();
    let shell = shell_with_state("Idle");
    let mut manager = HistoryManager::new(Arc::clone(&shell), HistoryConfig::default());

    record_step(&mut manager, &resource, "Spin", &meters(&[("credit", 100), ("bet", 1)]));
    record_step(&mut manager, &resource, "Evaluate", &meters(&[("credit", 100), ("win", 20)]));

    let step2 = decode_history_record(&resource.get("Step2").unwrap()).unwrap();
    assert_eq!(step2.state_name, "Evaluate");
    assert_eq!(step2.data, meters(&[("win", 20)]));

    let shell2 = decode_history_record(&resource.get("Shell/Step2").unwrap()).unwrap();
    assert_eq!(shell2.step_number, 2);
    assert_eq!(shell2.data, shell.snapshot());
    assert_eq!(resource.get(keys::SHELL_LAST_STEP), resource.get("Shell/Step2"));
}

#[test]
fn ending_a_step_before_the_shell_presented_is_fatal() {
    let resource = InMemoryResource::new();
    let shell = Arc::new(ConcurrentHistoryRecorder::new());
    let mut manager = HistoryManager::new(shell, HistoryConfig::default());

    let result = resource.in_transaction(|| {
        manager.begin_history_step("Spin", &resource).unwrap();
        manager.end_history_step(&resource)
    });
    assert!(matches!(result, Err(HistoryError::NoPresentationState)));
    assert_eq!(manager.step_count(), 0);
}

#[test]
fn mismatched_pair_is_rejected() {
    let resource = InMemoryResource::new();
    let coplayer = HistoryRecord::new(3, "Spin", DataItems::new());
    let shell = HistoryRecord::new(4, "Idle", DataItems::new());

    let result = resource.in_transaction(|| write_step_pair(&resource, &coplayer, &shell));
    assert!(matches!(
        result,
        Err(HistoryError::StepMismatch {
            coplayer: 3,
            shell: 4
        })
    ));
    assert!(!resource.contains("Step3"));
}

// ── Recovery ────────────────────────────────────────────────────

#[test]
fn a_fresh_manager_resumes_from_critical_data() {
    let resource = InMemoryResource::new();
    let shell = shell_with_state("Idle");
    let mut first = HistoryManager::new(Arc::clone(&shell), HistoryConfig::default());
    record_step(&mut first, &resource, "Spin", &meters(&[("credit", 100)]));
    resource.in_transaction(|| {
        first.stage_update(&meters(&[("credit", 100), ("win", 9)]), &resource).unwrap();
        first.begin_history_step("Evaluate", &resource).unwrap();
    });

    // Power hit: the step is open and an update is staged.
    let mut second = HistoryManager::new(shell, HistoryConfig::default());
    let written = resource.in_transaction(|| second.end_history_step(&resource).unwrap());
    assert_eq!(written, Some(2));

    let step2 = decode_history_record(&resource.get("Step2").unwrap()).unwrap();
    assert_eq!(step2.state_name, "Evaluate");
    assert_eq!(step2.data, meters(&[("win", 9)]));
}

#[test]
fn cold_boot_respects_configured_gate() {
    let resource = InMemoryResource::new();
    let config = HistoryConfig {
        enable_on_cold_boot: false,
    };
    let mut manager = HistoryManager::new(shell_with_state("Idle"), config);
    assert_eq!(record_step(&mut manager, &resource, "Spin", &meters(&[("win", 1)])), None);
}

// ── Reader ──────────────────────────────────────────────────────

#[test]
fn reader_walks_pairs_and_resets() {
    let resource = InMemoryResource::new();
    let mut manager = HistoryManager::new(shell_with_state("Idle"), HistoryConfig::default());
    for i in 0..3 {
        record_step(&mut manager, &resource, &format!("S{i}"), &meters(&[("win", i)]));
    }

    let mut reader = HistoryReader::open(&resource).unwrap();
    assert_eq!(reader.total_steps(), 3);

    let names: Vec<_> = std::iter::from_fn(|| reader.next_pair(&resource).unwrap())
        .map(|pair| {
            assert_eq!(pair.coplayer.step_number, pair.shell.step_number);
            pair.coplayer.state_name
        })
        .collect();
    assert_eq!(names, vec!["S0", "S1", "S2"]);
    assert!(reader.is_exhausted());

    reader.reset();
    let first = reader.next_pair(&resource).unwrap().unwrap();
    assert_eq!(first.coplayer.step_number, 1);
}

#[test]
fn reader_reports_missing_records() {
    let resource = InMemoryResource::new();
    let mut reader = HistoryReader::with_total(1);
    assert!(matches!(
        reader.next_pair(&resource),
        Err(HistoryError::MissingRecord { key }) if key == "Step1"
    ));
}
