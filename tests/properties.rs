//! Property tests for progress counters and their checkpoint round trip.

mod common;

use common::*;
use gridtrain::*;
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_processed_is_sum_of_advances(steps in prop::collection::vec(0u64..10_000, 0..50)) {
        let mut state = DatasetState::new(ExecutionMode::Training);
        state.attach(Box::new(RecordingDataset::new("train", 1_000, 4, 2)));
        for &n in &steps {
            state.advance(n).unwrap();
        }
        prop_assert_eq!(state.samples_processed(), steps.iter().sum::<u64>());
        prop_assert_eq!(state.is_overrun(), state.samples_processed() > 1_000);
    }

    #[test]
    fn prop_attach_resets_progress(
        before in prop::collection::vec(0u64..1_000, 0..10),
        samples in 0u64..1_000_000,
    ) {
        let mut state = DatasetState::new(ExecutionMode::Validation);
        state.attach(Box::new(RecordingDataset::new("old", 50, 4, 2)));
        for &n in &before {
            state.advance(n).unwrap();
        }

        let previous = state.attach(Box::new(RecordingDataset::new("new", samples, 4, 2)));
        prop_assert_eq!(previous.map(|d| d.name().to_string()), Some("old".to_string()));
        prop_assert_eq!(state.samples_processed(), 0);
        prop_assert_eq!(state.total_samples(), samples);
    }

    #[test]
    fn prop_checkpoint_round_trip(values in prop::array::uniform6(any::<u64>())) {
        let header = DatasetHeader {
            train_processed: values[0],
            train_total: values[1],
            test_processed: values[2],
            test_total: values[3],
            validate_processed: values[4],
            validate_total: values[5],
        };
        let mut saving = InputCoordinator::new(ProcessTopology::single(), TaskKind::Classification);
        saving.apply_progress_header(&header);
        let mut store = MemoryPersist::new(0);
        saving.save_to_checkpoint_shared(&mut store).unwrap();

        let mut restoring = InputCoordinator::new(ProcessTopology::single(), TaskKind::Classification);
        restoring.load_from_checkpoint_shared(&store, &SingleProcess::new()).unwrap();
        prop_assert_eq!(restoring.progress_header(), header);
    }
}

#[test]
fn test_round_trip_boundaries() {
    for value in [0, 1 << 63, u64::MAX] {
        let header = DatasetHeader {
            train_processed: value,
            train_total: value,
            test_processed: value,
            test_total: value,
            validate_processed: value,
            validate_total: value,
        };
        let bytes = header.to_bytes().unwrap();
        assert_eq!(bytes.len(), DatasetHeader::ENCODED_LEN);
        assert_eq!(DatasetHeader::from_bytes(&bytes).unwrap(), header);
    }
}

#[test]
fn test_overrun_is_counted_not_clamped() {
    let mut state = DatasetState::new(ExecutionMode::Training);
    state.attach(Box::new(RecordingDataset::new("train", 10, 4, 2)));
    state.advance(8).unwrap();
    assert!(!state.is_overrun());
    assert_eq!(state.advance(8).unwrap(), 16);
    assert!(state.is_overrun());
}
