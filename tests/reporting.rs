//! Metric reporting across models.

mod common;

use common::*;
use gridtrain::*;

const TRAINING: [f64; 3] = [0.91, 0.85, 0.93];

fn metrics_for(model_id: usize) -> Vec<Box<dyn Metric>> {
    vec![Box::new(FixedMetric::accuracy(
        TRAINING[model_id],
        0.5 + model_id as f64,
        0.25 * (model_id + 1) as f64,
    ))]
}

fn run_epoch_end(metrics: fn(usize) -> Vec<Box<dyn Metric>>) -> Vec<(Result<()>, String)> {
    grid(3, 2)
        .run(|comm| {
            let topology = *comm.topology();
            let metrics = metrics(topology.model_id());
            let mut view = ModelView::new(&comm, &metrics);
            // Only the world master's counters appear in the report.
            view.step = 100 + topology.world_rank() as u64;
            view.validation_step = 10 + topology.world_rank() as u64;

            let mut cb = PrintCallback::new(Vec::new());
            let result = cb.on_epoch_end(&view);
            (result, String::from_utf8(cb.into_inner()).unwrap())
        })
        .unwrap()
}

#[test]
fn test_epoch_end_lines_ordered_by_model() {
    let outputs = run_epoch_end(metrics_for);

    assert!(outputs.iter().all(|(result, _)| result.is_ok()));
    let lines: Vec<&str> = outputs[0].1.lines().collect();
    assert_eq!(
        lines,
        vec![
            "Model 0 @100 steps Training categorical accuracy: 0.91% @10 validation steps Validation categorical accuracy: 0.5%",
            "Model 1 @100 steps Training categorical accuracy: 0.85% @10 validation steps Validation categorical accuracy: 1.5%",
            "Model 2 @100 steps Training categorical accuracy: 0.93% @10 validation steps Validation categorical accuracy: 2.5%",
        ]
    );
    for (_, text) in &outputs[1..] {
        assert!(text.is_empty());
    }
}

#[test]
fn test_test_end_lines() {
    let outputs = grid(3, 1)
        .run(|comm| {
            let metrics = metrics_for(comm.topology().model_id());
            let mut view = ModelView::new(&comm, &metrics);
            view.testing_step = 42;
            let mut cb = PrintCallback::new(Vec::new());
            cb.on_test_end(&view).unwrap();
            String::from_utf8(cb.into_inner()).unwrap()
        })
        .unwrap();

    assert_eq!(
        outputs[0],
        "Model 0 @42 testing steps external validation categorical accuracy: 0.25%\n\
         Model 1 @42 testing steps external validation categorical accuracy: 0.5%\n\
         Model 2 @42 testing steps external validation categorical accuracy: 0.75%\n"
    );
}

#[test]
fn test_failing_metric_aborts_whole_pass() {
    fn broken_on_model_one(model_id: usize) -> Vec<Box<dyn Metric>> {
        if model_id == 1 {
            vec![Box::new(FixedMetric::broken())]
        } else {
            metrics_for(model_id)
        }
    }

    let outputs = run_epoch_end(broken_on_model_one);
    for (world_rank, (result, text)) in outputs.iter().enumerate() {
        assert!(text.is_empty(), "rank {} wrote {:?}", world_rank, text);
        let is_model_master = world_rank % 2 == 0;
        assert_eq!(result.is_err(), is_model_master, "rank {}", world_rank);
    }
    assert!(matches!(outputs[0].0, Err(GridError::Metric { .. })));
}

#[test]
fn test_unit_follows_metric_kind() {
    let outputs = grid(2, 1)
        .run(|comm| {
            let metrics: Vec<Box<dyn Metric>> = vec![Box::new(FixedMetric {
                kind: MetricKind::MeanSquaredError,
                training: Some(0.125),
                validation: Some(0.25),
                testing: None,
            })];
            let view = ModelView::new(&comm, &metrics);
            let mut cb = PrintCallback::new(Vec::new());
            cb.on_epoch_end(&view).unwrap();
            String::from_utf8(cb.into_inner()).unwrap()
        })
        .unwrap();

    let first = outputs[0].lines().next().unwrap();
    assert_eq!(
        first,
        "Model 0 @0 steps Training mean squared error: 0.125 @0 validation steps Validation mean squared error: 0.25"
    );
}

#[test]
fn test_io_report_per_model() {
    let outputs = grid(2, 2)
        .run(|comm| {
            let topology = *comm.topology();
            let mut coordinator = InputCoordinator::new(topology, TaskKind::Classification);
            coordinator.set_training_dataset(Box::new(RecordingDataset::new("train", 60, 4, 2)));
            coordinator.set_execution_mode(ExecutionMode::Training);
            coordinator
                .update_num_samples_processed(10 * (topology.model_id() as u64 + 1))
                .unwrap();

            let view = ModelView::new(&comm, &[]).with_coordinator(&coordinator);
            let mut cb = IoCallback::new(Vec::new()).with_phases(&[ExecutionMode::Training]);
            cb.on_epoch_end(&view).unwrap();
            String::from_utf8(cb.into_inner()).unwrap()
        })
        .unwrap();

    assert_eq!(
        outputs[0],
        "Model 0 training I/O: 10 of 60 samples\nModel 1 training I/O: 20 of 60 samples\n"
    );
    assert!(outputs[1..].iter().all(String::is_empty));
}
