mod common;

use common::{
    FailingEstimator, PanickingEstimator, RecordingDisplay, ScriptedEstimator, orchestrator, stream_message,
};
use pose_pipeline::pipeline::EstimateStatus;
use pose_pipeline::{
    ConsoleDisplay, ControlCommand, ControlInterpreter, GoalHandler, GoalId, GoalRequest,
    PipelineState, SharedState, StopMatch, StopReason, StreamHandler,
};
use std::path::PathBuf;
use std::sync::atomic::Ordering;

#[tokio::test]
async fn estimator_receives_configured_model_path() {
    let shared = SharedState::new(true);
    let estimator = ScriptedEstimator::default();
    let loaded = estimator.loaded_model.clone();
    let (_orchestrator, _bus) = orchestrator(&shared, Box::new(estimator));
    assert_eq!(
        loaded.lock().clone(),
        Some(PathBuf::from("/default/human-pose-estimation.xml"))
    );
}

#[tokio::test]
async fn displayed_slot_lags_fetch_by_two_iterations() {
    let shared = SharedState::new(true);
    let stream = StreamHandler::new(shared.clone());
    stream.on_frame(&stream_message(0));

    let display = RecordingDisplay::default();
    let (orchestrator, _bus) = orchestrator(&shared, Box::new(ScriptedEstimator::default()));
    let mut orchestrator = orchestrator.with_display(Box::new(display.clone()));
    assert!(orchestrator.start().await);
    assert_eq!(orchestrator.state(), PipelineState::Running);

    let mut reports = Vec::new();
    for seq in 1..=5 {
        stream.on_frame(&stream_message(seq));
        reports.push(orchestrator.step().await.unwrap());
    }

    for report in &reports {
        assert_eq!(report.fetched, Some(report.iteration));
        assert_eq!(report.estimated, report.iteration - 1);
        assert!(report.stop.is_none());
    }
    for report in &reports[2..] {
        assert_eq!(report.displayed, Some(report.fetched.unwrap() - 2));
    }
    let last = reports.last().unwrap();
    assert_eq!((last.fetched, last.displayed), (Some(5), Some(3)));

    // From the second iteration on, the displayed slot was estimated one
    // iteration earlier and therefore carries a rendered overlay.
    let shown = display.shown.lock().clone();
    assert_eq!(shown.len(), 5);
    assert!(!shown[0].1);
    assert!(shown[1..].iter().all(|(_, rendered)| *rendered));

    let summary = orchestrator.finish().await;
    assert_eq!(summary.iterations, 5);
}

#[tokio::test]
async fn seeded_slots_render_identically_for_unchanged_input() {
    let shared = SharedState::new(true);
    StreamHandler::new(shared.clone()).on_frame(&stream_message(7));
    let (mut orchestrator, _bus) = orchestrator(&shared, Box::new(ScriptedEstimator::default()));
    assert!(orchestrator.start().await);
    let unrendered = orchestrator.slot(0).unwrap().frame.checksum();

    let mut outputs = Vec::new();
    for _ in 0..3 {
        let report = orchestrator.step().await.unwrap();
        assert_eq!(report.estimate, EstimateStatus::Rendered { poses: 1 });
        let slot = orchestrator.slot(report.indices.estimate).unwrap();
        assert!(slot.rendered);
        outputs.push(slot.frame.checksum());
    }
    assert_ne!(outputs[0], unrendered);
    assert!(outputs.windows(2).all(|w| w[0] == w[1]));
    orchestrator.finish().await;
}

#[tokio::test]
async fn goal_frame_completes_goal_once_estimated() {
    // Disarmed: stream frames are not estimated but goal frames are.
    let shared = SharedState::new(false);
    StreamHandler::new(shared.clone()).on_frame(&stream_message(0));
    let (mut orchestrator, bus) = orchestrator(&shared, Box::new(ScriptedEstimator::default()));
    let mut results = bus.goals_tx.subscribe();
    assert!(orchestrator.start().await);

    let goals = GoalHandler::new(shared.clone());
    goals
        .on_goal(GoalRequest {
            id: GoalId::from("check-1"),
            image: stream_message(100),
        })
        .unwrap();
    assert!(goals.is_processing());

    let first = orchestrator.step().await.unwrap();
    assert_eq!(first.fetched, Some(100));
    assert_eq!(first.estimate, EstimateStatus::Skipped);

    let second = orchestrator.step().await.unwrap();
    assert_eq!(second.estimated, 100);
    assert_eq!(second.estimate, EstimateStatus::Rendered { poses: 1 });

    let result = results.try_recv().unwrap();
    assert_eq!(result.id, GoalId::from("check-1"));
    assert_eq!(result.header.seq, 100);
    assert_eq!(result.poses.len(), 1);
    assert!(!goals.is_processing());

    // The goal frame is still the latest frame; re-fetched copies of a finished
    // goal are no longer estimated while disarmed.
    let third = orchestrator.step().await.unwrap();
    assert_eq!(third.estimated, 100);
    assert_eq!(third.estimate, EstimateStatus::Skipped);
    assert!(results.try_recv().is_err());

    goals
        .on_goal(GoalRequest {
            id: GoalId::from("check-2"),
            image: stream_message(101),
        })
        .unwrap();
    orchestrator.finish().await;
}

#[tokio::test]
async fn preempted_goal_produces_no_result() {
    let shared = SharedState::new(true);
    let (mut orchestrator, bus) = orchestrator(&shared, Box::new(ScriptedEstimator::default()));
    let mut results = bus.goals_tx.subscribe();
    let goals = GoalHandler::new(shared.clone());
    goals
        .on_goal(GoalRequest {
            id: GoalId::from("g"),
            image: stream_message(1),
        })
        .unwrap();
    assert!(goals.on_preempt());
    assert!(orchestrator.start().await);

    let report = orchestrator.step().await.unwrap();
    assert_eq!(report.estimate, EstimateStatus::Rendered { poses: 1 });
    assert!(results.try_recv().is_err());
    assert!(shared.goals.record().preempt_requested);
    orchestrator.finish().await;
}

#[tokio::test]
async fn control_commands_gate_inference_and_feedback() {
    let shared = SharedState::new(false);
    let stream = StreamHandler::new(shared.clone());
    stream.on_frame(&stream_message(0));
    let control = ControlInterpreter::new(shared.clone(), "human_pose", StopMatch::Contains);
    let estimator = ScriptedEstimator::default();
    let inferences = estimator.inferences.clone();
    let (mut orchestrator, bus) = orchestrator(&shared, Box::new(estimator));
    let mut feedback = bus.feedback_tx.subscribe();
    assert!(orchestrator.start().await);

    assert_eq!(orchestrator.step().await.unwrap().estimate, EstimateStatus::Skipped);
    assert_eq!(inferences.load(Ordering::SeqCst), 0);

    control.handle(&ControlCommand::new("human_pose", "detect", "wave"));
    let report = orchestrator.step().await.unwrap();
    assert_eq!(report.estimate, EstimateStatus::Rendered { poses: 1 });
    let published = feedback.try_recv().unwrap();
    assert_eq!(published.poses.len(), 1);
    assert!(published.detect_specific_pose);
    assert_eq!(published.target_pose.as_deref(), Some("wave"));

    control.handle(&ControlCommand::new("human_pose", "stop", ""));
    assert_eq!(orchestrator.step().await.unwrap().estimate, EstimateStatus::Skipped);
    assert!(feedback.try_recv().is_err());
    orchestrator.finish().await;
}

#[tokio::test]
async fn failed_inference_does_not_stop_the_loop() {
    let shared = SharedState::new(true);
    let stream = StreamHandler::new(shared.clone());
    stream.on_frame(&stream_message(0));
    let display = RecordingDisplay::default();
    let (orchestrator, _bus) = orchestrator(&shared, Box::new(FailingEstimator));
    let mut orchestrator = orchestrator.with_display(Box::new(display.clone()));
    assert!(orchestrator.start().await);

    for seq in 1..=4 {
        stream.on_frame(&stream_message(seq));
        let report = orchestrator.step().await.unwrap();
        assert!(matches!(report.estimate, EstimateStatus::Failed(_)));
        assert!(report.stop.is_none());
    }
    assert!(display.shown.lock().iter().all(|(_, rendered)| !rendered));
    assert_eq!(orchestrator.state(), PipelineState::Running);
    orchestrator.finish().await;
}

#[tokio::test]
async fn panicking_estimator_does_not_stop_the_loop() {
    let shared = SharedState::new(true);
    let stream = StreamHandler::new(shared.clone());
    stream.on_frame(&stream_message(0));
    let (mut orchestrator, _bus) = orchestrator(&shared, Box::new(PanickingEstimator));
    assert!(orchestrator.start().await);

    for seq in 1..=2 {
        stream.on_frame(&stream_message(seq));
        let report = orchestrator.step().await.unwrap();
        assert!(matches!(report.estimate, EstimateStatus::Failed(_)));
        assert_eq!(report.fetched, Some(seq));
        assert!(report.stop.is_none());
    }
    assert_eq!(orchestrator.state(), PipelineState::Running);
    assert_eq!(orchestrator.finish().await.iterations, 2);
}

#[tokio::test]
async fn display_quit_stops_the_pipeline() {
    let shared = SharedState::new(true);
    StreamHandler::new(shared.clone()).on_frame(&stream_message(0));
    let display = ConsoleDisplay::new(false);
    let quit = display.quit_flag();
    let (orchestrator, _bus) = orchestrator(&shared, Box::new(ScriptedEstimator::default()));
    let mut orchestrator = orchestrator.with_display(Box::new(display));
    assert!(orchestrator.start().await);

    assert!(orchestrator.step().await.unwrap().stop.is_none());
    quit.store(true, Ordering::SeqCst);
    let report = orchestrator.step().await.unwrap();
    assert_eq!(report.stop, Some(StopReason::QuitRequested));
    assert_eq!(orchestrator.state(), PipelineState::Stopped);
    assert!(!shared.status.is_running());
    assert!(orchestrator.step().await.is_err());

    let summary = orchestrator.finish().await;
    assert_eq!(summary.iterations, 2);
    assert_eq!(summary.stop, Some(StopReason::QuitRequested));
}
