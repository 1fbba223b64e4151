// tests/scheduler_trigger_rules.rs

mod common;
use crate::common::builders::GraphBuilder;
use crate::common::init_tracing;

use dagrun::dag::{Graph, Scheduler, SchedulerStep, TaskRunState};
use dagrun::types::TaskStatus;

fn ids(step: &SchedulerStep) -> Vec<&str> {
    step.newly_scheduled.iter().map(|t| t.id.as_str()).collect()
}

fn chain() -> Graph {
    GraphBuilder::new()
        .task("A")
        .task("B")
        .task("C")
        .edge("A", "B")
        .edge("B", "C")
        .build()
}

#[test]
fn chain_runs_one_task_at_a_time_in_order() {
    init_tracing();

    let mut scheduler = Scheduler::new(&chain(), 4);

    let step = scheduler.start_run();
    assert_eq!(ids(&step), vec!["A"]);
    assert_eq!(scheduler.run_state_of("B"), Some(TaskRunState::Pending));

    let step = scheduler.step_completion("A", TaskStatus::Success);
    assert_eq!(ids(&step), vec!["B"]);
    assert!(!step.run_just_finished);

    let step = scheduler.step_completion("B", TaskStatus::Success);
    assert_eq!(ids(&step), vec!["C"]);

    let step = scheduler.step_completion("C", TaskStatus::Success);
    assert!(step.newly_scheduled.is_empty());
    assert!(step.run_just_finished);
    assert!(scheduler.is_finished());
}

#[test]
fn failure_skips_all_success_downstreams_transitively() {
    init_tracing();

    let mut scheduler = Scheduler::new(&chain(), 4);
    scheduler.start_run();

    let step = scheduler.step_completion("A", TaskStatus::Failed);

    assert!(step.newly_scheduled.is_empty());
    assert_eq!(step.newly_skipped, vec!["B".to_string(), "C".to_string()]);
    assert!(step.run_just_finished);
    assert_eq!(scheduler.run_state_of("A"), Some(TaskRunState::Failed));
    assert_eq!(scheduler.run_state_of("C"), Some(TaskRunState::Skipped));
}

#[test]
fn all_done_task_runs_after_upstream_failure() {
    init_tracing();

    let graph = GraphBuilder::new()
        .task("seed")
        .task("build")
        .all_done_task("report")
        .edge("seed", "build")
        .edge("build", "report")
        .build();
    let mut scheduler = Scheduler::new(&graph, 4);

    assert_eq!(ids(&scheduler.start_run()), vec!["seed"]);
    assert_eq!(
        ids(&scheduler.step_completion("seed", TaskStatus::Success)),
        vec!["build"]
    );

    let step = scheduler.step_completion("build", TaskStatus::Failed);
    assert_eq!(ids(&step), vec!["report"]);
    assert!(step.newly_skipped.is_empty());
    assert!(!step.run_just_finished);

    let step = scheduler.step_completion("report", TaskStatus::Success);
    assert!(step.run_just_finished);
}

#[test]
fn all_done_task_runs_after_skipped_upstream() {
    init_tracing();

    // A fails, B is skipped, C still runs.
    let graph = GraphBuilder::new()
        .task("A")
        .task("B")
        .all_done_task("C")
        .edge("A", "B")
        .edge("B", "C")
        .build();
    let mut scheduler = Scheduler::new(&graph, 4);
    scheduler.start_run();

    let step = scheduler.step_completion("A", TaskStatus::Failed);
    assert_eq!(step.newly_skipped, vec!["B".to_string()]);
    assert_eq!(ids(&step), vec!["C"]);
}

#[test]
fn task_waits_for_every_upstream() {
    init_tracing();

    let graph = GraphBuilder::new()
        .task("left")
        .task("right")
        .all_done_task("join")
        .edge("left", "join")
        .edge("right", "join")
        .build();
    let mut scheduler = Scheduler::new(&graph, 4);

    assert_eq!(ids(&scheduler.start_run()), vec!["left", "right"]);

    let step = scheduler.step_completion("left", TaskStatus::Failed);
    assert!(step.newly_scheduled.is_empty());
    assert_eq!(scheduler.deps_terminal("join"), Some(false));

    let step = scheduler.step_completion("right", TaskStatus::Success);
    assert_eq!(ids(&step), vec!["join"]);
    assert_eq!(scheduler.deps_terminal("join"), Some(true));
    assert_eq!(scheduler.deps_terminal("nope"), None);
}

#[test]
fn concurrency_limit_bounds_running_tasks() {
    init_tracing();

    let graph = GraphBuilder::new()
        .task("r0")
        .task("r1")
        .task("r2")
        .task("r3")
        .task("r4")
        .build();
    let mut scheduler = Scheduler::new(&graph, 2);

    let step = scheduler.start_run();
    assert_eq!(ids(&step), vec!["r0", "r1"]);
    assert_eq!(scheduler.running_count(), 2);
    assert_eq!(scheduler.run_state_of("r2"), Some(TaskRunState::Ready));

    let step = scheduler.step_completion("r0", TaskStatus::Success);
    assert_eq!(ids(&step), vec!["r2"]);
    assert_eq!(scheduler.running_count(), 2);

    let step = scheduler.step_completion("r2", TaskStatus::Failed);
    assert_eq!(ids(&step), vec!["r3"]);

    let step = scheduler.step_completion("r1", TaskStatus::Success);
    assert_eq!(ids(&step), vec!["r4"]);

    scheduler.step_completion("r3", TaskStatus::Success);
    let step = scheduler.step_completion("r4", TaskStatus::Success);
    assert!(step.run_just_finished);
}

#[test]
fn zero_concurrency_is_clamped_to_one() {
    init_tracing();

    let graph = GraphBuilder::new().task("a").task("b").build();
    let mut scheduler = Scheduler::new(&graph, 0);

    assert_eq!(scheduler.max_concurrency(), 1);
    assert_eq!(ids(&scheduler.start_run()), vec!["a"]);
}

#[test]
fn empty_graph_finishes_on_start() {
    init_tracing();

    let mut scheduler = Scheduler::new(&Graph::new(), 4);
    assert!(!scheduler.is_finished());

    let step = scheduler.start_run();
    assert!(step.newly_scheduled.is_empty());
    assert!(step.run_just_finished);
    assert!(scheduler.is_finished());
}

#[test]
fn completion_for_task_that_is_not_running_is_ignored() {
    init_tracing();

    let mut scheduler = Scheduler::new(&chain(), 4);
    scheduler.start_run();

    let step = scheduler.step_completion("B", TaskStatus::Success);
    assert!(step.newly_scheduled.is_empty());
    assert_eq!(scheduler.run_state_of("B"), Some(TaskRunState::Pending));

    let step = scheduler.step_completion("missing", TaskStatus::Success);
    assert!(step.newly_scheduled.is_empty());

    // A finishes once; a duplicate completion changes nothing.
    scheduler.step_completion("A", TaskStatus::Success);
    let step = scheduler.step_completion("A", TaskStatus::Failed);
    assert!(step.newly_scheduled.is_empty());
    assert_eq!(scheduler.run_state_of("A"), Some(TaskRunState::Success));
}

#[test]
fn cancel_skips_waiting_tasks_and_lists_running_ones() {
    init_tracing();

    let graph = GraphBuilder::new()
        .task("A")
        .task("B")
        .task("C")
        .all_done_task("report")
        .edge("A", "C")
        .edge("C", "report")
        .build();
    let mut scheduler = Scheduler::new(&graph, 1);

    // A running, B ready (no free slot), C and report pending.
    assert_eq!(ids(&scheduler.start_run()), vec!["A"]);
    assert_eq!(scheduler.run_state_of("B"), Some(TaskRunState::Ready));

    let step = scheduler.step_cancel();
    assert!(step.newly_scheduled.is_empty());
    assert_eq!(
        step.newly_skipped,
        vec!["B".to_string(), "C".to_string(), "report".to_string()]
    );
    assert_eq!(step.to_cancel, vec!["A".to_string()]);
    assert!(!step.run_just_finished);
    assert!(scheduler.is_cancelled());

    // Even ALL_DONE tasks stay skipped after cancellation.
    let step = scheduler.step_completion("A", TaskStatus::Failed);
    assert!(step.newly_scheduled.is_empty());
    assert!(step.run_just_finished);
    assert_eq!(scheduler.run_state_of("report"), Some(TaskRunState::Skipped));
}

#[test]
fn cancel_is_idempotent() {
    init_tracing();

    let mut scheduler = Scheduler::new(&chain(), 4);
    scheduler.start_run();

    let first = scheduler.step_cancel();
    assert_eq!(first.to_cancel, vec!["A".to_string()]);

    let second = scheduler.step_cancel();
    assert!(second.newly_skipped.is_empty());
    assert!(second.to_cancel.is_empty());
    assert!(!second.run_just_finished);
}

#[test]
fn cancel_before_start_skips_everything() {
    init_tracing();

    let mut scheduler = Scheduler::new(&chain(), 4);
    let step = scheduler.step_cancel();

    assert_eq!(step.newly_skipped.len(), 3);
    assert!(step.to_cancel.is_empty());
    assert!(step.run_just_finished);
    assert!(scheduler.is_finished());
}

#[test]
fn run_state_is_not_started_before_the_run() {
    let scheduler = Scheduler::new(&chain(), 4);
    assert_eq!(scheduler.run_state_of("A"), Some(TaskRunState::NotStarted));
    assert_eq!(scheduler.run_state_of("nope"), None);
    assert_eq!(scheduler.task_ids().collect::<Vec<_>>(), vec!["A", "B", "C"]);
}
