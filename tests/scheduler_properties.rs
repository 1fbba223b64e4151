// tests/scheduler_properties.rs

use std::collections::{HashMap, HashSet, VecDeque};

use proptest::prelude::*;

use dagrun::dag::{Graph, Scheduler, TaskRunState, TaskSpec};
use dagrun::types::{TaskStatus, TriggerRule};

#[derive(Debug, Clone)]
struct Scenario {
    graph: Graph,
    failing: HashSet<String>,
    max_concurrency: usize,
    /// Cancel after this many completions, if set.
    cancel_after: Option<usize>,
}

// Strategy to generate a valid DAG.
// We ensure acyclicity by only allowing task N to depend on tasks 0..N-1.
fn scenario_strategy(max_tasks: usize) -> impl Strategy<Value = Scenario> {
    (1..=max_tasks).prop_flat_map(|n| {
        (
            proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..3), n),
            proptest::collection::vec(any::<bool>(), n),
            proptest::collection::vec(any::<bool>(), n),
            1..4usize,
            proptest::option::of(0..n),
        )
            .prop_map(move |(raw_deps, all_done, fails, max_concurrency, cancel_after)| {
                let mut graph = Graph::new();
                let mut failing = HashSet::new();

                for i in 0..n {
                    let id = format!("task_{i}");
                    let rule = if all_done[i] {
                        TriggerRule::AllDone
                    } else {
                        TriggerRule::AllSuccess
                    };
                    graph
                        .add_task(TaskSpec::shell(id.clone(), "true").with_trigger_rule(rule))
                        .unwrap();
                    if fails[i] {
                        failing.insert(id);
                    }
                }

                for (i, deps) in raw_deps.iter().enumerate() {
                    if i == 0 {
                        continue;
                    }
                    for dep in deps {
                        graph
                            .add_dependency(&format!("task_{}", dep % i), &format!("task_{i}"))
                            .unwrap();
                    }
                }

                Scenario {
                    graph,
                    failing,
                    max_concurrency,
                    cancel_after,
                }
            })
    })
}

fn is_terminal(state: Option<TaskRunState>) -> bool {
    matches!(
        state,
        Some(TaskRunState::Success | TaskRunState::Failed | TaskRunState::Skipped)
    )
}

proptest! {
    #[test]
    fn scheduler_always_terminates_and_respects_rules(scenario in scenario_strategy(10)) {
        let Scenario { graph, failing, max_concurrency, cancel_after } = scenario;
        let mut scheduler = Scheduler::new(&graph, max_concurrency);

        let mut dispatched: HashSet<String> = HashSet::new();
        let mut outcomes: HashMap<String, TaskStatus> = HashMap::new();
        let mut running: VecDeque<String> = VecDeque::new();
        let mut completions = 0usize;
        let mut finished = false;

        let mut step = scheduler.start_run();

        // Every task is dispatched or skipped at most once, so 2n steps is a
        // generous upper bound.
        for _ in 0..=(graph.len() * 2 + 2) {
            for task in &step.newly_scheduled {
                prop_assert!(dispatched.insert(task.id.clone()), "dispatched twice: {}", task.id);

                let deps = graph.dependencies_of(&task.id);
                for dep in &deps {
                    prop_assert!(is_terminal(scheduler.run_state_of(dep)));
                }
                if task.spec.trigger_rule == TriggerRule::AllSuccess {
                    for dep in &deps {
                        prop_assert_eq!(outcomes.get(*dep).copied(), Some(TaskStatus::Success));
                    }
                }
                running.push_back(task.id.clone());
            }
            prop_assert!(scheduler.running_count() <= max_concurrency);

            if step.run_just_finished {
                finished = true;
                break;
            }

            if cancel_after == Some(completions) && !scheduler.is_cancelled() {
                step = scheduler.step_cancel();
                prop_assert!(step.newly_scheduled.is_empty());
                continue;
            }

            let Some(id) = running.pop_front() else {
                break;
            };
            let status = if failing.contains(&id) {
                TaskStatus::Failed
            } else {
                TaskStatus::Success
            };
            outcomes.insert(id.clone(), status);
            completions += 1;
            step = scheduler.step_completion(&id, status);
            if scheduler.is_cancelled() {
                prop_assert!(step.newly_scheduled.is_empty());
            }
        }

        prop_assert!(finished, "run never finished");
        prop_assert!(scheduler.is_finished());
        prop_assert!(running.is_empty());

        for id in scheduler.task_ids() {
            let state = scheduler.run_state_of(id);
            prop_assert!(is_terminal(state));
            // Only dispatched tasks can end up Success / Failed.
            prop_assert_eq!(
                dispatched.contains(id),
                state != Some(TaskRunState::Skipped)
            );
        }
    }
}
