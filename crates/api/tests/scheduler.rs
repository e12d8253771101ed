//! Scheduler installation semantics against an in-memory registry.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::Utc;
use picstyle_api::background::scheduler;
use picstyle_core::error::CoreError;
use picstyle_core::registry::{
    ScheduledTask, ScheduledTaskSpec, TaskRegistry, TaskSchedule,
};

#[derive(Default)]
struct MemRegistry {
    tasks: Mutex<BTreeMap<String, ScheduledTask>>,
    clears: Mutex<u32>,
}

#[async_trait::async_trait]
impl TaskRegistry for MemRegistry {
    async fn clear_namespace(&self) -> Result<u64, CoreError> {
        let mut tasks = self.tasks.lock().unwrap();
        *self.clears.lock().unwrap() += 1;
        let cleared = tasks.len() as u64;
        tasks.clear();
        Ok(cleared)
    }

    async fn install(&self, spec: &ScheduledTaskSpec) -> Result<(), CoreError> {
        self.tasks.lock().unwrap().insert(
            spec.name.to_string(),
            ScheduledTask {
                name: spec.name.to_string(),
                schedule: spec.schedule.clone(),
                timeout_secs: spec.timeout_secs,
                next_run_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ScheduledTask>, CoreError> {
        Ok(self.tasks.lock().unwrap().values().cloned().collect())
    }
}

#[tokio::test]
async fn install_registers_the_full_task_set() {
    let registry = MemRegistry::default();
    scheduler::install_all(&registry).await.unwrap();

    let names: Vec<String> = registry
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(
        names,
        vec!["cleanup_data", "health_check", "history_maintenance", "stats_log"]
    );
}

#[tokio::test]
async fn reinstall_is_idempotent() {
    // Simulates a crash/restart cycle: a second install must not leave
    // duplicate registrations firing under the same name.
    let registry = MemRegistry::default();
    scheduler::install_all(&registry).await.unwrap();
    scheduler::install_all(&registry).await.unwrap();

    assert_eq!(registry.list().await.unwrap().len(), 4);
    assert_eq!(*registry.clears.lock().unwrap(), 2);
}

#[tokio::test]
async fn clear_runs_before_install() {
    // Pre-seed a stale registration under a name the task set no longer
    // uses; install must wipe it.
    let registry = MemRegistry::default();
    registry
        .install(&ScheduledTaskSpec {
            name: "legacy_task",
            schedule: TaskSchedule::Every {
                interval_secs: 60,
                initial_delay_secs: 0,
            },
            timeout_secs: 60,
        })
        .await
        .unwrap();

    scheduler::install_all(&registry).await.unwrap();

    let names: Vec<String> = registry
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert!(!names.contains(&"legacy_task".to_string()));
    assert_eq!(names.len(), 4);
}

#[test]
fn canary_fires_shortly_after_start() {
    let specs = scheduler::task_specs();
    let canary = specs.iter().find(|s| s.name == "health_check").unwrap();
    match &canary.schedule {
        TaskSchedule::Every {
            interval_secs,
            initial_delay_secs,
        } => {
            assert_eq!(*initial_delay_secs, 10);
            assert_eq!(*interval_secs, 15 * 60);
        }
        other => panic!("unexpected schedule: {other:?}"),
    }
}
