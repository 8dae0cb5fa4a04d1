//! Tick-driven deferred task scheduler.
//!
//! Work is submitted with a delay in ticks. Each [`TaskScheduler::tick`]
//! decrements every queued task by one and runs the tasks that reach zero,
//! in the order they were queued. A delay of zero (or less) runs the work
//! immediately in the calling thread and never touches the queue.
//!
//! # Failure isolation
//!
//! A task that returns an error or panics is logged and dropped. It never
//! prevents the other tasks due in the same tick from running.
//!
//! # Threading
//!
//! The queue sits behind a [`Mutex`], so any thread may call
//! [`TaskScheduler::schedule`]. Due tasks are drained under the lock and run
//! after it is released, which lets a task schedule follow-up work.

pub mod task;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use singularity_events::isolate;
use singularity_types::{TaskId, TaskSnapshot};
use tracing::{debug, error, warn};

pub use task::{FnTaskFactory, PersistedTask, TaskError, TaskFactory, TaskTypeRegistry};

/// Transient work: a closure that runs once.
pub type TaskWork = Box<dyn FnOnce() -> Result<(), TaskError> + Send>;

/// Outcome of one scheduler tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tasks that ran to completion.
    pub executed: usize,
    /// Tasks that returned an error or panicked.
    pub failed: usize,
}

/// Outcome of loading a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Tasks re-queued.
    pub restored: usize,
    /// Entries dropped because their type could not be rebuilt.
    pub skipped: usize,
}

/// Scheduler contract shared by [`Scheduler`] and [`NoopScheduler`].
pub trait TaskScheduler: Send + Sync {
    /// Queue transient work to run after `delay_ticks` ticks.
    ///
    /// Negative delays are treated as zero. Zero runs `work` before this
    /// call returns.
    fn schedule(&self, delay_ticks: i64, work: TaskWork);

    /// Queue a persisted task. Same delay rules as [`TaskScheduler::schedule`].
    fn schedule_persisted(&self, delay_ticks: i64, task: Box<dyn PersistedTask>);

    /// Advance every queued task by one tick and run those that are due.
    fn tick(&self) -> TickReport;

    /// Drop every pending task without running it. Returns how many were
    /// dropped.
    fn clear(&self) -> usize;

    /// Number of queued tasks.
    fn pending_tasks(&self) -> usize;

    /// Whether nothing is queued.
    fn is_empty(&self) -> bool {
        self.pending_tasks() == 0
    }

    /// Snapshot every persistable task, in queue order.
    fn snapshot(&self) -> Vec<TaskSnapshot>;

    /// Rebuild and re-queue tasks from a snapshot.
    fn load_snapshot(&self, snapshots: &[TaskSnapshot]) -> RestoreReport;
}

/// Closure-friendly helpers for any [`TaskScheduler`].
pub trait TaskSchedulerExt: TaskScheduler {
    /// Queue a closure without boxing it at the call site.
    fn schedule_fn<F>(&self, delay_ticks: i64, work: F)
    where
        F: FnOnce() -> Result<(), TaskError> + Send + 'static,
    {
        self.schedule(delay_ticks, Box::new(work));
    }
}

impl<S: TaskScheduler + ?Sized> TaskSchedulerExt for S {}

/// The work carried by a queued task.
enum Work {
    Transient(TaskWork),
    Persisted(Box<dyn PersistedTask>),
}

impl Work {
    fn run(self) -> Result<(), TaskError> {
        match self {
            Self::Transient(work) => work(),
            Self::Persisted(task) => task.run(),
        }
    }

    fn type_key(&self) -> Option<&str> {
        match self {
            Self::Transient(_) => None,
            Self::Persisted(task) => Some(task.type_key()),
        }
    }
}

struct ScheduledTask {
    id: TaskId,
    remaining_ticks: u64,
    work: Work,
}

/// Clamp a signed delay to a tick count.
fn clamp_delay(delay_ticks: i64) -> u64 {
    u64::try_from(delay_ticks).unwrap_or(0)
}

/// Run one unit of work with failure isolation. Returns `true` on success.
fn execute(id: TaskId, work: Work) -> bool {
    let type_key = work.type_key().unwrap_or("transient").to_owned();
    match isolate::guarded(|| work.run()) {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            warn!(task_id = %id, task_type = %type_key, error = %err, "Scheduled task failed");
            false
        }
        Err(panic) => {
            error!(task_id = %id, task_type = %type_key, panic = %panic, "Scheduled task panicked");
            false
        }
    }
}

/// The real scheduler.
pub struct Scheduler {
    queue: Mutex<Vec<ScheduledTask>>,
    registry: Arc<TaskTypeRegistry>,
}

impl Scheduler {
    /// Create a scheduler that restores persisted tasks through `registry`.
    pub fn new(registry: Arc<TaskTypeRegistry>) -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
            registry,
        }
    }

    /// The task type registry used by [`TaskScheduler::load_snapshot`].
    pub const fn registry(&self) -> &Arc<TaskTypeRegistry> {
        &self.registry
    }

    fn queue(&self) -> MutexGuard<'_, Vec<ScheduledTask>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn submit(&self, delay_ticks: i64, work: Work) {
        let delay = clamp_delay(delay_ticks);
        let id = TaskId::new();
        if delay == 0 {
            execute(id, work);
            return;
        }
        self.queue().push(ScheduledTask {
            id,
            remaining_ticks: delay,
            work,
        });
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(Arc::new(TaskTypeRegistry::new()))
    }
}

impl core::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending_tasks", &self.pending_tasks())
            .field("registry", &self.registry)
            .finish()
    }
}

impl TaskScheduler for Scheduler {
    fn schedule(&self, delay_ticks: i64, work: TaskWork) {
        self.submit(delay_ticks, Work::Transient(work));
    }

    fn schedule_persisted(&self, delay_ticks: i64, task: Box<dyn PersistedTask>) {
        self.submit(delay_ticks, Work::Persisted(task));
    }

    fn tick(&self) -> TickReport {
        let due = {
            let mut queue = self.queue();
            for task in queue.iter_mut() {
                task.remaining_ticks = task.remaining_ticks.saturating_sub(1);
            }
            let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut *queue)
                .into_iter()
                .partition(|task| task.remaining_ticks == 0);
            *queue = waiting;
            due
        };

        let mut report = TickReport::default();
        for task in due {
            if execute(task.id, task.work) {
                report.executed = report.executed.saturating_add(1);
            } else {
                report.failed = report.failed.saturating_add(1);
            }
        }
        if report.executed > 0 || report.failed > 0 {
            debug!(executed = report.executed, failed = report.failed, "Scheduler tick");
        }
        report
    }

    fn clear(&self) -> usize {
        let dropped = std::mem::take(&mut *self.queue()).len();
        if dropped > 0 {
            debug!(dropped, "Scheduler cleared");
        }
        dropped
    }

    fn pending_tasks(&self) -> usize {
        self.queue().len()
    }

    /// Persisted tasks are asked to [`save`](PersistedTask::save) while the
    /// queue lock is held, so `save` must not call back into the scheduler.
    fn snapshot(&self) -> Vec<TaskSnapshot> {
        let queue = self.queue();
        queue
            .iter()
            .filter_map(|task| {
                let Work::Persisted(persisted) = &task.work else {
                    return None;
                };
                match isolate::guarded(|| persisted.save()) {
                    Ok(Ok(payload)) => Some(TaskSnapshot {
                        id: task.id,
                        type_key: persisted.type_key().to_owned(),
                        remaining_ticks: task.remaining_ticks,
                        payload,
                    }),
                    Ok(Err(err)) => {
                        warn!(task_id = %task.id, error = %err, "Task could not be saved, omitted from snapshot");
                        None
                    }
                    Err(panic) => {
                        error!(task_id = %task.id, panic = %panic, "Task panicked while saving, omitted from snapshot");
                        None
                    }
                }
            })
            .collect()
    }

    fn load_snapshot(&self, snapshots: &[TaskSnapshot]) -> RestoreReport {
        let mut report = RestoreReport::default();
        let mut rebuilt = Vec::with_capacity(snapshots.len());

        for snapshot in snapshots {
            let Some(factory) = self.registry.factory(&snapshot.type_key) else {
                warn!(
                    task_id = %snapshot.id,
                    task_type = %snapshot.type_key,
                    "Unknown task type in snapshot, skipping"
                );
                report.skipped = report.skipped.saturating_add(1);
                continue;
            };
            match isolate::guarded(|| factory.create(&snapshot.payload)) {
                Ok(Some(task)) => {
                    rebuilt.push(ScheduledTask {
                        id: snapshot.id,
                        remaining_ticks: snapshot.remaining_ticks,
                        work: Work::Persisted(task),
                    });
                    report.restored = report.restored.saturating_add(1);
                }
                Ok(None) => {
                    warn!(
                        task_id = %snapshot.id,
                        task_type = %snapshot.type_key,
                        "Task factory rejected payload, skipping"
                    );
                    report.skipped = report.skipped.saturating_add(1);
                }
                Err(panic) => {
                    error!(
                        task_id = %snapshot.id,
                        task_type = %snapshot.type_key,
                        panic = %panic,
                        "Task factory panicked, skipping"
                    );
                    report.skipped = report.skipped.saturating_add(1);
                }
            }
        }

        self.queue().extend(rebuilt);
        debug!(restored = report.restored, skipped = report.skipped, "Scheduler snapshot loaded");
        report
    }
}

/// Inert scheduler used before a real one is installed.
///
/// Submitted work is dropped without running, even with a zero delay.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopScheduler;

impl TaskScheduler for NoopScheduler {
    fn schedule(&self, _delay_ticks: i64, _work: TaskWork) {
        debug!("No scheduler installed, dropping task");
    }

    fn schedule_persisted(&self, _delay_ticks: i64, task: Box<dyn PersistedTask>) {
        debug!(task_type = task.type_key(), "No scheduler installed, dropping task");
    }

    fn tick(&self) -> TickReport {
        TickReport::default()
    }

    fn clear(&self) -> usize {
        0
    }

    fn pending_tasks(&self) -> usize {
        0
    }

    fn snapshot(&self) -> Vec<TaskSnapshot> {
        Vec::new()
    }

    fn load_snapshot(&self, snapshots: &[TaskSnapshot]) -> RestoreReport {
        RestoreReport {
            restored: 0,
            skipped: snapshots.len(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use singularity_types::TaskPayload;

    use super::*;

    /// Shared log of which task labels ran, in order.
    type RunLog = Arc<Mutex<Vec<String>>>;

    fn run_log() -> RunLog {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn record(log: &RunLog, label: &str) -> impl FnOnce() -> Result<(), TaskError> + Send + use<> {
        let log = Arc::clone(log);
        let label = label.to_owned();
        move || {
            log.lock().unwrap().push(label);
            Ok(())
        }
    }

    fn entries(log: &RunLog) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    /// Persisted task that appends its label to a process-wide log.
    struct LabelTask {
        label: String,
        log: RunLog,
    }

    impl PersistedTask for LabelTask {
        fn type_key(&self) -> &str {
            "label"
        }

        fn save(&self) -> Result<TaskPayload, TaskError> {
            Ok(TaskPayload::encode(&self.label)?)
        }

        fn run(self: Box<Self>) -> Result<(), TaskError> {
            self.log.lock().unwrap().push(self.label);
            Ok(())
        }
    }

    fn label_registry(log: &RunLog) -> Arc<TaskTypeRegistry> {
        let registry = Arc::new(TaskTypeRegistry::new());
        let log = Arc::clone(log);
        registry.register(Arc::new(FnTaskFactory::new("label", move |payload: &TaskPayload| {
            let label: String = payload.decode().ok()?;
            Some(Box::new(LabelTask {
                label,
                log: Arc::clone(&log),
            }) as Box<dyn PersistedTask>)
        })));
        registry
    }

    #[test]
    fn zero_delay_runs_before_schedule_returns() {
        let scheduler = Scheduler::default();
        let log = run_log();
        scheduler.schedule_fn(0, record(&log, "now"));
        assert_eq!(entries(&log), vec!["now"]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn negative_delay_is_clamped_to_zero() {
        let scheduler = Scheduler::default();
        let log = run_log();
        scheduler.schedule_fn(-5, record(&log, "now"));
        assert_eq!(entries(&log), vec!["now"]);
        assert_eq!(scheduler.pending_tasks(), 0);
    }

    #[test]
    fn delay_one_fires_on_next_tick() {
        let scheduler = Scheduler::default();
        let log = run_log();
        scheduler.schedule_fn(1, record(&log, "next"));
        assert!(entries(&log).is_empty());
        assert_eq!(scheduler.pending_tasks(), 1);
        let report = scheduler.tick();
        assert_eq!(report.executed, 1);
        assert_eq!(entries(&log), vec!["next"]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn tasks_fire_exactly_on_their_delay() {
        let scheduler = Scheduler::default();
        let log = run_log();
        scheduler.schedule_fn(3, record(&log, "three"));
        scheduler.schedule_fn(2, record(&log, "two"));
        scheduler.schedule_fn(5, record(&log, "five"));

        let mut fired_at = Vec::new();
        for tick in 1..=6_u64 {
            let before = entries(&log).len();
            scheduler.tick();
            for label in entries(&log).iter().skip(before) {
                fired_at.push((label.clone(), tick));
            }
        }
        assert_eq!(
            fired_at,
            vec![
                ("two".to_owned(), 2),
                ("three".to_owned(), 3),
                ("five".to_owned(), 5)
            ]
        );
    }

    #[test]
    fn failing_task_does_not_stop_siblings() {
        let scheduler = Scheduler::default();
        let log = run_log();
        scheduler.schedule_fn(1, || panic!("task A exploded"));
        scheduler.schedule_fn(1, record(&log, "B"));
        scheduler.schedule_fn(1, || Err(TaskError::failed("task C reported failure")));
        scheduler.schedule_fn(1, record(&log, "D"));

        let report = scheduler.tick();
        assert_eq!(report, TickReport { executed: 2, failed: 2 });
        assert_eq!(entries(&log), vec!["B", "D"]);
    }

    #[test]
    fn task_may_schedule_follow_up_work() {
        let scheduler = Arc::new(Scheduler::default());
        let log = run_log();
        let inner = Arc::clone(&scheduler);
        let follow_up = record(&log, "follow-up");
        scheduler.schedule_fn(1, move || {
            inner.schedule_fn(1, follow_up);
            Ok(())
        });
        scheduler.tick();
        assert!(entries(&log).is_empty());
        assert_eq!(scheduler.pending_tasks(), 1);
        scheduler.tick();
        assert_eq!(entries(&log), vec!["follow-up"]);
    }

    #[test]
    fn clear_discards_without_running() {
        let scheduler = Scheduler::default();
        let ran = Arc::new(AtomicUsize::new(0));
        for delay in 1..=3 {
            let ran = Arc::clone(&ran);
            scheduler.schedule_fn(delay, move || {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        assert_eq!(scheduler.clear(), 3);
        for _ in 0..5 {
            scheduler.tick();
        }
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn snapshot_skips_transient_tasks() {
        let log = run_log();
        let scheduler = Scheduler::new(label_registry(&log));
        scheduler.schedule_fn(4, record(&log, "transient"));
        scheduler.schedule_persisted(
            6,
            Box::new(LabelTask {
                label: "durable".to_owned(),
                log: Arc::clone(&log),
            }),
        );
        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.first().map(|s| s.remaining_ticks), Some(6));
        assert_eq!(snapshot.first().map(|s| s.type_key.as_str()), Some("label"));
    }

    #[test]
    fn snapshot_round_trip_preserves_order_and_timing() {
        let log = run_log();
        let original = Scheduler::new(label_registry(&log));
        for (label, delay) in [("a", 3), ("b", 0), ("c", 7)] {
            original.schedule_persisted(
                delay,
                Box::new(LabelTask {
                    label: label.to_owned(),
                    log: Arc::clone(&log),
                }),
            );
        }
        // The zero-delay task ran synchronously and never entered the queue.
        assert_eq!(entries(&log), vec!["b"]);
        let snapshot = original.snapshot();
        assert_eq!(snapshot.len(), 2);

        let restored_log = run_log();
        let restored = Scheduler::new(label_registry(&restored_log));
        let report = restored.load_snapshot(&snapshot);
        assert_eq!(report, RestoreReport { restored: 2, skipped: 0 });

        let mut fired_at = Vec::new();
        for tick in 1..=8_u64 {
            let before = entries(&restored_log).len();
            restored.tick();
            for label in entries(&restored_log).iter().skip(before) {
                fired_at.push((label.clone(), tick));
            }
        }
        assert_eq!(fired_at, vec![("a".to_owned(), 3), ("c".to_owned(), 7)]);
        assert_eq!(restored.snapshot().len(), 0);
    }

    #[test]
    fn unknown_task_types_are_skipped() {
        let scheduler = Scheduler::default();
        let report = scheduler.load_snapshot(&[TaskSnapshot {
            id: TaskId::new(),
            type_key: "retired-in-last-release".to_owned(),
            remaining_ticks: 4,
            payload: TaskPayload::empty(),
        }]);
        assert_eq!(report, RestoreReport { restored: 0, skipped: 1 });
        assert!(scheduler.is_empty());
    }

    #[test]
    fn unreadable_payload_is_skipped() {
        let log = run_log();
        let scheduler = Scheduler::new(label_registry(&log));
        let report = scheduler.load_snapshot(&[TaskSnapshot {
            id: TaskId::new(),
            type_key: "label".to_owned(),
            remaining_ticks: 2,
            payload: TaskPayload::from_bytes(vec![0xff, 0x00]),
        }]);
        assert_eq!(report.skipped, 1);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn restored_task_ids_survive() {
        let log = run_log();
        let scheduler = Scheduler::new(label_registry(&log));
        let id = TaskId::new();
        scheduler.load_snapshot(&[TaskSnapshot {
            id,
            type_key: "label".to_owned(),
            remaining_ticks: 2,
            payload: TaskPayload::encode(&"kept").unwrap(),
        }]);
        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.first().map(|s| s.id), Some(id));
    }

    #[test]
    fn schedule_from_another_thread() {
        let scheduler = Arc::new(Scheduler::default());
        let ran = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let scheduler = Arc::clone(&scheduler);
                let ran = Arc::clone(&ran);
                std::thread::spawn(move || {
                    scheduler.schedule_fn(1, move || {
                        ran.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    });
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(scheduler.pending_tasks(), 4);
        scheduler.tick();
        assert_eq!(ran.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn noop_scheduler_is_inert() {
        let scheduler = NoopScheduler;
        let log = run_log();
        scheduler.schedule_fn(0, record(&log, "never"));
        scheduler.schedule_fn(1, record(&log, "never"));
        assert_eq!(scheduler.tick(), TickReport::default());
        assert!(entries(&log).is_empty());
        assert!(scheduler.is_empty());
    }
}
