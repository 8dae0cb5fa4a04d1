//! End-to-end orchestration tests.
//!
//! These drive a fully composed [`Orchestrator`] the way a host does: one
//! `tick` plus one `tick_phases` per game tick.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use singularity_core::broadcast::{BroadcastService, ChannelBroadcast};
use singularity_core::config::SingularityProfile;
use singularity_core::effects::{PhaseChanged, ScenarioAttached, ScenarioDetached};
use singularity_core::orchestrator::{Orchestrator, OrchestratorParts};
use singularity_core::phase::{PhaseContext, PhaseError, PhaseHandler, PhaseHandlerTable};
use singularity_core::scenario::{Scenario, ScenarioError, ScenarioRegistry};
use singularity_core::scheduler::{
    FnTaskFactory, PersistedTask, Scheduler, TaskError, TaskScheduler, TaskSchedulerExt,
    TaskTypeRegistry,
};
use singularity_core::services::ServiceHub;
use singularity_core::state::SingularityState;
use singularity_core::world::{SimWorld, WorldHandle};
use singularity_events::{EffectBus, EffectBusExt, TypedEffectBus};
use singularity_types::{OrchestratorState, Phase, ScenarioId, TaskPayload, TaskSnapshot, WorldKey};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Scenario that records which id ran and whether infection was on.
struct Logged {
    id: ScenarioId,
    log: Log,
}

impl Scenario for Logged {
    fn id(&self) -> &ScenarioId {
        &self.id
    }

    fn tick(&mut self, _world: &dyn WorldHandle) -> Result<(), ScenarioError> {
        Ok(())
    }

    fn tick_infection(
        &mut self,
        _world: &dyn WorldHandle,
        singularity_active: bool,
    ) -> Result<(), ScenarioError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{singularity_active}", self.id));
        Ok(())
    }
}

fn logged_factory(id: &'static str, log: &Log) -> impl Fn() -> Box<dyn Scenario> + Send + Sync + use<> {
    let log = Arc::clone(log);
    move || -> Box<dyn Scenario> {
        Box::new(Logged {
            id: id.into(),
            log: Arc::clone(&log),
        })
    }
}

/// Advances a timed phase once it has lasted its configured duration.
struct Timed;

impl PhaseHandler for Timed {
    fn tick(&mut self, ctx: &mut PhaseContext<'_>) -> Result<(), PhaseError> {
        let phase = ctx.state().phase;
        let Some(duration) = ctx.profile().phase_duration(phase) else {
            return Ok(());
        };
        if ctx.state().ticks_in_phase < duration {
            return Ok(());
        }
        match phase {
            Phase::Fusing => ctx.handle_fuse_countdown_complete(),
            Phase::Collapse => ctx.enter_core(),
            Phase::Core => ctx.enter_ring(),
            Phase::Ring => ctx.begin_dissipation(),
            Phase::Dissipation => ctx.start_post_collapse_reset(),
            Phase::Dormant | Phase::Reset => Ok(()),
        }
    }
}

struct Resetting;

impl PhaseHandler for Resetting {
    fn tick(&mut self, ctx: &mut PhaseContext<'_>) -> Result<(), PhaseError> {
        ctx.process_singularity_reset()
    }
}

fn short_profile() -> SingularityProfile {
    SingularityProfile {
        fuse_ticks: 2,
        collapse_ticks: 2,
        core_ticks: 2,
        ring_ticks: 2,
        dissipation_ticks: 2,
        reset_work: 4,
        reset_batch: 2,
        ..SingularityProfile::default()
    }
}

fn cycle_handlers() -> PhaseHandlerTable {
    PhaseHandlerTable {
        fusing: Box::new(Timed),
        collapse: Box::new(Timed),
        core: Box::new(Timed),
        ring: Box::new(Timed),
        dissipation: Box::new(Timed),
        reset: Box::new(Resetting),
        ..PhaseHandlerTable::idle()
    }
}

struct Harness {
    orchestrator: Orchestrator,
    scheduler: Arc<Scheduler>,
    bus: Arc<TypedEffectBus>,
    broadcast: Arc<ChannelBroadcast>,
    registry: Arc<ScenarioRegistry>,
}

impl Harness {
    fn new(handlers: PhaseHandlerTable, registry: ScenarioRegistry) -> Self {
        let scheduler = Arc::new(Scheduler::default());
        let bus = Arc::new(TypedEffectBus::new());
        let broadcast = Arc::new(ChannelBroadcast::new());
        let registry = Arc::new(registry);
        let services = ServiceHub::with_services(
            Arc::clone(&scheduler) as Arc<dyn TaskScheduler>,
            Arc::clone(&broadcast) as Arc<dyn BroadcastService>,
            Arc::clone(&bus) as Arc<dyn EffectBus>,
        );
        let orchestrator = Orchestrator::new(OrchestratorParts {
            services,
            registry: Arc::clone(&registry),
            handlers,
            profile: Arc::new(short_profile()),
        });
        Self {
            orchestrator,
            scheduler,
            bus,
            broadcast,
            registry,
        }
    }

    fn step(&self, world: &mut SimWorld, state: &mut SingularityState) {
        world.advance();
        self.orchestrator.tick(world);
        self.orchestrator.tick_phases(world, state);
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[test]
fn tasks_run_on_their_tick_in_submission_order() {
    let harness = Harness::new(PhaseHandlerTable::idle(), ScenarioRegistry::new());
    let ran = log();
    for (delay, label) in [(2, "a"), (1, "b"), (2, "c"), (0, "now")] {
        let ran = Arc::clone(&ran);
        harness.scheduler.schedule_fn(delay, move || {
            ran.lock().unwrap().push(label.to_owned());
            Ok(())
        });
    }
    assert_eq!(entries(&ran), vec!["now"]);

    let mut world = SimWorld::new("w");
    let mut state = SingularityState::default();
    harness.step(&mut world, &mut state);
    assert_eq!(entries(&ran), vec!["now", "b"]);
    harness.step(&mut world, &mut state);
    assert_eq!(entries(&ran), vec!["now", "b", "a", "c"]);
    assert!(harness.scheduler.is_empty());
}

#[test]
fn failing_and_panicking_tasks_do_not_stop_siblings() {
    let harness = Harness::new(PhaseHandlerTable::idle(), ScenarioRegistry::new());
    let survivors = Arc::new(AtomicUsize::new(0));
    harness
        .scheduler
        .schedule_fn(1, || Err(TaskError::failed("broken on purpose")));
    harness.scheduler.schedule_fn(1, || panic!("task exploded"));
    let counter = Arc::clone(&survivors);
    harness.scheduler.schedule_fn(1, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let report = harness.scheduler.tick();
    assert_eq!(report.executed, 1);
    assert_eq!(report.failed, 2);
    assert_eq!(survivors.load(Ordering::SeqCst), 1);
}

/// Persisted task that appends its message to a shared log.
struct Note {
    message: String,
    sink: Log,
}

impl PersistedTask for Note {
    fn type_key(&self) -> &str {
        "note"
    }

    fn save(&self) -> Result<TaskPayload, TaskError> {
        Ok(TaskPayload::encode(&self.message)?)
    }

    fn run(self: Box<Self>) -> Result<(), TaskError> {
        self.sink.lock().unwrap().push(self.message);
        Ok(())
    }
}

fn note_registry(sink: &Log) -> Arc<TaskTypeRegistry> {
    let registry = TaskTypeRegistry::new();
    let sink = Arc::clone(sink);
    registry.register(Arc::new(FnTaskFactory::new("note", move |payload: &TaskPayload| {
        let message: String = payload.decode().ok()?;
        Some(Box::new(Note {
            message,
            sink: Arc::clone(&sink),
        }) as Box<dyn PersistedTask>)
    })));
    Arc::new(registry)
}

#[test]
fn snapshot_survives_a_restart() {
    let sink = log();
    let before = Scheduler::new(note_registry(&sink));
    for (delay, message) in [(3, "third"), (1, "first"), (2, "second")] {
        before.schedule_persisted(
            delay,
            Box::new(Note {
                message: message.to_owned(),
                sink: Arc::clone(&sink),
            }),
        );
    }
    before.schedule_fn(1, || Ok(()));
    before.tick();
    assert_eq!(entries(&sink), vec!["first"]);

    let json = serde_json::to_string(&before.snapshot()).unwrap();
    let after = Scheduler::new(note_registry(&sink));
    let report = after.load_snapshot(&serde_json::from_str::<Vec<TaskSnapshot>>(&json).unwrap());
    assert_eq!(report.restored, 2);
    assert_eq!(report.skipped, 0);

    after.tick();
    assert_eq!(entries(&sink), vec!["first", "second"]);
    after.tick();
    assert_eq!(entries(&sink), vec!["first", "second", "third"]);
}

// ---------------------------------------------------------------------------
// Bus and scenarios
// ---------------------------------------------------------------------------

#[test]
fn every_listener_hears_every_phase_change() {
    let harness = Harness::new(cycle_handlers(), ScenarioRegistry::new());
    let hits = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..3)
        .map(|_| {
            let hits = Arc::clone(&hits);
            harness.bus.register(move |_: &PhaseChanged| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    let world = SimWorld::new("w");
    let mut state = SingularityState::default();
    harness.orchestrator.begin_fusing(&world, &mut state).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    assert!(harness.bus.unregister(handles.first().unwrap()));
    harness.orchestrator.abort_singularity(&world, &mut state);
    assert_eq!(hits.load(Ordering::SeqCst), 5);
}

#[test]
fn unbound_worlds_fall_back_to_the_first_scenario() {
    let ran = log();
    let registry = ScenarioRegistry::new();
    registry.register("calm", logged_factory("calm", &ran));
    registry.register("infected", logged_factory("infected", &ran));
    registry.bind("minecraft:the_end", "infected").unwrap();
    let harness = Harness::new(PhaseHandlerTable::idle(), registry);

    let attached = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attached);
    harness.bus.register(move |_: &ScenarioAttached| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    harness.orchestrator.tick(&SimWorld::new("minecraft:overworld"));
    harness.orchestrator.tick(&SimWorld::new("minecraft:the_end"));
    assert_eq!(entries(&ran), vec!["calm:false", "infected:false"]);
    assert_eq!(attached.load(Ordering::SeqCst), 2);
    assert_eq!(
        harness.registry.binding(&WorldKey::from("minecraft:the_end")),
        Some(ScenarioId::from("infected"))
    );
}

#[test]
fn scenario_sees_the_singularity_flag_from_phase_ticks() {
    let ran = log();
    let registry = ScenarioRegistry::new();
    registry.register("calm", logged_factory("calm", &ran));
    let harness = Harness::new(cycle_handlers(), registry);
    let mut world = SimWorld::new("w");
    let mut state = SingularityState::default();

    harness.step(&mut world, &mut state);
    harness.orchestrator.begin_fusing(&world, &mut state).unwrap();
    harness.step(&mut world, &mut state);
    assert_eq!(entries(&ran), vec!["calm:false", "calm:true"]);
}

// ---------------------------------------------------------------------------
// Phases and lifecycle
// ---------------------------------------------------------------------------

#[test]
fn handlers_walk_a_full_cycle() {
    let harness = Harness::new(cycle_handlers(), ScenarioRegistry::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    harness.bus.register(move |event: &PhaseChanged| {
        sink.lock().unwrap().push(event.to);
    });
    let mut rx = harness.broadcast.subscribe();

    let mut world = SimWorld::new("w");
    let mut state = SingularityState::default();
    harness.orchestrator.begin_fusing(&world, &mut state).unwrap();
    for _ in 0..64 {
        harness.step(&mut world, &mut state);
        if state.cycles_completed == 1 {
            break;
        }
    }

    assert_eq!(state.phase, Phase::Dormant);
    assert!(!state.active);
    assert_eq!(state.cycles_completed, 1);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            Phase::Fusing,
            Phase::Collapse,
            Phase::Core,
            Phase::Ring,
            Phase::Dissipation,
            Phase::Reset,
            Phase::Dormant,
        ]
    );
    // Announcements were flushed by the service hub on later ticks.
    let announcements = std::iter::from_fn(|| rx.try_recv().ok()).count();
    assert!(announcements >= 6);
}

#[test]
fn same_state_dispatches_the_same_handler() {
    let harness = Harness::new(cycle_handlers(), ScenarioRegistry::new());
    let world = SimWorld::new("w");
    for phase in Phase::ALL {
        let template = SingularityState {
            phase,
            active: true,
            ..SingularityState::default()
        };
        let mut first = template.clone();
        let mut second = template.clone();
        assert_eq!(
            harness.orchestrator.tick_phases(&world, &mut first),
            harness.orchestrator.tick_phases(&world, &mut second)
        );
        assert_eq!(first, second);
    }
}

#[test]
fn nothing_happens_after_shutdown() {
    let harness = Harness::new(cycle_handlers(), ScenarioRegistry::new());
    let mut world = SimWorld::new("w");
    let mut state = SingularityState::default();
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);
    harness.scheduler.schedule_fn(1, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    harness.orchestrator.shutdown(&world);
    assert_eq!(harness.orchestrator.state(), OrchestratorState::Shutdown);
    assert!(harness.scheduler.is_empty());

    harness.step(&mut world, &mut state);
    assert!(harness.orchestrator.begin_fusing(&world, &mut state).is_err());
    assert!(!harness.orchestrator.abort_singularity(&world, &mut state));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(state, SingularityState::default());
}

/// Scenario that looks at its orchestrator while being detached.
struct Watchful {
    id: ScenarioId,
    orchestrator: Arc<OnceLock<Weak<Orchestrator>>>,
    seen: Arc<Mutex<Vec<(String, OrchestratorState, bool)>>>,
}

impl Scenario for Watchful {
    fn id(&self) -> &ScenarioId {
        &self.id
    }

    fn tick(&mut self, _world: &dyn WorldHandle) -> Result<(), ScenarioError> {
        Ok(())
    }

    fn on_detach(&mut self, world: &WorldKey) -> Result<(), ScenarioError> {
        let orchestrator = self
            .orchestrator
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| ScenarioError::failed(&self.id, "detach"))?;
        self.seen
            .lock()
            .unwrap()
            .push((world.to_string(), orchestrator.state(), orchestrator.is_shutdown()));
        Ok(())
    }
}

#[test]
fn shutdown_detaches_the_scenario_attached_for_another_world() {
    let handle: Arc<OnceLock<Weak<Orchestrator>>> = Arc::new(OnceLock::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let registry = ScenarioRegistry::new();
    let (factory_handle, factory_seen) = (Arc::clone(&handle), Arc::clone(&seen));
    registry.register("watchful", move || -> Box<dyn Scenario> {
        Box::new(Watchful {
            id: "watchful".into(),
            orchestrator: Arc::clone(&factory_handle),
            seen: Arc::clone(&factory_seen),
        })
    });
    let bus = Arc::new(TypedEffectBus::new());
    let detached = log();
    let detached_sink = Arc::clone(&detached);
    bus.register(move |effect: &ScenarioDetached| {
        detached_sink.lock().unwrap().push(effect.world.to_string());
    });
    let orchestrator = Arc::new(Orchestrator::new(OrchestratorParts {
        services: ServiceHub::with_services(
            Arc::new(Scheduler::default()) as Arc<dyn TaskScheduler>,
            Arc::new(ChannelBroadcast::new()) as Arc<dyn BroadcastService>,
            Arc::clone(&bus) as Arc<dyn EffectBus>,
        ),
        registry: Arc::new(registry),
        handlers: PhaseHandlerTable::idle(),
        profile: Arc::new(SingularityProfile::default()),
    }));
    handle.set(Arc::downgrade(&orchestrator)).unwrap();

    orchestrator.tick(&SimWorld::new("overworld"));
    assert_eq!(orchestrator.active_scenario_id(), Some(ScenarioId::from("watchful")));

    orchestrator.shutdown(&SimWorld::new("nether"));
    assert_eq!(orchestrator.state(), OrchestratorState::Shutdown);
    assert!(orchestrator.is_shutdown());
    assert!(orchestrator.active_scenario_id().is_none());
    // The hook ran once, for the world it was attached to, mid-teardown.
    assert_eq!(
        *seen.lock().unwrap(),
        vec![("overworld".to_owned(), OrchestratorState::ShuttingDown, true)]
    );
    assert_eq!(entries(&detached), vec!["overworld"]);
}
