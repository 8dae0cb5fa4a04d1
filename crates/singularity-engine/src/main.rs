//! Engine binary for the Singularity simulation.
//!
//! This is the main entry point that wires together the scheduler, the
//! broadcast service, the built-in scenarios and phase handlers, and the
//! operator controls. It loads configuration, restores any durable tasks
//! from the last run, and drives the orchestrator until a termination
//! condition is met.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `singularity-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Build the broadcast service, task registry and scheduler
//! 4. Restore the scheduler snapshot, if one exists
//! 5. Register scenarios and apply the configured bindings
//! 6. Compose the orchestrator
//! 7. Optionally light the fuse
//! 8. Run the tick loop until stopped
//! 9. Save the scheduler snapshot and shut down

mod error;
mod handlers;
mod persistence;
mod scenarios;
mod tasks;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use singularity_core::broadcast::{Announcement, BroadcastService, ChannelBroadcast};
use singularity_core::config::SingularityConfig;
use singularity_core::operator::OperatorState;
use singularity_core::orchestrator::{Orchestrator, OrchestratorParts};
use singularity_core::runner::{self, NoOpCallback};
use singularity_core::scenario::ScenarioRegistry;
use singularity_core::scheduler::{Scheduler, TaskScheduler, TaskTypeRegistry};
use singularity_core::services::ServiceHub;
use singularity_core::state::SingularityState;
use singularity_core::world::{SimWorld, WorldHandle};
use singularity_events::TypedEffectBus;
use singularity_types::SchedulerSnapshot;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::tasks::AnnounceTask;

/// Environment variable naming the config file.
const CONFIG_PATH_ENV: &str = "SINGULARITY_CONFIG";
/// Config file used when [`CONFIG_PATH_ENV`] is unset.
const DEFAULT_CONFIG_PATH: &str = "singularity-config.yaml";

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if any initialization step, the tick loop, or the
/// final snapshot write fails.
#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration.
    let config_path = config_path();
    let config = load_config(&config_path).context("loading configuration")?;

    // 2. Initialize structured logging.
    init_tracing(&config);
    info!(
        path = %config_path.display(),
        world = config.engine.world_key,
        tick_interval_ms = config.engine.tick_interval_ms,
        max_ticks = config.engine.max_ticks,
        "singularity-engine starting"
    );

    // 3. Broadcast service, task types, scheduler.
    let broadcast = Arc::new(ChannelBroadcast::new());
    let broadcast_dyn: Arc<dyn BroadcastService> = Arc::clone(&broadcast) as Arc<dyn BroadcastService>;
    spawn_announcement_log(&broadcast);

    let task_types = Arc::new(TaskTypeRegistry::new());
    tasks::register_all(&task_types, &broadcast_dyn);
    let scheduler = Arc::new(Scheduler::new(task_types));

    // 4. Restore durable tasks.
    let snapshot_path = config.engine.snapshot_path.clone();
    let restored = persistence::load(&snapshot_path).context("reading scheduler snapshot")?;
    let game_time = restored.as_ref().map_or(0, |snapshot| snapshot.game_time);
    if let Some(snapshot) = &restored {
        let report = scheduler.load_snapshot(&snapshot.tasks);
        info!(
            restored = report.restored,
            skipped = report.skipped,
            "Durable tasks restored"
        );
    }
    let mut world = SimWorld::at(config.engine.world_key.as_str(), game_time);

    // 5. Scenarios.
    let registry = Arc::new(ScenarioRegistry::new());
    scenarios::register_defaults(&registry);
    registry
        .apply_config(&config.scenarios)
        .map_err(EngineError::from)
        .context("applying scenario config")?;

    // 6. Compose the orchestrator.
    let orchestrator = Orchestrator::new(OrchestratorParts {
        services: ServiceHub::with_services(
            Arc::clone(&scheduler) as Arc<dyn TaskScheduler>,
            Arc::clone(&broadcast_dyn),
            Arc::new(TypedEffectBus::new()),
        ),
        registry,
        handlers: handlers::default_handlers(),
        profile: Arc::new(config.profile.clone()),
    });
    let mut state = SingularityState::dormant(config.profile.border.dormant);

    // 7. Light the fuse.
    if config.engine.ignite_on_start {
        orchestrator
            .begin_fusing(&world, &mut state)
            .context("lighting the fuse")?;
        if scheduler.is_empty() {
            scheduler.schedule_persisted(
                1,
                AnnounceTask::boxed(
                    Announcement::new(world.key().as_str(), "Brace yourselves."),
                    Arc::clone(&broadcast_dyn),
                ),
            );
        }
    }

    // 8. Run the tick loop.
    let operator = Arc::new(OperatorState::new(
        config.engine.tick_interval_ms,
        config.engine.max_ticks,
    ));
    spawn_stop_on_ctrl_c(&operator);

    let result = runner::run_simulation(&orchestrator, &mut world, &mut state, &operator, &mut NoOpCallback)
        .await
        .map_err(EngineError::from)
        .context("running the tick loop")?;
    runner::log_simulation_end(&result);

    // 9. Persist and shut down.
    let snapshot = SchedulerSnapshot::now(world.game_time(), scheduler.snapshot());
    persistence::save(&snapshot_path, &snapshot).context("writing scheduler snapshot")?;
    orchestrator.shutdown(&world);

    info!(
        end_reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        cycles_completed = state.cycles_completed,
        "singularity-engine shutdown complete"
    );
    Ok(())
}

fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV).map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Load configuration from `path`, falling back to defaults when the file
/// does not exist.
fn load_config(path: &std::path::Path) -> Result<SingularityConfig, EngineError> {
    if path.exists() {
        return Ok(SingularityConfig::from_file(path)?);
    }
    let mut config = SingularityConfig::default();
    config.engine.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &SingularityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.logging.is_json() {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Log every announcement that leaves the broadcast service.
fn spawn_announcement_log(broadcast: &ChannelBroadcast) {
    let mut rx = broadcast.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(announcement) => {
                    info!(world = announcement.world, message = announcement.message, "Announcement");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Announcement log fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Ask the loop to stop on Ctrl-C.
fn spawn_stop_on_ctrl_c(operator: &Arc<OperatorState>) {
    let operator = Arc::clone(operator);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, stopping");
                operator.request_stop();
            }
            Err(e) => warn!(error = %e, "Ctrl-C handler unavailable"),
        }
    });
}
