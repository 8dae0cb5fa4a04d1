//! Scheduler snapshot file I/O.
//!
//! The snapshot is a single JSON document. Writes go to a sibling temp
//! file first and are renamed into place, so a crash mid-write leaves the
//! previous snapshot intact.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use singularity_types::SchedulerSnapshot;
use tracing::{debug, info};

use crate::error::EngineError;

/// Read the snapshot at `path`.
///
/// A missing file is not an error: it means there is nothing to restore.
pub fn load(path: &Path) -> Result<Option<SchedulerSnapshot>, EngineError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No scheduler snapshot on disk");
            return Ok(None);
        }
        Err(source) => {
            return Err(EngineError::SnapshotIo {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let snapshot: SchedulerSnapshot =
        serde_json::from_slice(&bytes).map_err(|source| EngineError::SnapshotFormat {
            path: path.to_path_buf(),
            source,
        })?;
    info!(
        path = %path.display(),
        tasks = snapshot.tasks.len(),
        game_time = snapshot.game_time,
        taken_at = %snapshot.taken_at,
        "Scheduler snapshot loaded"
    );
    Ok(Some(snapshot))
}

/// Write `snapshot` to `path`, replacing any previous file.
pub fn save(path: &Path, snapshot: &SchedulerSnapshot) -> Result<(), EngineError> {
    let io_err = |source: std::io::Error| EngineError::SnapshotIo {
        path: path.to_path_buf(),
        source,
    };

    let json = serde_json::to_vec_pretty(snapshot).map_err(|source| EngineError::SnapshotFormat {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp = temp_path(path);
    std::fs::write(&tmp, json).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;

    info!(
        path = %path.display(),
        tasks = snapshot.tasks.len(),
        payload_bytes = payload_bytes(snapshot),
        game_time = snapshot.game_time,
        "Scheduler snapshot saved"
    );
    Ok(())
}

/// Total size of the task payloads carried by `snapshot`.
fn payload_bytes(snapshot: &SchedulerSnapshot) -> usize {
    snapshot
        .tasks
        .iter()
        .fold(0, |total, task| total.saturating_add(task.payload.as_bytes().len()))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map_or_else(OsString::new, OsString::from);
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use singularity_types::{TaskId, TaskPayload, TaskSnapshot};

    use super::*;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("singularity-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn missing_file_loads_as_none() {
        assert!(load(&scratch("absent.json")).unwrap().is_none());
    }

    #[test]
    fn saved_snapshot_loads_back() {
        let path = scratch("tasks.json");
        let snapshot = SchedulerSnapshot::now(
            42,
            vec![TaskSnapshot {
                id: TaskId::new(),
                type_key: "announce".to_owned(),
                remaining_ticks: 7,
                payload: TaskPayload::from_bytes(br#"{"message":"hi"}"#.to_vec()),
            }],
        );

        save(&path, &snapshot).unwrap();
        let back = load(&path).unwrap().unwrap();
        assert_eq!(back, snapshot);
        assert!(!temp_path(&path).exists());

        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn save_replaces_previous_snapshot() {
        let path = scratch("tasks.json");
        save(&path, &SchedulerSnapshot::now(1, Vec::new())).unwrap();
        save(&path, &SchedulerSnapshot::now(2, Vec::new())).unwrap();
        assert_eq!(load(&path).unwrap().unwrap().game_time, 2);

        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn garbage_is_a_format_error() {
        let path = scratch("tasks.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not json").unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, EngineError::SnapshotFormat { .. }));

        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn payload_bytes_sums_every_task() {
        let task = |payload: &[u8]| TaskSnapshot {
            id: TaskId::new(),
            type_key: "announce".to_owned(),
            remaining_ticks: 1,
            payload: TaskPayload::from_bytes(payload.to_vec()),
        };
        let snapshot = SchedulerSnapshot::now(0, vec![task(b"abc"), task(b""), task(b"de")]);
        assert_eq!(payload_bytes(&snapshot), 5);
        assert_eq!(payload_bytes(&SchedulerSnapshot::now(0, Vec::new())), 0);
    }

    #[test]
    fn temp_path_is_a_sibling() {
        assert_eq!(
            temp_path(Path::new("data/tasks.json")),
            PathBuf::from("data/tasks.json.tmp")
        );
    }
}
