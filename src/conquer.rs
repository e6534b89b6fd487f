//! # Conquer Orchestration
//!
//! Dispatches cubes to solver backends on a fixed-size worker pool. Workers
//! claim cube indices from a shared atomic cursor and check a shared stop
//! flag between dispatches: the first satisfiable cube stops further
//! dispatching, while in-flight tasks drain naturally instead of being
//! killed. Per-cube timeouts and solver failures are contained as
//! [`Verdict::Unknown`] without affecting sibling cubes.

use std::{
    fs,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        mpsc,
    },
    thread,
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::{
    cube::Cube,
    encodings::Encoding,
    report::{CubeVerdict, UnknownReason, Verdict},
    solvers::{BackendSpec, BackendVerdict},
};

/// Fatal orchestration failures
///
/// Unlike per-cube timeouts and solver errors, these abort the whole run.
#[derive(Error, Debug)]
pub enum ConquerError {
    /// The worker count must be at least one
    #[error("conquer requires at least one worker")]
    NoWorkers,
    /// The artifact directory could not be created
    #[error("failed to create artifact directory {dir}: {source}")]
    ArtifactDir {
        /// The configured directory
        dir: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// A worker thread could not be spawned
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

/// Per-run conquer configuration
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Per-cube wall-clock timeout; `None` solves without a limit
    pub timeout: Option<Duration>,
    /// Number of parallel workers
    pub jobs: usize,
    /// Persist per-cube DIMACS artifacts here instead of transient storage
    pub artifact_dir: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            timeout: None,
            jobs: 1,
            artifact_dir: None,
        }
    }
}

/// Solves every cube and collects the verdicts in cube index order
///
/// Cube dispatch order never affects the aggregated answer; re-sorting by
/// index makes the reporting deterministic as well.
pub fn run(
    cubes: &[Cube],
    encoding: &Encoding,
    backend: &BackendSpec,
    config: &RunConfig,
) -> Result<Vec<CubeVerdict>, ConquerError> {
    if config.jobs == 0 {
        return Err(ConquerError::NoWorkers);
    }
    if let Some(dir) = &config.artifact_dir {
        fs::create_dir_all(dir).map_err(|source| ConquerError::ArtifactDir {
            dir: dir.clone(),
            source,
        })?;
    }
    let workers = config.jobs.min(cubes.len()).max(1);
    info!(
        "conquering {} cubes on {} workers ({backend})",
        cubes.len(),
        workers
    );

    let cursor = AtomicUsize::new(0);
    let stop = AtomicBool::new(false);
    let (tx, rx) = mpsc::channel();
    thread::scope(|scope| {
        for worker in 0..workers {
            let tx = tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("conquer-{worker}"))
                .spawn_scoped(scope, {
                    let (cursor, stop) = (&cursor, &stop);
                    move || worker_loop(worker, cubes, encoding, backend, config, cursor, stop, &tx)
                });
            if let Err(source) = spawned {
                // let already-running workers drain their current task
                stop.store(true, Ordering::Release);
                return Err(ConquerError::WorkerSpawn(source));
            }
        }
        Ok(())
    })?;
    drop(tx);

    let mut verdicts: Vec<CubeVerdict> = rx.iter().collect();
    verdicts.sort_unstable_by_key(|v| v.index);
    Ok(verdicts)
}

/// One worker: claims cubes from the cursor until the queue is drained or a
/// satisfiable cube raised the stop flag
#[allow(clippy::too_many_arguments)]
fn worker_loop(
    worker: usize,
    cubes: &[Cube],
    encoding: &Encoding,
    backend_spec: &BackendSpec,
    config: &RunConfig,
    cursor: &AtomicUsize,
    stop: &AtomicBool,
    tx: &mpsc::Sender<CubeVerdict>,
) {
    let mut backend = backend_spec.build(config.artifact_dir.as_deref());
    let mut retired = 0usize;
    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }
        let index = cursor.fetch_add(1, Ordering::AcqRel);
        let Some(cube) = cubes.get(index) else {
            break;
        };
        debug!("cube {index} dispatched to worker {worker}");
        let deadline = config.timeout.map(|t| Instant::now() + t);
        let start = Instant::now();
        let verdict = match backend.solve(encoding, cube, deadline) {
            Ok(BackendVerdict::Sat(witness)) => {
                info!("cube {index} is satisfiable, stopping dispatch");
                stop.store(true, Ordering::Release);
                Verdict::Sat(witness)
            }
            Ok(BackendVerdict::Unsat) => Verdict::Unsat,
            Ok(BackendVerdict::Interrupted) => {
                warn!("cube {index} exceeded the timeout");
                Verdict::Unknown(UnknownReason::Timeout)
            }
            Err(err) => {
                error!("solver failed on cube {index}: {err:#}");
                Verdict::Unknown(UnknownReason::SolverError)
            }
        };
        retired += 1;
        let elapsed = start.elapsed();
        debug!("cube {index} retired as {verdict} after {elapsed:?}");
        let _ = tx.send(CubeVerdict {
            index,
            verdict,
            elapsed,
        });
    }
    debug!(
        "worker {worker} retiring after {retired} cubes, {:?} cpu solve time",
        backend.cpu_solve_time()
    );
}
