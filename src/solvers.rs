//! # Solver Backends
//!
//! The conquer stage talks to SAT solvers through the [`Backend`] trait.
//! Two implementations exist: [`BatsatBackend`] drives the pure-Rust
//! [BatSat](https://github.com/c-cube/batsat) CDCL solver in-process, and
//! [`ExternalBackend`] hands a DIMACS file to a SAT-competition-style
//! executable and interprets its exit status (10 = SAT, 20 = UNSAT).
//! [`BackendSpec`] selects between them by configuration.

use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use anyhow::Context;
use batsat::{intmap::AsIndex, lbool, Callbacks, SolverInterface};
use cpu_time::ProcessTime;
use log::debug;

use crate::{
    cube::Cube,
    encodings::Encoding,
    fio,
    types::{Assignment, Lit, TernaryVal},
};

/// What a backend reports for one cube
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum BackendVerdict {
    /// Satisfiable, with an input witness if the backend provides models
    Sat(Option<Assignment>),
    /// Unsatisfiable
    Unsat,
    /// The backend gave up because the deadline expired
    Interrupted,
}

/// A solver capability consumed by the conquer stage
///
/// A backend instance is owned by exactly one worker; the base clauses are
/// shared read-only through the [`Encoding`].
pub trait Backend {
    /// A short description of the underlying solver
    fn signature(&self) -> &'static str;

    /// Solves the base encoding under one cube's assumptions
    ///
    /// Returns [`BackendVerdict::Interrupted`] when `deadline` expires first.
    /// Errors are contained per cube by the caller and must not poison the
    /// backend for subsequent cubes.
    fn solve(
        &mut self,
        encoding: &Encoding,
        cube: &Cube,
        deadline: Option<Instant>,
    ) -> anyhow::Result<BackendVerdict>;

    /// Accumulated in-process CPU time spent solving
    ///
    /// Zero for backends that solve in a child process.
    fn cpu_solve_time(&self) -> Duration {
        Duration::ZERO
    }
}

/// Selects and builds a solver backend per worker
#[derive(Clone, Debug)]
pub enum BackendSpec {
    /// The in-process BatSat solver
    InProcess,
    /// An external solver executable following the exit-code convention
    External {
        /// Path to the solver executable
        solver: PathBuf,
    },
}

impl std::fmt::Display for BackendSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendSpec::InProcess => write!(f, "in-process BatSat"),
            BackendSpec::External { solver } => write!(f, "external {}", solver.display()),
        }
    }
}

impl BackendSpec {
    /// Builds a fresh backend instance
    ///
    /// With `artifact_dir` set, external backends persist their per-cube
    /// DIMACS files there instead of using transient storage.
    #[must_use]
    pub fn build(&self, artifact_dir: Option<&Path>) -> Box<dyn Backend> {
        match self {
            BackendSpec::InProcess => Box::new(BatsatBackend::default()),
            BackendSpec::External { solver } => Box::new(ExternalBackend {
                solver: solver.clone(),
                artifact_dir: artifact_dir.map(Path::to_path_buf),
            }),
        }
    }
}

/// Deadline hook polled by BatSat between propagations
#[derive(Default)]
struct DeadlineCallbacks {
    deadline: Option<Instant>,
}

impl Callbacks for DeadlineCallbacks {
    fn stop(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// In-process backend driving [`batsat::Solver`]
///
/// The base clauses are loaded once on the first solve; cube literals are
/// passed as solver assumptions, so one solver instance serves every cube a
/// worker claims.
pub struct BatsatBackend {
    solver: batsat::Solver<DeadlineCallbacks>,
    loaded: bool,
    cpu_time: Duration,
}

impl Default for BatsatBackend {
    fn default() -> Self {
        BatsatBackend {
            solver: batsat::Solver::new(batsat::SolverOpts::default(), DeadlineCallbacks::default()),
            loaded: false,
            cpu_time: Duration::ZERO,
        }
    }
}

impl BatsatBackend {
    fn batsat_lit(&mut self, lit: Lit) -> batsat::Lit {
        batsat::Lit::new(self.solver.var_of_int(lit.vidx32() + 1), lit.is_pos())
    }

    fn load(&mut self, encoding: &Encoding) {
        for clause in encoding.cnf() {
            let mut cl: Vec<_> = clause.iter().map(|&l| self.batsat_lit(l)).collect();
            self.solver.add_clause_reuse(&mut cl);
        }
        self.loaded = true;
    }

    fn input_witness(&self, encoding: &Encoding) -> Assignment {
        let mut witness = Assignment::new();
        for &v in encoding.input_vars() {
            let l = batsat::Lit::new(batsat::Var::from_index(v.idx() + 1), true);
            let value = match self.solver.value_lit(l) {
                x if x == lbool::TRUE => TernaryVal::True,
                // inputs the solver left unconstrained default to false
                _ => TernaryVal::False,
            };
            witness.assign_var(v, value);
        }
        witness
    }
}

impl Backend for BatsatBackend {
    fn signature(&self) -> &'static str {
        "BatSat 0.6.0"
    }

    fn solve(
        &mut self,
        encoding: &Encoding,
        cube: &Cube,
        deadline: Option<Instant>,
    ) -> anyhow::Result<BackendVerdict> {
        if !self.loaded {
            self.load(encoding);
        }
        self.solver.cb_mut().deadline = deadline;
        let assumps: Vec<_> = cube.lits().iter().map(|&l| self.batsat_lit(l)).collect();
        let start = ProcessTime::now();
        let ret = self.solver.solve_limited(&assumps);
        self.cpu_time += start.elapsed();
        match ret {
            x if x == lbool::TRUE => Ok(BackendVerdict::Sat(Some(self.input_witness(encoding)))),
            x if x == lbool::FALSE => Ok(BackendVerdict::Unsat),
            x if x == lbool::UNDEF => Ok(BackendVerdict::Interrupted),
            _ => unreachable!(),
        }
    }

    fn cpu_solve_time(&self) -> Duration {
        self.cpu_time
    }
}

/// How often a worker polls its external solver child for completion
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Backend invoking an external solver executable on a DIMACS file
///
/// The child's stdout is discarded rather than parsed: a solver killed on
/// deadline may have written partial output that must not be misread as a
/// verdict. Only the exit status counts.
pub struct ExternalBackend {
    solver: PathBuf,
    artifact_dir: Option<PathBuf>,
}

impl ExternalBackend {
    fn write_instance(
        &self,
        encoding: &Encoding,
        cube: &Cube,
    ) -> anyhow::Result<(PathBuf, Option<tempfile::TempPath>)> {
        let instance = encoding.assume(cube.lits());
        if let Some(dir) = &self.artifact_dir {
            let path = dir.join(format!("cube_{:04}.cnf", cube.index()));
            let mut writer = BufWriter::new(
                File::create(&path)
                    .with_context(|| format!("creating cube artifact {}", path.display()))?,
            );
            fio::write_dimacs(&mut writer, &instance).context("writing cube artifact")?;
            Ok((path, None))
        } else {
            let mut file = tempfile::Builder::new()
                .prefix("aigcube_")
                .suffix(".cnf")
                .tempfile()
                .context("creating temporary cube file")?;
            fio::write_dimacs(&mut file, &instance).context("writing temporary cube file")?;
            let temp = file.into_temp_path();
            Ok((temp.to_path_buf(), Some(temp)))
        }
    }

    fn wait_with_deadline(
        &self,
        child: &mut Child,
        deadline: Option<Instant>,
    ) -> anyhow::Result<BackendVerdict> {
        loop {
            if let Some(status) = child.try_wait().context("waiting for external solver")? {
                return match status.code() {
                    Some(10) => Ok(BackendVerdict::Sat(None)),
                    Some(20) => Ok(BackendVerdict::Unsat),
                    code => anyhow::bail!("external solver exited with unexpected status {code:?}"),
                };
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                child.kill().context("killing timed-out external solver")?;
                child.wait().context("reaping timed-out external solver")?;
                return Ok(BackendVerdict::Interrupted);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Backend for ExternalBackend {
    fn signature(&self) -> &'static str {
        "external process"
    }

    fn solve(
        &mut self,
        encoding: &Encoding,
        cube: &Cube,
        deadline: Option<Instant>,
    ) -> anyhow::Result<BackendVerdict> {
        // the temp path guard deletes the file on every exit path
        let (path, _guard) = self.write_instance(encoding, cube)?;
        debug!(
            "running {} on cube {} ({})",
            self.solver.display(),
            cube.index(),
            path.display()
        );
        let mut child = Command::new(&self.solver)
            .arg(&path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("spawning external solver {}", self.solver.display()))?;
        self.wait_with_deadline(&mut child, deadline)
    }
}
