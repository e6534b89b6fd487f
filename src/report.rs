//! # Verdict Aggregation and Run Reporting
//!
//! Folds the per-cube verdicts into the final answer: one satisfiable cube
//! makes the whole query satisfiable; a fully unsatisfiable partition proves
//! unsatisfiability; anything short of that is reported as unknown rather
//! than guessed. An `Unknown` answer must never be read as a proof.

use std::{fmt, time::Duration};

use crate::types::Assignment;

/// Why a cube verdict is inconclusive
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnknownReason {
    /// The backend exceeded the per-cube timeout
    Timeout,
    /// The backend crashed or returned an unparseable result
    SolverError,
}

impl fmt::Display for UnknownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnknownReason::Timeout => write!(f, "timeout"),
            UnknownReason::SolverError => write!(f, "solver error"),
        }
    }
}

/// The verdict of one cube
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Verdict {
    /// The cube is satisfiable, optionally with an input witness
    Sat(Option<Assignment>),
    /// The cube is unsatisfiable
    Unsat,
    /// The cube could not be decided
    Unknown(UnknownReason),
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Sat(_) => write!(f, "SAT"),
            Verdict::Unsat => write!(f, "UNSAT"),
            Verdict::Unknown(reason) => write!(f, "UNKNOWN ({reason})"),
        }
    }
}

/// One entry of the reporting contract: cube index, verdict, elapsed time
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CubeVerdict {
    /// The generation index of the cube
    pub index: usize,
    /// The recorded verdict
    pub verdict: Verdict,
    /// Wall-clock time the conquer task took
    pub elapsed: Duration,
}

/// The aggregated answer of a whole run
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FinalAnswer {
    /// Some cube is satisfiable
    Sat,
    /// Every cube of the partition is unsatisfiable
    Unsat,
    /// No cube is satisfiable, but at least one verdict is inconclusive
    Unknown,
}

impl fmt::Display for FinalAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalAnswer::Sat => write!(f, "SAT"),
            FinalAnswer::Unsat => write!(f, "UNSAT"),
            FinalAnswer::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// The aggregated result and statistics of one run
#[derive(Clone, Debug)]
pub struct RunReport {
    /// The final answer
    pub answer: FinalAnswer,
    /// The witness of the first satisfiable cube, if the backend provided one
    pub witness: Option<Assignment>,
    /// All per-cube verdicts in cube index order
    pub verdicts: Vec<CubeVerdict>,
    /// Time spent generating cubes
    pub cube_time: Duration,
    /// Total conquer wall time summed over all cubes
    pub conquer_time: Duration,
    /// The longest single conquer task
    pub max_task_time: Duration,
    /// Number of satisfiable cube verdicts
    pub n_sat: usize,
    /// Number of unsatisfiable cube verdicts
    pub n_unsat: usize,
    /// Number of inconclusive cube verdicts
    pub n_unknown: usize,
}

impl RunReport {
    /// The report of a run whose output collapsed to a constant before any
    /// conquer work
    #[must_use]
    pub fn trivial(satisfiable: bool, cube_time: Duration) -> RunReport {
        RunReport {
            answer: if satisfiable {
                FinalAnswer::Sat
            } else {
                FinalAnswer::Unsat
            },
            witness: None,
            verdicts: Vec::new(),
            cube_time,
            conquer_time: Duration::ZERO,
            max_task_time: Duration::ZERO,
            n_sat: 0,
            n_unsat: 0,
            n_unknown: 0,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Answer: {}", self.answer)?;
        writeln!(
            f,
            "Cubes: {} ({} sat, {} unsat, {} unknown)",
            self.verdicts.len(),
            self.n_sat,
            self.n_unsat,
            self.n_unknown
        )?;
        write!(
            f,
            "Cube: {:.2}s | Conquer: {:.2}s (max task {:.2}s) | Total: {:.2}s",
            self.cube_time.as_secs_f64(),
            self.conquer_time.as_secs_f64(),
            self.max_task_time.as_secs_f64(),
            (self.cube_time + self.conquer_time).as_secs_f64()
        )
    }
}

/// Folds per-cube verdicts into the final report
///
/// Any `Sat` verdict wins; all-`Unsat` proves the query unsatisfiable over
/// the exhaustive partition; otherwise the run is inconclusive. Verdicts are
/// re-sorted by cube index so reporting is deterministic regardless of
/// dispatch order.
#[must_use]
pub fn aggregate(cube_time: Duration, mut verdicts: Vec<CubeVerdict>) -> RunReport {
    verdicts.sort_unstable_by_key(|v| v.index);
    let mut witness = None;
    let (mut n_sat, mut n_unsat, mut n_unknown) = (0, 0, 0);
    let mut conquer_time = Duration::ZERO;
    let mut max_task_time = Duration::ZERO;
    for cv in &verdicts {
        conquer_time += cv.elapsed;
        max_task_time = max_task_time.max(cv.elapsed);
        match &cv.verdict {
            Verdict::Sat(model) => {
                n_sat += 1;
                if witness.is_none() {
                    witness.clone_from(model);
                }
            }
            Verdict::Unsat => n_unsat += 1,
            Verdict::Unknown(_) => n_unknown += 1,
        }
    }
    let answer = if n_sat > 0 {
        FinalAnswer::Sat
    } else if n_unknown > 0 {
        FinalAnswer::Unknown
    } else {
        FinalAnswer::Unsat
    };
    RunReport {
        answer,
        witness,
        verdicts,
        cube_time,
        conquer_time,
        max_task_time,
        n_sat,
        n_unsat,
        n_unknown,
    }
}
