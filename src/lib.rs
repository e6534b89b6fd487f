//! # aigcube - Cube-and-Conquer SAT Solving on And-Inverter Graphs
//!
//! `aigcube` splits a SAT query given as an and-inverter graph (AIG) into
//! independent sub-problems ("cubes") by branching on circuit nodes chosen
//! with a lookahead heuristic, encodes the circuit once into CNF via the
//! Tseitin transformation, solves every cube separately on a worker pool,
//! and combines the per-cube verdicts into a single SAT/UNSAT/UNKNOWN
//! answer.
//!
//! The pipeline is:
//!
//! 1. [`circuit::Circuit`] — load an AIGER file (`aag` or `aig`) into an
//!    immutable circuit graph.
//! 2. [`encodings::Encoding`] — encode the circuit into a clause set shared
//!    by all cubes, with the output asserted true.
//! 3. [`cube::CubeBuilder`] — pick splitting nodes and enumerate the cube
//!    set.
//! 4. [`conquer::run`] — dispatch the cubes to a [`solvers::Backend`]
//!    (in-process [BatSat](https://github.com/c-cube/batsat) or an external
//!    SAT-competition-style executable) under a per-cube timeout.
//! 5. [`report::aggregate`] — fold the verdicts into the final answer and
//!    run statistics.

pub mod circuit;
pub mod conquer;
pub mod cube;
pub mod encodings;
pub mod fio;
pub mod report;
pub mod solvers;
pub mod types;
