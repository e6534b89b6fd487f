//! # DIMACS CNF Writing
//!
//! Writes an augmented cube instance (shared base clauses plus unit
//! assumptions) in the DIMACS CNF format external SAT-competition solvers
//! consume: a `p cnf <vars> <clauses>` header line followed by one
//! space-separated, zero-terminated clause per line.

use std::io::{self, Write};

use crate::{encodings::AssumedCnf, types::Clause};

/// Writes one cube instance as DIMACS CNF
pub fn write_dimacs<W: Write>(writer: &mut W, instance: &AssumedCnf) -> Result<(), io::Error> {
    writeln!(writer, "c CNF instance written by aigcube")?;
    writeln!(
        writer,
        "p cnf {} {}",
        instance.max_var().map_or(0, |v| v.pos_lit().to_dimacs()),
        instance.n_clauses()
    )?;
    instance
        .base()
        .iter()
        .try_for_each(|cl| write_clause(writer, cl))?;
    instance
        .assumps()
        .iter()
        .try_for_each(|l| writeln!(writer, "{} 0", l.to_dimacs()))?;
    writer.flush()
}

fn write_clause<W: Write>(writer: &mut W, clause: &Clause) -> Result<(), io::Error> {
    clause
        .iter()
        .try_for_each(|l| write!(writer, "{} ", l.to_dimacs()))?;
    writeln!(writer, "0")
}
