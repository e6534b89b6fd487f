//! Full-pipeline scenarios: miter equivalence checks, solver backends,
//! timeouts and exit-code handling

use std::time::Duration;

use aigcube::{
    circuit::{Circuit, CircuitBuilder, Edge},
    conquer::{self, RunConfig},
    cube::{Cube, CubeBuilder, CubeSet},
    encodings::Encoding,
    report::{self, FinalAnswer, UnknownReason, Verdict},
    solvers::{Backend, BackendSpec, BackendVerdict, BatsatBackend},
    types::TernaryVal,
};

/// Miter of two 2-bit adder implementations
///
/// With `bug` set, the second implementation negates its carry-in, so the
/// two circuits disagree on some inputs.
fn adder_miter(bug: bool) -> Circuit {
    let mut b = CircuitBuilder::new();
    let a0 = b.input();
    let a1 = b.input();
    let b0 = b.input();
    let b1 = b.input();

    // reference: ripple adder
    let s0 = b.xor(a0, b0);
    let carry = b.and(a0, b0);
    let hi = b.xor(a1, b1);
    let s1 = b.xor(hi, carry);

    // second implementation, structurally distinct
    let only_a0 = b.and(a0, !b0);
    let only_b0 = b.and(!a0, b0);
    let s0_alt = b.or(only_a0, only_b0);
    let c = b.and(a0, b0);
    let carry_alt = if bug { !c } else { c };
    let hi_alt = b.xor(a1, b1);
    let hi_only = b.and(hi_alt, !carry_alt);
    let carry_only = b.and(!hi_alt, carry_alt);
    let s1_alt = b.or(hi_only, carry_only);

    let diff0 = b.xor(s0, s0_alt);
    let diff1 = b.xor(s1, s1_alt);
    let miter = b.or(diff0, diff1);
    b.build(miter).unwrap()
}

fn split(set: CubeSet) -> Vec<Cube> {
    match set {
        CubeSet::Split(cubes) => cubes,
        CubeSet::Trivial(answer) => panic!("unexpected trivial verdict {answer}"),
    }
}

#[test]
fn and_gate_truth_table() {
    // the encoded instance is satisfiable exactly at (true, true)
    let mut builder = CircuitBuilder::new();
    let a = builder.input();
    let b = builder.input();
    let g = builder.and(a, b);
    let circuit = builder.build(g).unwrap();
    let encoding = Encoding::new(&circuit).unwrap();
    let vars = encoding.input_vars();
    let mut backend = BatsatBackend::default();
    for (va, vb) in [(false, false), (false, true), (true, false), (true, true)] {
        let cube = Cube::new(0, vec![vars[0].lit(va), vars[1].lit(vb)]);
        let verdict = backend.solve(&encoding, &cube, None).unwrap();
        if va && vb {
            assert!(matches!(verdict, BackendVerdict::Sat(_)));
        } else {
            assert_eq!(verdict, BackendVerdict::Unsat);
        }
    }
}

#[test]
fn equivalent_miter_is_unsat_from_every_cube() {
    let circuit = adder_miter(false);
    let encoding = Encoding::new(&circuit).unwrap();
    let cubes = split(CubeBuilder::new(&circuit, &encoding).depth(3).build().unwrap());
    assert!(cubes.len() <= 8);
    let config = RunConfig {
        jobs: 2,
        ..RunConfig::default()
    };
    let verdicts = conquer::run(&cubes, &encoding, &BackendSpec::InProcess, &config).unwrap();
    assert_eq!(verdicts.len(), cubes.len());
    for v in &verdicts {
        assert_eq!(v.verdict, Verdict::Unsat, "cube {} not refuted", v.index);
    }
    let report = report::aggregate(Duration::ZERO, verdicts);
    assert_eq!(report.answer, FinalAnswer::Unsat);
}

#[test]
fn buggy_miter_yields_a_witnessed_counterexample() {
    let circuit = adder_miter(true);
    let encoding = Encoding::new(&circuit).unwrap();
    let cubes = split(CubeBuilder::new(&circuit, &encoding).depth(3).build().unwrap());
    let config = RunConfig {
        jobs: 2,
        ..RunConfig::default()
    };
    let verdicts = conquer::run(&cubes, &encoding, &BackendSpec::InProcess, &config).unwrap();
    let report = report::aggregate(Duration::ZERO, verdicts);
    assert_eq!(report.answer, FinalAnswer::Sat);
    // the witness must actually distinguish the two implementations
    let witness = report.witness.expect("in-process backend provides models");
    let inputs: Vec<bool> = encoding
        .input_vars()
        .iter()
        .map(|&v| witness.var_value(v) == TernaryVal::True)
        .collect();
    assert!(circuit.eval(&inputs));
}

#[test]
fn depth_zero_matches_full_encoding() {
    for bug in [false, true] {
        let circuit = adder_miter(bug);
        let encoding = Encoding::new(&circuit).unwrap();
        let cubes = split(CubeBuilder::new(&circuit, &encoding).depth(0).build().unwrap());
        assert_eq!(cubes.len(), 1);
        let verdicts =
            conquer::run(&cubes, &encoding, &BackendSpec::InProcess, &RunConfig::default())
                .unwrap();
        let report = report::aggregate(Duration::ZERO, verdicts);

        let mut backend = BatsatBackend::default();
        let full = backend
            .solve(&encoding, &Cube::new(0, Vec::new()), None)
            .unwrap();
        match full {
            BackendVerdict::Sat(_) => assert_eq!(report.answer, FinalAnswer::Sat),
            BackendVerdict::Unsat => assert_eq!(report.answer, FinalAnswer::Unsat),
            BackendVerdict::Interrupted => panic!("no deadline was set"),
        }
    }
}

#[test]
fn trivial_circuit_skips_conquer() {
    let mut builder = CircuitBuilder::new();
    builder.input();
    let circuit = builder.build(Edge::FALSE).unwrap();
    let encoding = Encoding::new(&circuit).unwrap();
    let set = CubeBuilder::new(&circuit, &encoding).depth(4).build().unwrap();
    assert_eq!(set, CubeSet::Trivial(false));
}

#[cfg(unix)]
mod external {
    use std::{
        fs,
        path::{Path, PathBuf},
        time::Duration,
    };

    use super::*;

    fn fake_solver(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn miter_cubes() -> (Circuit, Encoding, Vec<Cube>) {
        let circuit = adder_miter(false);
        let encoding = Encoding::new(&circuit).unwrap();
        let cubes = split(CubeBuilder::new(&circuit, &encoding).depth(2).build().unwrap());
        (circuit, encoding, cubes)
    }

    #[test]
    fn exit_code_twenty_is_unsat() {
        let dir = tempfile::tempdir().unwrap();
        let solver = fake_solver(dir.path(), "always-unsat", "exit 20");
        let (_, encoding, cubes) = miter_cubes();
        let verdicts = conquer::run(
            &cubes,
            &encoding,
            &BackendSpec::External { solver },
            &RunConfig::default(),
        )
        .unwrap();
        assert!(verdicts.iter().all(|v| v.verdict == Verdict::Unsat));
    }

    #[test]
    fn exit_code_ten_is_sat_and_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let solver = fake_solver(dir.path(), "always-sat", "exit 10");
        let (_, encoding, cubes) = miter_cubes();
        let verdicts = conquer::run(
            &cubes,
            &encoding,
            &BackendSpec::External { solver },
            &RunConfig::default(),
        )
        .unwrap();
        // external backends report no model
        assert_eq!(verdicts[0].verdict, Verdict::Sat(None));
        // a single worker stops dispatching after the first satisfiable cube
        assert_eq!(verdicts.len(), 1);
    }

    #[test]
    fn unexpected_exit_code_is_solver_error() {
        let dir = tempfile::tempdir().unwrap();
        let solver = fake_solver(dir.path(), "crashes", "exit 3");
        let (_, encoding, cubes) = miter_cubes();
        let verdicts = conquer::run(
            &cubes,
            &encoding,
            &BackendSpec::External { solver },
            &RunConfig::default(),
        )
        .unwrap();
        assert!(verdicts
            .iter()
            .all(|v| v.verdict == Verdict::Unknown(UnknownReason::SolverError)));
        let report = report::aggregate(Duration::ZERO, verdicts);
        assert_eq!(report.answer, FinalAnswer::Unknown);
    }

    #[test]
    fn timeout_is_unknown_and_does_not_block_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let solver = fake_solver(dir.path(), "stalls", "sleep 10");
        let (_, encoding, cubes) = miter_cubes();
        assert!(cubes.len() >= 2);
        let config = RunConfig {
            timeout: Some(Duration::from_millis(200)),
            jobs: 2,
            ..RunConfig::default()
        };
        let verdicts = conquer::run(
            &cubes,
            &encoding,
            &BackendSpec::External { solver },
            &config,
        )
        .unwrap();
        // every cube retires with a timeout instead of blocking the run
        assert_eq!(verdicts.len(), cubes.len());
        assert!(verdicts
            .iter()
            .all(|v| v.verdict == Verdict::Unknown(UnknownReason::Timeout)));
        let report = report::aggregate(Duration::ZERO, verdicts);
        assert_eq!(report.answer, FinalAnswer::Unknown);
    }

    #[test]
    fn artifacts_persist_when_requested() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = dir.path().join("cnfs");
        let solver = fake_solver(dir.path(), "always-unsat", "exit 20");
        let (_, encoding, cubes) = miter_cubes();
        let config = RunConfig {
            artifact_dir: Some(artifacts.clone()),
            ..RunConfig::default()
        };
        conquer::run(&cubes, &encoding, &BackendSpec::External { solver }, &config).unwrap();
        for cube in &cubes {
            let path = artifacts.join(format!("cube_{:04}.cnf", cube.index()));
            let text = fs::read_to_string(&path).unwrap();
            assert!(text.starts_with("c CNF instance written by aigcube\np cnf "));
            // one unit line per cube literal on top of the base clauses
            assert_eq!(
                text.lines().count(),
                2 + encoding.n_clauses() + cube.lits().len()
            );
        }
    }
}
