//! Cube generation properties: partitioning, determinism, degenerate depths

use aigcube::{
    circuit::{Circuit, CircuitBuilder},
    cube::{Cube, CubeBuilder, CubeSet, ScorePolicy},
    encodings::Encoding,
    types::{Assignment, TernaryVal},
};

fn xor3() -> Circuit {
    let mut builder = CircuitBuilder::new();
    let a = builder.input();
    let b = builder.input();
    let c = builder.input();
    let ab = builder.xor(a, b);
    let abc = builder.xor(ab, c);
    builder.build(abc).unwrap()
}

fn majority3() -> Circuit {
    let mut builder = CircuitBuilder::new();
    let a = builder.input();
    let b = builder.input();
    let c = builder.input();
    let ab = builder.and(a, b);
    let ac = builder.and(a, c);
    let bc = builder.and(b, c);
    let any_ab_ac = builder.or(ab, ac);
    let maj = builder.or(any_ab_ac, bc);
    builder.build(maj).unwrap()
}

/// The full assignment over encoding variables induced by an input vector
fn induced_assignment(circuit: &Circuit, encoding: &Encoding, inputs: &[bool]) -> Assignment {
    let values = circuit.eval_nodes(inputs);
    let mut assignment = Assignment::new();
    for (id, _) in circuit.nodes() {
        if let Some(var) = encoding.var(id) {
            assignment.assign_var(var, TernaryVal::from(values[id as usize]));
        }
    }
    assignment
}

fn consistent(cube: &Cube, assignment: &Assignment) -> bool {
    cube.lits()
        .iter()
        .all(|&l| assignment.lit_value(l) == TernaryVal::True)
}

/// Checks the partition invariant semantically: under any total assignment
/// at most one cube applies, and every satisfying assignment is covered by
/// exactly one cube.
fn assert_partition(circuit: &Circuit, encoding: &Encoding, cubes: &[Cube]) {
    let n = circuit.n_inputs();
    for bits in 0..1u32 << n {
        let inputs: Vec<bool> = (0..n).map(|i| bits >> i & 1 == 1).collect();
        let assignment = induced_assignment(circuit, encoding, &inputs);
        let covering = cubes.iter().filter(|c| consistent(c, &assignment)).count();
        assert!(
            covering <= 1,
            "assignment {inputs:?} is covered by {covering} cubes"
        );
        if circuit.eval(&inputs) {
            assert_eq!(
                covering, 1,
                "satisfying assignment {inputs:?} is not covered"
            );
        }
    }
}

fn split(set: CubeSet) -> Vec<Cube> {
    match set {
        CubeSet::Split(cubes) => cubes,
        CubeSet::Trivial(answer) => panic!("unexpected trivial verdict {answer}"),
    }
}

#[test]
fn cubes_partition_the_search_space() {
    for circuit in [xor3(), majority3()] {
        let encoding = Encoding::new(&circuit).unwrap();
        for depth in 0..=3 {
            let cubes = split(
                CubeBuilder::new(&circuit, &encoding)
                    .depth(depth)
                    .build()
                    .unwrap(),
            );
            assert!(!cubes.is_empty());
            assert!(cubes.len() <= 1 << depth);
            assert_partition(&circuit, &encoding, &cubes);
        }
    }
}

#[test]
fn partition_holds_for_both_policies() {
    let circuit = majority3();
    let encoding = Encoding::new(&circuit).unwrap();
    for policy in [ScorePolicy::PropagationProduct, ScorePolicy::BranchBalance] {
        let cubes = split(
            CubeBuilder::new(&circuit, &encoding)
                .depth(2)
                .policy(policy)
                .build()
                .unwrap(),
        );
        assert_partition(&circuit, &encoding, &cubes);
    }
}

#[test]
fn depth_zero_degenerates_to_one_empty_cube() {
    let circuit = xor3();
    let encoding = Encoding::new(&circuit).unwrap();
    let cubes = split(CubeBuilder::new(&circuit, &encoding).depth(0).build().unwrap());
    assert_eq!(cubes.len(), 1);
    assert!(cubes[0].is_empty());
}

#[test]
fn generation_is_idempotent() {
    let circuit = majority3();
    let encoding = Encoding::new(&circuit).unwrap();
    let reference = split(CubeBuilder::new(&circuit, &encoding).depth(3).build().unwrap());
    for _ in 0..3 {
        let again = split(CubeBuilder::new(&circuit, &encoding).depth(3).build().unwrap());
        assert_eq!(again, reference);
    }
}

#[test]
fn cube_indices_follow_generation_order() {
    let circuit = xor3();
    let encoding = Encoding::new(&circuit).unwrap();
    let cubes = split(CubeBuilder::new(&circuit, &encoding).depth(2).build().unwrap());
    for (i, cube) in cubes.iter().enumerate() {
        assert_eq!(cube.index(), i);
    }
}

#[test]
fn exhausted_candidates_stop_early() {
    // two inputs and a handful of gates cannot sustain depth 8
    let mut builder = CircuitBuilder::new();
    let a = builder.input();
    let b = builder.input();
    let x = builder.xor(a, b);
    let circuit = builder.build(x).unwrap();
    let encoding = Encoding::new(&circuit).unwrap();
    let cubes = split(CubeBuilder::new(&circuit, &encoding).depth(8).build().unwrap());
    assert!(!cubes.is_empty());
    assert!(cubes.len() < 1 << 8);
    assert_partition(&circuit, &encoding, &cubes);
}
