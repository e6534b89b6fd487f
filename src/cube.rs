//! # Cube Generation
//!
//! Splits the search space of a circuit into cubes by repeatedly branching on
//! circuit nodes, always under the asserted output: the residual state fixes
//! the output true before the first split, mirroring the output unit clause
//! of the encoding. Split candidates are pre-ranked by the structural score
//! `sigma(n) = (indegree + 1) * (outdegree + 1)` over the residual circuit,
//! then probed with a lookahead: each polarity is tentatively fixed and
//! constants are folded forward through the gates, and the pluggable
//! [`ScorePolicy`] turns the two propagation counts into the candidate's
//! score. A polarity that is inconsistent with the asserted output marks the
//! opposite polarity as forced; forced literals join the branch without
//! consuming a split level.
//!
//! The resulting binary decision tree is flattened to its leaves in
//! left-to-right (false before true) order, which together with the
//! lowest-id tie-break makes generation deterministic.

use itertools::Itertools;
use log::{debug, info};

use crate::{
    circuit::{Circuit, Edge, Node, NodeId},
    encodings::{Encoding, EncodingError},
    types::{Lit, TernaryVal},
};

/// One cube: an ordered sequence of unit literals over encoding variables
///
/// Generated once, immutable, consumed by exactly one conquer task.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Cube {
    index: usize,
    lits: Vec<Lit>,
}

impl Cube {
    /// Creates a cube, mainly for tests and custom conquer drivers
    #[must_use]
    pub fn new(index: usize, lits: Vec<Lit>) -> Cube {
        Cube { index, lits }
    }

    /// The generation index of the cube
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The unit literals of the cube
    #[must_use]
    pub fn lits(&self) -> &[Lit] {
        &self.lits
    }

    /// The number of literals in the cube
    #[must_use]
    pub fn len(&self) -> usize {
        self.lits.len()
    }

    /// Whether the cube has no literals
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lits.is_empty()
    }
}

impl std::fmt::Display for Cube {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, lit) in self.lits.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{lit}")?;
        }
        write!(f, "]")
    }
}

/// The outcome of the cube stage
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum CubeSet {
    /// The search space split into cubes, indexed in generation order
    Split(Vec<Cube>),
    /// The output collapsed to a constant; no conquer work is needed
    Trivial(bool),
}

/// The lookahead scoring policy
///
/// The reference heuristic is not fixed yet, so the score is a pluggable
/// policy over the two propagation counts `delta0`/`delta1` (nodes newly
/// determined when fixing the candidate false resp. true).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ScorePolicy {
    /// `delta0 * delta1`, rewarding candidates that simplify both branches
    #[default]
    PropagationProduct,
    /// `(delta0 + delta1) * min / max`, total reduction weighted by balance
    BranchBalance,
}

impl ScorePolicy {
    #[allow(clippy::cast_precision_loss)]
    fn score(self, delta0: usize, delta1: usize) -> f64 {
        match self {
            ScorePolicy::PropagationProduct => (delta0 * delta1) as f64,
            ScorePolicy::BranchBalance => {
                let lo = delta0.min(delta1);
                let hi = delta0.max(delta1).max(1);
                (delta0 + delta1) as f64 * lo as f64 / hi as f64
            }
        }
    }
}

/// Configures and runs cube generation for one circuit
pub struct CubeBuilder<'a> {
    circuit: &'a Circuit,
    encoding: &'a Encoding,
    depth: u32,
    candidate_limit: usize,
    policy: ScorePolicy,
}

impl<'a> CubeBuilder<'a> {
    /// The default split depth
    pub const DEFAULT_DEPTH: u32 = 4;
    /// The default lookahead candidate set size
    pub const DEFAULT_CANDIDATE_LIMIT: usize = 10;

    /// Creates a builder with the default depth, candidate limit and policy
    #[must_use]
    pub fn new(circuit: &'a Circuit, encoding: &'a Encoding) -> CubeBuilder<'a> {
        CubeBuilder {
            circuit,
            encoding,
            depth: Self::DEFAULT_DEPTH,
            candidate_limit: Self::DEFAULT_CANDIDATE_LIMIT,
            policy: ScorePolicy::default(),
        }
    }

    /// Sets the split depth; `0` yields a single empty cube
    #[must_use]
    pub fn depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Sets the number of top-ranked candidates the lookahead probes
    #[must_use]
    pub fn candidate_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = limit.max(1);
        self
    }

    /// Sets the lookahead scoring policy
    #[must_use]
    pub fn policy(mut self, policy: ScorePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Generates the cube set
    ///
    /// If fewer than `depth` split candidates remain on some branch, that
    /// branch stops early and the total cube count stays below `2^depth`;
    /// this is expected, not an error.
    pub fn build(&self) -> Result<CubeSet, EncodingError> {
        if let Some(value) = self.circuit.output().constant_value() {
            info!(
                "output is constant, trivially {}",
                if value { "SAT" } else { "UNSAT" }
            );
            return Ok(CubeSet::Trivial(value));
        }
        // the whole tree searches under the asserted output, mirroring the
        // output unit clause of the encoding; the assertion is shared by all
        // cubes and therefore not part of any cube's literal sequence
        let mut root = Residual::new(self.circuit);
        let output = self.circuit.output();
        if let Outcome::Conflict = root.assign(output.node(), !output.is_complement()) {
            info!("asserted output is structurally inconsistent, trivially UNSAT");
            return Ok(CubeSet::Trivial(false));
        }
        let mut cubes = Vec::new();
        self.grow(root, Vec::new(), 0, &mut cubes)?;
        info!(
            "generated {} cubes at depth {} over {} and gates",
            cubes.len(),
            self.depth,
            self.circuit.n_ands()
        );
        Ok(CubeSet::Split(cubes))
    }

    /// Extends one branch of the decision tree until it becomes a leaf
    fn grow(
        &self,
        mut residual: Residual<'a>,
        mut branch: Vec<Lit>,
        splits: u32,
        out: &mut Vec<Cube>,
    ) -> Result<(), EncodingError> {
        loop {
            if splits >= self.depth {
                return Ok(self.emit(branch, out));
            }
            match self.select(&residual)? {
                None => return Ok(self.emit(branch, out)),
                Some(Selection::Forced { node, value }) => {
                    debug!("forced node {node} to {value} (other polarity conflicts)");
                    branch.push(self.encoding.cube_lit(node, value)?);
                    if let Outcome::Conflict = residual.assign(node, value) {
                        // both polarities conflict; the conquer stage refutes
                        // this cube cheaply
                        return Ok(self.emit(branch, out));
                    }
                }
                Some(Selection::Split(node)) => {
                    for value in [false, true] {
                        let mut sub = residual.clone();
                        let mut sub_branch = branch.clone();
                        sub_branch.push(self.encoding.cube_lit(node, value)?);
                        if let Outcome::Conflict = sub.assign(node, value) {
                            self.emit(sub_branch, out);
                        } else {
                            self.grow(sub, sub_branch, splits + 1, out)?;
                        }
                    }
                    return Ok(());
                }
            }
        }
    }

    fn emit(&self, lits: Vec<Lit>, out: &mut Vec<Cube>) {
        debug!("cube {}: {} literals", out.len(), lits.len());
        out.push(Cube {
            index: out.len(),
            lits,
        });
    }

    /// Picks the next branch node over the residual circuit
    ///
    /// Probes the top-`candidate_limit` candidates by structural rank; the
    /// first candidate with a conflicting polarity short-circuits selection
    /// as a forced assignment.
    fn select(&self, residual: &Residual) -> Result<Option<Selection>, EncodingError> {
        let candidates = residual.rank_candidates(self.candidate_limit);
        if candidates.is_empty() {
            return Ok(None);
        }
        let mut best: Option<(f64, NodeId)> = None;
        for node in candidates {
            let mut deltas = [0usize; 2];
            let mut conflicts = [false; 2];
            for (i, value) in [false, true].into_iter().enumerate() {
                let mut probe = residual.clone();
                match probe.assign(node, value) {
                    Outcome::Conflict => conflicts[i] = true,
                    Outcome::Propagated { determined } => deltas[i] = determined,
                }
            }
            match conflicts {
                [true, true] => {
                    // branch infeasible regardless of this node; force one
                    // polarity and let the conquer stage refute the cube
                    return Ok(Some(Selection::Forced { node, value: true }));
                }
                [true, false] => return Ok(Some(Selection::Forced { node, value: true })),
                [false, true] => return Ok(Some(Selection::Forced { node, value: false })),
                [false, false] => {}
            }
            let score = self.policy.score(deltas[0], deltas[1]);
            // strictly-greater keeps the lowest node id among ties, since
            // candidates are visited in ascending id order within equal ranks
            if best.map_or(true, |(s, _)| score > s) {
                best = Some((score, node));
            }
        }
        Ok(best.map(|(_, node)| Selection::Split(node)))
    }
}

/// The decision the lookahead makes at one tree node
enum Selection {
    /// Branch on both polarities of this node
    Split(NodeId),
    /// Commit this polarity as a unit; the other conflicts
    Forced { node: NodeId, value: bool },
}

/// The outcome of assigning a node in the residual state
enum Outcome {
    /// The assignment propagated; `determined` nodes were newly fixed
    Propagated { determined: usize },
    /// The assignment collapses the output to false or contradicts an
    /// earlier assignment
    Conflict,
}

/// Residual propagation state of the circuit under a branch's assignments
///
/// Tracks the explicit branch assignments and the values they imply through
/// forward constant folding: an AND gate with a false fanin collapses to
/// false, one with both fanins true collapses to true, transitively in
/// topological order.
#[derive(Clone)]
struct Residual<'a> {
    circuit: &'a Circuit,
    assigned: Vec<TernaryVal>,
    values: Vec<TernaryVal>,
    determined: usize,
}

impl<'a> Residual<'a> {
    fn new(circuit: &'a Circuit) -> Residual<'a> {
        Residual {
            circuit,
            assigned: vec![TernaryVal::DontCare; circuit.n_nodes()],
            values: vec![TernaryVal::DontCare; circuit.n_nodes()],
            determined: 0,
        }
    }

    fn edge_value(values: &[TernaryVal], edge: Edge) -> TernaryVal {
        let v = if edge.node() == crate::circuit::CONST_NODE {
            TernaryVal::False
        } else {
            values[edge.node() as usize]
        };
        if edge.is_complement() {
            !v
        } else {
            v
        }
    }

    /// Assigns a node and folds constants forward
    fn assign(&mut self, node: NodeId, value: bool) -> Outcome {
        debug_assert!(!matches!(self.circuit.node(node), Node::Const));
        if self.values[node as usize] == !TernaryVal::from(value) {
            return Outcome::Conflict;
        }
        self.assigned[node as usize] = value.into();
        self.propagate()
    }

    /// Recomputes derived values from the explicit assignments
    ///
    /// One forward sweep in topological order suffices because every gate's
    /// fanins precede it in the arena. Collapsing the output to false is a
    /// conflict: no assignment extending this branch can satisfy the query.
    fn propagate(&mut self) -> Outcome {
        let before = self.determined;
        let mut values = vec![TernaryVal::DontCare; self.circuit.n_nodes()];
        let mut determined = 0;
        for (id, node) in self.circuit.nodes() {
            let derived = match node {
                Node::Const | Node::Input => TernaryVal::DontCare,
                Node::And { fanin0, fanin1 } => {
                    let a = Self::edge_value(&values, *fanin0);
                    let b = Self::edge_value(&values, *fanin1);
                    if a == TernaryVal::False || b == TernaryVal::False {
                        TernaryVal::False
                    } else if a == TernaryVal::True && b == TernaryVal::True {
                        TernaryVal::True
                    } else {
                        TernaryVal::DontCare
                    }
                }
            };
            let assigned = self.assigned[id as usize];
            let value = match (derived, assigned) {
                (TernaryVal::DontCare, v) | (v, TernaryVal::DontCare) => v,
                (d, a) if d == a => d,
                _ => return Outcome::Conflict,
            };
            if matches!(node, Node::Const) {
                continue;
            }
            values[id as usize] = value;
            if value != TernaryVal::DontCare {
                determined += 1;
            }
        }
        if Self::edge_value(&values, self.circuit.output()) == TernaryVal::False {
            return Outcome::Conflict;
        }
        self.values = values;
        self.determined = determined;
        Outcome::Propagated {
            determined: determined - before,
        }
    }

    /// Undetermined nodes in the fanin cone of the output
    ///
    /// Determined gates are traversed but not marked: a gate fixed by the
    /// asserted output still has free fanins worth splitting on.
    fn live_mask(&self) -> Vec<bool> {
        let mut live = vec![false; self.circuit.n_nodes()];
        let mut visited = vec![false; self.circuit.n_nodes()];
        let out = self.circuit.output().node();
        let mut stack = Vec::new();
        if out != crate::circuit::CONST_NODE {
            stack.push(out);
        }
        while let Some(id) = stack.pop() {
            if visited[id as usize] {
                continue;
            }
            visited[id as usize] = true;
            live[id as usize] = self.values[id as usize] == TernaryVal::DontCare;
            if let Node::And { fanin0, fanin1 } = self.circuit.node(id) {
                for fanin in [fanin0, fanin1] {
                    let n = fanin.node();
                    if n != crate::circuit::CONST_NODE && !visited[n as usize] {
                        stack.push(n);
                    }
                }
            }
        }
        live
    }

    /// Structural pre-ranking: the top `limit` live free nodes by
    /// `sigma = (indegree + 1) * (outdegree + 1)`, ties by lowest id
    fn rank_candidates(&self, limit: usize) -> Vec<NodeId> {
        let live = self.live_mask();
        self.circuit
            .nodes()
            .filter(|(id, _)| live[*id as usize])
            .map(|(id, node)| {
                let indegree = match node {
                    Node::And { fanin0, fanin1 } => [fanin0, fanin1]
                        .into_iter()
                        .filter(|f| Self::edge_value(&self.values, **f) == TernaryVal::DontCare)
                        .count(),
                    _ => 0,
                };
                let outdegree = self
                    .circuit
                    .fanouts(id)
                    .iter()
                    .filter(|&&f| live[f as usize])
                    .count();
                ((indegree + 1) * (outdegree + 1), id)
            })
            .sorted_unstable_by(|(sa, ia), (sb, ib)| sb.cmp(sa).then(ia.cmp(ib)))
            .take(limit)
            .map(|(_, id)| id)
            .collect()
    }
}
