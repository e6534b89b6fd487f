//! # Tseitin CNF Encoding
//!
//! Encodes a [`Circuit`] into an equisatisfiable clause set: one variable per
//! primary input, one fresh variable per AND gate, and for every gate
//! `g = a & b` the three clauses enforcing the equivalence. The circuit
//! output is asserted true as a unit clause, so the encoded instance is
//! satisfiable iff some input assignment drives the output to true.
//!
//! The base clause set is built once per circuit and shared read-only by all
//! cubes; [`Encoding::assume`] attaches cube literals as borrowed units
//! without touching the base clauses.

use thiserror::Error;

use crate::{
    circuit::{Circuit, Edge, Node, NodeId, CONST_NODE},
    types::{Cnf, Lit, Var},
};

/// Internal encoding invariant violations
///
/// These indicate a bug rather than bad input and abort the run.
#[derive(Error, Debug)]
pub enum EncodingError {
    /// A node that should carry an encoding variable does not
    #[error("node {0} has no encoding variable")]
    UnencodedNode(NodeId),
}

/// A fanin resolved against the encoding: either a literal or a constant
#[derive(Clone, Copy)]
enum EdgeRes {
    Lit(Lit),
    Const(bool),
}

/// The Tseitin encoding of one circuit
///
/// Holds the shared base clauses and the bidirectional node/variable maps.
/// Immutable once built; reused across all cube encodings of the circuit.
#[derive(Debug)]
pub struct Encoding {
    cnf: Cnf,
    node_vars: Vec<Option<Var>>,
    var_nodes: Vec<NodeId>,
    input_vars: Vec<Var>,
    output_lit: Option<Lit>,
}

impl Encoding {
    /// Encodes a circuit, asserting its output true
    ///
    /// Gates are walked in topological order; fanin edges to the constant
    /// node simplify the emitted clauses. A constant-false output yields the
    /// empty clause, a constant-true output no unit at all.
    pub fn new(circuit: &Circuit) -> Result<Encoding, EncodingError> {
        let mut enc = Encoding {
            cnf: Cnf::with_capacity(3 * circuit.n_ands() + 1),
            node_vars: vec![None; circuit.n_nodes()],
            var_nodes: Vec::with_capacity(circuit.n_nodes()),
            input_vars: Vec::with_capacity(circuit.n_inputs()),
            output_lit: None,
        };
        for (id, node) in circuit.nodes() {
            match node {
                Node::Const => {}
                Node::Input => {
                    let v = enc.alloc(id);
                    enc.input_vars.push(v);
                }
                Node::And { fanin0, fanin1 } => {
                    let a = enc.edge_res(*fanin0)?;
                    let b = enc.edge_res(*fanin1)?;
                    let g = enc.alloc(id).pos_lit();
                    match (a, b) {
                        (EdgeRes::Const(false), _) | (_, EdgeRes::Const(false)) => {
                            enc.cnf.add_unit(!g);
                        }
                        (EdgeRes::Const(true), EdgeRes::Const(true)) => {
                            enc.cnf.add_unit(g);
                        }
                        (EdgeRes::Const(true), EdgeRes::Lit(x))
                        | (EdgeRes::Lit(x), EdgeRes::Const(true)) => {
                            enc.cnf.add_binary(!g, x);
                            enc.cnf.add_binary(g, !x);
                        }
                        (EdgeRes::Lit(a), EdgeRes::Lit(b)) => {
                            enc.cnf.add_binary(!g, a);
                            enc.cnf.add_binary(!g, b);
                            enc.cnf.add_ternary(g, !a, !b);
                        }
                    }
                }
            }
        }
        match enc.edge_res(circuit.output())? {
            EdgeRes::Const(true) => {}
            EdgeRes::Const(false) => enc.cnf.add_clause(crate::types::Clause::new()),
            EdgeRes::Lit(l) => {
                enc.cnf.add_unit(l);
                enc.output_lit = Some(l);
            }
        }
        Ok(enc)
    }

    fn alloc(&mut self, id: NodeId) -> Var {
        let v = Var::new(u32::try_from(self.var_nodes.len()).expect("too many encoding variables"));
        self.var_nodes.push(id);
        self.node_vars[id as usize] = Some(v);
        v
    }

    fn edge_res(&self, edge: Edge) -> Result<EdgeRes, EncodingError> {
        if edge.node() == CONST_NODE {
            return Ok(EdgeRes::Const(edge.is_complement()));
        }
        let v = self.node_vars[edge.node() as usize]
            .ok_or(EncodingError::UnencodedNode(edge.node()))?;
        let l = v.pos_lit();
        Ok(EdgeRes::Lit(if edge.is_complement() { !l } else { l }))
    }

    /// The shared base clause set
    #[must_use]
    pub fn cnf(&self) -> &Cnf {
        &self.cnf
    }

    /// The encoding variable of a node, if it has one
    #[must_use]
    pub fn var(&self, node: NodeId) -> Option<Var> {
        self.node_vars.get(node as usize).copied().flatten()
    }

    /// The node an encoding variable was allocated for
    #[must_use]
    pub fn node(&self, var: Var) -> Option<NodeId> {
        self.var_nodes.get(var.idx()).copied()
    }

    /// The variables of the primary inputs in declaration order
    #[must_use]
    pub fn input_vars(&self) -> &[Var] {
        &self.input_vars
    }

    /// The asserted output literal, unless the output is constant
    #[must_use]
    pub fn output_lit(&self) -> Option<Lit> {
        self.output_lit
    }

    /// The highest allocated variable, if any
    #[must_use]
    pub fn max_var(&self) -> Option<Var> {
        let n = u32::try_from(self.var_nodes.len()).expect("too many encoding variables");
        (n > 0).then(|| Var::new(n - 1))
    }

    /// The number of base clauses
    #[must_use]
    pub fn n_clauses(&self) -> usize {
        self.cnf.len()
    }

    /// The literal fixing `node` to `value` under this encoding
    pub fn cube_lit(&self, node: NodeId, value: bool) -> Result<Lit, EncodingError> {
        self.var(node)
            .map(|v| v.lit(value))
            .ok_or(EncodingError::UnencodedNode(node))
    }

    /// Attaches cube literals to the base clauses as borrowed unit clauses
    ///
    /// The base clauses are shared unmodified, so this is `O(|cube|)`.
    #[must_use]
    pub fn assume<'a>(&'a self, assumps: &'a [Lit]) -> AssumedCnf<'a> {
        AssumedCnf {
            base: &self.cnf,
            assumps,
        }
    }
}

/// A borrowed view of the base clauses plus one cube's unit assumptions
#[derive(Clone, Copy, Debug)]
pub struct AssumedCnf<'a> {
    base: &'a Cnf,
    assumps: &'a [Lit],
}

impl AssumedCnf<'_> {
    /// The shared base clauses
    #[must_use]
    pub fn base(&self) -> &Cnf {
        self.base
    }

    /// The unit assumptions of the cube
    #[must_use]
    pub fn assumps(&self) -> &[Lit] {
        self.assumps
    }

    /// The total clause count, units included
    #[must_use]
    pub fn n_clauses(&self) -> usize {
        self.base.len() + self.assumps.len()
    }

    /// The highest variable over base clauses and assumptions
    #[must_use]
    pub fn max_var(&self) -> Option<Var> {
        let unit_max = self.assumps.iter().map(|l| l.var()).max();
        self.base.max_var().max(unit_max)
    }
}
