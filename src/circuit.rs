//! # And-Inverter Graph Circuit Model
//!
//! An immutable in-memory AIG: a flat arena of nodes referenced by dense
//! integer ids, with a constant-false node at id 0, primary inputs, two-input
//! AND gates with optionally inverted fanins, and one designated output edge.
//!
//! The arena is constructed so that every AND gate's fanins have smaller ids
//! than the gate itself, so id order is a topological order and cycles are
//! unrepresentable once a [`Circuit`] exists. The AIGER loader performs its
//! own cycle and reference validation before handing node definitions to the
//! [`CircuitBuilder`].

pub mod aiger;

use std::{fs::File, io::BufReader, ops::Not, path::Path};

use thiserror::Error;

/// Index of a node in the circuit arena
pub type NodeId = u32;

/// The id of the distinguished constant-false node
pub const CONST_NODE: NodeId = 0;

/// Errors for malformed circuit descriptions
///
/// All of these are fatal: no cube or solver work starts on a circuit that
/// fails to load.
#[derive(Error, Debug)]
pub enum FormatError {
    /// The AIGER header line is missing or malformed
    #[error("invalid AIGER header: {0}")]
    InvalidHeader(String),
    /// The file declares latches, which have no combinational meaning here
    #[error("AIGER latches are unsupported (file declares {0})")]
    UnsupportedLatches(u64),
    /// The circuit must have exactly one output
    #[error("expected exactly one output, found {0}")]
    OutputCount(u64),
    /// A literal references a variable that is never defined
    #[error("literal {0} references an undefined node")]
    DanglingLiteral(u64),
    /// A variable is defined more than once
    #[error("literal {0} is defined more than once")]
    DuplicateDefinition(u64),
    /// A gate's transitive fanin contains the gate itself
    #[error("gate literal {0} is part of a definition cycle")]
    CyclicDefinition(u64),
    /// The file ended in the middle of a section
    #[error("unexpected end of file in {0} section")]
    UnexpectedEof(&'static str),
    /// A body line does not match the expected shape
    #[error("malformed {kind} line: {line:?}")]
    MalformedLine {
        /// The section the line belongs to
        kind: &'static str,
        /// The offending line
        line: String,
    },
    /// The file extension identifies neither AIGER flavor
    #[error("unrecognized file extension {0:?} (expected .aag or .aig)")]
    UnknownExtension(String),
    /// Underlying I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A reference to a node with a polarity
///
/// `complement` inverts the value of the referenced node; an edge to the
/// constant node therefore represents constant false or constant true.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Edge {
    node: NodeId,
    complement: bool,
}

impl Edge {
    /// The constant-false edge
    pub const FALSE: Edge = Edge {
        node: CONST_NODE,
        complement: false,
    };

    /// The constant-true edge
    pub const TRUE: Edge = Edge {
        node: CONST_NODE,
        complement: true,
    };

    /// Creates an edge to `node`, inverted if `complement`
    #[must_use]
    pub fn new(node: NodeId, complement: bool) -> Edge {
        Edge { node, complement }
    }

    /// The referenced node
    #[inline]
    #[must_use]
    pub fn node(self) -> NodeId {
        self.node
    }

    /// Whether the edge inverts the referenced node
    #[inline]
    #[must_use]
    pub fn is_complement(self) -> bool {
        self.complement
    }

    /// The value of the edge if it refers to the constant node
    #[must_use]
    pub fn constant_value(self) -> Option<bool> {
        (self.node == CONST_NODE).then_some(self.complement)
    }
}

impl Not for Edge {
    type Output = Edge;

    fn not(self) -> Edge {
        Edge {
            node: self.node,
            complement: !self.complement,
        }
    }
}

/// A node in the circuit arena
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Node {
    /// The constant-false node, only ever at id 0
    Const,
    /// A primary input
    Input,
    /// A two-input AND gate
    And {
        /// First fanin
        fanin0: Edge,
        /// Second fanin
        fanin1: Edge,
    },
}

impl Node {
    /// Whether the node is an AND gate
    #[must_use]
    pub fn is_and(&self) -> bool {
        matches!(self, Node::And { .. })
    }

    /// Whether the node is a primary input
    #[must_use]
    pub fn is_input(&self) -> bool {
        matches!(self, Node::Input)
    }
}

/// An immutable and-inverter graph with a single designated output
///
/// Built once, through [`CircuitBuilder`] or the AIGER loader, and shared
/// read-only afterwards.
#[derive(Clone, Debug)]
pub struct Circuit {
    nodes: Vec<Node>,
    inputs: Vec<NodeId>,
    output: Edge,
    fanouts: Vec<Vec<NodeId>>,
}

impl Circuit {
    /// Loads a circuit from an AIGER file, choosing the flavor by extension
    ///
    /// `.aag` files are read as ASCII AIGER, `.aig` files as binary AIGER.
    pub fn from_aiger_path<P: AsRef<Path>>(path: P) -> Result<Circuit, FormatError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let reader = BufReader::new(File::open(path)?);
        match ext.as_str() {
            "aag" => aiger::parse_ascii(reader),
            "aig" => aiger::parse_binary(reader),
            _ => Err(FormatError::UnknownExtension(ext)),
        }
    }

    /// The total number of nodes, including the constant node
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// The number of primary inputs
    #[must_use]
    pub fn n_inputs(&self) -> usize {
        self.inputs.len()
    }

    /// The number of AND gates
    #[must_use]
    pub fn n_ands(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_and()).count()
    }

    /// The primary inputs in declaration order
    #[must_use]
    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    /// The designated output edge
    #[must_use]
    pub fn output(&self) -> Edge {
        self.output
    }

    /// Gets a node by id
    ///
    /// # Panics
    ///
    /// If `id` is out of range.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    /// Iterates over all `(id, node)` pairs in topological (id) order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(id, n)| (id as NodeId, n))
    }

    /// Iterates over the ids of all AND gates in topological order
    pub fn and_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes().filter(|(_, n)| n.is_and()).map(|(id, _)| id)
    }

    /// The AND gates reading the given node directly
    #[must_use]
    pub fn fanouts(&self, id: NodeId) -> &[NodeId] {
        &self.fanouts[id as usize]
    }

    /// Evaluates the circuit output under a total input assignment
    ///
    /// `inputs` gives one value per primary input in declaration order.
    ///
    /// # Panics
    ///
    /// If `inputs.len()` differs from the number of primary inputs.
    #[must_use]
    pub fn eval(&self, inputs: &[bool]) -> bool {
        let values = self.eval_nodes(inputs);
        values[self.output.node() as usize] ^ self.output.is_complement()
    }

    /// Evaluates every node under a total input assignment
    ///
    /// Returns one value per node, indexed by node id.
    ///
    /// # Panics
    ///
    /// If `inputs.len()` differs from the number of primary inputs.
    #[must_use]
    pub fn eval_nodes(&self, inputs: &[bool]) -> Vec<bool> {
        assert_eq!(
            inputs.len(),
            self.inputs.len(),
            "input assignment length mismatch"
        );
        let mut values = vec![false; self.nodes.len()];
        let mut next_input = 0;
        for (id, node) in self.nodes() {
            values[id as usize] = match node {
                Node::Const => false,
                Node::Input => {
                    let v = inputs[next_input];
                    next_input += 1;
                    v
                }
                Node::And { fanin0, fanin1 } => {
                    let a = values[fanin0.node() as usize] ^ fanin0.is_complement();
                    let b = values[fanin1.node() as usize] ^ fanin1.is_complement();
                    a && b
                }
            };
        }
        values
    }
}

/// Incrementally constructs a [`Circuit`]
///
/// Fanin edges must reference nodes that already exist, which keeps the arena
/// topologically ordered and acyclic by construction.
#[derive(Debug, Default)]
pub struct CircuitBuilder {
    nodes: Vec<Node>,
    inputs: Vec<NodeId>,
}

impl CircuitBuilder {
    /// Creates a builder holding only the constant node
    #[must_use]
    pub fn new() -> CircuitBuilder {
        CircuitBuilder {
            nodes: vec![Node::Const],
            inputs: Vec::new(),
        }
    }

    /// Adds a primary input and returns its (positive) edge
    pub fn input(&mut self) -> Edge {
        let id = self.next_id();
        self.nodes.push(Node::Input);
        self.inputs.push(id);
        Edge::new(id, false)
    }

    /// Adds an AND gate over two existing edges and returns its edge
    ///
    /// # Panics
    ///
    /// If a fanin references a node that does not exist yet.
    pub fn and(&mut self, fanin0: Edge, fanin1: Edge) -> Edge {
        assert!(
            (fanin0.node() as usize) < self.nodes.len()
                && (fanin1.node() as usize) < self.nodes.len(),
            "fanin references a node that does not exist yet"
        );
        let id = self.next_id();
        self.nodes.push(Node::And { fanin0, fanin1 });
        Edge::new(id, false)
    }

    /// Convenience: `or(a, b)` as `!( !a & !b )`
    pub fn or(&mut self, a: Edge, b: Edge) -> Edge {
        !self.and(!a, !b)
    }

    /// Convenience: `xor(a, b)` over three AND gates
    pub fn xor(&mut self, a: Edge, b: Edge) -> Edge {
        let both = self.and(a, b);
        let neither = self.and(!a, !b);
        !self.and(!both, !neither)
    }

    /// Finalizes the circuit with the given output edge
    pub fn build(self, output: Edge) -> Result<Circuit, FormatError> {
        if output.node() as usize >= self.nodes.len() {
            return Err(FormatError::DanglingLiteral(u64::from(output.node()) * 2));
        }
        let mut fanouts = vec![Vec::new(); self.nodes.len()];
        for (id, node) in self.nodes.iter().enumerate() {
            if let Node::And { fanin0, fanin1 } = node {
                fanouts[fanin0.node() as usize].push(id as NodeId);
                if fanin1.node() != fanin0.node() {
                    fanouts[fanin1.node() as usize].push(id as NodeId);
                }
            }
        }
        Ok(Circuit {
            nodes: self.nodes,
            inputs: self.inputs,
            output,
            fanouts,
        })
    }

    fn next_id(&self) -> NodeId {
        NodeId::try_from(self.nodes.len()).expect("circuit arena overflows node id space")
    }
}
