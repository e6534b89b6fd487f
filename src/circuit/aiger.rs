//! # AIGER Circuit Reader
//!
//! Reads the AIGER format in both its ASCII (`aag`) and binary (`aig`)
//! variants into a [`Circuit`]. Latches are rejected, symbol tables and
//! comment sections are skipped. AIGER literals are `2 * variable` with the
//! low bit marking inversion; variable 0 is the constant.
//!
//! In the binary variant, the fanins of the `i`-th AND gate are stored as two
//! 7-bit-per-byte varints `delta0 = lhs - rhs0` and `delta1 = rhs0 - rhs1`.
//!
//! ## References
//!
//! - [AIGER format description](https://fmv.jku.at/aiger/)

use std::io::{BufRead, Read};

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{space1, u64 as nom_u64},
    combinator::{all_consuming, map},
    sequence::{preceded, tuple},
    IResult,
};

use super::{Circuit, CircuitBuilder, Edge, FormatError};
use crate::types::{RsHashMap, RsHashSet};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Flavor {
    Ascii,
    Binary,
}

#[derive(Clone, Copy, Debug)]
struct Header {
    flavor: Flavor,
    n_inputs: u64,
    n_latches: u64,
    n_outputs: u64,
    n_ands: u64,
}

fn parse_header(line: &str) -> Result<Header, FormatError> {
    let res: IResult<&str, Header> = all_consuming(map(
        tuple((
            alt((tag("aag"), tag("aig"))),
            preceded(space1, nom_u64),
            preceded(space1, nom_u64),
            preceded(space1, nom_u64),
            preceded(space1, nom_u64),
            preceded(space1, nom_u64),
        )),
        |(flavor, _max_idx, n_inputs, n_latches, n_outputs, n_ands)| Header {
            flavor: if flavor == "aag" {
                Flavor::Ascii
            } else {
                Flavor::Binary
            },
            n_inputs,
            n_latches,
            n_outputs,
            n_ands,
        },
    ))(line.trim_end());
    match res {
        Ok((_, header)) => Ok(header),
        Err(_) => Err(FormatError::InvalidHeader(line.trim_end().to_string())),
    }
}

fn check_header(header: &Header, expected: Flavor, line: &str) -> Result<(), FormatError> {
    if header.flavor != expected {
        return Err(FormatError::InvalidHeader(line.trim_end().to_string()));
    }
    if header.n_latches != 0 {
        return Err(FormatError::UnsupportedLatches(header.n_latches));
    }
    if header.n_outputs != 1 {
        return Err(FormatError::OutputCount(header.n_outputs));
    }
    Ok(())
}

fn parse_literal(line: &str, kind: &'static str) -> Result<u64, FormatError> {
    let res: IResult<&str, u64> = all_consuming(nom_u64)(line.trim_end());
    match res {
        Ok((_, lit)) => Ok(lit),
        Err(_) => Err(FormatError::MalformedLine {
            kind,
            line: line.trim_end().to_string(),
        }),
    }
}

fn parse_and_line(line: &str) -> Result<(u64, u64, u64), FormatError> {
    let res: IResult<&str, (u64, u64, u64)> = all_consuming(tuple((
        nom_u64,
        preceded(space1, nom_u64),
        preceded(space1, nom_u64),
    )))(line.trim_end());
    match res {
        Ok((_, def)) => Ok(def),
        Err(_) => Err(FormatError::MalformedLine {
            kind: "and gate",
            line: line.trim_end().to_string(),
        }),
    }
}

/// An AND gate definition keyed by its AIGER variable
#[derive(Clone, Copy, Debug)]
struct AndDef {
    rhs0: u64,
    rhs1: u64,
}

/// Reads one line, reporting EOF as a format error for the given section
fn next_line<R: BufRead>(reader: &mut R, section: &'static str) -> Result<String, FormatError> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(FormatError::UnexpectedEof(section));
    }
    Ok(line)
}

/// Parses an ASCII (`aag`) AIGER file
///
/// Input and AND gate definitions may appear in any order; they are sorted
/// topologically while the arena is built, and definition cycles are
/// rejected.
pub fn parse_ascii<R: BufRead>(mut reader: R) -> Result<Circuit, FormatError> {
    let header_line = next_line(&mut reader, "header")?;
    let header = parse_header(&header_line)?;
    check_header(&header, Flavor::Ascii, &header_line)?;

    let mut defs: RsHashMap<u64, AndDef> = RsHashMap::default();
    let mut input_vars = Vec::with_capacity(usize::try_from(header.n_inputs).unwrap_or(0));
    for _ in 0..header.n_inputs {
        let line = next_line(&mut reader, "input")?;
        let lit = parse_literal(&line, "input")?;
        if lit < 2 || lit & 1 == 1 {
            return Err(FormatError::MalformedLine {
                kind: "input",
                line: line.trim_end().to_string(),
            });
        }
        if input_vars.contains(&(lit >> 1)) {
            return Err(FormatError::DuplicateDefinition(lit));
        }
        input_vars.push(lit >> 1);
    }

    let output_line = next_line(&mut reader, "output")?;
    let output_lit = parse_literal(&output_line, "output")?;

    let mut gate_order = Vec::with_capacity(usize::try_from(header.n_ands).unwrap_or(0));
    for _ in 0..header.n_ands {
        let line = next_line(&mut reader, "and gate")?;
        let (lhs, rhs0, rhs1) = parse_and_line(&line)?;
        if lhs < 2 || lhs & 1 == 1 {
            return Err(FormatError::MalformedLine {
                kind: "and gate",
                line: line.trim_end().to_string(),
            });
        }
        if input_vars.contains(&(lhs >> 1))
            || defs.insert(lhs >> 1, AndDef { rhs0, rhs1 }).is_some()
        {
            return Err(FormatError::DuplicateDefinition(lhs));
        }
        gate_order.push(lhs >> 1);
    }

    // anything after the body is the symbol table or comments
    build(&input_vars, &gate_order, &defs, output_lit)
}

/// Parses a binary (`aig`) AIGER file
///
/// Inputs are implicit (variables `1..=I`) and AND gates are stored in
/// topological order as delta-encoded varints.
pub fn parse_binary<R: BufRead>(mut reader: R) -> Result<Circuit, FormatError> {
    let header_line = next_line(&mut reader, "header")?;
    let header = parse_header(&header_line)?;
    check_header(&header, Flavor::Binary, &header_line)?;

    let input_vars: Vec<u64> = (1..=header.n_inputs).collect();

    let output_line = next_line(&mut reader, "output")?;
    let output_lit = parse_literal(&output_line, "output")?;

    let mut defs: RsHashMap<u64, AndDef> = RsHashMap::default();
    let mut gate_order = Vec::with_capacity(usize::try_from(header.n_ands).unwrap_or(0));
    for idx in 0..header.n_ands {
        let lhs = 2 * (header.n_inputs + idx + 1);
        let delta0 = decode_varint(&mut reader)?;
        let delta1 = decode_varint(&mut reader)?;
        let rhs0 = lhs
            .checked_sub(delta0)
            .ok_or(FormatError::DanglingLiteral(lhs))?;
        if rhs0 == lhs {
            return Err(FormatError::CyclicDefinition(lhs));
        }
        let rhs1 = rhs0
            .checked_sub(delta1)
            .ok_or(FormatError::DanglingLiteral(lhs))?;
        defs.insert(lhs >> 1, AndDef { rhs0, rhs1 });
        gate_order.push(lhs >> 1);
    }

    // anything after the gate section is the symbol table or comments
    build(&input_vars, &gate_order, &defs, output_lit)
}

/// Decodes one 7-bit-per-byte varint from the binary gate section
fn decode_varint<R: BufRead>(reader: &mut R) -> Result<u64, FormatError> {
    let mut result = 0u64;
    let mut shift = 0u32;
    loop {
        let mut byte = [0u8; 1];
        if reader.read(&mut byte)? == 0 {
            return Err(FormatError::UnexpectedEof("and gate"));
        }
        if shift >= u64::BITS {
            return Err(FormatError::MalformedLine {
                kind: "binary delta",
                line: format!("{:#04x}", byte[0]),
            });
        }
        result |= u64::from(byte[0] & 0x7f) << shift;
        if byte[0] & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// Builds the arena from validated definitions
///
/// Emits AND gates in topological order via an explicit DFS stack; a gate
/// encountered again while its fan-in cone is still being expanded closes a
/// definition cycle.
fn build(
    input_vars: &[u64],
    gate_order: &[u64],
    defs: &RsHashMap<u64, AndDef>,
    output_lit: u64,
) -> Result<Circuit, FormatError> {
    let mut builder = CircuitBuilder::new();
    let mut edges: RsHashMap<u64, Edge> = RsHashMap::default();
    edges.insert(0, Edge::FALSE);
    for &var in input_vars {
        let edge = builder.input();
        edges.insert(var, edge);
    }

    let resolve = |edges: &RsHashMap<u64, Edge>, lit: u64| -> Result<Edge, FormatError> {
        let edge = *edges
            .get(&(lit >> 1))
            .ok_or(FormatError::DanglingLiteral(lit))?;
        Ok(if lit & 1 == 1 { !edge } else { edge })
    };

    let mut expanding: RsHashSet<u64> = RsHashSet::default();
    let mut stack: Vec<(u64, bool)> = Vec::new();
    for &root in gate_order {
        stack.push((root, false));
        while let Some((var, expanded)) = stack.pop() {
            if expanded {
                let def = defs[&var];
                let fanin0 = resolve(&edges, def.rhs0)?;
                let fanin1 = resolve(&edges, def.rhs1)?;
                let edge = builder.and(fanin0, fanin1);
                edges.insert(var, edge);
                expanding.remove(&var);
                continue;
            }
            if edges.contains_key(&var) {
                continue;
            }
            let def = *defs
                .get(&var)
                .ok_or(FormatError::DanglingLiteral(var * 2))?;
            if !expanding.insert(var) {
                return Err(FormatError::CyclicDefinition(var * 2));
            }
            stack.push((var, true));
            for rhs in [def.rhs0, def.rhs1] {
                if !edges.contains_key(&(rhs >> 1)) {
                    stack.push((rhs >> 1, false));
                }
            }
        }
    }

    let output = resolve(&edges, output_lit)?;
    builder.build(output)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{parse_ascii, parse_binary};
    use crate::circuit::FormatError;

    fn ascii(input: &str) -> Result<crate::circuit::Circuit, FormatError> {
        parse_ascii(Cursor::new(input))
    }

    #[test]
    fn single_and_gate() {
        let circuit = ascii("aag 3 2 0 1 1\n2\n4\n6\n6 2 4\n").unwrap();
        assert_eq!(circuit.n_inputs(), 2);
        assert_eq!(circuit.n_ands(), 1);
        assert!(circuit.eval(&[true, true]));
        assert!(!circuit.eval(&[true, false]));
    }

    #[test]
    fn inverted_output() {
        // output is the negation of the AND gate
        let circuit = ascii("aag 3 2 0 1 1\n2\n4\n7\n6 2 4\n").unwrap();
        assert!(!circuit.eval(&[true, true]));
        assert!(circuit.eval(&[false, true]));
    }

    #[test]
    fn out_of_order_gates() {
        // gate 8 references gate 6, which is defined after it
        let circuit = ascii("aag 4 2 0 1 2\n2\n4\n8\n8 6 2\n6 2 4\n").unwrap();
        assert_eq!(circuit.n_ands(), 2);
        assert!(circuit.eval(&[true, true]));
        assert!(!circuit.eval(&[false, true]));
    }

    #[test]
    fn symbol_table_skipped() {
        let circuit = ascii("aag 3 2 0 1 1\n2\n4\n6\n6 2 4\ni0 a\ni1 b\no0 out\nc\ncomment\n")
            .unwrap();
        assert_eq!(circuit.n_inputs(), 2);
    }

    #[test]
    fn constant_output() {
        let circuit = ascii("aag 0 0 0 1 0\n1\n").unwrap();
        assert_eq!(circuit.output().constant_value(), Some(true));
    }

    #[test]
    fn binary_matches_ascii() {
        // same AND gate as `single_and_gate`: lhs 6, rhs0 4, rhs1 2
        let mut data = b"aig 3 2 0 1 1\n6\n".to_vec();
        data.extend([0x02, 0x02]);
        let circuit = parse_binary(Cursor::new(data)).unwrap();
        let reference = ascii("aag 3 2 0 1 1\n2\n4\n6\n6 2 4\n").unwrap();
        for a in [false, true] {
            for b in [false, true] {
                assert_eq!(circuit.eval(&[a, b]), reference.eval(&[a, b]));
            }
        }
    }

    #[test]
    fn binary_multibyte_delta() {
        // 100 inputs, single gate and(2, 4): lhs = 202, delta0 = 198 = 0xc6
        let mut data = b"aig 101 100 0 1 1\n202\n".to_vec();
        data.extend([0xc6, 0x01, 0x02]);
        let circuit = parse_binary(Cursor::new(data)).unwrap();
        assert_eq!(circuit.n_inputs(), 100);
        assert_eq!(circuit.n_ands(), 1);
        let mut inputs = vec![false; 100];
        inputs[0] = true;
        inputs[1] = true;
        assert!(circuit.eval(&inputs));
    }

    #[test]
    fn latches_rejected() {
        let res = ascii("aag 2 1 1 1 0\n2\n4 2\n4\n");
        assert!(matches!(res, Err(FormatError::UnsupportedLatches(1))));
    }

    #[test]
    fn multiple_outputs_rejected() {
        let res = ascii("aag 2 2 0 2 0\n2\n4\n2\n4\n");
        assert!(matches!(res, Err(FormatError::OutputCount(2))));
    }

    #[test]
    fn dangling_reference_rejected() {
        let res = ascii("aag 3 1 0 1 1\n2\n4\n4 6 2\n");
        assert!(matches!(res, Err(FormatError::DanglingLiteral(6))));
    }

    #[test]
    fn duplicate_definition_rejected() {
        let res = ascii("aag 3 2 0 1 2\n2\n4\n6\n6 2 4\n6 4 2\n");
        assert!(matches!(res, Err(FormatError::DuplicateDefinition(6))));
    }

    #[test]
    fn cyclic_definition_rejected() {
        let res = ascii("aag 2 0 0 1 2\n2\n2 4 4\n4 2 2\n");
        assert!(matches!(res, Err(FormatError::CyclicDefinition(_))));
    }

    #[test]
    fn truncated_file_rejected() {
        let res = ascii("aag 3 2 0 1 1\n2\n4\n6\n");
        assert!(matches!(res, Err(FormatError::UnexpectedEof("and gate"))));
    }

    #[test]
    fn garbage_header_rejected() {
        let res = ascii("not an aiger file\n");
        assert!(matches!(res, Err(FormatError::InvalidHeader(_))));
    }
}
