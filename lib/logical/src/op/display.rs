use crate::op::{JoinType, Op, OpKind};
use fedfusion_model::{DisplayTriple, TriplePattern, VarSet};
use std::fmt::{Display, Formatter};

impl Display for JoinType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinType::Inner => write!(f, "Inner"),
            JoinType::Left => write!(f, "Left"),
        }
    }
}

/// Renders the plan as an indented tree, one node per line.
impl Display for Op {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        fmt_indented(self, f, 0)
    }
}

fn fmt_indented(op: &Op, f: &mut Formatter<'_>, indent: usize) -> std::fmt::Result {
    write!(f, "{:indent$}", "", indent = indent * 2)?;
    match op.kind() {
        OpKind::Endpoint { source, query } => {
            write!(f, "Endpoint({}): ", source.name())?;
            write_triples(f, query.triples())?;
            write_inputs(f, op.required_inputs(), op.optional_inputs())?;
        }
        OpKind::Query { query } => {
            f.write_str("Query: ")?;
            write_triples(f, query.triples())?;
        }
        OpKind::Empty => {
            f.write_str("Empty:")?;
            for variable in op.result_vars().iter() {
                write!(f, " {variable}")?;
            }
        }
        OpKind::Union(_) => f.write_str("Union")?,
        OpKind::Cartesian(_) => f.write_str("Cartesian")?,
        OpKind::Join { .. } => {
            let join_type = op.join_type().unwrap_or(JoinType::Inner);
            write!(f, "Join: {join_type}")?;
        }
        OpKind::Pipe(_) => f.write_str("Pipe")?,
    }

    if op.modifiers().has_solution_modifiers() || op.is_optional() {
        write!(f, " {}", op.modifiers())?;
    }

    for child in op.children() {
        writeln!(f)?;
        fmt_indented(child, f, indent + 1)?;
    }
    Ok(())
}

fn write_triples(f: &mut Formatter<'_>, triples: &[TriplePattern]) -> std::fmt::Result {
    for (i, triple) in triples.iter().enumerate() {
        if i > 0 {
            f.write_str(" . ")?;
        }
        write!(f, "{}", DisplayTriple(triple))?;
    }
    Ok(())
}

fn write_inputs(f: &mut Formatter<'_>, required: &VarSet, optional: &VarSet) -> std::fmt::Result {
    if required.is_empty() && optional.is_empty() {
        return Ok(());
    }
    let render = |set: &VarSet| {
        set.iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    };
    f.write_str(" (")?;
    if !required.is_empty() {
        write!(f, "required: {}", render(required))?;
    }
    if !optional.is_empty() {
        if !required.is_empty() {
            f.write_str("; ")?;
        }
        write!(f, "optional: {}", render(optional))?;
    }
    f.write_str(")")
}
