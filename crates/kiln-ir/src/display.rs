//! Text dumps used by the `trace` option

use std::fmt;

use crate::graph::{Graph, Input};

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Value(id) => write!(f, "{id}"),
            Input::Const(c) => write!(f, "{c}"),
        }
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "fn {}({} params)", self.name(), self.params())?;
        for (id, block) in self.blocks() {
            writeln!(f, "{id}:")?;
            for instr_id in &block.instrs {
                let Ok(instr) = self.instr(*instr_id) else {
                    writeln!(f, "  <missing {instr_id}>")?;
                    continue;
                };
                write!(f, "  ")?;
                if instr.op.info().output {
                    write!(f, "{} = ", instr.id)?;
                }
                write!(f, "{}", instr.op)?;
                for (i, input) in instr.inputs.iter().enumerate() {
                    write!(f, "{}{input}", if i == 0 { " " } else { ", " })?;
                }
                writeln!(f)?;
            }
            if !block.successors.is_empty() {
                let succ: Vec<String> = block.successors.iter().map(|b| b.to_string()).collect();
                writeln!(f, "  -> {}", succ.join(", "))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::Builder;
    use crate::constant::Const;
    use crate::graph::Input;

    #[test]
    fn dump_lists_blocks_and_edges() {
        let mut b = Builder::new("answer");
        let v = b.literal(Const::Smi(42)).expect("literal");
        b.ret(Input::Value(v)).expect("ret");
        let text = b.finish().to_string();
        assert!(text.contains("fn answer(0 params)"));
        assert!(text.contains("i0 = literal smi 42"));
        assert!(text.contains("ret i0"));
    }
}
