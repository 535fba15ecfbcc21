//! Eval command - evaluate source text.

use anyhow::Result;
use clap::Args;
use kiln_jit::JitConfig;

#[derive(Args)]
pub struct EvalCommand {
    /// Source text
    pub source: String,
}

impl EvalCommand {
    pub fn run(&self, config: JitConfig) -> Result<()> {
        let result = super::execute(config, &self.source)?;
        println!("{result}");
        Ok(())
    }
}
