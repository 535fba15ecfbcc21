//! Run command - execute a script file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use kiln_jit::JitConfig;

#[derive(Args)]
pub struct RunCommand {
    /// File to execute
    pub entry: PathBuf,

    /// Print the script's completion value
    #[arg(short, long)]
    pub print: bool,
}

impl RunCommand {
    pub fn run(&self, config: JitConfig) -> Result<()> {
        let source = std::fs::read_to_string(&self.entry)
            .with_context(|| format!("failed to read {}", self.entry.display()))?;
        tracing::debug!(entry = %self.entry.display(), bytes = source.len(), "running script");
        let result = super::execute(config, &source)
            .with_context(|| format!("{} failed", self.entry.display()))?;
        if self.print {
            println!("{result}");
        }
        Ok(())
    }
}
