//! CLI commands

pub mod eval;
pub mod run;

use anyhow::Result;
use kiln_jit::{JitConfig, Runtime};

/// Compile and run `source`, returning the display string of its result
pub(crate) fn execute(config: JitConfig, source: &str) -> Result<String> {
    let runtime = Runtime::new(config)?;
    let value = runtime.eval(source)?;
    Ok(runtime.display(value)?)
}
