//! kiln CLI - compile and run scripts with the kiln JIT.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use kiln_jit::{JitConfig, OptLevel, TraceStages};
use tracing_subscriber::filter::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "kiln",
    version,
    about = "Compile and run scripts with the kiln JIT",
    long_about = "kiln compiles scripts to native code with Cranelift.\n\n\
                  Run a script:  kiln run script.js\n\
                  Eval code:     kiln eval '1 + 2'\n\
                  Dump IR:       kiln --trace all eval 'log(1)'"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    jit: JitArgs,
}

/// Flags shared by every command
#[derive(Args)]
struct JitArgs {
    /// Dump IR stages at info level: cfg, opt, lowered, clif or all
    #[arg(long, global = true, value_name = "STAGES")]
    trace: Option<TraceStages>,

    /// Emit a debug trap at the entry of every generated function
    #[arg(long, global = true)]
    brk: bool,

    /// Cranelift optimisation level: none, speed or speed_and_size
    #[arg(long, global = true, default_value_t = OptLevel::default())]
    opt_level: OptLevel,

    /// Probes per inline cache before a site goes megamorphic
    #[arg(long, global = true, default_value_t = kiln_jit::DEFAULT_IC_PROBE_LIMIT)]
    ic_probe_limit: usize,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

impl JitArgs {
    fn config(&self) -> JitConfig {
        JitConfig {
            trace: self.trace.unwrap_or_default(),
            brk: self.brk,
            opt_level: self.opt_level,
            ic_probe_limit: self.ic_probe_limit,
            ..JitConfig::default()
        }
    }

    fn default_directive(&self) -> &'static str {
        if self.trace.is_some_and(|t| t.any()) {
            "kiln::trace=info"
        } else if self.verbose {
            "debug"
        } else {
            "warn"
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script file
    Run(commands::run::RunCommand),

    /// Evaluate source text and print the completion value
    Eval(commands::eval::EvalCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(cli.jit.default_directive().parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = cli.jit.config();
    match cli.command {
        Commands::Run(cmd) => cmd.run(config),
        Commands::Eval(cmd) => cmd.run(config),
    }
}
