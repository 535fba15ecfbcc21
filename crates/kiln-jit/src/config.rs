//! JIT configuration

use std::fmt;
use std::str::FromStr;

use kiln_heap::HeapConfig;

/// Default number of probes an inline cache may hold
pub const DEFAULT_IC_PROBE_LIMIT: usize = 4;

/// Cranelift optimisation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptLevel {
    /// No optimisation
    None,
    /// Optimise for speed
    #[default]
    Speed,
    /// Optimise for speed and size
    SpeedAndSize,
}

impl OptLevel {
    /// Value of Cranelift's `opt_level` setting
    pub const fn as_str(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "0" => Ok(OptLevel::None),
            "speed" | "1" => Ok(OptLevel::Speed),
            "speed_and_size" | "2" => Ok(OptLevel::SpeedAndSize),
            other => Err(format!("unknown opt level '{other}'")),
        }
    }
}

/// Compilation stages whose IR is dumped at `info` level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TraceStages {
    /// Graph as built by the front end
    pub cfg: bool,
    /// Graph after platform-independent optimisation
    pub opt: bool,
    /// Graph after platform lowering
    pub lowered: bool,
    /// Cranelift IR handed to the backend
    pub clif: bool,
}

impl TraceStages {
    /// Dump every stage
    pub const ALL: Self = Self {
        cfg: true,
        opt: true,
        lowered: true,
        clif: true,
    };

    /// Whether any stage is dumped
    pub fn any(&self) -> bool {
        self.cfg || self.opt || self.lowered || self.clif
    }
}

impl FromStr for TraceStages {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut stages = TraceStages::default();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part {
                "all" => stages = TraceStages::ALL,
                "cfg" => stages.cfg = true,
                "opt" => stages.opt = true,
                "lowered" => stages.lowered = true,
                "clif" => stages.clif = true,
                other => return Err(format!("unknown trace stage '{other}'")),
            }
        }
        Ok(stages)
    }
}

/// JIT configuration
#[derive(Debug, Clone)]
pub struct JitConfig {
    /// Heap page sizes
    pub heap: HeapConfig,
    /// IR dumps
    pub trace: TraceStages,
    /// Emit a debug trap at the entry of every generated function
    pub brk: bool,
    /// Probes per inline cache before the site stays on the miss path (default: 4)
    pub ic_probe_limit: usize,
    /// Cranelift optimisation level
    pub opt_level: OptLevel,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            heap: HeapConfig::default(),
            trace: TraceStages::default(),
            brk: false,
            ic_probe_limit: DEFAULT_IC_PROBE_LIMIT,
            opt_level: OptLevel::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_stages_parse() {
        let stages: TraceStages = "cfg,lowered".parse().expect("parse should succeed");
        assert!(stages.cfg && stages.lowered);
        assert!(!stages.opt && !stages.clif);

        let all: TraceStages = "all".parse().expect("parse should succeed");
        assert_eq!(all, TraceStages::ALL);

        assert!("cfg,bogus".parse::<TraceStages>().is_err());
        assert!(!TraceStages::default().any());
    }

    #[test]
    fn opt_level_parse() {
        assert_eq!("none".parse::<OptLevel>(), Ok(OptLevel::None));
        assert_eq!("2".parse::<OptLevel>(), Ok(OptLevel::SpeedAndSize));
        assert!("fast".parse::<OptLevel>().is_err());
        assert_eq!(JitConfig::default().ic_probe_limit, DEFAULT_IC_PROBE_LIMIT);
    }
}
