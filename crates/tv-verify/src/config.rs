//! Checker-wide configuration: which input modes the selective
//! instantiation loop is allowed to consider, how far it's allowed to
//! expand, and how memory pressure is approximated.

use std::time::Duration;

/// Verification configuration, named-preset style like a deployment
/// profile: pick a starting point, override fields as needed.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// Never instantiate an input's type variable to the "undef" mode.
    pub disable_undef_input: bool,
    /// Never instantiate an input's type variable to the "poison" mode.
    pub disable_poison_input: bool,
    /// Upper bound on how many instantiated subproblems `preprocess`
    /// will build before giving up and falling back to a plain
    /// quantified query.
    pub max_instantiations: usize,
    /// Whether to check refinement at every named instruction in
    /// addition to the function's return value.
    pub check_each_var: bool,
    pub solver_timeout: Duration,
}

impl VerifyConfig {
    /// Exhaustive: both undef and poison input modes explored, the full
    /// 128-instance cap, per-instruction refinement checking on.
    pub fn exhaustive() -> Self {
        Self {
            disable_undef_input: false,
            disable_poison_input: false,
            max_instantiations: 128,
            check_each_var: true,
            solver_timeout: Duration::from_secs(60),
        }
    }

    /// Fast iteration: undef/poison input modes still explored, but only
    /// the function's overall return value is checked, not every
    /// intermediate value.
    pub fn quick() -> Self {
        Self {
            disable_undef_input: false,
            disable_poison_input: false,
            max_instantiations: 128,
            check_each_var: false,
            solver_timeout: Duration::from_secs(10),
        }
    }

    /// Restricted: undef and poison input modes are both disabled,
    /// useful when a caller already knows its inputs are always fully
    /// defined and wants a tighter, cheaper query.
    pub fn defined_inputs_only() -> Self {
        Self {
            disable_undef_input: true,
            disable_poison_input: true,
            max_instantiations: 128,
            check_each_var: false,
            solver_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self::exhaustive()
    }
}

/// A coarse memory-pressure probe the selective-instantiation loop
/// checks between rounds, so it can bail out to a plain quantified query
/// before an enumeration blows up. Backed by `/proc/self/status` on
/// Linux; always reports "no pressure" elsewhere, matching this
/// checker's single-process, best-effort use of the signal.
pub fn hit_half_memory_limit(limit_kb: u64) -> bool {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if let Some(rest) = line.strip_prefix("VmRSS:") {
                    if let Some(kb) = rest.trim().split_whitespace().next() {
                        if let Ok(kb) = kb.parse::<u64>() {
                            return kb >= limit_kb / 2;
                        }
                    }
                }
            }
        }
        false
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = limit_kb;
        false
    }
}
