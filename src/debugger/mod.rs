//! Breakpoint engine of the debugger.
//!
//! The engine tracks two kinds of objects: logical breakpoints (what the
//! user asked for, keyed by a stable id) and physical breakpoints (what is
//! actually patched into the debugee, keyed by instruction address). Several
//! independent subscribers ("breaklets") may share one physical breakpoint:
//! at most one user breaklet plus any number of internal ones set by
//! stepping algorithms and watchpoint sentinels.
//!
//! The engine runs single-threaded with respect to the target: every entry
//! point expects that a coordinator already halted the debugee and selected
//! a stopped thread. Nothing here suspends, all target I/O goes
//! synchronously through the process facade.

pub mod address;
pub mod breakpoint;
pub mod cond;
pub mod debugee;
pub mod error;
pub mod logical;
pub mod ret;
mod step;
pub mod watchpoint;

use crate::debugger::address::RelocatedAddress;
use crate::debugger::breakpoint::{Breakpoint, BreakpointRegistry};
use crate::debugger::debugee::{DebugInfo, Exploration, ProcessDriver};
use crate::debugger::error::Error;
use crate::debugger::logical::{LogicalBreakpoint, LogicalId};
use nix::unistd::Pid;

/// Tunables of the breakpoint engine.
#[derive(Debug, Clone)]
pub struct TargetConfig {
    /// Hardware debug slots available for watchpoints.
    pub hw_debug_slots: u8,
}

impl Default for TargetConfig {
    fn default() -> Self {
        TargetConfig { hw_debug_slots: 4 }
    }
}

/// Breakpoint-engine view of the debugged process.
///
/// Owns the breakpoint registry and the three collaborators the engine is
/// allowed to talk to: the low-level process facade, the debug-info reader
/// and the expression/scope provider.
pub struct Target {
    proc: Box<dyn ProcessDriver>,
    debug_info: Box<dyn DebugInfo>,
    exploration: Box<dyn Exploration>,
    cfg: TargetConfig,
    breakpoints: BreakpointRegistry,
}

impl Target {
    pub fn new(
        proc: Box<dyn ProcessDriver>,
        debug_info: Box<dyn DebugInfo>,
        exploration: Box<dyn Exploration>,
    ) -> Self {
        Self::with_config(proc, debug_info, exploration, TargetConfig::default())
    }

    pub fn with_config(
        proc: Box<dyn ProcessDriver>,
        debug_info: Box<dyn DebugInfo>,
        exploration: Box<dyn Exploration>,
        cfg: TargetConfig,
    ) -> Self {
        Self {
            proc,
            debug_info,
            exploration,
            cfg,
            breakpoints: BreakpointRegistry::default(),
        }
    }

    /// The process-wide breakpoint table.
    pub fn breakpoints(&self) -> &BreakpointRegistry {
        &self.breakpoints
    }

    pub fn breakpoint_at(&self, addr: RelocatedAddress) -> Option<&Breakpoint> {
        self.breakpoints.get(addr)
    }

    pub fn logical_breakpoint(&self, id: LogicalId) -> Option<&LogicalBreakpoint> {
        self.breakpoints.logical(id)
    }

    /// Mutable access to a logical breakpoint, for frontends amending
    /// tracepoint metadata.
    pub fn logical_breakpoint_mut(&mut self, id: LogicalId) -> Option<&mut LogicalBreakpoint> {
        self.breakpoints.logical.get_mut(&id)
    }

    /// At least one stepping breakpoint is currently set.
    pub fn has_stepping_breakpoints(&self) -> bool {
        self.breakpoints.has_stepping_breakpoints()
    }

    /// At least one hardware breakpoint is currently set.
    pub fn has_hw_breakpoints(&self) -> bool {
        self.breakpoints.has_hw_breakpoints()
    }

    /// Physical breakpoint the thread stopped at last, cleared when that
    /// breakpoint is removed.
    pub fn thread_stop_at(&self, tid: Pid) -> Option<RelocatedAddress> {
        self.breakpoints.thread_stop_at(tid)
    }

    /// Attach a uprobe-based tracepoint to every function matching
    /// `fn_name`. Only the argument map assembly lives here, the probes
    /// themselves are owned by the process facade.
    pub fn set_ebpf_tracepoint(&mut self, fn_name: &str) -> Result<(), Error> {
        // not every supported OS/arch combination has eBPF, check early
        if !self.proc.supports_bpf() {
            return Err(Error::BpfUnsupported);
        }
        let functions = self.debug_info.find_functions(fn_name);
        if functions.is_empty() {
            return Err(Error::FunctionNotFound(fn_name.to_string()));
        }

        let routine_id_offset = self.debug_info.routine_id_offset()?;
        let ptr_size = self.debug_info.ptr_size() as i64;

        for function in functions {
            let entry_line = self.debug_info.entry_line_for_function(&function);
            let mut args = self.debug_info.function_arguments(&function, entry_line)?;
            for arg in args.iter_mut() {
                // locations are recorded relative to the frame base, probes
                // address them relative to the entry stack pointer
                arg.offset += ptr_size;
            }
            self.proc.set_uprobe(&function, routine_id_offset, args)?;
        }
        Ok(())
    }
}
