//! Lifecycle of stepping breakpoints.
//!
//! Step/next/return operations never patch bytes themselves, they install
//! internal breaklets through this module and remove them in bulk with
//! [`Target::clear_stepping_breakpoints`] once a step resolves.

use crate::debugger::Target;
use crate::debugger::address::RelocatedAddress;
use crate::debugger::breakpoint::{BreakletCallback, BreakletKind};
use crate::debugger::cond::CondExpr;
use crate::debugger::debugee::StackFrame;
use crate::debugger::error::Error;
use crate::debugger::logical::NO_LOGICAL_ID;
use crate::debugger::watchpoint::WatchType;

/// Entry point of the runtime panic machinery.
pub(super) const PANIC_FUNCTION: &str = "runtime.gopanic";

/// The runtime trampoline that invokes deferred calls.
pub(super) const DEFER_RETURN_FUNCTION: &str = "runtime.deferreturn";

impl Target {
    /// Set a breakpoint resolved by the next "next" stop.
    pub fn set_next_breakpoint(
        &mut self,
        addr: RelocatedAddress,
        cond: Option<CondExpr>,
    ) -> Result<RelocatedAddress, Error> {
        self.set_breakpoint(NO_LOGICAL_ID, addr, BreakletKind::Next, cond)
    }

    /// Set a breakpoint on the entry of a deferred function. `defer_returns`
    /// holds the addresses of deferred-call trampoline call sites in the
    /// function that scheduled the defer: the breakpoint fires only on a
    /// panic chain or when the return address matches one of them, a direct
    /// call of the deferred function does not activate it.
    pub fn set_next_defer_breakpoint(
        &mut self,
        addr: RelocatedAddress,
        defer_returns: Vec<RelocatedAddress>,
        cond: Option<CondExpr>,
    ) -> Result<RelocatedAddress, Error> {
        let brkpt = self.set_breakpoint_internal(
            NO_LOGICAL_ID,
            addr,
            BreakletKind::NextDefer,
            WatchType::NONE,
            cond,
        )?;
        brkpt
            .last_breaklet_mut()
            .expect("breaklet was just appended")
            .defer_returns = defer_returns;
        Ok(brkpt.addr)
    }

    /// Set a breakpoint on a CALL target. When it fires the stepper converts
    /// it into a [`BreakletKind::Next`] at the callee and removes this one.
    pub fn set_step_breakpoint(
        &mut self,
        addr: RelocatedAddress,
        cond: Option<CondExpr>,
    ) -> Result<RelocatedAddress, Error> {
        self.set_breakpoint(NO_LOGICAL_ID, addr, BreakletKind::Step, cond)
    }

    /// Set a breakpoint on the routine creation path. `callback` decides
    /// whether the stepper attaches to the newly created routine.
    pub fn set_step_into_new_task_breakpoint(
        &mut self,
        addr: RelocatedAddress,
        callback: BreakletCallback,
    ) -> Result<RelocatedAddress, Error> {
        let brkpt = self.set_breakpoint_internal(
            NO_LOGICAL_ID,
            addr,
            BreakletKind::StepIntoNewTask,
            WatchType::NONE,
            None,
        )?;
        brkpt
            .last_breaklet_mut()
            .expect("breaklet was just appended")
            .callback = Some(callback);
        Ok(brkpt.addr)
    }

    /// Set a breakpoint guarding the body of a range-over-function-body
    /// statement during a step.
    pub fn set_step_into_range_over_func_body_breakpoint(
        &mut self,
        addr: RelocatedAddress,
        cond: Option<CondExpr>,
    ) -> Result<RelocatedAddress, Error> {
        self.set_breakpoint(
            NO_LOGICAL_ID,
            addr,
            BreakletKind::StepIntoRangeOverFuncBody,
            cond,
        )
    }

    /// Set a breakpoint on the dynamic-module loading path. When it fires
    /// the coordinator re-resolves logical breakpoints deferred until their
    /// module appears.
    pub fn set_plugin_open_breakpoint(
        &mut self,
        addr: RelocatedAddress,
    ) -> Result<RelocatedAddress, Error> {
        self.set_breakpoint(NO_LOGICAL_ID, addr, BreakletKind::PluginOpen, None)
    }

    /// Put every next breakpoint aside without releasing its address: the
    /// breaklets stop activating but survive until the stepping clear.
    pub fn inactivate_next_breakpoints(&mut self) {
        for brkpt in self.breakpoints.physical.values_mut() {
            for breaklet in brkpt.breaklets.iter_mut().flatten() {
                if breaklet.kind == BreakletKind::Next {
                    breaklet.kind = BreakletKind::NextInactivated;
                }
            }
        }
    }
}

/// The stop happened inside a panic call chain.
///
/// Two call stack layouts exist: the deferred call may be invoked through a
/// call wrapper (`deferred fn` / `wrapper` / panic entry) or directly
/// (`deferred fn` / panic entry).
pub(super) fn is_panic_call(frames: &[StackFrame]) -> bool {
    fn fn_name(frame: &StackFrame) -> Option<&str> {
        frame
            .function
            .as_ref()
            .map(|function| function.name.as_str())
    }
    if frames.len() >= 3 && fn_name(&frames[2]) == Some(PANIC_FUNCTION) {
        return true;
    }
    if frames.len() >= 2 && fn_name(&frames[1]) == Some(PANIC_FUNCTION) {
        return true;
    }
    false
}

/// The stop happened inside the deferred-call trampoline: either the parent
/// frame is the trampoline itself, or the current frame returns to one of
/// the pre-computed trampoline call sites.
pub(super) fn is_defer_return_call(
    frames: &[StackFrame],
    defer_returns: &[RelocatedAddress],
) -> bool {
    if frames.len() >= 2
        && !defer_returns.is_empty()
        && frames[1]
            .function
            .as_ref()
            .is_some_and(|function| function.name == DEFER_RETURN_FUNCTION)
    {
        return true;
    }
    if let Some(frame) = frames.first()
        && let Some(ret) = frame.ret_addr
    {
        return defer_returns.contains(&ret);
    }
    false
}
