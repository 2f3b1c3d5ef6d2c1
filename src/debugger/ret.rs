//! Return-value capture.
//!
//! When a "next" breakpoint lands on a function return point, a capture
//! descriptor may be attached to the physical breakpoint. On hit the
//! descriptor rebuilds the entry-time frame of the returning function from
//! the routine stack top and the frame/stack-pointer offsets recorded at the
//! call site, then collects the locals flagged as return arguments.
//!
//! Inlined functions are not supported: their entry frame can not be
//! reconstructed this way.

use crate::debugger::Target;
use crate::debugger::address::RelocatedAddress;
use crate::debugger::cond::CondExpr;
use crate::debugger::debugee::{Exploration, FunctionMeta, StackFrame, Value, ValueKind, Variable};
use crate::debugger::error::Error;
use nix::unistd::Pid;
use std::fmt::Display;

/// Name of the synthetic variable reported when return values can not be
/// read.
pub const RETURN_VALUE_READ_ERROR: &str = "return value read error";

/// How to collect return values when a breakpoint is hit as a return
/// breakpoint.
#[derive(Debug)]
pub struct ReturnBreakpointInfo {
    /// Condition distinguishing the return-breakpoint hit from an ordinary
    /// stop at the same address.
    ret_frame_cond: CondExpr,
    function: FunctionMeta,
    /// Offset of the frame base from the routine stack top at the call site.
    frame_offset: i64,
    /// Value the stack pointer had at the entry point of the function.
    sp_offset: i64,
}

impl Target {
    /// Attach a return-value capture descriptor to the breakpoint at `addr`.
    /// `topframe` is the frame of the function whose return values are
    /// wanted. A frame without a known function is silently skipped.
    pub fn configure_return_breakpoint(
        &mut self,
        addr: RelocatedAddress,
        topframe: &StackFrame,
        ret_frame_cond: CondExpr,
    ) -> Result<(), Error> {
        let Some(function) = topframe.function.clone() else {
            return Ok(());
        };
        let brkpt = self
            .breakpoints
            .physical
            .get_mut(&addr)
            .ok_or(Error::NoBreakpoint(addr))?;
        brkpt.return_info = Some(ReturnBreakpointInfo {
            ret_frame_cond,
            function,
            frame_offset: topframe.frame_offset,
            sp_offset: topframe.frame_offset - self.debug_info.ptr_size() as i64,
        });
        Ok(())
    }

    /// Collect the return values captured by the breakpoint at `addr`, empty
    /// when the breakpoint has no capture descriptor or was not hit as a
    /// return breakpoint.
    pub fn collect_return_values(&self, tid: Pid, addr: RelocatedAddress) -> Vec<Variable> {
        let Some(return_info) = self
            .breakpoints
            .physical
            .get(&addr)
            .and_then(|brkpt| brkpt.return_info.as_ref())
        else {
            return vec![];
        };
        return_info.collect(self.exploration.as_ref(), tid)
    }
}

impl ReturnBreakpointInfo {
    pub(super) fn collect(&self, exploration: &dyn Exploration, tid: Pid) -> Vec<Variable> {
        let Some(routine) = exploration.current_routine(tid) else {
            return read_error("could not get routine", "no routine on thread");
        };
        let scope = match exploration.routine_scope(tid) {
            Ok(scope) => scope,
            Err(e) => return read_error("could not get scope", e),
        };

        // the return condition was already evaluated as part of the normal
        // condition check, its errors were reported there
        let Ok(value) = scope.evaluate(&self.ret_frame_cond) else {
            return vec![];
        };
        if value.unreadable.is_some() {
            return vec![];
        }
        let ValueKind::Bool(hit_as_return) = value.kind else {
            return vec![];
        };
        if !hit_as_return {
            return vec![];
        }

        let frame_base = (self.frame_offset + routine.stack_hi as i64) as usize;
        let sp = (self.sp_offset + routine.stack_hi as i64) as usize;
        let entry_scope = match exploration.entry_scope(tid, &self.function, frame_base, sp) {
            Ok(scope) => scope,
            Err(e) => return read_error("could not read function entry", e),
        };
        let locals = match entry_scope.locals() {
            Ok(locals) => locals,
            Err(e) => return read_error("could not evaluate return variables", e),
        };

        locals
            .into_iter()
            .filter(|variable| variable.return_argument)
            .collect()
    }
}

fn read_error(descr: &str, err: impl Display) -> Vec<Variable> {
    vec![Variable {
        name: RETURN_VALUE_READ_ERROR.to_string(),
        value: Value::string_val(format!("{descr}: {err}")),
        return_argument: false,
    }]
}
