//! Hardware watchpoints (data breakpoints).
//!
//! A watchpoint occupies one of the few hardware debug slots and traps on
//! reads and/or writes of a fixed-size memory location. Watchpoints on
//! stack-allocated locations are guarded by sentinel breaklets that detect
//! the watched frame going out of scope and runtime stack resizes.

use crate::debugger::Target;
use crate::debugger::address::RelocatedAddress;
use crate::debugger::breakpoint::{Breakpoint, BreakletKind};
use crate::debugger::cond::{self, CondExpr};
use crate::debugger::debugee::ValueKind;
use crate::debugger::error::Error;
use crate::debugger::logical::{LogicalId, NO_LOGICAL_ID};
use crate::debugger::step::PANIC_FUNCTION;
use crate::weak_error;
use log::debug;
use nix::unistd::Pid;

/// The runtime routine that moves a routine stack when it grows or shrinks.
pub(super) const STACK_RESIZE_FUNCTION: &str = "runtime.copystack";

/// Access type of a watchpoint. The low nibble carries the read/write bits,
/// the high nibble the watch size in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatchType(u8);

impl WatchType {
    pub const NONE: WatchType = WatchType(0);
    pub const READ: WatchType = WatchType(1);
    pub const WRITE: WatchType = WatchType(1 << 1);
    pub const READ_WRITE: WatchType = WatchType(1 | 1 << 1);

    /// The watchpoint triggers on memory reads.
    pub fn read(self) -> bool {
        self.0 & Self::READ.0 != 0
    }

    /// The watchpoint triggers on memory writes.
    pub fn write(self) -> bool {
        self.0 & Self::WRITE.0 != 0
    }

    /// Size of the watched location in bytes.
    pub fn size(self) -> usize {
        (self.0 >> 4) as usize
    }

    pub(super) fn with_size(self, size: u8) -> WatchType {
        WatchType((size << 4) | (self.0 & 0xf))
    }

    /// This is a watchpoint (and not a software breakpoint).
    pub fn watching(self) -> bool {
        self.0 != 0
    }
}

impl Target {
    /// Set a data breakpoint on the location `expr` evaluates to in the
    /// scope of the routine running on thread `tid`.
    pub fn set_watchpoint(
        &mut self,
        logical_id: LogicalId,
        tid: Pid,
        expr: &str,
        watch_type: WatchType,
        cond: Option<CondExpr>,
    ) -> Result<RelocatedAddress, Error> {
        if !watch_type.read() && !watch_type.write() {
            return Err(Error::WatchAccessRequired);
        }

        let watch_ast = cond::parse(expr)?;
        let mut expr = expr.to_string();
        let mut value = {
            let scope = match self.exploration.routine_scope(tid) {
                Ok(scope) => scope,
                Err(_) => self.exploration.thread_scope(tid)?,
            };
            scope.evaluate(&watch_ast)?
        };

        if value.addr == 0 || value.synthetic || value.type_name.is_none() {
            return Err(Error::WatchUnwatchable(expr));
        }
        if let Some(descr) = value.unreadable {
            return Err(Error::WatchUnreadable(expr, descr));
        }
        if matches!(value.kind, ValueKind::UnsafePointer | ValueKind::Invalid) {
            return Err(Error::WatchUnsupportedType(
                value.kind.type_descr().to_string(),
            ));
        }

        // interface values are watched through their data pointer
        if let ValueKind::Interface { data } = value.kind {
            let Some(data) = data else {
                return Err(Error::InvalidInterface(expr));
            };
            if let Some(descr) = &data.unreadable {
                return Err(Error::WatchUnreadable(expr, descr.clone()));
            }
            value = *data;
            expr.push_str(" (interface data)");
        }

        let size = value.size.unwrap_or_default();
        if size == 0 || size as usize > self.debug_info.ptr_size() {
            return Err(Error::WatchUnsupportedType(
                value.type_name.unwrap_or_default(),
            ));
        }

        let routine = self.exploration.current_routine(tid);
        let stack_watch = matches!(
            &routine,
            Some(routine) if !routine.system_stack
                && value.addr >= routine.stack_lo
                && value.addr < routine.stack_hi
        );
        if stack_watch && watch_type.read() {
            // the runtime reads stack bytes at will when it resizes stacks
            return Err(Error::WatchStackRead);
        }

        let addr = RelocatedAddress::from(value.addr);
        let brkpt = self.set_breakpoint_internal(
            logical_id,
            addr,
            BreakletKind::User,
            watch_type.with_size(size as u8),
            cond,
        )?;
        brkpt.watch_expr = Some(expr);

        if stack_watch {
            let routine = routine.expect("stack watch implies a routine");
            brkpt.watch_stack_off = addr.signed_distance_from(routine.stack_hi);
            self.set_stack_watch_breakpoints(tid, addr)?;
        }

        Ok(addr)
    }

    /// Install the sentinels guarding a stack watchpoint: an out-of-scope
    /// breakpoint at the return site of the owning frame (and on the panic
    /// entry when the runtime exposes it) plus a stack-resize breakpoint on
    /// the runtime stack mover.
    fn set_stack_watch_breakpoints(
        &mut self,
        tid: Pid,
        watchpoint: RelocatedAddress,
    ) -> Result<(), Error> {
        let frames = self.exploration.stacktrace(tid, 1)?;
        let ret_pc = frames
            .first()
            .and_then(|frame| frame.ret_addr)
            .ok_or(Error::UnknownScope)?;

        let brkpt = self.set_breakpoint_internal(
            NO_LOGICAL_ID,
            ret_pc,
            BreakletKind::WatchOutOfScope,
            WatchType::NONE,
            None,
        )?;
        brkpt
            .last_breaklet_mut()
            .expect("breaklet was just appended")
            .watchpoint = Some(watchpoint);

        if let Some(panic_fn) = self.debug_info.find_functions(PANIC_FUNCTION).first() {
            let entry = panic_fn.entry;
            let brkpt = self.set_breakpoint_internal(
                NO_LOGICAL_ID,
                entry,
                BreakletKind::WatchOutOfScope,
                WatchType::NONE,
                None,
            )?;
            let breaklet = brkpt
                .last_breaklet_mut()
                .expect("breaklet was just appended");
            breaklet.watchpoint = Some(watchpoint);
            breaklet.check_panic_call = true;
        } else {
            debug!(target: "debugger", "panic entry not found, watchpoint {watchpoint} has no panic-path sentinel");
        }

        let resize_fn = self
            .debug_info
            .find_functions(STACK_RESIZE_FUNCTION)
            .into_iter()
            .next()
            .ok_or_else(|| Error::FunctionNotFound(STACK_RESIZE_FUNCTION.to_string()))?;
        let brkpt = self.set_breakpoint_internal(
            NO_LOGICAL_ID,
            resize_fn.entry,
            BreakletKind::StackResize,
            WatchType::NONE,
            None,
        )?;
        brkpt
            .last_breaklet_mut()
            .expect("breaklet was just appended")
            .watchpoint = Some(watchpoint);

        Ok(())
    }

    /// Remove every sentinel breaklet guarding `watchpoint`.
    pub(super) fn clear_stack_watch_breakpoints(
        &mut self,
        watchpoint: RelocatedAddress,
    ) -> Result<(), Error> {
        let addrs: Vec<RelocatedAddress> = self.breakpoints.physical.keys().copied().collect();
        for addr in addrs {
            let brkpt = self
                .breakpoints
                .physical
                .get_mut(&addr)
                .expect("infallible");
            for slot in brkpt.breaklets.iter_mut() {
                if matches!(slot, Some(breaklet) if breaklet.watchpoint == Some(watchpoint)) {
                    *slot = None;
                }
            }
            self.finish_clear(addr)?;
        }
        Ok(())
    }

    /// Watchpoints guarded by sentinel breaklets of `kind` at `addr`.
    pub fn guarded_watchpoints_at(
        &self,
        addr: RelocatedAddress,
        kind: BreakletKind,
    ) -> Vec<RelocatedAddress> {
        let Some(brkpt) = self.breakpoints.physical.get(&addr) else {
            return vec![];
        };
        brkpt
            .breaklets()
            .filter(|breaklet| breaklet.kind == kind)
            .filter_map(|breaklet| breaklet.watchpoint)
            .collect()
    }

    /// Retire a stack watchpoint whose frame went out of scope: remove the
    /// watchpoint, its sentinels and record it for the frontend.
    pub fn expire_watchpoint(&mut self, watchpoint: RelocatedAddress) {
        debug!(target: "debugger", "watchpoint at {watchpoint} went out of scope");
        if let Some(brkpt) =
            weak_error!(self.remove_user_breaklet(watchpoint), "expire watchpoint:").flatten()
        {
            self.breakpoints.watch_out_of_scope.push(brkpt);
        }
    }

    /// Move a stack watchpoint after the runtime relocated the routine
    /// stack. The new watch address keeps the recorded offset from the new
    /// stack top.
    pub fn adjust_stack_watchpoint(
        &mut self,
        watchpoint: RelocatedAddress,
        new_stack_top: usize,
    ) -> Result<RelocatedAddress, Error> {
        let Some(mut brkpt) = self.breakpoints.physical.shift_remove(&watchpoint) else {
            return Err(Error::NoBreakpoint(watchpoint));
        };
        if let Err(e) = self.proc.erase_breakpoint(&brkpt) {
            self.breakpoints.physical.insert(watchpoint, brkpt);
            return Err(e);
        }

        let new_addr =
            RelocatedAddress::from((new_stack_top as i64 + brkpt.watch_stack_off) as usize);
        brkpt.addr = new_addr;
        if let Err(e) = self.proc.write_breakpoint(&mut brkpt) {
            brkpt.addr = watchpoint;
            self.breakpoints.physical.insert(watchpoint, brkpt);
            return Err(e);
        }
        self.breakpoints.physical.insert(new_addr, brkpt);

        // re-point sentinels and stop bookkeeping at the new address
        for brkpt in self.breakpoints.physical.values_mut() {
            for breaklet in brkpt.breaklets.iter_mut().flatten() {
                if breaklet.watchpoint == Some(watchpoint) {
                    breaklet.watchpoint = Some(new_addr);
                }
            }
        }
        for stop in self.breakpoints.last_stop.values_mut() {
            if *stop == watchpoint {
                *stop = new_addr;
            }
        }

        Ok(new_addr)
    }

    /// Watchpoints that went out of scope since the last call.
    pub fn drain_watch_out_of_scope(&mut self) -> Vec<Breakpoint> {
        std::mem::take(&mut self.breakpoints.watch_out_of_scope)
    }
}
