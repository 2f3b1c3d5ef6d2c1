//! Physical breakpoints and their breaklets.
//!
//! A physical breakpoint is the unit the CPU traps on: one record per
//! instrumented instruction address. Several independent subscribers
//! (breaklets) may share one physical breakpoint: at most one user breaklet
//! and any number of internal ones (stepping breakpoints, watch sentinels).

use crate::debugger::address::RelocatedAddress;
use crate::debugger::cond::{self, CondExpr};
use crate::debugger::debugee::Exploration;
use crate::debugger::error::Error;
use crate::debugger::logical::{self, LogicalBreakpoint, LogicalId, MULTIPLE_LOCATIONS, NO_LOGICAL_ID};
use crate::debugger::ret::ReturnBreakpointInfo;
use crate::debugger::step;
use crate::debugger::watchpoint::WatchType;
use crate::debugger::Target;
use crate::muted_error;
use indexmap::IndexMap;
use itertools::Itertools;
use nix::unistd::Pid;
use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::path::PathBuf;

/// Behavior of a breaklet when its address is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum BreakletKind {
    /// Set by a user request.
    User,
    /// Set by "next"; resolving the stop removes it.
    Next,
    /// Set by "next" on the entry of a deferred function. Fires only when
    /// the function was invoked by the panic machinery or through the
    /// runtime's deferred-call trampoline, not when it is called directly.
    NextDefer,
    /// Set by "step" on a CALL target; on hit the stepper replaces it with a
    /// [`BreakletKind::Next`] at the callee.
    Step,
    /// Detects a watched stack location going out of scope.
    WatchOutOfScope,
    /// Detects runtime stack resizes to relocate stack watchpoints.
    StackResize,
    /// Detects a dynamically loaded module appearing, so deferred logical
    /// breakpoints can be resolved.
    PluginOpen,
    /// Fires on new routine creation, letting the stepper attach to it.
    StepIntoNewTask,
    /// A [`BreakletKind::Next`] put aside, swept at the next stepping clear.
    NextInactivated,
    /// Guards the body of a range-over-function-body statement during steps.
    StepIntoRangeOverFuncBody,
}

impl BreakletKind {
    pub(super) const fn bit(self) -> u16 {
        1 << self as u16
    }

    /// The kind belongs to the stepping mask swept by bulk clears.
    pub fn is_stepping(self) -> bool {
        self.bit() & STEPPING_MASK != 0
    }
}

/// Breaklet kinds considered stepping-internal by bulk clear operations.
pub(super) const STEPPING_MASK: u16 = BreakletKind::Next.bit()
    | BreakletKind::NextDefer.bit()
    | BreakletKind::Step.bit()
    | BreakletKind::StepIntoNewTask.bit()
    | BreakletKind::NextInactivated.bit()
    | BreakletKind::StepIntoRangeOverFuncBody.bit();

/// Post-predicate hook of a breaklet: runs after all other activation checks
/// pass, its return value is the final breaklet activation. May observe the
/// stopped target but never mutates breakpoint state.
pub type BreakletCallback = Box<dyn Fn(Pid, &dyn Exploration) -> anyhow::Result<bool>>;

/// A single subscriber on a physical breakpoint.
pub struct Breaklet {
    pub kind: BreakletKind,
    /// Id of the owning logical breakpoint, [`NO_LOGICAL_ID`] for internal
    /// breaklets.
    pub logical_id: LogicalId,
    /// Activation condition, evaluated against the stopped routine scope.
    pub cond: Option<CondExpr>,
    /// Addresses of deferred-call trampoline call sites in the function that
    /// scheduled the deferred call ([`BreakletKind::NextDefer`] only).
    pub defer_returns: Vec<RelocatedAddress>,
    /// Require a panic call chain ([`BreakletKind::WatchOutOfScope`] only).
    pub(super) check_panic_call: bool,
    pub(super) callback: Option<BreakletCallback>,
    /// Weak link to the watchpoint guarded by this sentinel.
    pub(super) watchpoint: Option<RelocatedAddress>,
}

impl Breaklet {
    pub(super) fn new(kind: BreakletKind, logical_id: LogicalId, cond: Option<CondExpr>) -> Self {
        Breaklet {
            kind,
            logical_id: if kind == BreakletKind::User {
                logical_id
            } else {
                NO_LOGICAL_ID
            },
            cond,
            defer_returns: vec![],
            check_panic_call: false,
            callback: None,
            watchpoint: None,
        }
    }

    /// Watchpoint guarded by this sentinel breaklet, if any.
    pub fn guarded_watchpoint(&self) -> Option<RelocatedAddress> {
        self.watchpoint
    }
}

impl Debug for Breaklet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Breaklet")
            .field("kind", &self.kind)
            .field("logical_id", &self.logical_id)
            .field("cond", &self.cond)
            .field("defer_returns", &self.defer_returns)
            .field("check_panic_call", &self.check_panic_call)
            .field("callback", &self.callback.as_ref().map(|_| "fn"))
            .field("watchpoint", &self.watchpoint)
            .finish()
    }
}

/// A physical breakpoint: one per trapped instruction address.
#[derive(Debug, Default)]
pub struct Breakpoint {
    /// Function, file and line, cached for display.
    pub function_name: Option<String>,
    pub file: PathBuf,
    pub line: u64,

    pub addr: RelocatedAddress,
    /// Bytes displaced by the trap instruction, present for software
    /// breakpoints until they are restored.
    pub original_data: Option<Vec<u8>>,

    pub watch_expr: Option<String>,
    pub watch_type: WatchType,
    /// Hardware debug slot, unique across live watchpoints.
    pub hw_index: u8,
    /// Offset of a watched stack location from the routine stack top,
    /// non-zero only for stack watchpoints.
    pub(super) watch_stack_off: i64,

    pub(super) breaklets: Vec<Option<Breaklet>>,

    /// Weak link to the owning logical breakpoint.
    pub logical: Option<LogicalId>,

    pub(super) return_info: Option<ReturnBreakpointInfo>,

    /// Root function of a call-following trace.
    pub root_func_name: Option<String>,
    /// Depth of a call-following trace.
    pub trace_follow_calls: Option<u32>,
}

impl Breakpoint {
    pub fn breaklets(&self) -> impl Iterator<Item = &Breaklet> {
        self.breaklets.iter().flatten()
    }

    pub(super) fn breaklet_at(&self, idx: usize) -> Option<&Breaklet> {
        self.breaklets.get(idx).and_then(|slot| slot.as_ref())
    }

    pub(super) fn push_breaklet(&mut self, breaklet: Breaklet) {
        self.breaklets.push(Some(breaklet));
    }

    pub(super) fn last_breaklet_mut(&mut self) -> Option<&mut Breaklet> {
        self.breaklets.last_mut().and_then(|slot| slot.as_mut())
    }

    /// Drop nulled breaklet slots.
    pub(super) fn compact_breaklets(&mut self) {
        self.breaklets.retain(|slot| slot.is_some());
    }

    /// Id of the owning logical breakpoint, [`NO_LOGICAL_ID`] when there is
    /// no user breaklet.
    pub fn logical_id(&self) -> LogicalId {
        self.user_breaklet()
            .map(|breaklet| breaklet.logical_id)
            .unwrap_or(NO_LOGICAL_ID)
    }

    /// A user breakpoint is set at this address. User breakpoints can
    /// overlap with stepping breakpoints, in that case both `is_user` and
    /// `is_stepping` are true.
    pub fn is_user(&self) -> bool {
        self.user_breaklet().is_some()
    }

    /// A stepping breakpoint is set at this address.
    pub fn is_stepping(&self) -> bool {
        self.breaklets().any(|breaklet| breaklet.kind.is_stepping())
    }

    pub fn user_breaklet(&self) -> Option<&Breaklet> {
        self.breaklets()
            .find(|breaklet| breaklet.kind == BreakletKind::User)
    }

    pub(super) fn user_breaklet_mut(&mut self) -> Option<&mut Breaklet> {
        self.breaklets
            .iter_mut()
            .flatten()
            .find(|breaklet| breaklet.kind == BreakletKind::User)
    }

    /// A breaklet of `kind` may join the already existing breaklets. At most
    /// one user breaklet is allowed, internal breaklets overlap freely.
    pub(super) fn can_overlap(&self, kind: BreakletKind) -> bool {
        if kind == BreakletKind::User {
            return !self.is_user();
        }
        true
    }

    /// Parts of the breakpoint that are not otherwise user visible, for
    /// troubleshooting.
    pub fn verbose_descr(&self, logical: Option<&LogicalBreakpoint>) -> Vec<String> {
        let mut r = vec![format!("OriginalData={:02x?}", self.original_data)];
        if self.watch_type.watching() {
            r.push(format!(
                "HWBreakIndex={:#x} watchStackOff={:#x}",
                self.hw_index, self.watch_stack_off
            ));
        }

        let cond_of = |breaklet: &Breaklet| {
            breaklet
                .cond
                .as_ref()
                .map(|cond| cond.to_string())
                .unwrap_or_default()
        };
        for breaklet in self.breaklets() {
            let descr = match breaklet.kind {
                BreakletKind::User => format!(
                    "User Cond={:?} HitCond={:?}",
                    cond_of(breaklet),
                    logical.map(|lbp| lbp.hit_cond_string()).unwrap_or_default()
                ),
                BreakletKind::Next => format!("Next Cond={:?}", cond_of(breaklet)),
                BreakletKind::NextDefer => format!(
                    "NextDefer Cond={:?} DeferReturns=[{}]",
                    cond_of(breaklet),
                    breaklet.defer_returns.iter().map(ToString::to_string).join(", ")
                ),
                BreakletKind::Step => format!("Step Cond={:?}", cond_of(breaklet)),
                BreakletKind::WatchOutOfScope => format!(
                    "WatchOutOfScope Cond={:?} checkPanicCall={}",
                    cond_of(breaklet),
                    breaklet.check_panic_call
                ),
                BreakletKind::StackResize => {
                    format!("StackResize Cond={:?}", cond_of(breaklet))
                }
                kind => kind.to_string(),
            };
            r.push(descr);
        }
        r
    }
}

impl Display for Breakpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "Breakpoint {} at {} {}:{}",
            self.logical_id(),
            self.addr,
            self.file.display(),
            self.line
        ))
    }
}

/// Result of resolving a stop at a physical breakpoint.
#[derive(Debug, Default)]
pub struct BreakpointState {
    /// Address of the physical breakpoint the thread stopped at.
    pub physical: Option<RelocatedAddress>,
    /// The condition of at least one breaklet is met.
    pub active: bool,
    /// At least one active breaklet is a stepping breakpoint.
    pub stepping: bool,
    /// One of the active stepping breaklets is a [`BreakletKind::Step`].
    pub stepping_into: bool,
    pub stepping_into_range_over_func_body: bool,
    /// First error encountered while evaluating breaklet conditions.
    pub cond_error: Option<Error>,
}

impl BreakpointState {
    /// Zero the state.
    pub fn clear(&mut self) {
        *self = BreakpointState::default();
    }
}

impl Display for BreakpointState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.physical {
            Some(addr) => f.write_fmt(format_args!("stop at {addr}"))?,
            None => f.write_str("stop")?,
        }
        if self.active {
            f.write_str(" active")?;
        }
        if self.stepping {
            f.write_str(" stepping")?;
        }
        Ok(())
    }
}

/// Process-wide breakpoint table: the address-keyed physical map, the
/// logical map and per-thread stop bookkeeping. Mutated only by the
/// coordinator thread that already halted the target.
#[derive(Debug, Default)]
pub struct BreakpointRegistry {
    pub(super) physical: IndexMap<RelocatedAddress, Breakpoint>,
    pub(super) logical: HashMap<LogicalId, LogicalBreakpoint>,
    /// Watchpoints that went out of scope during the last resume.
    pub(super) watch_out_of_scope: Vec<Breakpoint>,
    /// Physical breakpoint each thread last stopped at.
    pub(super) last_stop: HashMap<Pid, RelocatedAddress>,
}

impl BreakpointRegistry {
    pub fn get(&self, addr: RelocatedAddress) -> Option<&Breakpoint> {
        self.physical.get(&addr)
    }

    pub fn all(&self) -> impl Iterator<Item = &Breakpoint> {
        self.physical.values()
    }

    pub fn logical(&self, id: LogicalId) -> Option<&LogicalBreakpoint> {
        self.logical.get(&id)
    }

    pub fn logical_all(&self) -> impl Iterator<Item = &LogicalBreakpoint> {
        self.logical.values()
    }

    /// At least one stepping breakpoint is set.
    pub fn has_stepping_breakpoints(&self) -> bool {
        self.physical.values().any(|brkpt| brkpt.is_stepping())
    }

    /// At least one hardware breakpoint is set.
    pub fn has_hw_breakpoints(&self) -> bool {
        self.physical.values().any(|brkpt| brkpt.watch_type.watching())
    }

    /// Physical breakpoint the thread stopped at last.
    pub fn thread_stop_at(&self, tid: Pid) -> Option<RelocatedAddress> {
        self.last_stop.get(&tid).copied()
    }

    /// Lowest hardware debug slot not taken by a live watchpoint.
    pub(super) fn free_hw_slot(&self, limit: u8) -> Result<u8, Error> {
        let busy: Vec<u8> = self
            .physical
            .values()
            .filter(|brkpt| brkpt.watch_type.watching())
            .map(|brkpt| brkpt.hw_index)
            .collect();
        (0..limit)
            .find(|idx| !busy.contains(idx))
            .ok_or(Error::WatchpointLimitReached)
    }
}

impl Target {
    /// Set a breakpoint of `kind` at `addr` and store it in the process-wide
    /// breakpoint table.
    pub fn set_breakpoint(
        &mut self,
        logical_id: LogicalId,
        addr: RelocatedAddress,
        kind: BreakletKind,
        cond: Option<CondExpr>,
    ) -> Result<RelocatedAddress, Error> {
        self.set_breakpoint_internal(logical_id, addr, kind, WatchType::NONE, cond)
            .map(|brkpt| brkpt.addr)
    }

    pub(super) fn set_breakpoint_internal(
        &mut self,
        logical_id: LogicalId,
        addr: RelocatedAddress,
        kind: BreakletKind,
        watch_type: WatchType,
        cond: Option<CondExpr>,
    ) -> Result<&mut Breakpoint, Error> {
        if let Err(e) = self.proc.validity()
            && !self.proc.recorded()
        {
            return Err(e);
        }

        let new_breaklet = Breaklet::new(kind, logical_id, cond);

        if let Some(brkpt) = self.breakpoints.physical.get_mut(&addr) {
            if !brkpt.can_overlap(kind) {
                return Err(Error::BreakpointExists {
                    file: brkpt.file.clone(),
                    line: brkpt.line,
                    addr: brkpt.addr,
                });
            }
            brkpt.push_breaklet(new_breaklet);
            self.ensure_logical(addr, kind, logical_id);
            return Ok(self.breakpoints.physical.get_mut(&addr).expect("infallible"));
        }

        let place = self.debug_info.pc_to_place(addr).unwrap_or_default();
        let function_name = self
            .debug_info
            .pc_to_function(addr)
            .map(|function| function.name);

        let hw_index = if watch_type.watching() {
            self.breakpoints.free_hw_slot(self.cfg.hw_debug_slots)?
        } else {
            0
        };

        let mut new_breakpoint = Breakpoint {
            function_name,
            file: place.file,
            line: place.line,
            addr,
            watch_type,
            hw_index,
            ..Default::default()
        };

        // a failed write commits no state
        self.proc.write_breakpoint(&mut new_breakpoint)?;

        new_breakpoint.push_breaklet(new_breaklet);
        self.breakpoints.physical.insert(addr, new_breakpoint);
        self.ensure_logical(addr, kind, logical_id);

        Ok(self.breakpoints.physical.get_mut(&addr).expect("infallible"))
    }

    /// Attach (creating on first use) the logical record behind a freshly
    /// added user breaklet.
    fn ensure_logical(&mut self, addr: RelocatedAddress, kind: BreakletKind, logical_id: LogicalId) {
        if kind != BreakletKind::User {
            return;
        }
        let BreakpointRegistry {
            physical, logical, ..
        } = &mut self.breakpoints;
        let brkpt = physical.get_mut(&addr).expect("breakpoint must exist");
        if brkpt.logical.is_some() {
            return;
        }

        let lbp = logical
            .entry(logical_id)
            .or_insert_with(|| LogicalBreakpoint::new(logical_id));
        brkpt.logical = Some(logical_id);

        if let Some(breaklet) = brkpt.user_breaklet_mut()
            && breaklet.cond.is_none()
        {
            breaklet.cond = lbp.cond().cloned();
        }

        if lbp.file.as_os_str().is_empty() && lbp.line == 0 {
            lbp.file = brkpt.file.clone();
            lbp.line = brkpt.line;
        } else if brkpt.file != lbp.file || brkpt.line != lbp.line {
            lbp.file = PathBuf::from(MULTIPLE_LOCATIONS);
            lbp.line = 0;
        }

        if !lbp.root_func_name.is_empty() {
            brkpt.root_func_name = Some(lbp.root_func_name.clone());
            brkpt.trace_follow_calls = Some(lbp.trace_follow_calls);
        }

        if let Some(function) = self.debug_info.pc_to_function(addr) {
            lbp.function_name = function.name_without_type_params().to_string();
        }
    }

    /// Clear the user breakpoint at `addr`, internal breaklets at the same
    /// address survive.
    pub fn clear_breakpoint(&mut self, addr: RelocatedAddress) -> Result<(), Error> {
        self.remove_user_breaklet(addr).map(|_| ())
    }

    pub(super) fn remove_user_breaklet(
        &mut self,
        addr: RelocatedAddress,
    ) -> Result<Option<Breakpoint>, Error> {
        if let Err(e) = self.proc.validity()
            && !self.proc.recorded()
        {
            return Err(e);
        }
        let Some(brkpt) = self.breakpoints.physical.get_mut(&addr) else {
            return Err(Error::NoBreakpoint(addr));
        };

        let logical_id = brkpt.logical;
        for slot in brkpt.breaklets.iter_mut() {
            if matches!(slot, Some(breaklet) if breaklet.kind == BreakletKind::User) {
                *slot = None;
            }
        }
        if brkpt.watch_expr.is_none() {
            brkpt.logical = None;
        }
        let stack_watch = brkpt.watch_expr.is_some() && brkpt.watch_stack_off != 0;

        let deleted = self.finish_clear(addr)?;

        if stack_watch {
            // a stack watchpoint drags its out-of-scope and stack-resize
            // sentinels along
            self.clear_stack_watch_breakpoints(addr)?;
        }

        // the logical record dies with the last user breaklet owning it
        if let Some(id) = logical_id
            && !self
                .breakpoints
                .physical
                .values()
                .any(|brkpt| brkpt.logical == Some(id))
        {
            self.breakpoints.logical.remove(&id);
        }

        Ok(deleted)
    }

    /// Remove all stepping breakpoints.
    pub fn clear_stepping_breakpoints(&mut self) -> Result<(), Error> {
        self.clear_breaklets_by_mask(STEPPING_MASK)
    }

    /// Remove inactivated next breakpoints left over by stepping.
    pub fn clear_inactivated_stepping_breakpoints(&mut self) -> Result<(), Error> {
        self.clear_breaklets_by_mask(BreakletKind::NextInactivated.bit())
    }

    fn clear_breaklets_by_mask(&mut self, mask: u16) -> Result<(), Error> {
        let addrs: Vec<RelocatedAddress> = self.breakpoints.physical.keys().copied().collect();
        for addr in addrs {
            let brkpt = self.breakpoints.physical.get_mut(&addr).expect("infallible");
            for slot in brkpt.breaklets.iter_mut() {
                if matches!(slot, Some(breaklet) if breaklet.kind.bit() & mask != 0) {
                    *slot = None;
                }
            }
            self.finish_clear(addr)?;
        }
        Ok(())
    }

    /// Compact nulled breaklets and erase the physical breakpoint if none
    /// are left. Returns the deleted breakpoint, if it was deleted.
    pub(super) fn finish_clear(
        &mut self,
        addr: RelocatedAddress,
    ) -> Result<Option<Breakpoint>, Error> {
        let Some(brkpt) = self.breakpoints.physical.get_mut(&addr) else {
            return Ok(None);
        };
        brkpt.compact_breaklets();
        if !brkpt.breaklets.is_empty() {
            return Ok(None);
        }

        self.proc.erase_breakpoint(brkpt)?;

        let brkpt = self
            .breakpoints
            .physical
            .shift_remove(&addr)
            .expect("infallible");
        if brkpt.watch_expr.is_some()
            && let Some(id) = brkpt.logical
        {
            self.breakpoints.logical.remove(&id);
        }
        // stale "last stopped at" references must not outlive the physical
        self.breakpoints.last_stop.retain(|_, stop| *stop != addr);

        Ok(Some(brkpt))
    }

    /// Resolve a stop of thread `tid` at `addr`: evaluate every breaklet of
    /// the physical breakpoint there and fold the results.
    pub fn check_condition(&mut self, tid: Pid, addr: RelocatedAddress) -> BreakpointState {
        let mut state = BreakpointState::default();
        let Some(brkpt) = self.breakpoints.physical.get(&addr) else {
            return state;
        };
        state.physical = Some(addr);
        let breaklet_count = brkpt.breaklets.len();
        self.breakpoints.last_stop.insert(tid, addr);

        for idx in 0..breaklet_count {
            self.check_breaklet(&mut state, tid, addr, idx);
        }
        state
    }

    fn check_breaklet(
        &mut self,
        state: &mut BreakpointState,
        tid: Pid,
        addr: RelocatedAddress,
        idx: usize,
    ) {
        let Some(brkpt) = self.breakpoints.physical.get(&addr) else {
            return;
        };
        let Some(breaklet) = brkpt.breaklet_at(idx) else {
            return;
        };

        let mut active = true;
        if let Some(breaklet_cond) = &breaklet.cond {
            let (cond_active, cond_err) =
                cond::evaluate_condition(self.exploration.as_ref(), tid, breaklet_cond);
            active = cond_active;
            if let Some(e) = cond_err
                && state.cond_error.is_none()
            {
                state.cond_error = Some(e);
            }
        }

        let kind = breaklet.kind;
        let logical_id = brkpt.logical;
        let check_panic_call = breaklet.check_panic_call;
        let defer_returns = breaklet.defer_returns.clone();
        let has_callback = breaklet.callback.is_some();

        match kind {
            BreakletKind::User => {
                // hit counters track every stop on the user breaklet, a
                // false condition does not exempt the stop from counting
                if let Some(id) = logical_id
                    && self.breakpoints.logical.contains_key(&id)
                {
                    let routine = self.exploration.current_routine(tid);
                    let routine_id = routine.as_ref().map(|routine| routine.id).unwrap_or_default();
                    let lbp = self.breakpoints.logical.get_mut(&id).expect("infallible");
                    if routine.is_some() {
                        *lbp.hit_count.entry(routine_id).or_default() += 1;
                    }
                    lbp.total_hit_count += 1;
                    active = active && logical::check_hit_cond(lbp, routine_id);
                    self.recalculate_satisfiability(id);
                }
            }
            BreakletKind::Step | BreakletKind::Next | BreakletKind::NextDefer => {
                if active
                    && kind == BreakletKind::NextDefer
                    && let Some(frames) = muted_error!(self.exploration.stacktrace(tid, 2))
                {
                    active = step::is_panic_call(&frames)
                        || step::is_defer_return_call(&frames, &defer_returns);
                }
            }
            BreakletKind::WatchOutOfScope => {
                if active
                    && check_panic_call
                    && let Some(frames) = muted_error!(self.exploration.stacktrace(tid, 2))
                {
                    active = step::is_panic_call(&frames);
                }
            }
            BreakletKind::StackResize
            | BreakletKind::PluginOpen
            | BreakletKind::StepIntoNewTask
            | BreakletKind::StepIntoRangeOverFuncBody => {
                // no further checks
            }
            BreakletKind::NextInactivated => active = false,
        }

        if active && has_callback {
            let brkpt = self.breakpoints.physical.get(&addr).expect("infallible");
            let callback = brkpt
                .breaklet_at(idx)
                .and_then(|breaklet| breaklet.callback.as_ref())
                .expect("infallible");
            match callback(tid, self.exploration.as_ref()) {
                Ok(callback_active) => active = callback_active,
                Err(e) => {
                    active = false;
                    if state.cond_error.is_none() {
                        state.cond_error = Some(Error::Callback(e));
                    }
                }
            }
        }

        if active {
            state.active = true;
            match kind {
                BreakletKind::Next | BreakletKind::NextDefer => state.stepping = true,
                BreakletKind::Step => {
                    state.stepping = true;
                    state.stepping_into = true;
                }
                BreakletKind::StepIntoRangeOverFuncBody => {
                    state.stepping = true;
                    state.stepping_into_range_over_func_body = true;
                }
                _ => {}
            }
        }
    }
}
