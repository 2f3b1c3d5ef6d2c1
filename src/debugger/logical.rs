//! Logical (source-level) breakpoints.
//!
//! A logical breakpoint is what the user sees: a stable id, a source
//! position, aggregate hit counts and conditions. It fans out to zero or
//! more physical breakpoints (several for generic instantiations, zero for a
//! location that waits for a module to be loaded).

use crate::debugger::Target;
use crate::debugger::cond::{self, CmpOp, CondExpr};
use crate::debugger::debugee::RoutineId;
use crate::debugger::error::Error;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub type LogicalId = i32;

/// Logical id of internal (stepping and sentinel) breaklets.
pub const NO_LOGICAL_ID: LogicalId = -1000;

/// Name and id of the breakpoint stopping on an unrecovered panic.
pub const UNRECOVERED_PANIC: &str = "unrecovered-panic";
pub const UNRECOVERED_PANIC_ID: LogicalId = -1;

/// Name and id of the breakpoint stopping on a fatal runtime error.
pub const FATAL_THROW: &str = "runtime-fatal-throw";
pub const FATAL_THROW_ID: LogicalId = -2;

/// Name and id given to traps hardcoded into the debugee.
pub const HARDCODED_BREAKPOINT: &str = "hardcoded-breakpoint";
pub const HARDCODED_BREAKPOINT_ID: LogicalId = -3;

/// File sentinel used when the physicals of one logical breakpoint disagree
/// about their source position.
pub const MULTIPLE_LOCATIONS: &str = "<multiple locations>";

/// Hit condition: gates breakpoint activation on its hit counter.
/// `Rem` means "fire on every value-th hit".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitCondition {
    pub op: CmpOp,
    pub value: u64,
}

impl Display for HitCondition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{} {}", self.op, self.value))
    }
}

/// How much of a variable to load when a tracepoint fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadConfig {
    pub follow_pointers: bool,
    pub max_variable_recurse: u32,
    pub max_string_len: usize,
    pub max_array_values: usize,
    pub max_struct_fields: i32,
}

#[derive(Debug, Default)]
pub struct LogicalBreakpoint {
    pub id: LogicalId,
    pub name: String,
    pub function_name: String,
    pub file: PathBuf,
    pub line: u64,
    pub(super) enabled: bool,

    // tracepoint configuration
    pub tracepoint: bool,
    pub trace_return: bool,
    /// Collect information about the routine that hit the tracepoint.
    pub collect_routine_info: bool,
    /// Number of stack frames to retrieve on hit.
    pub stacktrace_depth: u32,
    /// Expressions to evaluate on hit.
    pub variables: Vec<String>,
    pub load_args: Option<LoadConfig>,
    pub load_locals: Option<LoadConfig>,
    /// Root function for call-following traces.
    pub root_func_name: String,
    /// Depth of call-following traces.
    pub trace_follow_calls: u32,

    /// Times the breakpoint was hit, per routine.
    pub hit_count: HashMap<RoutineId, u64>,
    pub total_hit_count: u64,
    /// Gate the hit condition on the per-routine counter instead of the
    /// total one.
    pub hit_cond_per_routine: bool,

    pub(super) hit_cond: Option<HitCondition>,
    pub(super) cond: Option<CondExpr>,
    /// `cond && hit_cond` can still become true at some future hit.
    pub(super) cond_satisfiable: bool,
    pub(super) cond_uses_hit_counts: bool,

    /// Opaque frontend payload.
    pub user_data: Option<serde_json::Value>,
}

impl LogicalBreakpoint {
    pub(super) fn new(id: LogicalId) -> Self {
        LogicalBreakpoint {
            id,
            enabled: true,
            cond_satisfiable: true,
            ..Default::default()
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn hit_cond(&self) -> Option<HitCondition> {
        self.hit_cond
    }

    pub fn hit_cond_string(&self) -> String {
        self.hit_cond.map(|hc| hc.to_string()).unwrap_or_default()
    }

    pub fn cond(&self) -> Option<&CondExpr> {
        self.cond.as_ref()
    }

    pub fn cond_string(&self) -> String {
        self.cond
            .as_ref()
            .map(|cond| cond.to_string())
            .unwrap_or_default()
    }

    pub fn cond_satisfiable(&self) -> bool {
        self.cond_satisfiable
    }

    pub fn cond_uses_hit_counts(&self) -> bool {
        self.cond_uses_hit_counts
    }
}

/// Evaluate the hit condition after the counters were bumped for the current
/// stop.
pub(super) fn check_hit_cond(lbp: &LogicalBreakpoint, routine_id: RoutineId) -> bool {
    let Some(hit_cond) = lbp.hit_cond else {
        return true;
    };
    let mut hits = lbp.total_hit_count;
    if lbp.hit_cond_per_routine && routine_id > 0 {
        hits = lbp.hit_count.get(&routine_id).copied().unwrap_or_default();
    }
    match hit_cond.op {
        CmpOp::Eq => hits == hit_cond.value,
        CmpOp::NotEq => hits != hit_cond.value,
        CmpOp::Greater => hits > hit_cond.value,
        CmpOp::Less => hits < hit_cond.value,
        CmpOp::GreaterEq => hits >= hit_cond.value,
        CmpOp::LessEq => hits <= hit_cond.value,
        CmpOp::Rem => hit_cond.value != 0 && hits % hit_cond.value == 0,
    }
}

pub(super) fn total_hit_count_by_id(
    logical_map: &HashMap<LogicalId, LogicalBreakpoint>,
    id: LogicalId,
) -> Option<u64> {
    logical_map.get(&id).map(|lbp| lbp.total_hit_count)
}

pub(super) fn total_hit_count_by_name(
    logical_map: &HashMap<LogicalId, LogicalBreakpoint>,
    name: &str,
) -> Option<u64> {
    logical_map
        .values()
        .find(|lbp| lbp.name == name)
        .map(|lbp| lbp.total_hit_count)
}

/// Walk the condition for `runtime.breakpoint_hitcount` selectors.
pub(super) fn condition_uses_hit_counts(cond: Option<&CondExpr>) -> bool {
    let Some(cond) = cond else {
        return false;
    };
    let mut found = false;
    cond::inspect(cond, &mut |expr| {
        if found {
            return false;
        }
        if cond::is_hit_count_selector(expr) {
            found = true;
            return false;
        }
        true
    });
    found
}

/// Conservatively decide whether the breakpoint can ever fire again given
/// its hit condition and the current hit counters.
pub(super) fn condition_satisfiable(
    logical_map: &HashMap<LogicalId, LogicalBreakpoint>,
    lbp: &LogicalBreakpoint,
) -> bool {
    if let Some(hit_cond) = lbp.hit_cond
        && !lbp.hit_cond_per_routine
    {
        match hit_cond.op {
            CmpOp::Eq | CmpOp::LessEq => {
                if lbp.total_hit_count >= hit_cond.value {
                    return false;
                }
            }
            CmpOp::Less => {
                if lbp.total_hit_count + 1 >= hit_cond.value {
                    return false;
                }
            }
            _ => {}
        }
    }
    if !lbp.cond_uses_hit_counts {
        return true;
    }
    let Some(cond) = &lbp.cond else {
        return true;
    };
    satisfiable(logical_map, cond)
}

fn satisfiable(logical_map: &HashMap<LogicalId, LogicalBreakpoint>, expr: &CondExpr) -> bool {
    match expr {
        CondExpr::Parentheses(e) => satisfiable(logical_map, e),
        CondExpr::Logical {
            op: cond::LogicOp::And,
            lhs,
            rhs,
        } => satisfiable(logical_map, lhs) && satisfiable(logical_map, rhs),
        // a disjunction dies together with its first dead operand
        CondExpr::Logical {
            op: cond::LogicOp::Or,
            lhs,
            rhs,
        } => {
            if !satisfiable(logical_map, lhs) {
                return false;
            }
            if !satisfiable(logical_map, rhs) {
                return false;
            }
            true
        }
        CondExpr::Compare { op, lhs, rhs } if *op != CmpOp::Rem => {
            let (Some(hits), Some(value)) = (
                hit_count_operand(logical_map, lhs),
                int_operand(rhs),
            ) else {
                return true;
            };
            match op {
                CmpOp::Eq => hits == value,
                CmpOp::NotEq => hits != value,
                CmpOp::Greater => hits > value,
                CmpOp::Less => hits < value,
                CmpOp::GreaterEq => hits >= value,
                CmpOp::LessEq => hits <= value,
                CmpOp::Rem => true,
            }
        }
        _ => true,
    }
}

fn int_operand(expr: &CondExpr) -> Option<u64> {
    match expr {
        CondExpr::Int(value) => Some(*value),
        _ => None,
    }
}

/// Current total hit count behind a `runtime.breakpoint_hitcount[id-or-name]`
/// expression, `None` for any other expression shape.
fn hit_count_operand(
    logical_map: &HashMap<LogicalId, LogicalBreakpoint>,
    expr: &CondExpr,
) -> Option<u64> {
    let CondExpr::Index { base, index } = expr else {
        return None;
    };
    if !cond::is_hit_count_selector(base) {
        return None;
    }
    match index.as_ref() {
        CondExpr::Int(id) => total_hit_count_by_id(logical_map, *id as LogicalId),
        CondExpr::Str(name) => total_hit_count_by_name(logical_map, name),
        _ => None,
    }
}

impl Target {
    /// Replace the condition of logical breakpoint `id` and propagate it to
    /// every user breaklet the breakpoint owns.
    pub fn set_breakpoint_condition(
        &mut self,
        id: LogicalId,
        cond: Option<&str>,
    ) -> Result<(), Error> {
        let parsed = cond.map(cond::parse).transpose()?;
        let lbp = self
            .breakpoints
            .logical
            .get_mut(&id)
            .ok_or(Error::LogicalNotFound(id))?;
        lbp.cond = parsed.clone();
        lbp.cond_uses_hit_counts = condition_uses_hit_counts(lbp.cond.as_ref());

        for brkpt in self.breakpoints.physical.values_mut() {
            if brkpt.logical == Some(id)
                && let Some(breaklet) = brkpt.user_breaklet_mut()
            {
                breaklet.cond = parsed.clone();
            }
        }
        self.recalculate_satisfiability(id);
        Ok(())
    }

    /// Replace the hit condition of logical breakpoint `id`.
    pub fn set_breakpoint_hit_condition(
        &mut self,
        id: LogicalId,
        hit_cond: Option<HitCondition>,
        per_routine: bool,
    ) -> Result<(), Error> {
        if let Some(hc) = hit_cond
            && hc.op == CmpOp::Rem
            && hc.value == 0
        {
            return Err(Error::HitCondModuloZero);
        }
        let lbp = self
            .breakpoints
            .logical
            .get_mut(&id)
            .ok_or(Error::LogicalNotFound(id))?;
        lbp.hit_cond = hit_cond;
        lbp.hit_cond_per_routine = per_routine;
        self.recalculate_satisfiability(id);
        Ok(())
    }

    pub fn set_breakpoint_enabled(&mut self, id: LogicalId, enabled: bool) -> Result<(), Error> {
        let lbp = self
            .breakpoints
            .logical
            .get_mut(&id)
            .ok_or(Error::LogicalNotFound(id))?;
        lbp.enabled = enabled;
        Ok(())
    }

    pub(super) fn recalculate_satisfiability(&mut self, id: LogicalId) {
        let Some(lbp) = self.breakpoints.logical.get(&id) else {
            return;
        };
        let satisfiable = condition_satisfiable(&self.breakpoints.logical, lbp);
        self.breakpoints
            .logical
            .get_mut(&id)
            .expect("infallible")
            .cond_satisfiable = satisfiable;
    }
}
