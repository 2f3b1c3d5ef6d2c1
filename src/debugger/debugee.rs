//! Seams between the breakpoint subsystem and the rest of the debugger.
//!
//! The subsystem never parses executables, unwinds stacks or reads debugee
//! memory itself. It consumes three collaborators through narrow traits: a
//! low-level process facade ([`ProcessDriver`]), a debug-info reader
//! ([`DebugInfo`]) and an expression/scope provider ([`Exploration`]).

use crate::debugger::address::RelocatedAddress;
use crate::debugger::breakpoint::Breakpoint;
use crate::debugger::cond::CondExpr;
use crate::debugger::error::Error;
use nix::unistd::Pid;
use std::path::PathBuf;

/// Identifier of a routine (a lightweight user-space task multiplexed onto
/// OS threads). Not an OS thread id.
pub type RoutineId = i64;

/// Routine state snapshot, enough to reason about its stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routine {
    pub id: RoutineId,
    /// Lowest address of the routine stack.
    pub stack_lo: usize,
    /// One past the highest address of the routine stack (the stack top,
    /// stacks grow down).
    pub stack_hi: usize,
    /// The routine currently executes on a system stack, its own stack
    /// bounds are not meaningful.
    pub system_stack: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionMeta {
    pub name: String,
    pub entry: RelocatedAddress,
}

impl FunctionMeta {
    pub fn new(name: impl ToString, entry: RelocatedAddress) -> Self {
        Self {
            name: name.to_string(),
            entry,
        }
    }

    /// Function name with the type parameter list stripped
    /// (`collection.sort[collection.ordered]` -> `collection.sort`).
    pub fn name_without_type_params(&self) -> &str {
        match self.name.split_once('[') {
            Some((head, _)) => head,
            None => &self.name,
        }
    }
}

/// Source-level position of an instruction address.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Place {
    pub file: PathBuf,
    pub line: u64,
}

/// One frame of a thread stacktrace.
#[derive(Debug, Clone, PartialEq)]
pub struct StackFrame {
    pub pc: RelocatedAddress,
    /// Return address of this frame, if the unwinder recovered one.
    pub ret_addr: Option<RelocatedAddress>,
    /// Offset of the frame base from the routine stack top.
    pub frame_offset: i64,
    pub function: Option<FunctionMeta>,
}

/// Argument descriptor handed to the uprobe-based tracing backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UProbeArg {
    /// Location offset, relative to the stack pointer at function entry.
    pub offset: i64,
    pub size: i64,
    /// Register numbers for register-resident pieces of the argument.
    pub pieces: Vec<i32>,
    pub in_reg: bool,
    /// The argument is a return value.
    pub ret: bool,
}

/// Shape of a value produced by the expression evaluator.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ValueKind {
    Bool(bool),
    Int(i64),
    Str(String),
    Scalar,
    Pointer,
    /// Interface-typed value, `data` is the concrete value behind it.
    Interface {
        data: Option<Box<Value>>,
    },
    UnsafePointer,
    #[default]
    Invalid,
}

impl ValueKind {
    pub fn type_descr(&self) -> &'static str {
        match self {
            ValueKind::Bool(_) => "bool",
            ValueKind::Int(_) => "int",
            ValueKind::Str(_) => "string",
            ValueKind::Scalar => "scalar",
            ValueKind::Pointer => "pointer",
            ValueKind::Interface { .. } => "interface",
            ValueKind::UnsafePointer => "unsafe pointer",
            ValueKind::Invalid => "invalid",
        }
    }
}

/// An evaluated value, reduced to what breakpoint bookkeeping needs:
/// activation gating and watch-target vetting.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Value {
    pub kind: ValueKind,
    /// Address of the value in debugee memory, 0 when the value has none.
    pub addr: usize,
    /// The address is synthesized by the evaluator and does not exist in the
    /// debugee.
    pub synthetic: bool,
    pub type_name: Option<String>,
    /// Byte size of the value type, `None` when the type is unknown.
    pub size: Option<u64>,
    /// Set when the value exists but its memory can not be read.
    pub unreadable: Option<String>,
}

impl Value {
    pub fn bool_val(val: bool) -> Self {
        Value {
            kind: ValueKind::Bool(val),
            type_name: Some("bool".to_string()),
            size: Some(1),
            ..Default::default()
        }
    }

    pub fn int_val(val: i64) -> Self {
        Value {
            kind: ValueKind::Int(val),
            type_name: Some("int".to_string()),
            size: Some(8),
            ..Default::default()
        }
    }

    pub fn string_val(val: impl ToString) -> Self {
        Value {
            kind: ValueKind::Str(val.to_string()),
            type_name: Some("string".to_string()),
            ..Default::default()
        }
    }
}

/// A named variable, as returned by scope enumeration.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub value: Value,
    /// The variable is a return argument of its function.
    pub return_argument: bool,
}

/// Low-level process facade. Owns actual memory and debug-register
/// mutations. On failure an operation must leave the debugee untouched, the
/// subsystem commits no state for a failed call.
pub trait ProcessDriver {
    /// Liveness check, `Err` for a dead target. Mutating operations are
    /// still allowed on a dead target when [`ProcessDriver::recorded`]
    /// reports a recording.
    fn validity(&self) -> Result<(), Error>;

    /// The target is a recording.
    fn recorded(&self) -> bool;

    /// Install the trap: patch bytes for a software breakpoint (filling
    /// `original_data`) or program a debug register for a watchpoint.
    fn write_breakpoint(&mut self, brkpt: &mut Breakpoint) -> Result<(), Error>;

    /// Restore original bytes or release the debug register.
    fn erase_breakpoint(&mut self, brkpt: &Breakpoint) -> Result<(), Error>;

    fn supports_bpf(&self) -> bool;

    /// Attach a uprobe to `function`, `routine_id_offset` tells the probe
    /// where to find the current routine id.
    fn set_uprobe(
        &mut self,
        function: &FunctionMeta,
        routine_id_offset: i64,
        args: Vec<UProbeArg>,
    ) -> Result<(), Error>;
}

/// Debug-info reader.
pub trait DebugInfo {
    fn pc_to_place(&self, pc: RelocatedAddress) -> Option<Place>;

    fn pc_to_function(&self, pc: RelocatedAddress) -> Option<FunctionMeta>;

    /// All functions matching `name` (generic instantiations may produce
    /// several).
    fn find_functions(&self, name: &str) -> Vec<FunctionMeta>;

    /// First source line of the function body.
    fn entry_line_for_function(&self, function: &FunctionMeta) -> Option<u64>;

    /// Visible parameters of `function` at `entry_line`, located relative to
    /// the entry stack pointer.
    fn function_arguments(
        &self,
        function: &FunctionMeta,
        entry_line: Option<u64>,
    ) -> Result<Vec<UProbeArg>, Error>;

    /// Offset of the routine id inside the runtime task structure.
    fn routine_id_offset(&self) -> Result<i64, Error>;

    /// Pointer size of the target architecture in bytes.
    fn ptr_size(&self) -> usize;
}

/// Expression evaluation and stack exploration collaborator.
pub trait Exploration {
    /// Scope of the routine currently running on thread `tid`.
    fn routine_scope<'a>(&'a self, tid: Pid) -> Result<Box<dyn EvalScope + 'a>, Error>;

    /// Scope of thread `tid` itself, the fallback when no routine is known.
    fn thread_scope<'a>(&'a self, tid: Pid) -> Result<Box<dyn EvalScope + 'a>, Error>;

    fn current_routine(&self, tid: Pid) -> Option<Routine>;

    /// Up to `depth + 1` innermost frames of thread `tid`.
    fn stacktrace(&self, tid: Pid, depth: u32) -> Result<Vec<StackFrame>, Error>;

    /// Synthetic scope at the entry of `function`, reconstructed from the
    /// frame base and stack pointer the function had when it was entered.
    fn entry_scope<'a>(
        &'a self,
        tid: Pid,
        function: &FunctionMeta,
        frame_base: usize,
        sp: usize,
    ) -> Result<Box<dyn EvalScope + 'a>, Error>;
}

/// A scope in which condition expressions are evaluated.
pub trait EvalScope {
    fn evaluate(&self, expr: &CondExpr) -> Result<Value, Error>;

    fn locals(&self) -> Result<Vec<Variable>, Error>;
}
