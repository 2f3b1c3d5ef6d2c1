use crate::debugger::address::RelocatedAddress;
use crate::debugger::logical::LogicalId;
use nix::unistd::Pid;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- breakpoint installation -----------------------------------
    #[error("breakpoint exists at {}:{} at {}", file.display(), line, addr)]
    BreakpointExists {
        file: PathBuf,
        line: u64,
        addr: RelocatedAddress,
    },
    #[error("invalid address {0}")]
    InvalidAddress(RelocatedAddress),
    #[error("no breakpoint at {0}")]
    NoBreakpoint(RelocatedAddress),
    #[error("hardware breakpoints not implemented")]
    HwBreakpointUnsupported,
    #[error("logical breakpoint {0} not found")]
    LogicalNotFound(LogicalId),

    // --------------------------------- watchpoints -----------------------------------------------
    #[error("at least one of read and write must be set for watchpoint")]
    WatchAccessRequired,
    #[error("all hardware debug slots are busy")]
    WatchpointLimitReached,
    #[error("can not watch {0:?}")]
    WatchUnwatchable(String),
    #[error("expression {0:?} is unreadable: {1}")]
    WatchUnreadable(String, String),
    #[error("can not watch variable of type {0}")]
    WatchUnsupportedType(String),
    #[error("invalid interface {0:?}")]
    InvalidInterface(String),
    #[error("can not watch stack allocated variable for reads")]
    WatchStackRead,
    #[error("can not determine the scope of a stack watchpoint")]
    UnknownScope,

    // --------------------------------- debugee process -------------------------------------------
    #[error("debugee process exit with code {0}")]
    ProcessExit(i32),
    #[error("program is not being started")]
    ProcessNotStarted,
    #[error("function {0} not found")]
    FunctionNotFound(String),
    #[error("eBPF is not supported")]
    BpfUnsupported,

    // --------------------------------- condition evaluation --------------------------------------
    #[error("condition parsing error: {0}")]
    ConditionParse(String),
    #[error("error evaluating expression: {0}")]
    ConditionEval(#[source] Box<Error>),
    #[error("condition expression not boolean")]
    ConditionNotBoolean,
    #[error("condition expression unreadable: {0}")]
    ConditionUnreadable(String),
    #[error("hit condition is never satisfied (modulo zero)")]
    HitCondModuloZero,

    // --------------------------------- evaluation collaborator -----------------------------------
    #[error("no scope for thread {0}")]
    ScopeUnavailable(Pid),
    #[error("expression evaluation: {0}")]
    Expression(String),

    // --------------------------------- third party errors ----------------------------------------
    #[error("breaklet callback: {0}")]
    Callback(anyhow::Error),
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!(target: "debugger", "{:#}", e);
                None
            }
        }
    };
    ($res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!(target: "debugger", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                log::debug!(target: "debugger", "{:#}", e);
                None
            }
        }
    };
    ($res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                log::debug!(target: "debugger", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}
