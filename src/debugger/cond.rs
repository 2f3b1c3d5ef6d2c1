//! Breakpoint condition expressions.
//!
//! A condition string is parsed once, when a breakpoint is installed, and
//! stored as an AST on the breaklet. On every stop the stored tree is handed
//! to the expression collaborator for evaluation, never re-parsed.

use crate::debugger::debugee::{Exploration, ValueKind};
use crate::debugger::error::Error;
use nix::unistd::Pid;
use nom::IResult;
use nom::branch::alt;
use nom::character::complete::{alpha1, alphanumeric1, char, digit1, multispace0};
use nom::combinator::{all_consuming, cut, map, opt, recognize, value};
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded, terminated, tuple};
use nom_supreme::error::ErrorTree;
use nom_supreme::tag::complete::tag;
use std::fmt::{Display, Formatter};

/// Variable exposed by the runtime for hit-count conditions:
/// `runtime.breakpoint_hitcount[id-or-name]`.
pub const HIT_COUNT_VAR_PACKAGE: &str = "runtime";
pub const HIT_COUNT_VAR_NAME: &str = "breakpoint_hitcount";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum LogicOp {
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
}

/// Comparison operators, also used by hit conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum CmpOp {
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    NotEq,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = ">=")]
    GreaterEq,
    #[strum(serialize = "<=")]
    LessEq,
    #[strum(serialize = "%")]
    Rem,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CondExpr {
    Parentheses(Box<CondExpr>),
    Logical {
        op: LogicOp,
        lhs: Box<CondExpr>,
        rhs: Box<CondExpr>,
    },
    Compare {
        op: CmpOp,
        lhs: Box<CondExpr>,
        rhs: Box<CondExpr>,
    },
    /// Field access (`package.variable`).
    Selector {
        base: Box<CondExpr>,
        field: String,
    },
    /// Index access (`container[key]`).
    Index {
        base: Box<CondExpr>,
        index: Box<CondExpr>,
    },
    Ident(String),
    Int(u64),
    Str(String),
}

impl CondExpr {
    pub fn boxed(self) -> Box<Self> {
        Box::new(self)
    }
}

impl Display for CondExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CondExpr::Parentheses(e) => f.write_fmt(format_args!("({e})")),
            CondExpr::Logical { op, lhs, rhs } => {
                f.write_fmt(format_args!("{lhs} {op} {rhs}"))
            }
            CondExpr::Compare { op, lhs, rhs } => {
                f.write_fmt(format_args!("{lhs} {op} {rhs}"))
            }
            CondExpr::Selector { base, field } => f.write_fmt(format_args!("{base}.{field}")),
            CondExpr::Index { base, index } => f.write_fmt(format_args!("{base}[{index}]")),
            CondExpr::Ident(name) => f.write_str(name),
            CondExpr::Int(i) => f.write_str(&i.to_string()),
            CondExpr::Str(s) => f.write_fmt(format_args!("\"{s}\"")),
        }
    }
}

/// Visit `expr` and every sub-expression in pre-order. The visitor return
/// value controls whether children of the visited node are descended into.
pub fn inspect(expr: &CondExpr, visit: &mut dyn FnMut(&CondExpr) -> bool) {
    if !visit(expr) {
        return;
    }
    match expr {
        CondExpr::Parentheses(e) => inspect(e, visit),
        CondExpr::Logical { lhs, rhs, .. } | CondExpr::Compare { lhs, rhs, .. } => {
            inspect(lhs, visit);
            inspect(rhs, visit);
        }
        CondExpr::Selector { base, .. } => inspect(base, visit),
        CondExpr::Index { base, index } => {
            inspect(base, visit);
            inspect(index, visit);
        }
        CondExpr::Ident(_) | CondExpr::Int(_) | CondExpr::Str(_) => {}
    }
}

/// True for `runtime.breakpoint_hitcount` selectors.
pub(super) fn is_hit_count_selector(expr: &CondExpr) -> bool {
    if let CondExpr::Selector { base, field } = expr
        && let CondExpr::Ident(package) = base.as_ref()
    {
        return package == HIT_COUNT_VAR_PACKAGE && field == HIT_COUNT_VAR_NAME;
    }
    false
}

type ParseResult<'a, T> = IResult<&'a str, T, ErrorTree<&'a str>>;

fn identifier(input: &str) -> ParseResult<&str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn int_lit(input: &str) -> ParseResult<CondExpr> {
    map(digit1, |digits: &str| {
        CondExpr::Int(digits.parse().unwrap_or_default())
    })(input)
}

fn str_lit(input: &str) -> ParseResult<CondExpr> {
    map(
        delimited(
            char('"'),
            recognize(many0(nom::character::complete::none_of("\""))),
            cut(char('"')),
        ),
        |s: &str| CondExpr::Str(s.to_string()),
    )(input)
}

fn parens(input: &str) -> ParseResult<CondExpr> {
    map(
        delimited(tag("("), expr, cut(tag(")"))),
        |e| CondExpr::Parentheses(e.boxed()),
    )(input)
}

enum Access<'a> {
    Field(&'a str),
    Index(CondExpr),
}

fn path(input: &str) -> ParseResult<CondExpr> {
    let (input, base) = map(identifier, |id| CondExpr::Ident(id.to_string()))(input)?;
    let (input, accesses) = many0(alt((
        map(preceded(tag("."), cut(identifier)), Access::Field),
        map(
            delimited(tag("["), alt((int_lit, str_lit)), cut(tag("]"))),
            Access::Index,
        ),
    )))(input)?;

    let expr = accesses.into_iter().fold(base, |acc, access| match access {
        Access::Field(field) => CondExpr::Selector {
            base: acc.boxed(),
            field: field.to_string(),
        },
        Access::Index(index) => CondExpr::Index {
            base: acc.boxed(),
            index: index.boxed(),
        },
    });
    Ok((input, expr))
}

fn primary(input: &str) -> ParseResult<CondExpr> {
    delimited(
        multispace0,
        alt((parens, str_lit, int_lit, path)),
        multispace0,
    )(input)
}

fn rem_expr(input: &str) -> ParseResult<CondExpr> {
    let (input, initial) = primary(input)?;
    let (input, remainder) = many0(preceded(tag("%"), cut(primary)))(input)?;
    let expr = remainder.into_iter().fold(initial, |acc, rhs| CondExpr::Compare {
        op: CmpOp::Rem,
        lhs: acc.boxed(),
        rhs: rhs.boxed(),
    });
    Ok((input, expr))
}

fn cmp_op(input: &str) -> ParseResult<CmpOp> {
    alt((
        value(CmpOp::Eq, tag("==")),
        value(CmpOp::NotEq, tag("!=")),
        value(CmpOp::GreaterEq, tag(">=")),
        value(CmpOp::LessEq, tag("<=")),
        value(CmpOp::Greater, tag(">")),
        value(CmpOp::Less, tag("<")),
    ))(input)
}

fn cmp_expr(input: &str) -> ParseResult<CondExpr> {
    let (input, (lhs, tail)) = tuple((rem_expr, opt(pair(cmp_op, cut(rem_expr)))))(input)?;
    let expr = match tail {
        None => lhs,
        Some((op, rhs)) => CondExpr::Compare {
            op,
            lhs: lhs.boxed(),
            rhs: rhs.boxed(),
        },
    };
    Ok((input, expr))
}

fn and_expr(input: &str) -> ParseResult<CondExpr> {
    let (input, initial) = cmp_expr(input)?;
    let (input, remainder) = many0(preceded(tag("&&"), cut(cmp_expr)))(input)?;
    let expr = remainder.into_iter().fold(initial, |acc, rhs| CondExpr::Logical {
        op: LogicOp::And,
        lhs: acc.boxed(),
        rhs: rhs.boxed(),
    });
    Ok((input, expr))
}

fn expr(input: &str) -> ParseResult<CondExpr> {
    let (input, initial) = and_expr(input)?;
    let (input, remainder) = many0(preceded(tag("||"), cut(and_expr)))(input)?;
    let expr = remainder.into_iter().fold(initial, |acc, rhs| CondExpr::Logical {
        op: LogicOp::Or,
        lhs: acc.boxed(),
        rhs: rhs.boxed(),
    });
    Ok((input, expr))
}

/// Parse a breakpoint condition (or a watch expression) into its AST.
pub fn parse(input: &str) -> Result<CondExpr, Error> {
    all_consuming(terminated(expr, multispace0))(input)
        .map(|(_, expr)| expr)
        .map_err(|e| Error::ConditionParse(e.to_string()))
}

/// Evaluate a breaklet condition against the stopped thread.
///
/// Evaluation problems never veto a stop: the breaklet stays active and the
/// error is reported through the breakpoint state.
pub(super) fn evaluate_condition(
    exploration: &dyn Exploration,
    tid: Pid,
    cond: &CondExpr,
) -> (bool, Option<Error>) {
    let scope = match exploration.routine_scope(tid) {
        Ok(scope) => scope,
        Err(_) => match exploration.thread_scope(tid) {
            Ok(scope) => scope,
            Err(e) => return (true, Some(e)),
        },
    };

    let value = match scope.evaluate(cond) {
        Ok(value) => value,
        Err(e) => return (true, Some(Error::ConditionEval(Box::new(e)))),
    };
    let ValueKind::Bool(active) = value.kind else {
        return (true, Some(Error::ConditionNotBoolean));
    };
    if let Some(descr) = value.unreadable {
        return (true, Some(Error::ConditionUnreadable(descr)));
    }
    (active, None)
}
