//! Evaluation of parsed expressions against a record's tag map.

use chrono::{DateTime, FixedOffset};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::parse::{Ast, BinaryOp, UnaryOp};
use crate::error::EvalError;
use crate::metadata::datetime::{parse_timestamp, Timezone};
use crate::types::TagValue;

fn mismatch(op: &str, left: &TagValue, right: &TagValue) -> EvalError {
    EvalError::TypeMismatch {
        op: op.to_string(),
        left: left.type_name(),
        right: right.type_name(),
    }
}

/// Evaluate an expression tree. Tag names are free variables.
pub fn evaluate(ast: &Ast, vars: &BTreeMap<String, TagValue>) -> Result<TagValue, EvalError> {
    match ast {
        Ast::Literal(value) => Ok(value.clone()),
        Ast::Var(name) => vars
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownVariable(name.clone())),
        Ast::Unary(op, operand) => {
            let value = evaluate(operand, vars)?;
            match (op, &value) {
                (UnaryOp::Not, TagValue::Bool(b)) => Ok(TagValue::Bool(!b)),
                (UnaryOp::Neg, TagValue::Int(i)) => Ok(i
                    .checked_neg()
                    .map(TagValue::Int)
                    .unwrap_or(TagValue::Float(-(*i as f64)))),
                (UnaryOp::Neg, TagValue::Float(f)) => Ok(TagValue::Float(-f)),
                (UnaryOp::Not, v) => Err(mismatch("!", v, v)),
                (UnaryOp::Neg, v) => Err(mismatch("-", v, v)),
            }
        }
        Ast::Binary(BinaryOp::And, left, right) => {
            let l = evaluate(left, vars)?;
            match l {
                TagValue::Bool(false) => Ok(TagValue::Bool(false)),
                TagValue::Bool(true) => expect_bool("&&", &l, evaluate(right, vars)?),
                other => Err(mismatch("&&", &other, &other)),
            }
        }
        Ast::Binary(BinaryOp::Or, left, right) => {
            let l = evaluate(left, vars)?;
            match l {
                TagValue::Bool(true) => Ok(TagValue::Bool(true)),
                TagValue::Bool(false) => expect_bool("||", &l, evaluate(right, vars)?),
                other => Err(mismatch("||", &other, &other)),
            }
        }
        Ast::Binary(op, left, right) => {
            let l = evaluate(left, vars)?;
            let r = evaluate(right, vars)?;
            apply(*op, &l, &r)
        }
    }
}

fn expect_bool(op: &str, left: &TagValue, right: TagValue) -> Result<TagValue, EvalError> {
    match right {
        TagValue::Bool(_) => Ok(right),
        other => Err(mismatch(op, left, &other)),
    }
}

fn apply(op: BinaryOp, l: &TagValue, r: &TagValue) -> Result<TagValue, EvalError> {
    match op {
        BinaryOp::Eq => Ok(TagValue::Bool(compare(l, r) == Some(Ordering::Equal))),
        BinaryOp::Ne => Ok(TagValue::Bool(compare(l, r) != Some(Ordering::Equal))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ord = compare(l, r).ok_or_else(|| mismatch(op.symbol(), l, r))?;
            let result = match op {
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::Le => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            };
            Ok(TagValue::Bool(result))
        }
        BinaryOp::Add => match (l, r) {
            (TagValue::String(_), _) | (_, TagValue::String(_)) => {
                Ok(TagValue::String(format!("{l}{r}")))
            }
            _ => arithmetic(op, l, r),
        },
        _ => arithmetic(op, l, r),
    }
}

fn arithmetic(op: BinaryOp, l: &TagValue, r: &TagValue) -> Result<TagValue, EvalError> {
    if let (TagValue::Int(a), TagValue::Int(b)) = (l, r) {
        let exact = match op {
            BinaryOp::Add => a.checked_add(*b),
            BinaryOp::Sub => a.checked_sub(*b),
            BinaryOp::Mul => a.checked_mul(*b),
            BinaryOp::Rem if *b == 0 => return Err(EvalError::DivisionByZero),
            BinaryOp::Rem => a.checked_rem(*b),
            _ => None,
        };
        if let Some(value) = exact {
            return Ok(TagValue::Int(value));
        }
    }

    let (a, b) = match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(mismatch(op.symbol(), l, r)),
    };
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Rem if b == 0.0 => return Err(EvalError::DivisionByZero),
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        _ => return Err(mismatch(op.symbol(), l, r)),
    };
    Ok(TagValue::from_f64(value))
}

/// Compare two values, letting a string stand in for a timestamp when it
/// parses as one.
fn compare(l: &TagValue, r: &TagValue) -> Option<Ordering> {
    match (l, r) {
        (TagValue::Timestamp(t), TagValue::String(s)) => string_timestamp(s).map(|u| t.cmp(&u)),
        (TagValue::String(s), TagValue::Timestamp(t)) => string_timestamp(s).map(|u| u.cmp(t)),
        _ => l.compare(r),
    }
}

fn string_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    parse_timestamp(s, &Timezone::utc()).or_else(|| DateTime::parse_from_rfc3339(s).ok())
}
