//! Result-type rules for expression nodes.
//!
//! Each function returns `None` when no rule covers the operand types. The
//! checked constructors on [`crate::ast::Expr`] turn that into a generator
//! invariant violation.

use crate::ast::{BinOp, ExprType, Function, UnaryOp};
use crate::schema::{CompositeType, DataKind};

/// Type of a prefix operator application.
pub fn unary(op: UnaryOp, operand: ExprType) -> Option<ExprType> {
    match op {
        UnaryOp::Not => {
            if !operand.is_predicate() {
                return None;
            }
            if operand.is_null() {
                Some(ExprType::null())
            } else {
                Some(ExprType::boolean(operand.nullable))
            }
        }
        UnaryOp::Negate | UnaryOp::Plus => {
            if !operand.is_numeric() {
                return None;
            }
            if operand.is_null() {
                Some(ExprType::null())
            } else {
                Some(ExprType::new(arith_operand(operand.ty), operand.nullable))
            }
        }
    }
}

/// Type of a binary operator application.
pub fn binary(op: BinOp, left: ExprType, right: ExprType) -> Option<ExprType> {
    let either_null = left.is_null() || right.is_null();
    let nullable = left.nullable || right.nullable;

    match op {
        BinOp::And | BinOp::Or => {
            if !(left.is_predicate() && right.is_predicate()) {
                return None;
            }
            Some(ExprType::boolean(nullable))
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
            if !(left.is_numeric() && right.is_numeric()) {
                return None;
            }
            if either_null {
                return Some(ExprType::null());
            }
            // Division by zero yields NULL.
            let nullable = nullable || matches!(op, BinOp::Div | BinOp::Mod);
            Some(ExprType::new(widen(left.ty, right.ty), nullable))
        }
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Like => {
            if either_null {
                return Some(ExprType::null());
            }
            Some(ExprType::boolean(nullable))
        }
        BinOp::Concat => {
            if either_null {
                return Some(ExprType::null());
            }
            Some(ExprType::new(CompositeType::string(), nullable))
        }
    }
}

/// Widened numeric type of an arithmetic operation.
///
/// INT widths take the maximum. Any FLOAT operand makes the result a FLOAT
/// of the widest FLOAT operand. BOOLEAN counts as a 1-byte INT and
/// TIMESTAMP as an 8-byte INT.
pub fn widen(left: CompositeType, right: CompositeType) -> CompositeType {
    let left = arith_operand(left);
    let right = arith_operand(right);
    match (left.kind(), right.kind()) {
        (DataKind::Float, DataKind::Float) => CompositeType::float(left.size().max(right.size())),
        (DataKind::Float, _) => left,
        (_, DataKind::Float) => right,
        _ => CompositeType::int(left.size().max(right.size())),
    }
}

fn arith_operand(ty: CompositeType) -> CompositeType {
    match ty.kind() {
        DataKind::Boolean => CompositeType::int(1),
        DataKind::Timestamp => CompositeType::int(8),
        _ => ty,
    }
}

/// Postfix checks are total: the result is never NULL.
pub fn postfix() -> ExprType {
    ExprType::boolean(false)
}

/// Type of a function call.
pub fn function(func: Function, args: &[ExprType]) -> Option<ExprType> {
    if args.len() != func.arity() {
        return None;
    }
    match func {
        Function::CountAll | Function::Count => {
            Some(ExprType::new(CompositeType::int(8), false))
        }
        Function::Abs => unary(UnaryOp::Plus, args[0]),
        Function::Length => {
            let arg = args[0];
            if arg.is_null() {
                Some(ExprType::null())
            } else {
                Some(ExprType::new(CompositeType::int(8), arg.nullable))
            }
        }
        Function::Upper | Function::Lower => {
            let arg = args[0];
            if arg.is_null() {
                Some(ExprType::null())
            } else {
                Some(ExprType::new(CompositeType::string(), arg.nullable))
            }
        }
        Function::Coalesce => {
            let (first, second) = (args[0], args[1]);
            let ty = common_type(first, second)?;
            Some(ExprType::new(ty, first.nullable && second.nullable))
        }
        Function::Sum => {
            let arg = args[0];
            if !arg.is_numeric() {
                return None;
            }
            if arg.is_null() {
                return Some(ExprType::null());
            }
            // An empty group sums to NULL.
            let ty = match widen(arg.ty, arg.ty).kind() {
                DataKind::Float => CompositeType::float(8),
                _ => CompositeType::int(8),
            };
            Some(ExprType::new(ty, true))
        }
        Function::Min | Function::Max => {
            let arg = args[0];
            if arg.is_null() {
                Some(ExprType::null())
            } else {
                Some(ExprType::new(arg.ty, true))
            }
        }
    }
}

/// `x BETWEEN low AND high` is not null-propagating.
pub fn between(expr: ExprType, low: ExprType, high: ExprType) -> ExprType {
    ExprType::boolean(expr.nullable || low.nullable || high.nullable)
}

/// `x IN (list)` is not null-propagating.
pub fn in_list(expr: ExprType, list: &[ExprType]) -> ExprType {
    ExprType::boolean(expr.nullable || list.iter().any(|t| t.nullable))
}

/// Type of `CASE WHEN condition THEN then ELSE otherwise END`.
pub fn case(condition: ExprType, then: ExprType, otherwise: ExprType) -> Option<ExprType> {
    if !condition.is_predicate() {
        return None;
    }
    let ty = common_type(then, otherwise)?;
    Some(ExprType::new(ty, then.nullable || otherwise.nullable))
}

/// Result type of a choice between two values (CASE branches, COALESCE).
fn common_type(a: ExprType, b: ExprType) -> Option<CompositeType> {
    if a.is_null() {
        Some(b.ty)
    } else if b.is_null() || a.ty == b.ty {
        Some(a.ty)
    } else if a.ty.is_numeric() && b.ty.is_numeric() {
        Some(widen(a.ty, b.ty))
    } else {
        None
    }
}
