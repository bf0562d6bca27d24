//! Literal value generation.

use crate::ast::Literal;
use crate::context::Context;
use crate::policy::LiteralConfig;
use crate::schema::{CompositeType, DataKind};

/// Generate a literal of the given type.
///
/// NULL and edge values are drawn with the probabilities of `config`.
pub fn generate_literal(ctx: &mut Context, ty: CompositeType, config: &LiteralConfig) -> Literal {
    if ty.is_null() || ctx.gen_bool_with_prob(config.null_probability) {
        return Literal::null();
    }
    if ctx.gen_bool_with_prob(config.edge_probability) {
        return edge_literal(ctx, ty);
    }

    match ty.kind() {
        DataKind::Int => {
            let (lo, hi) = int_bounds(ty.size());
            let value = ctx.gen_i64_range(config.int_min.max(lo), config.int_max.min(hi));
            Literal::integer(value, ty.size())
        }
        DataKind::Float => {
            let value = ctx.gen_f64_range(config.real_min, config.real_max);
            Literal::real((value * 1000.0).round() / 1000.0, ty.size())
        }
        DataKind::String => {
            let len = ctx.gen_range_inclusive(0, config.string_max_len);
            Literal::text(ctx.gen_string(len))
        }
        DataKind::Boolean => Literal::boolean(ctx.gen_bool()),
        DataKind::Timestamp => Literal::timestamp(ctx.gen_i64_range(0, config.timestamp_max)),
        DataKind::Null => Literal::null(),
    }
}

/// Boundary values that tend to expose overflow and comparison bugs.
pub fn edge_literal(ctx: &mut Context, ty: CompositeType) -> Literal {
    match ty.kind() {
        DataKind::Int => {
            let (lo, hi) = int_bounds(ty.size());
            let value = *ctx.choose(&[0, -1, lo, hi]).unwrap_or(&0);
            Literal::integer(value, ty.size())
        }
        DataKind::Float => {
            let max = if ty.size() == 4 {
                f32::MAX as f64
            } else {
                f64::MAX
            };
            let value = *ctx.choose(&[0.0, -0.5, max]).unwrap_or(&0.0);
            Literal::real(value, ty.size())
        }
        DataKind::String => {
            if ctx.gen_bool() {
                Literal::text("")
            } else {
                Literal::text("'")
            }
        }
        DataKind::Boolean => Literal::boolean(ctx.gen_bool()),
        DataKind::Timestamp => Literal::timestamp(0),
        DataKind::Null => Literal::null(),
    }
}

/// Value range of an INT of the given width in bytes.
pub fn int_bounds(size: u8) -> (i64, i64) {
    match size {
        1 => (i8::MIN as i64, i8::MAX as i64),
        2 => (i16::MIN as i64, i16::MAX as i64),
        4 => (i32::MIN as i64, i32::MAX as i64),
        _ => (i64::MIN, i64::MAX),
    }
}
