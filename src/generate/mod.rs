//! Random SQL generation.
//!
//! All choices draw from the [`crate::context::Context`] passed in and all
//! probabilities, ranges and weights come from the
//! [`crate::policy::Policy`]. Generator functions never keep their own
//! randomness, so a seed fully determines the output.

pub mod expr;
pub mod literal;
pub mod select;
pub mod stmt;

pub use expr::{ExprGenerator, Target};
pub use select::synthesize_select;
