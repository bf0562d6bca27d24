//! AST types for generated SQL.
//!
//! Every expression node carries its inferred [`ExprType`]. Nodes are built
//! through the checked constructors on [`Expr`], which consult the rule table
//! in [`crate::typing`]; a combination without a rule is a generator defect.
//! All compound nodes render fully parenthesized, so operator precedence of
//! the backend never changes the meaning of a tree.

use std::fmt;
use std::ops::Not;

use itertools::Itertools;

use crate::error::GenError;
use crate::schema::{Column, CompositeType, DataKind};
use crate::typing;

// =============================================================================
// Types
// =============================================================================

/// Result type of an expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprType {
    pub ty: CompositeType,
    pub nullable: bool,
}

impl ExprType {
    pub fn new(ty: CompositeType, nullable: bool) -> Self {
        Self { ty, nullable }
    }

    /// The type of a bare NULL.
    pub fn null() -> Self {
        Self {
            ty: CompositeType::null(),
            nullable: true,
        }
    }

    pub fn boolean(nullable: bool) -> Self {
        Self {
            ty: CompositeType::boolean(),
            nullable,
        }
    }

    pub fn kind(&self) -> DataKind {
        self.ty.kind()
    }

    pub fn is_null(&self) -> bool {
        self.ty.is_null()
    }

    /// Whether values of this type live in the tri-state boolean domain.
    pub fn is_predicate(&self) -> bool {
        matches!(self.kind(), DataKind::Boolean | DataKind::Null)
    }

    /// Whether values of this type can take part in arithmetic.
    pub fn is_numeric(&self) -> bool {
        self.ty.is_numeric() || self.is_null()
    }
}

impl fmt::Display for ExprType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() || !self.nullable {
            write!(f, "{}", self.ty)
        } else {
            write!(f, "{}?", self.ty)
        }
    }
}

/// SQL three-valued truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriState {
    True,
    False,
    Unknown,
}

impl TriState {
    pub const ALL: [TriState; 3] = [TriState::True, TriState::False, TriState::Unknown];

    pub fn and(self, other: TriState) -> TriState {
        match (self, other) {
            (TriState::False, _) | (_, TriState::False) => TriState::False,
            (TriState::True, TriState::True) => TriState::True,
            _ => TriState::Unknown,
        }
    }

    pub fn or(self, other: TriState) -> TriState {
        match (self, other) {
            (TriState::True, _) | (_, TriState::True) => TriState::True,
            (TriState::False, TriState::False) => TriState::False,
            _ => TriState::Unknown,
        }
    }

    /// Truth of `x IS NULL` for a predicate `x` with this truth.
    pub fn is_unknown(self) -> TriState {
        if self == TriState::Unknown {
            TriState::True
        } else {
            TriState::False
        }
    }
}

impl Not for TriState {
    type Output = TriState;

    fn not(self) -> TriState {
        match self {
            TriState::True => TriState::False,
            TriState::False => TriState::True,
            TriState::Unknown => TriState::Unknown,
        }
    }
}

impl From<Option<bool>> for TriState {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => TriState::True,
            Some(false) => TriState::False,
            None => TriState::Unknown,
        }
    }
}

// =============================================================================
// Expressions
// =============================================================================

/// A SQL expression.
#[derive(Debug, Clone, PartialEq, strum::EnumDiscriminants)]
#[strum_discriminants(name(ExprKind))]
#[strum_discriminants(derive(Hash, PartialOrd, Ord, strum::EnumIter, strum::Display))]
pub enum Expr {
    Column(ColumnRef),
    Literal(Literal),
    UnaryOp(Box<UnaryOpExpr>),
    BinaryOp(Box<BinaryOpExpr>),
    Postfix(Box<PostfixExpr>),
    FunctionCall(FunctionCallExpr),
    Between(Box<BetweenExpr>),
    InList(Box<InListExpr>),
    Case(Box<CaseExpr>),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) => write!(f, "{c}"),
            Expr::Literal(l) => write!(f, "{l}"),
            Expr::UnaryOp(u) => write!(f, "{u}"),
            Expr::BinaryOp(b) => write!(f, "{b}"),
            Expr::Postfix(p) => write!(f, "{p}"),
            Expr::FunctionCall(fc) => write!(f, "{fc}"),
            Expr::Between(b) => write!(f, "{b}"),
            Expr::InList(i) => write!(f, "{i}"),
            Expr::Case(c) => write!(f, "{c}"),
        }
    }
}

fn no_rule(what: impl fmt::Display) -> GenError {
    GenError::invariant("type rules", format!("no type rule for {what}"))
}

impl Expr {
    pub fn column(column: ColumnRef) -> Self {
        Expr::Column(column)
    }

    pub fn literal(literal: Literal) -> Self {
        Expr::Literal(literal)
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Result<Self, GenError> {
        let ty = typing::unary(op, operand.ty())
            .ok_or_else(|| no_rule(format_args!("{op} {}", operand.ty())))?;
        Ok(Expr::UnaryOp(Box::new(UnaryOpExpr { op, operand, ty })))
    }

    pub fn binary(left: Expr, op: BinOp, right: Expr) -> Result<Self, GenError> {
        let ty = typing::binary(op, left.ty(), right.ty())
            .ok_or_else(|| no_rule(format_args!("{} {op} {}", left.ty(), right.ty())))?;
        Ok(Expr::BinaryOp(Box::new(BinaryOpExpr {
            left,
            op,
            right,
            ty,
        })))
    }

    pub fn postfix(operand: Expr, op: PostfixOp) -> Self {
        Expr::Postfix(Box::new(PostfixExpr { operand, op }))
    }

    pub fn function(func: Function, args: Vec<Expr>) -> Result<Self, GenError> {
        let arg_types: Vec<ExprType> = args.iter().map(Expr::ty).collect();
        let ty = typing::function(func, &arg_types)
            .ok_or_else(|| no_rule(format_args!("{}({})", func, arg_types.iter().join(", "))))?;
        Ok(Expr::FunctionCall(FunctionCallExpr { func, args, ty }))
    }

    pub fn between(expr: Expr, low: Expr, high: Expr, negated: bool) -> Self {
        let ty = typing::between(expr.ty(), low.ty(), high.ty());
        Expr::Between(Box::new(BetweenExpr {
            expr,
            low,
            high,
            negated,
            ty,
        }))
    }

    pub fn in_list(expr: Expr, list: Vec<Expr>, negated: bool) -> Result<Self, GenError> {
        if list.is_empty() {
            return Err(GenError::invariant("in list", "empty IN list"));
        }
        let list_types: Vec<ExprType> = list.iter().map(Expr::ty).collect();
        let ty = typing::in_list(expr.ty(), &list_types);
        Ok(Expr::InList(Box::new(InListExpr {
            expr,
            list,
            negated,
            ty,
        })))
    }

    /// `CASE WHEN condition THEN then ELSE otherwise END`.
    pub fn case(condition: Expr, then: Expr, otherwise: Expr) -> Result<Self, GenError> {
        let ty = typing::case(condition.ty(), then.ty(), otherwise.ty())
            .ok_or_else(|| no_rule(format_args!("CASE WHEN {}", condition.ty())))?;
        Ok(Expr::Case(Box::new(CaseExpr {
            condition,
            then,
            otherwise,
            ty,
        })))
    }

    /// `NOT self`.
    pub fn negated(self) -> Result<Self, GenError> {
        Self::unary(UnaryOp::Not, self)
    }

    /// The expression whose truth is TRUE exactly on the rows where `self`
    /// has the given truth: `P`, `NOT P` or `P IS NULL`.
    pub fn partition(&self, truth: TriState) -> Result<Self, GenError> {
        if !self.ty().is_predicate() {
            return Err(GenError::invariant(
                "partition",
                format!("predicate of type {} is not tri-state", self.ty()),
            ));
        }
        match truth {
            TriState::True => Ok(self.clone()),
            TriState::False => self.clone().negated(),
            TriState::Unknown => Ok(Self::postfix(self.clone(), PostfixOp::IsNull)),
        }
    }

    /// Inferred result type of this node.
    pub fn ty(&self) -> ExprType {
        match self {
            Expr::Column(c) => c.ty,
            Expr::Literal(l) => l.expr_type(),
            Expr::UnaryOp(u) => u.ty,
            Expr::BinaryOp(b) => b.ty,
            Expr::Postfix(_) => typing::postfix(),
            Expr::FunctionCall(fc) => fc.ty,
            Expr::Between(b) => b.ty,
            Expr::InList(i) => i.ty,
            Expr::Case(c) => c.ty,
        }
    }

    pub fn kind(&self) -> ExprKind {
        ExprKind::from(self)
    }

    /// Nesting depth; leaves have depth 0.
    pub fn depth(&self) -> usize {
        let children = self.children();
        children
            .iter()
            .map(|c| c.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Whether an aggregate call appears anywhere in the tree.
    pub fn contains_aggregate(&self) -> bool {
        if let Expr::FunctionCall(fc) = self {
            if fc.func.is_aggregate() {
                return true;
            }
        }
        self.children().iter().any(|c| c.contains_aggregate())
    }

    fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Column(_) | Expr::Literal(_) => vec![],
            Expr::UnaryOp(u) => vec![&u.operand],
            Expr::BinaryOp(b) => vec![&b.left, &b.right],
            Expr::Postfix(p) => vec![&p.operand],
            Expr::FunctionCall(fc) => fc.args.iter().collect(),
            Expr::Between(b) => vec![&b.expr, &b.low, &b.high],
            Expr::InList(i) => std::iter::once(&i.expr).chain(i.list.iter()).collect(),
            Expr::Case(c) => vec![&c.condition, &c.then, &c.otherwise],
        }
    }
}

/// A column reference, always qualified with its table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
    pub ty: ExprType,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>, ty: ExprType) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            ty,
        }
    }
}

impl From<&Column> for ColumnRef {
    fn from(column: &Column) -> Self {
        Self::new(
            column.table(),
            &column.name,
            ExprType::new(column.ty, column.nullable),
        )
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// A literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
}

/// A literal with the type it was generated for.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub value: LiteralValue,
    pub ty: CompositeType,
}

impl Literal {
    pub fn null() -> Self {
        Self {
            value: LiteralValue::Null,
            ty: CompositeType::null(),
        }
    }

    pub fn integer(value: i64, size: u8) -> Self {
        Self {
            value: LiteralValue::Integer(value),
            ty: CompositeType::int(size),
        }
    }

    pub fn real(value: f64, size: u8) -> Self {
        Self {
            value: LiteralValue::Real(value),
            ty: CompositeType::float(size),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: LiteralValue::Text(value.into()),
            ty: CompositeType::string(),
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self {
            value: LiteralValue::Boolean(value),
            ty: CompositeType::boolean(),
        }
    }

    pub fn timestamp(value: i64) -> Self {
        Self {
            value: LiteralValue::Integer(value),
            ty: CompositeType::timestamp(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.value, LiteralValue::Null)
    }

    pub fn expr_type(&self) -> ExprType {
        if self.is_null() {
            ExprType::null()
        } else {
            ExprType::new(self.ty, false)
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            LiteralValue::Null => write!(f, "NULL"),
            LiteralValue::Integer(i) => write!(f, "{i}"),
            LiteralValue::Real(r) => {
                if r.is_infinite() || r.is_nan() {
                    write!(f, "NULL")
                } else {
                    // Debug keeps the decimal point, so the backend parses a real.
                    write!(f, "{r:?}")
                }
            }
            LiteralValue::Text(s) => {
                let escaped = s.replace('\'', "''");
                write!(f, "'{escaped}'")
            }
            LiteralValue::Boolean(true) => write!(f, "TRUE"),
            LiteralValue::Boolean(false) => write!(f, "FALSE"),
        }
    }
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Negate,
    Plus,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "NOT"),
            UnaryOp::Negate => write!(f, "-"),
            UnaryOp::Plus => write!(f, "+"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryOpExpr {
    pub op: UnaryOp,
    pub operand: Expr,
    pub ty: ExprType,
}

impl fmt::Display for UnaryOpExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The space keeps `- -1` from turning into a line comment.
        write!(f, "({} {})", self.op, self.operand)
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    And,
    Or,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // String
    Concat,
    Like,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinOp::Eq => write!(f, "="),
            BinOp::Ne => write!(f, "!="),
            BinOp::Lt => write!(f, "<"),
            BinOp::Le => write!(f, "<="),
            BinOp::Gt => write!(f, ">"),
            BinOp::Ge => write!(f, ">="),
            BinOp::And => write!(f, "AND"),
            BinOp::Or => write!(f, "OR"),
            BinOp::Add => write!(f, "+"),
            BinOp::Sub => write!(f, "-"),
            BinOp::Mul => write!(f, "*"),
            BinOp::Div => write!(f, "/"),
            BinOp::Mod => write!(f, "%"),
            BinOp::Concat => write!(f, "||"),
            BinOp::Like => write!(f, "LIKE"),
        }
    }
}

impl BinOp {
    pub fn comparison() -> &'static [BinOp] {
        &[
            BinOp::Eq,
            BinOp::Ne,
            BinOp::Lt,
            BinOp::Le,
            BinOp::Gt,
            BinOp::Ge,
        ]
    }

    pub fn logical() -> &'static [BinOp] {
        &[BinOp::And, BinOp::Or]
    }

    pub fn arithmetic() -> &'static [BinOp] {
        &[BinOp::Add, BinOp::Sub, BinOp::Mul, BinOp::Div, BinOp::Mod]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOpExpr {
    pub left: Expr,
    pub op: BinOp,
    pub right: Expr,
    pub ty: ExprType,
}

impl fmt::Display for BinaryOpExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.left, self.op, self.right)
    }
}

/// Postfix truth checks. These never evaluate to NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostfixOp {
    IsNull,
    IsNotNull,
    IsTrue,
    IsFalse,
}

impl fmt::Display for PostfixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostfixOp::IsNull => write!(f, "IS NULL"),
            PostfixOp::IsNotNull => write!(f, "IS NOT NULL"),
            PostfixOp::IsTrue => write!(f, "IS TRUE"),
            PostfixOp::IsFalse => write!(f, "IS FALSE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostfixExpr {
    pub operand: Expr,
    pub op: PostfixOp,
}

impl fmt::Display for PostfixExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {})", self.operand, self.op)
    }
}

/// Functions the generator knows how to type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum Function {
    Abs,
    Length,
    Upper,
    Lower,
    Coalesce,
    /// `COUNT(*)`
    CountAll,
    Count,
    Sum,
    Min,
    Max,
}

impl Function {
    pub fn name(&self) -> &'static str {
        match self {
            Function::Abs => "ABS",
            Function::Length => "LENGTH",
            Function::Upper => "UPPER",
            Function::Lower => "LOWER",
            Function::Coalesce => "COALESCE",
            Function::CountAll | Function::Count => "COUNT",
            Function::Sum => "SUM",
            Function::Min => "MIN",
            Function::Max => "MAX",
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            Function::CountAll | Function::Count | Function::Sum | Function::Min | Function::Max
        )
    }

    pub fn arity(&self) -> usize {
        match self {
            Function::CountAll => 0,
            Function::Coalesce => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallExpr {
    pub func: Function,
    pub args: Vec<Expr>,
    pub ty: ExprType,
}

impl fmt::Display for FunctionCallExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.func == Function::CountAll {
            return write!(f, "COUNT(*)");
        }
        write!(f, "{}({})", self.func, self.args.iter().join(", "))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BetweenExpr {
    pub expr: Expr,
    pub low: Expr,
    pub high: Expr,
    pub negated: bool,
    pub ty: ExprType,
}

impl fmt::Display for BetweenExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let not = if self.negated { "NOT " } else { "" };
        write!(
            f,
            "({} {not}BETWEEN {} AND {})",
            self.expr, self.low, self.high
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InListExpr {
    pub expr: Expr,
    pub list: Vec<Expr>,
    pub negated: bool,
    pub ty: ExprType,
}

impl fmt::Display for InListExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let not = if self.negated { "NOT " } else { "" };
        write!(f, "({} {not}IN ({}))", self.expr, self.list.iter().join(", "))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseExpr {
    pub condition: Expr,
    pub then: Expr,
    pub otherwise: Expr,
    pub ty: ExprType,
}

impl fmt::Display for CaseExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(CASE WHEN {} THEN {} ELSE {} END)",
            self.condition, self.then, self.otherwise
        )
    }
}

// =============================================================================
// Queries
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub name: String,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// An entry of the FROM list.
#[derive(Debug, Clone, PartialEq)]
pub enum FromItem {
    Table(TableRef),
    Subquery { select: Box<Select>, alias: String },
}

impl fmt::Display for FromItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FromItem::Table(t) => write!(f, "{t}"),
            FromItem::Subquery { select, alias } => write!(f, "({select}) AS {alias}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    Left,
    Cross,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinKind::Inner => write!(f, "INNER JOIN"),
            JoinKind::Left => write!(f, "LEFT JOIN"),
            JoinKind::Cross => write!(f, "CROSS JOIN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: TableRef,
    pub on: Option<Expr>,
}

impl fmt::Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.table)?;
        if let Some(on) = &self.on {
            write!(f, " ON {on}")?;
        }
        Ok(())
    }
}

/// Optimizer hint rendered as a comment right after `SELECT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannerHint {
    IndexMerge { table: String, indexes: Vec<String> },
}

impl fmt::Display for PlannerHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlannerHint::IndexMerge { table, indexes } => {
                write!(
                    f,
                    "/*+ USE_INDEX_MERGE({table}, {}) */",
                    indexes.iter().join(", ")
                )
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForClause {
    Update,
    Share,
}

impl fmt::Display for ForClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForClause::Update => write!(f, "FOR UPDATE"),
            ForClause::Share => write!(f, "FOR SHARE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn aliased(expr: Expr, alias: impl Into<String>) -> Self {
        Self {
            expr,
            alias: Some(alias.into()),
        }
    }
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {alias}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupBy {
    pub exprs: Vec<Expr>,
    pub having: Option<Expr>,
}

/// A SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub hint: Option<PlannerHint>,
    pub distinct: bool,
    pub fetch: Vec<SelectItem>,
    pub from: Vec<FromItem>,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expr>,
    pub group_by: Option<GroupBy>,
    pub for_clause: Option<ForClause>,
}

impl Select {
    pub fn new(fetch: Vec<SelectItem>, from: Vec<FromItem>) -> Self {
        Self {
            hint: None,
            distinct: false,
            fetch,
            from,
            joins: Vec::new(),
            where_clause: None,
            group_by: None,
            for_clause: None,
        }
    }

    /// Copy of this query with the given WHERE predicate.
    pub fn with_where(&self, predicate: Option<Expr>) -> Self {
        Self {
            where_clause: predicate,
            ..self.clone()
        }
    }

    /// Copy of this query with the given HAVING predicate. No-op without GROUP BY.
    pub fn with_having(&self, predicate: Option<Expr>) -> Self {
        let mut select = self.clone();
        if let Some(group_by) = &mut select.group_by {
            group_by.having = predicate;
        }
        select
    }
}

impl fmt::Display for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT ")?;
        if let Some(hint) = &self.hint {
            write!(f, "{hint} ")?;
        }
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        write!(f, "{}", self.fetch.iter().join(", "))?;

        if !self.from.is_empty() {
            write!(f, " FROM {}", self.from.iter().join(", "))?;
        }
        for join in &self.joins {
            write!(f, " {join}")?;
        }
        if let Some(predicate) = &self.where_clause {
            write!(f, " WHERE {predicate}")?;
        }
        if let Some(group_by) = &self.group_by {
            write!(f, " GROUP BY {}", group_by.exprs.iter().join(", "))?;
            if let Some(having) = &group_by.having {
                write!(f, " HAVING {having}")?;
            }
        }
        if let Some(for_clause) = &self.for_clause {
            write!(f, " {for_clause}")?;
        }
        Ok(())
    }
}

// =============================================================================
// Statements
// =============================================================================

/// A statement issued by the action scheduler.
#[derive(Debug, Clone, PartialEq, strum::EnumDiscriminants)]
#[strum_discriminants(name(StmtKind))]
#[strum_discriminants(derive(Hash, PartialOrd, Ord, strum::EnumIter, strum::Display))]
pub enum Stmt {
    CreateTable(CreateTableStmt),
    Insert(InsertStmt),
    CreateIndex(CreateIndexStmt),
    AlterTable(AlterTableStmt),
    CreateView(CreateViewStmt),
    Delete(DeleteStmt),
    DropTable(DropTableStmt),
}

impl Stmt {
    /// Whether the schema must be introspected again after this statement.
    pub fn changes_schema(&self) -> bool {
        matches!(
            self,
            Stmt::CreateTable(_)
                | Stmt::CreateIndex(_)
                | Stmt::AlterTable(_)
                | Stmt::CreateView(_)
                | Stmt::DropTable(_)
        )
    }

    pub fn kind(&self) -> StmtKind {
        StmtKind::from(self)
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::CreateTable(s) => write!(f, "{s}"),
            Stmt::Insert(s) => write!(f, "{s}"),
            Stmt::CreateIndex(s) => write!(f, "{s}"),
            Stmt::AlterTable(s) => write!(f, "{s}"),
            Stmt::CreateView(s) => write!(f, "{s}"),
            Stmt::Delete(s) => write!(f, "{s}"),
            Stmt::DropTable(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefStmt {
    pub name: String,
    pub ty: CompositeType,
    pub not_null: bool,
}

impl fmt::Display for ColumnDefStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.ty)?;
        if self.not_null {
            write!(f, " NOT NULL")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTableStmt {
    pub name: String,
    pub columns: Vec<ColumnDefStmt>,
}

impl fmt::Display for CreateTableStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CREATE TABLE {} ({})",
            self.name,
            self.columns.iter().join(", ")
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStmt {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Literal>>,
}

impl fmt::Display for InsertStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "INSERT INTO {} ({}) VALUES ",
            self.table,
            self.columns.join(", ")
        )?;
        let rows = self
            .rows
            .iter()
            .map(|row| format!("({})", row.iter().join(", ")))
            .join(", ");
        f.write_str(&rows)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIndexStmt {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl fmt::Display for CreateIndexStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unique = if self.unique { "UNIQUE " } else { "" };
        write!(
            f,
            "CREATE {unique}INDEX {} ON {} ({})",
            self.name,
            self.table,
            self.columns.join(", ")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlterTableStmt {
    pub table: String,
    pub column: ColumnDefStmt,
}

impl fmt::Display for AlterTableStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ALTER TABLE {} ADD COLUMN {}", self.table, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateViewStmt {
    pub name: String,
    pub select: Box<Select>,
}

impl fmt::Display for CreateViewStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CREATE VIEW {} AS {}", self.name, self.select)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStmt {
    pub table: String,
    pub where_clause: Option<Expr>,
}

impl fmt::Display for DeleteStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DELETE FROM {}", self.table)?;
        if let Some(predicate) = &self.where_clause {
            write!(f, " WHERE {predicate}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTableStmt {
    pub name: String,
    pub is_view: bool,
}

impl fmt::Display for DropTableStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_view {
            write!(f, "DROP VIEW {}", self.name)
        } else {
            write!(f, "DROP TABLE {}", self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, ty: CompositeType, nullable: bool) -> Expr {
        Expr::column(ColumnRef::new("t0", name, ExprType::new(ty, nullable)))
    }

    #[test]
    fn test_tri_state_truth_tables() {
        use TriState::*;
        assert_eq!(!Unknown, Unknown);
        assert_eq!(False.and(Unknown), False);
        assert_eq!(True.and(Unknown), Unknown);
        assert_eq!(True.or(Unknown), True);
        assert_eq!(False.or(Unknown), Unknown);
        assert_eq!(TriState::from(None), Unknown);

        // Each truth value lands in exactly one of P, NOT P, P IS NULL.
        for t in TriState::ALL {
            let hits = [t, !t, t.is_unknown()]
                .iter()
                .filter(|v| **v == True)
                .count();
            assert_eq!(hits, 1, "{t:?}");
        }
    }

    #[test]
    fn test_binary_display_is_parenthesized() {
        let a = col("c0", CompositeType::int(4), true);
        let gt = Expr::binary(a, BinOp::Gt, Expr::literal(Literal::integer(1, 4))).unwrap();
        assert_eq!(gt.to_string(), "(t0.c0 > 1)");
        assert_eq!(gt.ty(), ExprType::boolean(true));
        assert_eq!(gt.depth(), 1);

        let not = gt.clone().negated().unwrap();
        assert_eq!(not.to_string(), "(NOT (t0.c0 > 1))");
        assert_eq!(not.depth(), 2);

        let neg = Expr::unary(UnaryOp::Negate, Expr::literal(Literal::integer(-1, 4))).unwrap();
        assert_eq!(neg.to_string(), "(- -1)");
    }

    #[test]
    fn test_partition_shapes() {
        let p = Expr::binary(
            col("c0", CompositeType::int(4), true),
            BinOp::Gt,
            Expr::literal(Literal::integer(1, 4)),
        )
        .unwrap();
        let parts: Vec<String> = TriState::ALL
            .iter()
            .map(|t| p.partition(*t).unwrap().to_string())
            .collect();
        assert_eq!(
            parts,
            vec![
                "(t0.c0 > 1)",
                "(NOT (t0.c0 > 1))",
                "((t0.c0 > 1) IS NULL)"
            ]
        );

        let not_predicate = col("c1", CompositeType::string(), true);
        assert!(not_predicate.partition(TriState::False).is_err());
    }

    #[test]
    fn test_literal_display() {
        assert_eq!(Literal::null().to_string(), "NULL");
        assert_eq!(Literal::real(3.0, 8).to_string(), "3.0");
        assert_eq!(Literal::real(f64::NAN, 8).to_string(), "NULL");
        assert_eq!(Literal::text("it's").to_string(), "'it''s'");
        assert_eq!(Literal::boolean(true).to_string(), "TRUE");
        assert_eq!(Literal::null().expr_type(), ExprType::null());
        assert!(!Literal::integer(0, 1).expr_type().nullable);
    }

    #[test]
    fn test_select_display() {
        let c0 = ColumnRef::new("t0", "c0", ExprType::new(CompositeType::int(4), true));
        let c1 = ColumnRef::new("t1", "c0", ExprType::new(CompositeType::string(), true));
        let on = Expr::binary(
            Expr::column(c0.clone()),
            BinOp::Eq,
            Expr::column(c1.clone()),
        )
        .unwrap();
        let mut select = Select::new(
            vec![SelectItem::new(Expr::column(c0.clone()))],
            vec![FromItem::Table(TableRef::new("t0"))],
        );
        select.joins.push(Join {
            kind: JoinKind::Left,
            table: TableRef::new("t1"),
            on: Some(on),
        });
        select.hint = Some(PlannerHint::IndexMerge {
            table: "t0".into(),
            indexes: vec!["i0".into(), "i1".into()],
        });
        select.distinct = true;
        assert_eq!(
            select.to_string(),
            "SELECT /*+ USE_INDEX_MERGE(t0, i0, i1) */ DISTINCT t0.c0 FROM t0 LEFT JOIN t1 ON (t0.c0 = t1.c0)"
        );

        let filtered = select.with_where(Some(Expr::postfix(
            Expr::column(c1),
            PostfixOp::IsNotNull,
        )));
        assert!(filtered.to_string().ends_with("WHERE (t1.c0 IS NOT NULL)"));
        assert!(select.where_clause.is_none());
    }

    #[test]
    fn test_count_all_display() {
        let count = Expr::function(Function::CountAll, vec![]).unwrap();
        assert_eq!(count.to_string(), "COUNT(*)");
        assert!(count.contains_aggregate());
        assert!(!count.ty().nullable);
    }

    #[test]
    fn test_stmt_display() {
        let create = Stmt::CreateTable(CreateTableStmt {
            name: "t0".into(),
            columns: vec![
                ColumnDefStmt {
                    name: "c0".into(),
                    ty: CompositeType::int(8),
                    not_null: false,
                },
                ColumnDefStmt {
                    name: "c1".into(),
                    ty: CompositeType::string(),
                    not_null: true,
                },
            ],
        });
        assert_eq!(
            create.to_string(),
            "CREATE TABLE t0 (c0 BIGINT, c1 VARCHAR NOT NULL)"
        );
        assert!(create.changes_schema());

        let insert = Stmt::Insert(InsertStmt {
            table: "t0".into(),
            columns: vec!["c0".into(), "c1".into()],
            rows: vec![
                vec![Literal::integer(1, 8), Literal::text("a")],
                vec![Literal::null(), Literal::text("")],
            ],
        });
        assert_eq!(
            insert.to_string(),
            "INSERT INTO t0 (c0, c1) VALUES (1, 'a'), (NULL, '')"
        );
        assert!(!insert.changes_schema());
        assert_eq!(insert.kind(), StmtKind::Insert);
    }
}
