//! Syntax tree for the Postgres subset emitted by the analytics SQL generator.
//!
//! Every node keeps the verbatim source slice it was parsed from in `text`.
//! Slices never include surrounding whitespace, so a node's byte range in the
//! statement is recoverable from the slice alone.

/// A complete statement: one query with an optional trailing `;`.
#[derive(Debug, PartialEq, Clone)]
pub struct Statement<'a> {
    pub query: Query<'a>,
    pub text: &'a str,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Query<'a> {
    pub with_clause: Option<WithClause<'a>>,
    pub body: SetExpr<'a>,
    pub order_by: Vec<OrderByItem<'a>>,
    pub limit: Option<LimitValue<'a>>,
    pub offset: Option<Expression<'a>>,
    pub text: &'a str,
}

#[derive(Debug, PartialEq, Clone)]
pub struct WithClause<'a> {
    pub recursive: bool,
    pub ctes: Vec<CommonTableExpression<'a>>,
    pub text: &'a str,
}

#[derive(Debug, PartialEq, Clone)]
pub struct CommonTableExpression<'a> {
    pub name: Identifier<'a>,
    pub columns: Vec<Identifier<'a>>,
    /// `Some(true)` for `MATERIALIZED`, `Some(false)` for `NOT MATERIALIZED`.
    pub materialized: Option<bool>,
    pub query: Box<Query<'a>>,
    pub text: &'a str,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum SetOperator {
    Union,
    Intersect,
    Except,
}

#[derive(Debug, PartialEq, Clone)]
pub enum SetExpr<'a> {
    Select(Box<Select<'a>>),
    SetOperation {
        op: SetOperator,
        all: bool,
        left: Box<SetExpr<'a>>,
        right: Box<SetExpr<'a>>,
    },
    /// Parenthesized query used as a set operand.
    Query(Box<Query<'a>>),
}

#[derive(Debug, PartialEq, Clone)]
pub enum Distinct<'a> {
    Distinct,
    On(Vec<Expression<'a>>),
}

#[derive(Debug, PartialEq, Clone)]
pub struct Select<'a> {
    pub distinct: Option<Distinct<'a>>,
    pub projection: Vec<SelectItem<'a>>,
    pub from: Vec<TableWithJoins<'a>>,
    pub where_clause: Option<Expression<'a>>,
    pub group_by: Vec<Expression<'a>>,
    pub having: Option<Expression<'a>>,
    pub text: &'a str,
}

#[derive(Debug, PartialEq, Clone)]
pub enum SelectItem<'a> {
    /// Bare `*`.
    Wildcard { text: &'a str },
    /// `alias.*`
    QualifiedWildcard {
        qualifier: ObjectName<'a>,
        text: &'a str,
    },
    Expr {
        expr: Expression<'a>,
        alias: Option<Identifier<'a>>,
        text: &'a str,
    },
}

#[derive(Debug, PartialEq, Clone)]
pub struct TableWithJoins<'a> {
    pub relation: TableFactor<'a>,
    pub joins: Vec<Join<'a>>,
    pub text: &'a str,
}

#[derive(Debug, PartialEq, Clone)]
pub struct TableAlias<'a> {
    pub name: Identifier<'a>,
    pub columns: Vec<Identifier<'a>>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum TableFactor<'a> {
    Table {
        name: ObjectName<'a>,
        alias: Option<TableAlias<'a>>,
        text: &'a str,
    },
    Derived {
        lateral: bool,
        subquery: Box<Query<'a>>,
        alias: Option<TableAlias<'a>>,
        text: &'a str,
    },
    /// Set-returning function in `FROM`, e.g. `generate_series(1, 3) as g`.
    Function {
        lateral: bool,
        call: Expression<'a>,
        alias: Option<TableAlias<'a>>,
        text: &'a str,
    },
    NestedJoin {
        inner: Box<TableWithJoins<'a>>,
        alias: Option<TableAlias<'a>>,
        text: &'a str,
    },
}

impl<'a> TableFactor<'a> {
    pub fn alias(&self) -> Option<&TableAlias<'a>> {
        match self {
            TableFactor::Table { alias, .. }
            | TableFactor::Derived { alias, .. }
            | TableFactor::Function { alias, .. }
            | TableFactor::NestedJoin { alias, .. } => alias.as_ref(),
        }
    }

    pub fn text(&self) -> &'a str {
        match self {
            TableFactor::Table { text, .. }
            | TableFactor::Derived { text, .. }
            | TableFactor::Function { text, .. }
            | TableFactor::NestedJoin { text, .. } => text,
        }
    }

    /// Identifier the relation is referenced by: its alias, else the bare table name.
    pub fn binding(&self) -> Option<Identifier<'a>> {
        if let Some(alias) = self.alias() {
            return Some(alias.name);
        }
        match self {
            TableFactor::Table { name, .. } => name.parts.last().copied(),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum JoinOperator {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
    Cross,
}

#[derive(Debug, PartialEq, Clone)]
pub enum JoinConstraint<'a> {
    On(Expression<'a>),
    Using(Vec<Identifier<'a>>),
    Natural,
    None,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Join<'a> {
    pub operator: JoinOperator,
    pub relation: TableFactor<'a>,
    pub constraint: JoinConstraint<'a>,
    pub text: &'a str,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum OrderDirection {
    Asc,
    Desc,
}

#[derive(Debug, PartialEq, Clone)]
pub struct OrderByItem<'a> {
    pub expr: Expression<'a>,
    pub direction: Option<OrderDirection>,
    /// Verbatim `NULLS FIRST` / `NULLS LAST`.
    pub nulls: Option<&'a str>,
    pub text: &'a str,
}

#[derive(Debug, PartialEq, Clone)]
pub enum LimitValue<'a> {
    All,
    Count(Expression<'a>),
}

/// A possibly quoted identifier exactly as written.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Identifier<'a> {
    pub text: &'a str,
    pub quoted: bool,
}

impl Identifier<'_> {
    /// Name as the database resolves it: quoted names keep case, bare names fold to lower case.
    pub fn normalized(&self) -> String {
        if self.quoted {
            self.text[1..self.text.len() - 1].replace("\"\"", "\"")
        } else {
            self.text.to_lowercase()
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.normalized() == name
    }
}

/// Dotted name such as `analytics_event_ur1edk5oe2n` or `public."Table"`.
#[derive(Debug, PartialEq, Clone)]
pub struct ObjectName<'a> {
    pub parts: Vec<Identifier<'a>>,
    pub text: &'a str,
}

impl ObjectName<'_> {
    pub fn normalized(&self) -> String {
        self.parts
            .iter()
            .map(Identifier::normalized)
            .collect::<Vec<_>>()
            .join(".")
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct ColumnRef<'a> {
    pub parts: Vec<Identifier<'a>>,
}

impl<'a> ColumnRef<'a> {
    pub fn name(&self) -> Identifier<'a> {
        // parser guarantees at least one part
        self.parts[self.parts.len() - 1]
    }

    /// Relation qualifier of a two-part reference.
    pub fn qualifier(&self) -> Option<Identifier<'a>> {
        match self.parts.as_slice() {
            [qualifier, _] => Some(*qualifier),
            _ => None,
        }
    }

    pub fn is_bare(&self) -> bool {
        self.parts.len() == 1
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Literal<'a> {
    Number(&'a str),
    String(&'a str),
    Boolean(bool),
    Null,
    /// `date '2020-01-01'`, `interval '1 day'`
    Typed {
        data_type: &'a str,
        value: &'a str,
    },
    /// `current_date` and friends.
    SqlValue(&'a str),
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum BinaryOperator<'a> {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Exponent,
    Concat,
    Other(&'a str),
}

#[derive(Debug, PartialEq, Clone)]
pub enum IsTarget<'a> {
    Null,
    True,
    False,
    Unknown,
    DistinctFrom(Box<Expression<'a>>),
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum LikeOperator {
    Like,
    ILike,
    SimilarTo,
}

#[derive(Debug, PartialEq, Clone)]
pub struct WindowSpec<'a> {
    /// `OVER w` or `OVER (w ...)`.
    pub name: Option<Identifier<'a>>,
    pub partition_by: Vec<Expression<'a>>,
    pub order_by: Vec<OrderByItem<'a>>,
    /// Verbatim frame clause, e.g. `rows between unbounded preceding and current row`.
    pub frame: Option<&'a str>,
    pub text: &'a str,
}

#[derive(Debug, PartialEq, Clone)]
pub struct FunctionCall<'a> {
    pub name: ObjectName<'a>,
    pub distinct: bool,
    pub args: Vec<Expression<'a>>,
    /// Ordered-set `ORDER BY` inside the argument list or `WITHIN GROUP`.
    pub order_by: Vec<OrderByItem<'a>>,
    pub filter: Option<Box<Expression<'a>>>,
    pub over: Option<WindowSpec<'a>>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct CaseExpression<'a> {
    pub operand: Option<Box<Expression<'a>>>,
    pub branches: Vec<(Expression<'a>, Expression<'a>)>,
    pub else_result: Option<Box<Expression<'a>>>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum ExpressionKind<'a> {
    Column(ColumnRef<'a>),
    Literal(Literal<'a>),
    /// `$1` or `?`
    Parameter,
    /// `*` inside `count(*)`.
    Wildcard,
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expression<'a>>,
    },
    BinaryOp {
        left: Box<Expression<'a>>,
        op: BinaryOperator<'a>,
        right: Box<Expression<'a>>,
    },
    IsCheck {
        expr: Box<Expression<'a>>,
        negated: bool,
        target: IsTarget<'a>,
    },
    InList {
        expr: Box<Expression<'a>>,
        list: Vec<Expression<'a>>,
        negated: bool,
    },
    InSubquery {
        expr: Box<Expression<'a>>,
        subquery: Box<Query<'a>>,
        negated: bool,
    },
    Between {
        expr: Box<Expression<'a>>,
        negated: bool,
        low: Box<Expression<'a>>,
        high: Box<Expression<'a>>,
    },
    Like {
        expr: Box<Expression<'a>>,
        negated: bool,
        op: LikeOperator,
        pattern: Box<Expression<'a>>,
        escape: Option<Box<Expression<'a>>>,
    },
    Function(FunctionCall<'a>),
    Cast {
        expr: Box<Expression<'a>>,
        data_type: &'a str,
        /// `expr::type` rather than `cast(expr as type)`.
        shorthand: bool,
    },
    Extract {
        field: &'a str,
        expr: Box<Expression<'a>>,
    },
    Case(CaseExpression<'a>),
    Exists(Box<Query<'a>>),
    /// Scalar subquery, including its parentheses in `text`.
    Subquery(Box<Query<'a>>),
    Nested(Box<Expression<'a>>),
    Row(Vec<Expression<'a>>),
    Array(Vec<Expression<'a>>),
    ArraySubquery(Box<Query<'a>>),
    Subscript {
        expr: Box<Expression<'a>>,
        index: Box<Expression<'a>>,
        upper: Option<Box<Expression<'a>>>,
    },
    /// Argument list kept as opaque text, e.g. `substring(x from 1 for 2)`.
    Raw(&'a str),
}

#[derive(Debug, PartialEq, Clone)]
pub struct Expression<'a> {
    pub kind: ExpressionKind<'a>,
    pub text: &'a str,
}

impl<'a> Expression<'a> {
    /// Direct sub-expressions, not descending into nested queries.
    pub fn children(&self) -> Vec<&Expression<'a>> {
        let mut out: Vec<&Expression<'a>> = Vec::new();
        match &self.kind {
            ExpressionKind::Column(_)
            | ExpressionKind::Literal(_)
            | ExpressionKind::Parameter
            | ExpressionKind::Wildcard
            | ExpressionKind::Exists(_)
            | ExpressionKind::Subquery(_)
            | ExpressionKind::ArraySubquery(_)
            | ExpressionKind::Raw(_) => {}
            ExpressionKind::UnaryOp { expr, .. }
            | ExpressionKind::Cast { expr, .. }
            | ExpressionKind::Extract { expr, .. }
            | ExpressionKind::Nested(expr)
            | ExpressionKind::InSubquery { expr, .. } => out.push(expr.as_ref()),
            ExpressionKind::BinaryOp { left, right, .. } => {
                out.push(left.as_ref());
                out.push(right.as_ref());
            }
            ExpressionKind::IsCheck { expr, target, .. } => {
                out.push(expr.as_ref());
                if let IsTarget::DistinctFrom(other) = target {
                    out.push(other.as_ref());
                }
            }
            ExpressionKind::InList { expr, list, .. } => {
                out.push(expr.as_ref());
                out.extend(list.iter());
            }
            ExpressionKind::Between {
                expr, low, high, ..
            } => {
                out.push(expr.as_ref());
                out.push(low.as_ref());
                out.push(high.as_ref());
            }
            ExpressionKind::Like {
                expr,
                pattern,
                escape,
                ..
            } => {
                out.push(expr.as_ref());
                out.push(pattern.as_ref());
                out.extend(escape.iter().map(|e| &**e));
            }
            ExpressionKind::Function(call) => {
                out.extend(call.args.iter());
                out.extend(call.order_by.iter().map(|item| &item.expr));
                out.extend(call.filter.iter().map(|e| &**e));
                if let Some(window) = &call.over {
                    out.extend(window.partition_by.iter());
                    out.extend(window.order_by.iter().map(|item| &item.expr));
                }
            }
            ExpressionKind::Case(case) => {
                out.extend(case.operand.iter().map(|e| &**e));
                for (when, then) in &case.branches {
                    out.push(when);
                    out.push(then);
                }
                out.extend(case.else_result.iter().map(|e| &**e));
            }
            ExpressionKind::Row(items) | ExpressionKind::Array(items) => out.extend(items.iter()),
            ExpressionKind::Subscript { expr, index, upper } => {
                out.push(expr.as_ref());
                out.push(index.as_ref());
                out.extend(upper.iter().map(|e| &**e));
            }
        }
        out
    }

    /// Strips redundant parentheses.
    pub fn unnested(&self) -> &Expression<'a> {
        match &self.kind {
            ExpressionKind::Nested(inner) => inner.unnested(),
            _ => self,
        }
    }

    pub fn as_column(&self) -> Option<&ColumnRef<'a>> {
        match &self.unnested().kind {
            ExpressionKind::Column(column) => Some(column),
            _ => None,
        }
    }

    /// Operands of a chain of `AND`s, with parentheses looked through.
    pub fn conjuncts(&self) -> Vec<&Expression<'a>> {
        match &self.unnested().kind {
            ExpressionKind::BinaryOp {
                left,
                op: BinaryOperator::And,
                right,
            } => {
                let mut out = left.conjuncts();
                out.extend(right.conjuncts());
                out
            }
            _ => vec![self],
        }
    }

    /// Query nested directly in this node, for subquery-bearing kinds.
    pub fn nested_query(&self) -> Option<&Query<'a>> {
        match &self.kind {
            ExpressionKind::Exists(query)
            | ExpressionKind::Subquery(query)
            | ExpressionKind::ArraySubquery(query)
            | ExpressionKind::InSubquery {
                subquery: query, ..
            } => Some(query),
            _ => None,
        }
    }
}

impl<'a> Query<'a> {
    /// The single `SELECT` of a query without set operations.
    pub fn as_select(&self) -> Option<&Select<'a>> {
        match &self.body {
            SetExpr::Select(select) => Some(select),
            _ => None,
        }
    }
}
