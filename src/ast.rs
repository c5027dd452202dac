//! Cypher intermediate representation and its printer.
//!
//! Translation builds `Statement`s out of `Clause`s and `Expr`s. Text is produced only at
//! the very end by [`Statement::render`]. The printer walks the tree with an explicit work
//! stack, so deeply nested selections never grow the call stack.

use std::borrow::Cow;

use indexmap::IndexMap;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BinaryOperator {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Contains,
    StartsWith,
    EndsWith,
    Matches,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::In => "IN",
            Self::Contains => "CONTAINS",
            Self::StartsWith => "STARTS WITH",
            Self::EndsWith => "ENDS WITH",
            Self::Matches => "=~",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum QuantifierKind {
    All,
    Any,
    None,
    Single,
}

impl QuantifierKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Any => "any",
            Self::None => "none",
            Self::Single => "single",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum MapEntry {
    /// `.name`
    Property(String),
    /// `key: expr`
    Entry(String, Expr),
    /// `.*`
    AllProperties,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Expr {
    Literal(Literal),
    Variable(String),
    Param(String),
    Property(Box<Expr>, String),
    Function {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    HasLabel {
        variable: String,
        label: String,
    },
    Map(Vec<(String, Expr)>),
    MapProjection {
        variable: String,
        entries: Vec<MapEntry>,
    },
    List(Vec<Expr>),
    ListComprehension {
        variable: String,
        source: Box<Expr>,
        filter: Option<Box<Expr>>,
        map: Option<Box<Expr>>,
    },
    PatternComprehension {
        pattern: Pattern,
        filter: Option<Box<Expr>>,
        map: Box<Expr>,
    },
    /// Existence of a pattern, rendered per dialect
    Exists {
        pattern: Pattern,
        filter: Option<Box<Expr>>,
    },
    /// Number of matches of a pattern
    PatternSize {
        pattern: Pattern,
        filter: Option<Box<Expr>>,
    },
    Quantifier {
        kind: QuantifierKind,
        variable: String,
        source: Box<Expr>,
        predicate: Box<Expr>,
    },
    Reduce {
        accumulator: String,
        init: Box<Expr>,
        variable: String,
        source: Box<Expr>,
        expr: Box<Expr>,
    },
    Case {
        branches: Vec<(Expr, Expr)>,
        default: Option<Box<Expr>>,
    },
    /// Identity of a node or relationship, rendered per dialect
    Id(Box<Expr>),
    /// Spatial distance, rendered per dialect
    Distance(Box<Expr>, Box<Expr>),
    /// `list[start..end]`
    Slice {
        list: Box<Expr>,
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },
    Raw(String),
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    pub fn param(name: impl Into<String>) -> Self {
        Self::Param(name.into())
    }

    pub fn prop(variable: &str, key: impl Into<String>) -> Self {
        Self::Property(Box::new(Self::var(variable)), key.into())
    }

    pub fn dot(self, key: impl Into<String>) -> Self {
        Self::Property(Box::new(self), key.into())
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::Literal(Literal::String(value.into()))
    }

    pub fn null() -> Self {
        Self::Literal(Literal::Null)
    }

    pub fn bool(value: bool) -> Self {
        Self::Literal(Literal::Bool(value))
    }

    pub fn int(value: i64) -> Self {
        Self::Literal(Literal::Int(value))
    }

    pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Function {
            name: name.into(),
            args,
            distinct: false,
        }
    }

    pub fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Self {
        Self::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOperator::Eq, right)
    }

    pub fn not(inner: Expr) -> Self {
        Self::Not(Box::new(inner))
    }

    pub fn is_null(inner: Expr) -> Self {
        Self::IsNull {
            expr: Box::new(inner),
            negated: false,
        }
    }

    pub fn is_not_null(inner: Expr) -> Self {
        Self::IsNull {
            expr: Box::new(inner),
            negated: true,
        }
    }

    /// `variable { .* }`
    pub fn all_properties(variable: &str) -> Self {
        Self::MapProjection {
            variable: variable.to_string(),
            entries: vec![MapEntry::AllProperties],
        }
    }

    pub fn is_null_literal(&self) -> bool {
        matches!(self, Self::Literal(Literal::Null))
    }

    /// Conjunction of the given predicates, `None` when there is nothing to conjoin
    pub fn and_all(mut exprs: Vec<Expr>) -> Option<Expr> {
        match exprs.len() {
            0 => None,
            1 => exprs.pop(),
            _ => Some(Self::And(exprs)),
        }
    }

    pub fn or_all(mut exprs: Vec<Expr>) -> Option<Expr> {
        match exprs.len() {
            0 => None,
            1 => exprs.pop(),
            _ => Some(Self::Or(exprs)),
        }
    }

    /// `REDUCE(acc = [], m IN collect(source) | acc + m)`
    pub fn flatten_collected(source: Expr) -> Self {
        Self::Reduce {
            accumulator: "acc".to_string(),
            init: Box::new(Self::List(vec![])),
            variable: "m".to_string(),
            source: Box::new(Self::func("collect", vec![source])),
            expr: Box::new(Self::binary(
                Self::var("acc"),
                BinaryOperator::Add,
                Self::var("m"),
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PatternDirection {
    /// `<-[]-`
    Left,
    /// `-[]->`
    Right,
    Undirected,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NodePattern {
    pub variable: Option<String>,
    pub labels: Vec<String>,
    pub properties: Vec<(String, Expr)>,
}

impl NodePattern {
    pub fn new(variable: Option<&str>, labels: &[String]) -> Self {
        Self {
            variable: variable.map(str::to_string),
            labels: labels.to_vec(),
            properties: vec![],
        }
    }

    pub fn var(variable: &str) -> Self {
        Self::new(Some(variable), &[])
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RelationshipPattern {
    pub variable: Option<String>,
    pub rel_type: Option<String>,
    pub direction: PatternDirection,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Pattern {
    pub start: NodePattern,
    pub segments: Vec<(RelationshipPattern, NodePattern)>,
}

impl Pattern {
    pub fn node(node: NodePattern) -> Self {
        Self {
            start: node,
            segments: vec![],
        }
    }

    pub fn relationship(
        from: NodePattern,
        variable: Option<&str>,
        rel_type: &str,
        direction: PatternDirection,
        to: NodePattern,
    ) -> Self {
        Self {
            start: from,
            segments: vec![(
                RelationshipPattern {
                    variable: variable.map(str::to_string),
                    rel_type: Some(rel_type.to_string()),
                    direction,
                },
                to,
            )],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReturnItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl ReturnItem {
    pub fn new(expr: Expr, alias: impl Into<String>) -> Self {
        Self {
            expr,
            alias: Some(alias.into()),
        }
    }

    pub fn var(name: &str) -> Self {
        Self {
            expr: Expr::var(name),
            alias: None,
        }
    }

    pub fn star() -> Self {
        Self {
            expr: Expr::Raw("*".to_string()),
            alias: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderItem {
    pub expr: Expr,
    pub descending: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SetItem {
    pub target: Expr,
    pub value: Expr,
}

/// Row projection shared by `WITH` and `RETURN`
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Projection {
    pub items: Vec<ReturnItem>,
    pub distinct: bool,
    pub order_by: Vec<OrderItem>,
    pub skip: Option<Expr>,
    pub limit: Option<Expr>,
}

impl Projection {
    pub fn items(items: Vec<ReturnItem>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Clause {
    Match {
        optional: bool,
        pattern: Pattern,
        filter: Option<Expr>,
    },
    Create(Pattern),
    Merge {
        pattern: Pattern,
        on_create: Vec<SetItem>,
    },
    Set(Vec<SetItem>),
    Delete {
        detach: bool,
        variables: Vec<String>,
    },
    With {
        projection: Projection,
        filter: Option<Expr>,
    },
    Unwind {
        expr: Expr,
        variable: String,
    },
    Call(Statement),
    /// Branches of a `UNION`, only meaningful as the body of a `CALL`
    Union(Vec<Statement>),
    CallProcedure {
        name: String,
        args: Vec<Expr>,
        yields: Vec<String>,
        filter: Option<Expr>,
    },
    Return(Projection),
    Raw(String),
}

impl Clause {
    pub fn with_vars<S: AsRef<str>>(vars: &[S]) -> Self {
        Self::With {
            projection: Projection::items(
                vars.iter().map(|v| ReturnItem::var(v.as_ref())).collect(),
            ),
            filter: None,
        }
    }

    pub fn with_star_where(filter: Expr) -> Self {
        Self::With {
            projection: Projection::items(vec![ReturnItem::star()]),
            filter: Some(filter),
        }
    }

    /// `CALL apoc.util.validate(predicate, message, [0])`
    pub fn validate(predicate: Expr, message: &str) -> Self {
        Self::CallProcedure {
            name: "apoc.util.validate".to_string(),
            args: vec![predicate, Expr::string(message), Expr::List(vec![Expr::int(0)])],
            yields: vec![],
            filter: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Statement {
    pub clauses: Vec<Clause>,
}

impl Statement {
    pub fn new(clauses: Vec<Clause>) -> Self {
        Self { clauses }
    }

    pub fn push(&mut self, clause: Clause) {
        self.clauses.push(clause);
    }

    pub fn extend(&mut self, clauses: impl IntoIterator<Item = Clause>) {
        self.clauses.extend(clauses);
    }

    pub fn render(&self, dialect: Dialect) -> String {
        let mut printer = Printer::new(dialect);
        printer.run(Work::Statement(self));
        printer.out
    }
}

/// Rendering differences between database major versions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Dialect {
    pub major: u32,
}

impl Default for Dialect {
    fn default() -> Self {
        Self { major: 5 }
    }
}

impl Dialect {
    pub fn supports_exists_subquery(&self) -> bool {
        self.major >= 5
    }

    fn id_function(&self) -> &'static str {
        if self.major >= 5 {
            "elementId"
        } else {
            "id"
        }
    }

    fn distance_function(&self) -> &'static str {
        if self.major >= 5 {
            "point.distance"
        } else {
            "distance"
        }
    }
}

/// Backtick-quotes identifiers that are not plain
pub fn escape_name(name: &str) -> Cow<'_, str> {
    let mut chars = name.chars();
    let plain = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if plain {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("`{}`", name.replace('`', "``")))
    }
}

fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

enum Work<'a> {
    Statement(&'a Statement),
    Clause(&'a Clause),
    Expr(&'a Expr),
    Pattern(&'a Pattern),
    Projection(&'a Projection),
    RawLines(&'a str),
    Str(&'static str),
    Text(Cow<'a, str>),
    Newline,
    Indent,
    Dedent,
}

struct Printer {
    out: String,
    indent: usize,
    dialect: Dialect,
}

impl Printer {
    fn new(dialect: Dialect) -> Self {
        Self {
            out: String::new(),
            indent: 0,
            dialect,
        }
    }

    fn run<'a>(&mut self, root: Work<'a>) {
        let mut stack: Vec<Work<'a>> = vec![root];
        while let Some(work) = stack.pop() {
            let parts = match work {
                Work::Str(s) => {
                    self.out.push_str(s);
                    continue;
                }
                Work::Text(s) => {
                    self.out.push_str(&s);
                    continue;
                }
                Work::Newline => {
                    self.out.push('\n');
                    for _ in 0..self.indent {
                        self.out.push_str("    ");
                    }
                    continue;
                }
                Work::Indent => {
                    self.indent += 1;
                    continue;
                }
                Work::Dedent => {
                    self.indent = self.indent.saturating_sub(1);
                    continue;
                }
                Work::Statement(statement) => {
                    let mut parts = vec![];
                    for (i, clause) in statement.clauses.iter().enumerate() {
                        if i > 0 {
                            parts.push(Work::Newline);
                        }
                        parts.push(Work::Clause(clause));
                    }
                    parts
                }
                Work::Clause(clause) => self.clause_parts(clause),
                Work::Expr(expr) => self.expr_parts(expr),
                Work::Pattern(pattern) => pattern_parts(pattern),
                Work::Projection(projection) => projection_parts(projection),
                Work::RawLines(text) => {
                    let mut parts = vec![];
                    for (i, line) in text.trim().lines().enumerate() {
                        if i > 0 {
                            parts.push(Work::Newline);
                        }
                        parts.push(Work::Text(Cow::Borrowed(line.trim_end())));
                    }
                    parts
                }
            };
            stack.extend(parts.into_iter().rev());
        }
    }

    fn clause_parts<'a>(&self, clause: &'a Clause) -> Vec<Work<'a>> {
        let mut parts = vec![];
        match clause {
            Clause::Match {
                optional,
                pattern,
                filter,
            } => {
                if *optional {
                    parts.push(Work::Str("OPTIONAL "));
                }
                parts.push(Work::Str("MATCH "));
                parts.push(Work::Pattern(pattern));
                if let Some(filter) = filter {
                    parts.push(Work::Newline);
                    parts.push(Work::Str("WHERE "));
                    parts.push(Work::Expr(filter));
                }
            }
            Clause::Create(pattern) => {
                parts.push(Work::Str("CREATE "));
                parts.push(Work::Pattern(pattern));
            }
            Clause::Merge { pattern, on_create } => {
                parts.push(Work::Str("MERGE "));
                parts.push(Work::Pattern(pattern));
                if !on_create.is_empty() {
                    parts.push(Work::Newline);
                    parts.push(Work::Str("ON CREATE SET "));
                    push_set_items(&mut parts, on_create);
                }
            }
            Clause::Set(items) => {
                parts.push(Work::Str("SET "));
                push_set_items(&mut parts, items);
            }
            Clause::Delete { detach, variables } => {
                parts.push(Work::Str(if *detach { "DETACH DELETE " } else { "DELETE " }));
                let names = variables.iter().map(|v| escape_name(v)).collect::<Vec<_>>();
                parts.push(Work::Text(Cow::Owned(names.join(", "))));
            }
            Clause::With { projection, filter } => {
                parts.push(Work::Str("WITH "));
                parts.push(Work::Projection(projection));
                if let Some(filter) = filter {
                    parts.push(Work::Newline);
                    parts.push(Work::Str("WHERE "));
                    parts.push(Work::Expr(filter));
                }
            }
            Clause::Return(projection) => {
                parts.push(Work::Str("RETURN "));
                parts.push(Work::Projection(projection));
            }
            Clause::Unwind { expr, variable } => {
                parts.push(Work::Str("UNWIND "));
                parts.push(Work::Expr(expr));
                parts.push(Work::Str(" AS "));
                parts.push(Work::Text(escape_name(variable)));
            }
            Clause::Call(statement) => {
                parts.push(Work::Str("CALL {"));
                parts.push(Work::Indent);
                parts.push(Work::Newline);
                parts.push(Work::Statement(statement));
                parts.push(Work::Dedent);
                parts.push(Work::Newline);
                parts.push(Work::Str("}"));
            }
            Clause::Union(branches) => {
                for (i, branch) in branches.iter().enumerate() {
                    if i > 0 {
                        parts.push(Work::Newline);
                        parts.push(Work::Str("UNION"));
                        parts.push(Work::Newline);
                    }
                    parts.push(Work::Statement(branch));
                }
            }
            Clause::CallProcedure {
                name,
                args,
                yields,
                filter,
            } => {
                parts.push(Work::Str("CALL "));
                parts.push(Work::Text(Cow::Borrowed(name)));
                parts.push(Work::Str("("));
                push_separated(&mut parts, args, ", ");
                parts.push(Work::Str(")"));
                if !yields.is_empty() {
                    parts.push(Work::Str(" YIELD "));
                    parts.push(Work::Text(Cow::Owned(yields.join(", "))));
                }
                if let Some(filter) = filter {
                    parts.push(Work::Newline);
                    parts.push(Work::Str("WHERE "));
                    parts.push(Work::Expr(filter));
                }
            }
            Clause::Raw(text) => parts.push(Work::RawLines(text)),
        }
        parts
    }

    fn expr_parts<'a>(&self, expr: &'a Expr) -> Vec<Work<'a>> {
        let mut parts = vec![];
        match expr {
            Expr::Literal(literal) => parts.push(Work::Text(Cow::Owned(match literal {
                Literal::Null => "NULL".to_string(),
                Literal::Bool(b) => b.to_string(),
                Literal::Int(i) => i.to_string(),
                Literal::Float(f) => format!("{f:?}"),
                Literal::String(s) => quote_string(s),
            }))),
            Expr::Variable(name) => parts.push(Work::Text(escape_name(name))),
            Expr::Param(name) => {
                parts.push(Work::Str("$"));
                parts.push(Work::Text(escape_name(name)));
            }
            Expr::Property(base, key) => {
                parts.push(Work::Expr(base));
                parts.push(Work::Str("."));
                parts.push(Work::Text(escape_name(key)));
            }
            Expr::Function {
                name,
                args,
                distinct,
            } => {
                parts.push(Work::Text(Cow::Borrowed(name)));
                parts.push(Work::Str("("));
                if *distinct {
                    parts.push(Work::Str("DISTINCT "));
                }
                push_separated(&mut parts, args, ", ");
                parts.push(Work::Str(")"));
            }
            Expr::Binary { left, op, right } => {
                parts.push(Work::Expr(left));
                parts.push(Work::Str(" "));
                parts.push(Work::Str(op.as_str()));
                parts.push(Work::Str(" "));
                parts.push(Work::Expr(right));
            }
            Expr::And(items) => push_junction(&mut parts, items, " AND ", "true"),
            Expr::Or(items) => push_junction(&mut parts, items, " OR ", "false"),
            Expr::Not(inner) => {
                parts.push(Work::Str("NOT ("));
                parts.push(Work::Expr(inner));
                parts.push(Work::Str(")"));
            }
            Expr::IsNull { expr, negated } => {
                parts.push(Work::Expr(expr));
                parts.push(Work::Str(if *negated { " IS NOT NULL" } else { " IS NULL" }));
            }
            Expr::HasLabel { variable, label } => {
                parts.push(Work::Text(escape_name(variable)));
                parts.push(Work::Str(":"));
                parts.push(Work::Text(escape_name(label)));
            }
            Expr::Map(entries) => {
                if entries.is_empty() {
                    parts.push(Work::Str("{}"));
                } else {
                    parts.push(Work::Str("{ "));
                    for (i, (key, value)) in entries.iter().enumerate() {
                        if i > 0 {
                            parts.push(Work::Str(", "));
                        }
                        parts.push(Work::Text(escape_name(key)));
                        parts.push(Work::Str(": "));
                        parts.push(Work::Expr(value));
                    }
                    parts.push(Work::Str(" }"));
                }
            }
            Expr::MapProjection { variable, entries } => {
                parts.push(Work::Text(escape_name(variable)));
                if entries.is_empty() {
                    parts.push(Work::Str(" {}"));
                } else {
                    parts.push(Work::Str(" { "));
                    for (i, entry) in entries.iter().enumerate() {
                        if i > 0 {
                            parts.push(Work::Str(", "));
                        }
                        match entry {
                            MapEntry::Property(name) => {
                                parts.push(Work::Str("."));
                                parts.push(Work::Text(escape_name(name)));
                            }
                            MapEntry::Entry(key, value) => {
                                parts.push(Work::Text(escape_name(key)));
                                parts.push(Work::Str(": "));
                                parts.push(Work::Expr(value));
                            }
                            MapEntry::AllProperties => parts.push(Work::Str(".*")),
                        }
                    }
                    parts.push(Work::Str(" }"));
                }
            }
            Expr::List(items) => {
                parts.push(Work::Str("["));
                push_separated(&mut parts, items, ", ");
                parts.push(Work::Str("]"));
            }
            Expr::ListComprehension {
                variable,
                source,
                filter,
                map,
            } => {
                parts.push(Work::Str("["));
                parts.push(Work::Text(escape_name(variable)));
                parts.push(Work::Str(" IN "));
                parts.push(Work::Expr(source));
                if let Some(filter) = filter {
                    parts.push(Work::Str(" WHERE "));
                    parts.push(Work::Expr(filter));
                }
                if let Some(map) = map {
                    parts.push(Work::Str(" | "));
                    parts.push(Work::Expr(map));
                }
                parts.push(Work::Str("]"));
            }
            Expr::PatternComprehension {
                pattern,
                filter,
                map,
            } => {
                parts.push(Work::Str("["));
                parts.push(Work::Pattern(pattern));
                if let Some(filter) = filter {
                    parts.push(Work::Str(" WHERE "));
                    parts.push(Work::Expr(filter));
                }
                parts.push(Work::Str(" | "));
                parts.push(Work::Expr(map));
                parts.push(Work::Str("]"));
            }
            Expr::Exists { pattern, filter } => {
                if self.dialect.supports_exists_subquery() {
                    parts.push(Work::Str("EXISTS { MATCH "));
                    parts.push(Work::Pattern(pattern));
                    if let Some(filter) = filter {
                        parts.push(Work::Str(" WHERE "));
                        parts.push(Work::Expr(filter));
                    }
                    parts.push(Work::Str(" }"));
                } else {
                    push_pattern_size(&mut parts, pattern, filter.as_deref());
                    parts.push(Work::Str(" > 0"));
                }
            }
            Expr::PatternSize { pattern, filter } => {
                push_pattern_size(&mut parts, pattern, filter.as_deref());
            }
            Expr::Quantifier {
                kind,
                variable,
                source,
                predicate,
            } => {
                parts.push(Work::Str(kind.as_str()));
                parts.push(Work::Str("("));
                parts.push(Work::Text(escape_name(variable)));
                parts.push(Work::Str(" IN "));
                parts.push(Work::Expr(source));
                parts.push(Work::Str(" WHERE "));
                parts.push(Work::Expr(predicate));
                parts.push(Work::Str(")"));
            }
            Expr::Reduce {
                accumulator,
                init,
                variable,
                source,
                expr,
            } => {
                parts.push(Work::Str("REDUCE("));
                parts.push(Work::Text(escape_name(accumulator)));
                parts.push(Work::Str(" = "));
                parts.push(Work::Expr(init));
                parts.push(Work::Str(", "));
                parts.push(Work::Text(escape_name(variable)));
                parts.push(Work::Str(" IN "));
                parts.push(Work::Expr(source));
                parts.push(Work::Str(" | "));
                parts.push(Work::Expr(expr));
                parts.push(Work::Str(")"));
            }
            Expr::Case { branches, default } => {
                parts.push(Work::Str("CASE"));
                for (condition, value) in branches {
                    parts.push(Work::Str(" WHEN "));
                    parts.push(Work::Expr(condition));
                    parts.push(Work::Str(" THEN "));
                    parts.push(Work::Expr(value));
                }
                if let Some(default) = default {
                    parts.push(Work::Str(" ELSE "));
                    parts.push(Work::Expr(default));
                }
                parts.push(Work::Str(" END"));
            }
            Expr::Id(inner) => {
                parts.push(Work::Str(self.dialect.id_function()));
                parts.push(Work::Str("("));
                parts.push(Work::Expr(inner));
                parts.push(Work::Str(")"));
            }
            Expr::Distance(a, b) => {
                parts.push(Work::Str(self.dialect.distance_function()));
                parts.push(Work::Str("("));
                parts.push(Work::Expr(a));
                parts.push(Work::Str(", "));
                parts.push(Work::Expr(b));
                parts.push(Work::Str(")"));
            }
            Expr::Slice { list, start, end } => {
                parts.push(Work::Expr(list));
                parts.push(Work::Str("["));
                if let Some(start) = start {
                    parts.push(Work::Expr(start));
                }
                parts.push(Work::Str(".."));
                if let Some(end) = end {
                    parts.push(Work::Expr(end));
                }
                parts.push(Work::Str("]"));
            }
            Expr::Raw(text) => parts.push(Work::Text(Cow::Borrowed(text))),
        }
        parts
    }
}

fn push_separated<'a>(parts: &mut Vec<Work<'a>>, items: &'a [Expr], separator: &'static str) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            parts.push(Work::Str(separator));
        }
        parts.push(Work::Expr(item));
    }
}

fn push_junction<'a>(
    parts: &mut Vec<Work<'a>>,
    items: &'a [Expr],
    separator: &'static str,
    empty: &'static str,
) {
    match items.len() {
        0 => parts.push(Work::Str(empty)),
        1 => parts.push(Work::Expr(&items[0])),
        _ => {
            parts.push(Work::Str("("));
            push_separated(parts, items, separator);
            parts.push(Work::Str(")"));
        }
    }
}

fn push_set_items<'a>(parts: &mut Vec<Work<'a>>, items: &'a [SetItem]) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            parts.push(Work::Str(", "));
        }
        parts.push(Work::Expr(&item.target));
        parts.push(Work::Str(" = "));
        parts.push(Work::Expr(&item.value));
    }
}

fn push_pattern_size<'a>(
    parts: &mut Vec<Work<'a>>,
    pattern: &'a Pattern,
    filter: Option<&'a Expr>,
) {
    parts.push(Work::Str("size(["));
    parts.push(Work::Pattern(pattern));
    if let Some(filter) = filter {
        parts.push(Work::Str(" WHERE "));
        parts.push(Work::Expr(filter));
    }
    parts.push(Work::Str(" | 1])"));
}

fn node_parts<'a>(parts: &mut Vec<Work<'a>>, node: &'a NodePattern) {
    parts.push(Work::Str("("));
    if let Some(variable) = &node.variable {
        parts.push(Work::Text(escape_name(variable)));
    }
    for label in &node.labels {
        parts.push(Work::Str(":"));
        parts.push(Work::Text(escape_name(label)));
    }
    if !node.properties.is_empty() {
        parts.push(Work::Str(" { "));
        for (i, (key, value)) in node.properties.iter().enumerate() {
            if i > 0 {
                parts.push(Work::Str(", "));
            }
            parts.push(Work::Text(escape_name(key)));
            parts.push(Work::Str(": "));
            parts.push(Work::Expr(value));
        }
        parts.push(Work::Str(" }"));
    }
    parts.push(Work::Str(")"));
}

fn pattern_parts(pattern: &Pattern) -> Vec<Work<'_>> {
    let mut parts = vec![];
    node_parts(&mut parts, &pattern.start);
    for (rel, node) in &pattern.segments {
        parts.push(Work::Str(match rel.direction {
            PatternDirection::Left => "<-[",
            _ => "-[",
        }));
        if let Some(variable) = &rel.variable {
            parts.push(Work::Text(escape_name(variable)));
        }
        if let Some(rel_type) = &rel.rel_type {
            parts.push(Work::Str(":"));
            parts.push(Work::Text(escape_name(rel_type)));
        }
        parts.push(Work::Str(match rel.direction {
            PatternDirection::Right => "]->",
            _ => "]-",
        }));
        node_parts(&mut parts, node);
    }
    parts
}

fn projection_parts(projection: &Projection) -> Vec<Work<'_>> {
    let mut parts = vec![];
    if projection.distinct {
        parts.push(Work::Str("DISTINCT "));
    }
    for (i, item) in projection.items.iter().enumerate() {
        if i > 0 {
            parts.push(Work::Str(", "));
        }
        parts.push(Work::Expr(&item.expr));
        if let Some(alias) = &item.alias {
            let same = matches!(&item.expr, Expr::Variable(v) if v == alias);
            if !same {
                parts.push(Work::Str(" AS "));
                parts.push(Work::Text(escape_name(alias)));
            }
        }
    }
    if !projection.order_by.is_empty() {
        parts.push(Work::Newline);
        parts.push(Work::Str("ORDER BY "));
        for (i, item) in projection.order_by.iter().enumerate() {
            if i > 0 {
                parts.push(Work::Str(", "));
            }
            parts.push(Work::Expr(&item.expr));
            parts.push(Work::Str(if item.descending { " DESC" } else { " ASC" }));
        }
    }
    if let Some(skip) = &projection.skip {
        parts.push(Work::Newline);
        parts.push(Work::Str("SKIP "));
        parts.push(Work::Expr(skip));
    }
    if let Some(limit) = &projection.limit {
        parts.push(Work::Newline);
        parts.push(Work::Str("LIMIT "));
        parts.push(Work::Expr(limit));
    }
    parts
}

/// Collects query parameters and hands out deterministic variable names.
#[derive(Clone, Debug, Default)]
pub struct ParamContext {
    pub params: IndexMap<String, serde_json::Value>,
    next_param: usize,
    next_var: usize,
}

impl ParamContext {
    // Pushes a parameter into the context and returns an expression referencing it
    pub fn clause_for(&mut self, value: serde_json::Value) -> Expr {
        Expr::Param(self.bind(value))
    }

    /// Binds `value` under a fresh name and returns the name
    pub fn bind(&mut self, value: serde_json::Value) -> String {
        let name = format!("param{}", self.next_param);
        self.next_param += 1;
        self.params.insert(name.clone(), value);
        name
    }

    pub fn bind_named(&mut self, name: &str, value: serde_json::Value) -> Expr {
        self.params.insert(name.to_string(), value);
        Expr::param(name)
    }

    pub fn next_var(&mut self, prefix: &str) -> String {
        let name = format!("{prefix}{}", self.next_var);
        self.next_var += 1;
        name
    }

    pub fn into_json(self) -> serde_json::Map<String, serde_json::Value> {
        self.params.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie_actor_pattern() -> Pattern {
        Pattern::relationship(
            NodePattern::var("this"),
            Some("this0"),
            "ACTED_IN",
            PatternDirection::Left,
            NodePattern::new(Some("this1"), &["Actor".to_string()]),
        )
    }

    #[test]
    fn render_match_where_return_test() {
        let statement = Statement::new(vec![
            Clause::Match {
                optional: false,
                pattern: Pattern::node(NodePattern::new(Some("this"), &["Movie".to_string()])),
                filter: Some(Expr::eq(Expr::prop("this", "title"), Expr::param("param0"))),
            },
            Clause::Return(Projection::items(vec![ReturnItem::new(
                Expr::MapProjection {
                    variable: "this".to_string(),
                    entries: vec![
                        MapEntry::Property("title".to_string()),
                        MapEntry::Entry("year".to_string(), Expr::prop("this", "released")),
                    ],
                },
                "this",
            )])),
        ]);
        assert_eq!(
            statement.render(Dialect::default()),
            "MATCH (this:Movie)\nWHERE this.title = $param0\nRETURN this { .title, year: this.released } AS this"
        );
    }

    #[test]
    fn render_nested_call_indents_test() {
        let inner = Statement::new(vec![
            Clause::with_vars(&["this"]),
            Clause::Match {
                optional: false,
                pattern: movie_actor_pattern(),
                filter: None,
            },
            Clause::Return(Projection::items(vec![ReturnItem::new(
                Expr::func("collect", vec![Expr::var("this1")]),
                "var2",
            )])),
        ]);
        let statement = Statement::new(vec![Clause::Call(inner)]);
        assert_eq!(
            statement.render(Dialect::default()),
            "CALL {\n    WITH this\n    MATCH (this)<-[this0:ACTED_IN]-(this1:Actor)\n    RETURN collect(this1) AS var2\n}"
        );
    }

    #[test]
    fn render_exists_per_dialect_test() {
        let expr = Expr::Exists {
            pattern: movie_actor_pattern(),
            filter: Some(Box::new(Expr::eq(
                Expr::prop("this1", "name"),
                Expr::param("param0"),
            ))),
        };
        let statement = Statement::new(vec![Clause::with_star_where(expr)]);
        assert_eq!(
            statement.render(Dialect { major: 5 }),
            "WITH *\nWHERE EXISTS { MATCH (this)<-[this0:ACTED_IN]-(this1:Actor) WHERE this1.name = $param0 }"
        );
        assert_eq!(
            statement.render(Dialect { major: 4 }),
            "WITH *\nWHERE size([(this)<-[this0:ACTED_IN]-(this1:Actor) WHERE this1.name = $param0 | 1]) > 0"
        );
    }

    #[test]
    fn render_junctions_test() {
        let a = Expr::eq(Expr::prop("this", "a"), Expr::int(1));
        let b = Expr::is_null(Expr::prop("this", "b"));
        let expr = Expr::Or(vec![Expr::And(vec![a.clone(), b]), Expr::not(a)]);
        let statement = Statement::new(vec![Clause::with_star_where(expr)]);
        assert_eq!(
            statement.render(Dialect::default()),
            "WITH *\nWHERE ((this.a = 1 AND this.b IS NULL) OR NOT (this.a = 1))"
        );
        assert_eq!(Expr::and_all(vec![]), None);
    }

    #[test]
    fn render_deep_nesting_without_recursion_test() {
        let mut expr = Expr::bool(true);
        for _ in 0..50_000 {
            expr = Expr::not(expr);
        }
        let statement = Statement::new(vec![Clause::with_star_where(expr)]);
        let text = statement.render(Dialect::default());
        assert!(text.starts_with("WITH *\nWHERE NOT (NOT ("));
        // dropping a deeply nested Box chain recurses as well, so leak it on purpose
        std::mem::forget(statement);
    }

    #[test]
    fn escape_name_test() {
        assert_eq!(escape_name("title"), "title");
        assert_eq!(escape_name("my field"), "`my field`");
        assert_eq!(escape_name("1abc"), "`1abc`");
        assert_eq!(escape_name("we`ird"), "`we``ird`");
    }

    #[test]
    fn param_context_names_are_deterministic_test() {
        let mut params = ParamContext::default();
        assert_eq!(params.next_var("this"), "this0");
        assert_eq!(params.clause_for(serde_json::json!(1)), Expr::param("param0"));
        assert_eq!(params.next_var("var"), "var1");
        assert_eq!(params.clause_for(serde_json::json!("x")), Expr::param("param1"));
        let json = params.into_json();
        assert_eq!(json.len(), 2);
        assert_eq!(json["param1"], serde_json::json!("x"));
    }

    #[test]
    fn flatten_collected_test() {
        let statement = Statement::new(vec![Clause::Return(Projection::items(vec![
            ReturnItem::new(Expr::flatten_collected(Expr::var("mutateMeta")), "mutateMeta"),
        ]))]);
        assert_eq!(
            statement.render(Dialect::default()),
            "RETURN REDUCE(acc = [], m IN collect(mutateMeta) | acc + m) AS mutateMeta"
        );
    }
}
