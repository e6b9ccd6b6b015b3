//! SQL to JSONSQL transpiler.
//!
//! Lowers a parsed [`Statement`] into the JSONSQL parameter object consumed
//! by the remote API. Column references become strings (`"name"`,
//! `"table.name"`), literals become JSON values and operators become
//! single-key objects built through [`crate::operators`].

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::ast::{
    DeleteStatement, Expression, FromClause, InsertStatement, JoinConstraint, Literal, LogicalOp,
    MathOp, OrderDirection, SelectColumn, SelectStatement, Statement, TableRef, UpdateStatement,
};
use crate::error::{TranspileError, UnsupportedFeatureError};
use crate::operators;
use crate::parser::parse_sql;
use crate::request::{JsonSqlRequest, Method};
use crate::schema::SchemaRegistry;

type LowerResult = Result<Value, UnsupportedFeatureError>;

/// Transpiles SQL with default settings (no schema registry).
///
/// # Errors
///
/// Returns `TranspileError::Parse` for malformed SQL and
/// `TranspileError::Unsupported` for constructs JSONSQL cannot express.
pub fn transpile(sql: &str) -> Result<JsonSqlRequest, TranspileError> {
    Transpiler::new().transpile(sql)
}

/// Converts SQL text into JSONSQL requests.
///
/// With a registry attached and `auto_order_by` enabled, a plain SELECT over
/// a registered table that has no ORDER BY is ordered by the table's
/// configured sort field, so paginated reads are deterministic.
#[derive(Debug, Clone, Default)]
pub struct Transpiler {
    registry: Option<Arc<SchemaRegistry>>,
    auto_order_by: bool,
}

impl Transpiler {
    /// Creates a transpiler without schema knowledge.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transpiler that consults `registry`.
    #[must_use]
    pub fn with_registry(registry: Arc<SchemaRegistry>, auto_order_by: bool) -> Self {
        Self {
            registry: Some(registry),
            auto_order_by,
        }
    }

    /// Parses and lowers one statement.
    ///
    /// # Errors
    ///
    /// See [`transpile`].
    pub fn transpile(&self, sql: &str) -> Result<JsonSqlRequest, TranspileError> {
        let statement = parse_sql(sql)?;
        Ok(self.lower_statement(&statement, sql)?)
    }

    /// Lowers an already parsed statement. `source` is the text it was parsed
    /// from and is only used to quote fragments in errors.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedFeatureError` for constructs JSONSQL cannot express.
    pub fn lower_statement(
        &self,
        statement: &Statement,
        source: &str,
    ) -> Result<JsonSqlRequest, UnsupportedFeatureError> {
        let lowering = Lowering { source };
        match statement {
            Statement::Select(select) => {
                let mut params = lowering.select(select)?;
                self.apply_auto_order_by(select, &mut params);
                Ok(JsonSqlRequest::new(Method::Select, Value::Object(params)))
            }
            Statement::Insert(insert) => Ok(JsonSqlRequest::new(
                Method::Insert,
                Value::Object(lowering.insert(insert)?),
            )),
            Statement::Update(update) => Ok(JsonSqlRequest::new(
                Method::Update,
                Value::Object(lowering.update(update)?),
            )),
            Statement::Delete(delete) => Ok(JsonSqlRequest::new(
                Method::Delete,
                Value::Object(lowering.delete(delete)?),
            )),
            Statement::Unsupported { feature, span } => {
                Err(UnsupportedFeatureError::at(feature.clone(), *span, source))
            }
        }
    }

    fn apply_auto_order_by(&self, select: &SelectStatement, params: &mut Map<String, Value>) {
        if !self.auto_order_by || !select.order_by.is_empty() || select.is_aggregate() {
            return;
        }
        let (Some(registry), Some(from)) = (&self.registry, &select.from) else {
            return;
        };
        if !from.joins.is_empty() {
            return;
        }
        if let Some(schema) = registry.get(&from.table.name) {
            let field = schema.sync_config.order_by.clone();
            params.insert(String::from("order_by"), Value::Array(vec![Value::String(field)]));
        }
    }
}

/// Lowers a single expression to its JSONSQL form.
///
/// # Errors
///
/// Returns `UnsupportedFeatureError` for constructs JSONSQL cannot express.
pub fn lower_expression(expr: &Expression, source: &str) -> LowerResult {
    Lowering { source }.expr(expr)
}

struct Lowering<'s> {
    source: &'s str,
}

impl Lowering<'_> {
    fn select(&self, select: &SelectStatement) -> Result<Map<String, Value>, UnsupportedFeatureError> {
        let from = select
            .from
            .as_ref()
            .ok_or_else(|| UnsupportedFeatureError::new("SELECT without FROM"))?;

        let mut params = Map::new();
        params.insert(String::from("from"), self.from_clause(from)?);
        if select.distinct {
            params.insert(String::from("distinct"), Value::Bool(true));
        }
        params.insert(String::from("data"), self.columns(&select.columns)?);
        if let Some(filter) = &select.where_clause {
            params.insert(String::from("where"), self.expr(filter)?);
        }
        if !select.group_by.is_empty() {
            let groups = select
                .group_by
                .iter()
                .map(|e| self.expr(e))
                .collect::<Result<Vec<_>, _>>()?;
            params.insert(String::from("group_by"), Value::Array(groups));
        }
        if let Some(having) = &select.having {
            params.insert(String::from("having"), self.expr(having)?);
        }
        if !select.order_by.is_empty() {
            let mut order = Vec::with_capacity(select.order_by.len());
            for entry in &select.order_by {
                let Expression::Column { table, name, .. } = &entry.expr else {
                    return Err(self.unsupported_expr("ORDER BY expression", &entry.expr));
                };
                let field = qualified(table.as_deref(), name);
                order.push(Value::String(match entry.direction {
                    OrderDirection::Asc => field,
                    OrderDirection::Desc => format!("-{field}"),
                }));
            }
            params.insert(String::from("order_by"), Value::Array(order));
        }
        if let Some(limit) = &select.limit {
            params.insert(String::from("limit"), self.count(limit, "LIMIT")?);
        }
        if let Some(offset) = &select.offset {
            params.insert(String::from("offset"), self.count(offset, "OFFSET")?);
        }
        Ok(params)
    }

    fn insert(&self, insert: &InsertStatement) -> Result<Map<String, Value>, UnsupportedFeatureError> {
        let mut params = Map::new();
        params.insert(String::from("into"), Value::String(insert.table.clone()));
        if !insert.columns.is_empty() {
            let columns = insert.columns.iter().cloned().map(Value::String).collect();
            params.insert(String::from("columns"), Value::Array(columns));
        }
        let mut rows = Vec::with_capacity(insert.rows.len());
        for row in &insert.rows {
            let values = row.iter().map(|e| self.expr(e)).collect::<Result<Vec<_>, _>>()?;
            rows.push(Value::Array(values));
        }
        params.insert(String::from("values"), Value::Array(rows));
        self.returning(&insert.returning, &mut params)?;
        Ok(params)
    }

    fn update(&self, update: &UpdateStatement) -> Result<Map<String, Value>, UnsupportedFeatureError> {
        let mut set = Map::new();
        for assignment in &update.assignments {
            set.insert(assignment.column.clone(), self.expr(&assignment.value)?);
        }
        let mut params = Map::new();
        params.insert(String::from("table"), Value::String(update.table.clone()));
        params.insert(String::from("set"), Value::Object(set));
        if let Some(filter) = &update.where_clause {
            params.insert(String::from("where"), self.expr(filter)?);
        }
        self.returning(&update.returning, &mut params)?;
        Ok(params)
    }

    fn delete(&self, delete: &DeleteStatement) -> Result<Map<String, Value>, UnsupportedFeatureError> {
        let mut params = Map::new();
        params.insert(String::from("from"), Value::String(delete.table.clone()));
        if let Some(filter) = &delete.where_clause {
            params.insert(String::from("where"), self.expr(filter)?);
        }
        self.returning(&delete.returning, &mut params)?;
        Ok(params)
    }

    fn returning(
        &self,
        columns: &[SelectColumn],
        params: &mut Map<String, Value>,
    ) -> Result<(), UnsupportedFeatureError> {
        if !columns.is_empty() {
            params.insert(String::from("returning"), self.columns(columns)?);
        }
        Ok(())
    }

    fn from_clause(&self, from: &FromClause) -> LowerResult {
        if from.joins.is_empty() {
            return Ok(match &from.table.alias {
                None => Value::String(from.table.name.clone()),
                Some(_) => Value::Object(table_ref(&from.table)),
            });
        }
        let mut sources = vec![Value::Object(table_ref(&from.table))];
        for join in &from.joins {
            let mut entry = Map::new();
            entry.insert(String::from("join"), Value::from(join.join_type.key()));
            entry.extend(table_ref(&join.table));
            match &join.constraint {
                JoinConstraint::On(condition) => {
                    entry.insert(String::from("on"), self.expr(condition)?);
                }
                JoinConstraint::Using(columns) => {
                    let columns = columns.iter().cloned().map(Value::String).collect();
                    entry.insert(String::from("using"), Value::Array(columns));
                }
                JoinConstraint::None => {}
            }
            sources.push(Value::Object(entry));
        }
        Ok(Value::Array(sources))
    }

    fn columns(&self, columns: &[SelectColumn]) -> LowerResult {
        let mut data = Vec::with_capacity(columns.len());
        for column in columns {
            data.push(self.select_column(column)?);
        }
        Ok(Value::Array(data))
    }

    fn select_column(&self, column: &SelectColumn) -> LowerResult {
        let alias = column.alias.as_ref().map(|a| Value::String(a.clone()));
        match (&column.expr, alias) {
            (Expression::Wildcard { table }, _) => {
                Ok(Value::String(qualified(table.as_deref(), "*")))
            }
            (Expression::Column { table, name, .. }, None) => {
                Ok(Value::String(qualified(table.as_deref(), name)))
            }
            (Expression::Column { table, name, .. }, Some(alias)) => {
                let mut entry = Map::new();
                entry.insert(String::from("field"), Value::String(qualified(table.as_deref(), name)));
                entry.insert(String::from("as"), alias);
                Ok(Value::Object(entry))
            }
            (expr @ Expression::Aggregate { .. }, alias) => {
                let mut lowered = self.expr(expr)?;
                if let (Some(alias), Value::Object(entry)) = (alias, &mut lowered) {
                    entry.insert(String::from("as"), alias);
                }
                Ok(lowered)
            }
            (expr, alias) => {
                let mut entry = Map::new();
                entry.insert(String::from("expr"), self.expr(expr)?);
                if let Some(alias) = alias {
                    entry.insert(String::from("as"), alias);
                }
                Ok(Value::Object(entry))
            }
        }
    }

    fn count(&self, expr: &Expression, clause: &str) -> LowerResult {
        match expr {
            Expression::Literal(Literal::Integer(n)) if *n >= 0 => Ok(Value::from(*n)),
            other => Err(self.unsupported_expr(&format!("non-constant {clause}"), other)),
        }
    }

    fn expr(&self, expr: &Expression) -> LowerResult {
        match expr {
            Expression::Literal(literal) => Ok(literal_value(literal)),
            Expression::Column { table, name, .. } => {
                Ok(Value::String(qualified(table.as_deref(), name)))
            }
            Expression::Wildcard { table } => Ok(Value::String(qualified(table.as_deref(), "*"))),
            Expression::Comparison { op, left, right } => Ok(operators::build_comparison(
                op.as_str(),
                self.expr(left)?,
                self.expr(right)?,
            )?),
            Expression::Logical { op, operands } => {
                let operands = operands
                    .iter()
                    .map(|e| self.expr(e))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(operators::build_logical(op.as_str(), operands)?)
            }
            Expression::Pattern {
                op,
                negated,
                expr,
                pattern,
            } => {
                let lowered =
                    operators::build_pattern(op.as_str(), self.expr(expr)?, self.expr(pattern)?)?;
                negate_if(*negated, lowered)
            }
            Expression::SetMembership {
                expr,
                list,
                negated,
            } => {
                let values = list
                    .iter()
                    .map(|e| self.expr(e))
                    .collect::<Result<Vec<_>, _>>()?;
                let lowered = operators::build_set("IN", self.expr(expr)?, values)?;
                negate_if(*negated, lowered)
            }
            Expression::Arithmetic { op, left, right } => Ok(operators::build_math(
                op.as_str(),
                self.expr(left)?,
                self.expr(right)?,
            )?),
            Expression::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let subject = self.expr(expr)?;
                let lower = operators::build_comparison(">=", subject.clone(), self.expr(low)?)?;
                let upper = operators::build_comparison("<=", subject, self.expr(high)?)?;
                let range = operators::build_logical(LogicalOp::And.as_str(), vec![lower, upper])?;
                negate_if(*negated, range)
            }
            Expression::Negate(inner) => match inner.as_ref() {
                Expression::Literal(Literal::Integer(n)) => Ok(n
                    .checked_neg()
                    .map_or_else(|| Value::from(-(*n as f64)), Value::from)),
                Expression::Literal(Literal::Float(f)) => Ok(Value::from(-f)),
                other => Ok(operators::build_math(
                    MathOp::Sub.as_str(),
                    Value::from(0),
                    self.expr(other)?,
                )?),
            },
            Expression::Aggregate {
                function,
                arg,
                distinct,
            } => {
                let argument = match arg {
                    None => Value::String(String::from("*")),
                    Some(arg) => self.expr(arg)?,
                };
                let mut entry = Map::new();
                entry.insert(function.key().to_string(), argument);
                if *distinct {
                    entry.insert(String::from("distinct"), Value::Bool(true));
                }
                Ok(Value::Object(entry))
            }
            Expression::Unsupported { feature, span } => {
                Err(UnsupportedFeatureError::at(feature.clone(), *span, self.source))
            }
        }
    }

    fn unsupported_expr(&self, feature: &str, expr: &Expression) -> UnsupportedFeatureError {
        match expr {
            Expression::Column { span, .. } | Expression::Unsupported { span, .. } => {
                UnsupportedFeatureError::at(feature, *span, self.source)
            }
            _ => UnsupportedFeatureError::new(feature),
        }
    }
}

fn negate_if(negated: bool, lowered: Value) -> LowerResult {
    if negated {
        Ok(operators::build_logical(LogicalOp::Not.as_str(), vec![lowered])?)
    } else {
        Ok(lowered)
    }
}

fn qualified(table: Option<&str>, name: &str) -> String {
    match table {
        Some(table) => format!("{table}.{name}"),
        None => name.to_string(),
    }
}

fn table_ref(table: &TableRef) -> Map<String, Value> {
    let mut entry = Map::new();
    entry.insert(String::from("table"), Value::String(table.name.clone()));
    if let Some(alias) = &table.alias {
        entry.insert(String::from("as"), Value::String(alias.clone()));
    }
    entry
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Integer(n) => Value::from(*n),
        Literal::Float(f) => Value::from(*f),
        Literal::String(s) => Value::String(s.clone()),
        Literal::Boolean(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
    }
}
