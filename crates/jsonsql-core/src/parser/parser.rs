//! SQL Parser implementation.

use super::error::ParseError;
use super::pratt::{
    infix_binding_power, token_to_comparison_op, token_to_logical_op, token_to_math_op,
    NEGATE_BINDING_POWER, NOT_BINDING_POWER,
};
use crate::ast::{
    AggregateFunction, ComparisonOp, DeleteStatement, Expression, FromClause, InsertStatement,
    JoinClause, JoinConstraint, JoinType, Literal, OrderBy, OrderDirection, PatternOp,
    SelectColumn, SelectStatement, Statement, TableRef, UpdateAssignment, UpdateStatement,
};
use crate::lexer::{Keyword, Lexer, Span, Token, TokenKind};

/// Longest statement accepted, in characters.
pub const MAX_STATEMENT_LENGTH: usize = 50_000;

/// Deepest expression nesting accepted: parenthesized groups, unary
/// operators, subqueries and non-flattening binary operators each count.
pub const MAX_EXPRESSION_DEPTH: usize = 64;

/// Parses exactly one SQL statement, optionally followed by `;`.
///
/// # Errors
///
/// Returns a `ParseError` for malformed SQL, empty input, more than one
/// statement, or input longer than [`MAX_STATEMENT_LENGTH`] characters.
pub fn parse_sql(sql: &str) -> Result<Statement, ParseError> {
    let length = sql.chars().count();
    if length > MAX_STATEMENT_LENGTH {
        return Err(ParseError::new(
            format!("Statement is {length} characters long, the limit is {MAX_STATEMENT_LENGTH}"),
            Span::new(0, sql.len()),
        ));
    }
    Parser::new(sql).parse_single()
}

/// SQL Parser.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    previous: Token,
    /// First construct seen that has no JSONSQL encoding.
    unsupported: Option<(String, Span)>,
    /// Current expression nesting, bounded by [`MAX_EXPRESSION_DEPTH`].
    depth: usize,
}

impl<'a> Parser<'a> {
    /// Creates a new parser for the given input.
    #[must_use]
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token();
        Self {
            lexer,
            current,
            previous: Token::new(TokenKind::Eof, Span::new(0, 0)),
            unsupported: None,
            depth: 0,
        }
    }

    /// Parses a complete input holding a single statement.
    ///
    /// Statement-level constructs without a JSONSQL encoding are reported as
    /// [`Statement::Unsupported`] once the whole input parsed cleanly.
    ///
    /// # Errors
    ///
    /// Returns a `ParseError` if the input is empty, malformed, or holds more
    /// than one statement.
    pub fn parse_single(&mut self) -> Result<Statement, ParseError> {
        while self.check(&TokenKind::Semicolon) {
            self.advance();
        }
        if self.current.is_eof() {
            return Err(ParseError::new("Empty statement", self.current.span));
        }

        let statement = self.parse_statement()?;

        while self.check(&TokenKind::Semicolon) {
            self.advance();
        }

        if !self.current.is_eof() {
            if self.starts_statement() {
                return Err(ParseError::new(
                    "Multiple statements are not supported",
                    self.current.span,
                ));
            }
            return Err(ParseError::unexpected(
                "end of statement",
                self.current.kind.clone(),
                self.current.span,
            ));
        }

        match self.unsupported.take() {
            Some((feature, span)) => Ok(Statement::Unsupported { feature, span }),
            None => Ok(statement),
        }
    }

    /// Parses a single SQL statement.
    ///
    /// # Errors
    ///
    /// Returns a `ParseError` if the input is not a valid SQL statement.
    pub fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        match &self.current.kind {
            TokenKind::Keyword(Keyword::With) => {
                self.parse_with_clause()?;
                self.parse_statement()
            }
            TokenKind::Keyword(Keyword::Select) => {
                Ok(Statement::Select(self.parse_select_statement()?))
            }
            TokenKind::Keyword(Keyword::Insert) => {
                Ok(Statement::Insert(self.parse_insert_statement()?))
            }
            TokenKind::Keyword(Keyword::Update) => {
                Ok(Statement::Update(self.parse_update_statement()?))
            }
            TokenKind::Keyword(Keyword::Delete) => {
                Ok(Statement::Delete(self.parse_delete_statement()?))
            }
            _ => Err(ParseError::unexpected(
                "SELECT, INSERT, UPDATE, or DELETE",
                self.current.kind.clone(),
                self.current.span,
            )),
        }
    }

    /// Parses `WITH name AS (SELECT ...) [, ...]`, recording it as unsupported.
    fn parse_with_clause(&mut self) -> Result<(), ParseError> {
        let start = self.current.span;
        self.expect_keyword(Keyword::With)?;
        loop {
            self.expect_identifier()?;
            self.expect_keyword(Keyword::As)?;
            self.expect(&TokenKind::LeftParen)?;
            self.parse_select_statement()?;
            self.expect(&TokenKind::RightParen)?;
            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.mark_unsupported("WITH (common table expression)", start);
        Ok(())
    }

    /// Parses a SELECT statement.
    fn parse_select_statement(&mut self) -> Result<SelectStatement, ParseError> {
        self.expect_keyword(Keyword::Select)?;

        // DISTINCT or ALL
        let distinct = if self.check_keyword(Keyword::Distinct) {
            self.advance();
            true
        } else if self.check_keyword(Keyword::All) {
            self.advance();
            false
        } else {
            false
        };

        // SELECT columns
        let columns = self.parse_select_columns()?;

        // FROM clause (optional for expressions like SELECT 1+1)
        let from = if self.check_keyword(Keyword::From) {
            self.advance();
            Some(self.parse_from_clause()?)
        } else {
            None
        };

        // WHERE clause
        let where_clause = self.parse_optional_where()?;

        // GROUP BY clause
        let group_by = if self.check_keyword(Keyword::Group) {
            self.advance();
            self.expect_keyword(Keyword::By)?;
            self.parse_expression_list()?
        } else {
            vec![]
        };

        // HAVING clause
        let having = if self.check_keyword(Keyword::Having) {
            self.advance();
            Some(self.parse_expression(0)?)
        } else {
            None
        };

        // ORDER BY clause
        let order_by = if self.check_keyword(Keyword::Order) {
            self.advance();
            self.expect_keyword(Keyword::By)?;
            self.parse_order_by_list()?
        } else {
            vec![]
        };

        // LIMIT clause
        let limit = if self.check_keyword(Keyword::Limit) {
            self.advance();
            Some(self.parse_expression(0)?)
        } else {
            None
        };

        // OFFSET clause
        let offset = if self.check_keyword(Keyword::Offset) {
            self.advance();
            Some(self.parse_expression(0)?)
        } else {
            None
        };

        // Compound queries
        if matches!(
            self.current.kind,
            TokenKind::Keyword(Keyword::Union | Keyword::Intersect | Keyword::Except)
        ) {
            let start = self.current.span;
            let feature = match self.current.as_keyword() {
                Some(Keyword::Intersect) => "INTERSECT",
                Some(Keyword::Except) => "EXCEPT",
                _ => "UNION",
            };
            self.advance();
            if self.check_keyword(Keyword::All) || self.check_keyword(Keyword::Distinct) {
                self.advance();
            }
            self.parse_select_statement()?;
            self.mark_unsupported(feature, start);
        }

        Ok(SelectStatement {
            distinct,
            columns,
            from,
            where_clause,
            group_by,
            having,
            order_by,
            limit,
            offset,
        })
    }

    /// Parses SELECT or RETURNING columns.
    fn parse_select_columns(&mut self) -> Result<Vec<SelectColumn>, ParseError> {
        let mut columns = vec![];

        loop {
            let expr = self.parse_expression(0)?;

            // Check for alias (AS name or just name)
            let alias = if self.check_keyword(Keyword::As) {
                self.advance();
                Some(self.expect_identifier()?)
            } else if matches!(&self.current.kind, TokenKind::Identifier(_)) {
                Some(self.expect_identifier()?)
            } else {
                None
            };

            columns.push(SelectColumn { expr, alias });

            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }

        Ok(columns)
    }

    /// Parses the table list after FROM.
    fn parse_from_clause(&mut self) -> Result<FromClause, ParseError> {
        let table = self.parse_table_ref()?;

        let mut joins = vec![];
        loop {
            if self.check(&TokenKind::Comma) {
                // Comma-separated tables are an implicit cross join.
                self.advance();
                let table = self.parse_table_ref()?;
                joins.push(JoinClause {
                    join_type: JoinType::Cross,
                    table,
                    constraint: JoinConstraint::None,
                });
                continue;
            }
            if !self.is_join_keyword() {
                break;
            }

            let join_type = self.parse_join_type()?;
            let table = self.parse_table_ref()?;

            let constraint = if join_type == JoinType::Cross {
                JoinConstraint::None
            } else if self.check_keyword(Keyword::On) {
                self.advance();
                JoinConstraint::On(self.parse_expression(0)?)
            } else if self.check_keyword(Keyword::Using) {
                self.advance();
                self.expect(&TokenKind::LeftParen)?;
                let cols = self.parse_identifier_list()?;
                self.expect(&TokenKind::RightParen)?;
                JoinConstraint::Using(cols)
            } else {
                return Err(ParseError::new(
                    "Expected ON or USING clause",
                    self.current.span,
                ));
            };

            joins.push(JoinClause {
                join_type,
                table,
                constraint,
            });
        }

        Ok(FromClause { table, joins })
    }

    /// Parses a table name with optional schema and alias.
    ///
    /// A parenthesized subquery is consumed and recorded as unsupported.
    fn parse_table_ref(&mut self) -> Result<TableRef, ParseError> {
        if self.check(&TokenKind::LeftParen) {
            let start = self.current.span;
            self.advance();
            self.parse_select_statement()?;
            self.expect(&TokenKind::RightParen)?;
            self.mark_unsupported("subquery in FROM", start);
            let alias = self.parse_optional_alias()?;
            return Ok(TableRef {
                name: String::from("subquery"),
                alias,
            });
        }

        let name = self.parse_table_name()?;
        let alias = self.parse_optional_alias()?;
        Ok(TableRef { name, alias })
    }

    /// Parses `table` or `schema.table`.
    fn parse_table_name(&mut self) -> Result<String, ParseError> {
        let first = self.expect_identifier()?;
        if self.check(&TokenKind::Dot) {
            self.advance();
            let table = self.expect_identifier()?;
            Ok(format!("{first}.{table}"))
        } else {
            Ok(first)
        }
    }

    /// Checks if current token is a join keyword.
    fn is_join_keyword(&self) -> bool {
        matches!(
            &self.current.kind,
            TokenKind::Keyword(
                Keyword::Join
                    | Keyword::Inner
                    | Keyword::Left
                    | Keyword::Right
                    | Keyword::Full
                    | Keyword::Cross
            )
        )
    }

    /// Parses a join type.
    fn parse_join_type(&mut self) -> Result<JoinType, ParseError> {
        let join_type = match &self.current.kind {
            TokenKind::Keyword(Keyword::Join) => {
                self.advance();
                return Ok(JoinType::Inner);
            }
            TokenKind::Keyword(Keyword::Inner) => JoinType::Inner,
            TokenKind::Keyword(Keyword::Left) => JoinType::Left,
            TokenKind::Keyword(Keyword::Right) => JoinType::Right,
            TokenKind::Keyword(Keyword::Full) => JoinType::Full,
            TokenKind::Keyword(Keyword::Cross) => JoinType::Cross,
            _ => {
                return Err(ParseError::unexpected(
                    "JOIN keyword",
                    self.current.kind.clone(),
                    self.current.span,
                ));
            }
        };
        self.advance();
        if matches!(join_type, JoinType::Left | JoinType::Right | JoinType::Full)
            && self.check_keyword(Keyword::Outer)
        {
            self.advance();
        }
        self.expect_keyword(Keyword::Join)?;
        Ok(join_type)
    }

    /// Parses an optional table alias.
    fn parse_optional_alias(&mut self) -> Result<Option<String>, ParseError> {
        if self.check_keyword(Keyword::As) {
            self.advance();
            Ok(Some(self.expect_identifier()?))
        } else if matches!(&self.current.kind, TokenKind::Identifier(_)) {
            Ok(Some(self.expect_identifier()?))
        } else {
            Ok(None)
        }
    }

    /// Parses an optional WHERE clause.
    fn parse_optional_where(&mut self) -> Result<Option<Expression>, ParseError> {
        if self.check_keyword(Keyword::Where) {
            self.advance();
            Ok(Some(self.parse_expression(0)?))
        } else {
            Ok(None)
        }
    }

    /// Parses an optional RETURNING list.
    fn parse_optional_returning(&mut self) -> Result<Vec<SelectColumn>, ParseError> {
        if self.check_keyword(Keyword::Returning) {
            self.advance();
            self.parse_select_columns()
        } else {
            Ok(vec![])
        }
    }

    /// Parses an INSERT statement.
    fn parse_insert_statement(&mut self) -> Result<InsertStatement, ParseError> {
        self.expect_keyword(Keyword::Insert)?;
        self.expect_keyword(Keyword::Into)?;

        let table = self.parse_table_name()?;

        // Column list (optional)
        let columns = if self.check(&TokenKind::LeftParen) {
            self.advance();
            let cols = self.parse_identifier_list()?;
            self.expect(&TokenKind::RightParen)?;
            cols
        } else {
            vec![]
        };

        // VALUES, SELECT, or DEFAULT VALUES
        let mut rows = vec![];
        if self.check_keyword(Keyword::Values) {
            self.advance();
            loop {
                let start = self.current.span;
                self.expect(&TokenKind::LeftParen)?;
                let row = self.parse_expression_list()?;
                self.expect(&TokenKind::RightParen)?;
                if !columns.is_empty() && row.len() != columns.len() {
                    return Err(ParseError::new(
                        format!(
                            "VALUES row has {} values but {} columns were named",
                            row.len(),
                            columns.len()
                        ),
                        start.merge(self.previous.span),
                    ));
                }
                rows.push(row);
                if !self.check(&TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        } else if self.check_keyword(Keyword::Select) {
            let start = self.current.span;
            self.parse_select_statement()?;
            self.mark_unsupported("INSERT ... SELECT", start);
        } else if self.check_keyword(Keyword::Default) {
            let start = self.current.span;
            self.advance();
            self.expect_keyword(Keyword::Values)?;
            self.mark_unsupported("DEFAULT VALUES", start);
        } else {
            return Err(ParseError::unexpected(
                "VALUES, SELECT, or DEFAULT VALUES",
                self.current.kind.clone(),
                self.current.span,
            ));
        }

        let returning = self.parse_optional_returning()?;

        Ok(InsertStatement {
            table,
            columns,
            rows,
            returning,
        })
    }

    /// Parses an UPDATE statement.
    fn parse_update_statement(&mut self) -> Result<UpdateStatement, ParseError> {
        self.expect_keyword(Keyword::Update)?;

        let table = self.parse_table_name()?;

        self.expect_keyword(Keyword::Set)?;

        // Parse SET assignments
        let mut assignments = vec![];
        loop {
            let column = self.expect_identifier()?;
            self.expect(&TokenKind::Eq)?;
            let value = self.parse_expression(0)?;
            assignments.push(UpdateAssignment { column, value });

            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }

        // FROM clause (joins in UPDATE)
        if self.check_keyword(Keyword::From) {
            let start = self.current.span;
            self.advance();
            self.parse_from_clause()?;
            self.mark_unsupported("UPDATE ... FROM", start);
        }

        let where_clause = self.parse_optional_where()?;
        let returning = self.parse_optional_returning()?;

        Ok(UpdateStatement {
            table,
            assignments,
            where_clause,
            returning,
        })
    }

    /// Parses a DELETE statement.
    fn parse_delete_statement(&mut self) -> Result<DeleteStatement, ParseError> {
        self.expect_keyword(Keyword::Delete)?;
        self.expect_keyword(Keyword::From)?;

        let table = self.parse_table_name()?;
        let where_clause = self.parse_optional_where()?;
        let returning = self.parse_optional_returning()?;

        Ok(DeleteStatement {
            table,
            where_clause,
            returning,
        })
    }

    /// Parses an ORDER BY list.
    fn parse_order_by_list(&mut self) -> Result<Vec<OrderBy>, ParseError> {
        let mut items = vec![];
        loop {
            let expr = self.parse_expression(0)?;
            let direction = if self.check_keyword(Keyword::Desc) {
                self.advance();
                OrderDirection::Desc
            } else {
                if self.check_keyword(Keyword::Asc) {
                    self.advance();
                }
                OrderDirection::Asc
            };

            if self.check_keyword(Keyword::Nulls) {
                let start = self.current.span;
                self.advance();
                if self.check_keyword(Keyword::First) || self.check_keyword(Keyword::Last) {
                    self.advance();
                } else {
                    return Err(ParseError::unexpected(
                        "FIRST or LAST",
                        self.current.kind.clone(),
                        self.current.span,
                    ));
                }
                self.mark_unsupported("NULLS FIRST/LAST ordering", start);
            }

            items.push(OrderBy { expr, direction });

            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        Ok(items)
    }

    /// Parses an expression using Pratt parsing.
    fn parse_expression(&mut self, min_bp: u8) -> Result<Expression, ParseError> {
        let depth = self.depth;
        let result = self.parse_expression_bounded(min_bp);
        self.depth = depth;
        result
    }

    /// Counts one level of nesting, failing past [`MAX_EXPRESSION_DEPTH`].
    fn descend(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_EXPRESSION_DEPTH {
            return Err(ParseError::new(
                format!("Expression nested too deeply, the limit is {MAX_EXPRESSION_DEPTH}"),
                self.current.span,
            ));
        }
        Ok(())
    }

    fn parse_expression_bounded(&mut self, min_bp: u8) -> Result<Expression, ParseError> {
        let start = self.current.span;
        self.descend()?;

        // Parse prefix (primary expression or unary operator)
        let mut lhs = self.parse_prefix()?;

        // Parse infix operators
        while let Some((l_bp, r_bp)) = infix_binding_power(&self.current.kind) {
            if l_bp < min_bp {
                break;
            }
            // AND/OR chains flatten into one node and add no depth
            if token_to_logical_op(&self.current.kind).is_none() {
                self.descend()?;
            }

            // Handle special infix operators
            match &self.current.kind {
                TokenKind::Keyword(Keyword::Is) => {
                    self.advance();
                    lhs = self.parse_is(lhs)?;
                }
                TokenKind::Keyword(Keyword::Not) => {
                    self.advance();
                    lhs = self.parse_negated_predicate(lhs, r_bp)?;
                }
                TokenKind::Keyword(Keyword::In) => {
                    self.advance();
                    lhs = self.parse_in_list(lhs, false)?;
                }
                TokenKind::Keyword(Keyword::Between) => {
                    self.advance();
                    lhs = self.parse_between(lhs, r_bp, false)?;
                }
                TokenKind::Keyword(Keyword::Like) => {
                    self.advance();
                    lhs = self.parse_pattern(lhs, PatternOp::Like, r_bp, false)?;
                }
                TokenKind::Keyword(Keyword::Ilike) => {
                    self.advance();
                    lhs = self.parse_pattern(lhs, PatternOp::ILike, r_bp, false)?;
                }
                TokenKind::Concat | TokenKind::BitAnd | TokenKind::BitOr => {
                    let symbol = self.current.kind.operator_spelling().unwrap_or("?");
                    self.advance();
                    self.parse_expression(r_bp)?;
                    lhs = Expression::Unsupported {
                        feature: format!("operator {symbol}"),
                        span: start.merge(self.previous.span),
                    };
                }
                kind => {
                    if let Some(op) = token_to_comparison_op(kind) {
                        self.advance();
                        let rhs = self.parse_expression(r_bp)?;
                        lhs = lhs.compare(op, rhs);
                    } else if let Some(op) = token_to_logical_op(kind) {
                        self.advance();
                        let rhs = self.parse_expression(r_bp)?;
                        lhs = lhs.connect(op, rhs);
                    } else if let Some(op) = token_to_math_op(kind) {
                        self.advance();
                        let rhs = self.parse_expression(r_bp)?;
                        lhs = Expression::Arithmetic {
                            op,
                            left: Box::new(lhs),
                            right: Box::new(rhs),
                        };
                    } else {
                        break;
                    }
                }
            }
        }

        Ok(lhs)
    }

    /// Parses the right side of `IS [NOT]`.
    fn parse_is(&mut self, lhs: Expression) -> Result<Expression, ParseError> {
        let op = if self.check_keyword(Keyword::Not) {
            self.advance();
            ComparisonOp::IsNot
        } else {
            ComparisonOp::Is
        };
        let value = match self.current.as_keyword() {
            Some(Keyword::Null) => Literal::Null,
            Some(Keyword::True) => Literal::Boolean(true),
            Some(Keyword::False) => Literal::Boolean(false),
            _ => {
                return Err(ParseError::unexpected(
                    "NULL, TRUE, or FALSE",
                    self.current.kind.clone(),
                    self.current.span,
                ));
            }
        };
        self.advance();
        Ok(lhs.compare(op, Expression::Literal(value)))
    }

    /// Parses `NOT LIKE`, `NOT ILIKE`, `NOT IN` and `NOT BETWEEN`.
    fn parse_negated_predicate(
        &mut self,
        lhs: Expression,
        r_bp: u8,
    ) -> Result<Expression, ParseError> {
        match self.current.as_keyword() {
            Some(Keyword::In) => {
                self.advance();
                self.parse_in_list(lhs, true)
            }
            Some(Keyword::Between) => {
                self.advance();
                self.parse_between(lhs, r_bp, true)
            }
            Some(Keyword::Like) => {
                self.advance();
                self.parse_pattern(lhs, PatternOp::Like, r_bp, true)
            }
            Some(Keyword::Ilike) => {
                self.advance();
                self.parse_pattern(lhs, PatternOp::ILike, r_bp, true)
            }
            _ => Err(ParseError::unexpected(
                "IN, BETWEEN, LIKE, or ILIKE after NOT",
                self.current.kind.clone(),
                self.current.span,
            )),
        }
    }

    fn parse_in_list(&mut self, lhs: Expression, negated: bool) -> Result<Expression, ParseError> {
        let start = self.current.span;
        self.expect(&TokenKind::LeftParen)?;
        if self.check_keyword(Keyword::Select) {
            self.parse_select_statement()?;
            self.expect(&TokenKind::RightParen)?;
            return Ok(Expression::Unsupported {
                feature: String::from("IN (subquery)"),
                span: start.merge(self.previous.span),
            });
        }
        let list = self.parse_expression_list()?;
        self.expect(&TokenKind::RightParen)?;
        Ok(Expression::SetMembership {
            expr: Box::new(lhs),
            list,
            negated,
        })
    }

    fn parse_between(
        &mut self,
        lhs: Expression,
        r_bp: u8,
        negated: bool,
    ) -> Result<Expression, ParseError> {
        let low = self.parse_expression(r_bp)?;
        self.expect_keyword(Keyword::And)?;
        let high = self.parse_expression(r_bp)?;
        Ok(Expression::Between {
            expr: Box::new(lhs),
            low: Box::new(low),
            high: Box::new(high),
            negated,
        })
    }

    fn parse_pattern(
        &mut self,
        lhs: Expression,
        op: PatternOp,
        r_bp: u8,
        negated: bool,
    ) -> Result<Expression, ParseError> {
        let pattern = self.parse_expression(r_bp)?;
        Ok(Expression::Pattern {
            op,
            negated,
            expr: Box::new(lhs),
            pattern: Box::new(pattern),
        })
    }

    /// Parses a prefix expression.
    fn parse_prefix(&mut self) -> Result<Expression, ParseError> {
        match &self.current.kind {
            TokenKind::Minus => {
                self.advance();
                let operand = self.parse_expression(NEGATE_BINDING_POWER)?;
                Ok(Expression::Negate(Box::new(operand)))
            }
            TokenKind::Plus => {
                self.advance();
                self.parse_expression(NEGATE_BINDING_POWER)
            }
            TokenKind::Keyword(Keyword::Not) => {
                self.advance();
                let operand = self.parse_expression(NOT_BINDING_POWER)?;
                Ok(operand.negate_logical())
            }
            _ => self.parse_primary(),
        }
    }

    /// Parses a primary expression.
    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        let token = self.current.clone();

        match &token.kind {
            // Literals
            TokenKind::Integer(n) => {
                self.advance();
                Ok(Expression::Literal(Literal::Integer(*n)))
            }
            TokenKind::Float(f) => {
                self.advance();
                Ok(Expression::Literal(Literal::Float(*f)))
            }
            TokenKind::String(s) => {
                let value = s.clone();
                self.advance();
                Ok(Expression::Literal(Literal::String(value)))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expression::Literal(Literal::Boolean(true)))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expression::Literal(Literal::Boolean(false)))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(Expression::Literal(Literal::Null))
            }

            // Parameter placeholders
            TokenKind::Question => {
                self.advance();
                Ok(self.unsupported_expr("parameter placeholder", token.span))
            }
            TokenKind::Colon => {
                self.advance();
                self.expect_identifier()?;
                Ok(self.unsupported_expr("parameter placeholder", token.span))
            }

            // Wildcard
            TokenKind::Star => {
                self.advance();
                Ok(Expression::Wildcard { table: None })
            }

            // Parenthesized expression or subquery
            TokenKind::LeftParen => {
                self.advance();
                if self.check_keyword(Keyword::Select) {
                    self.parse_select_statement()?;
                    self.expect(&TokenKind::RightParen)?;
                    Ok(self.unsupported_expr("subquery", token.span))
                } else {
                    let expr = self.parse_expression(0)?;
                    self.expect(&TokenKind::RightParen)?;
                    Ok(expr)
                }
            }

            // Aggregate functions; a bare `min` or `max` is still a column
            TokenKind::Keyword(
                kw @ (Keyword::Count | Keyword::Sum | Keyword::Avg | Keyword::Min | Keyword::Max),
            ) => {
                let keyword = *kw;
                self.advance();
                if self.check(&TokenKind::LeftParen) {
                    self.parse_aggregate(keyword)
                } else {
                    Ok(Expression::Column {
                        table: None,
                        name: keyword.as_str().to_ascii_lowercase(),
                        span: token.span,
                    })
                }
            }

            TokenKind::Keyword(Keyword::Cast) => {
                self.advance();
                self.parse_cast_expression()?;
                Ok(self.unsupported_expr("CAST expression", token.span))
            }

            TokenKind::Keyword(Keyword::Case) => {
                self.parse_case_expression()?;
                Ok(self.unsupported_expr("CASE expression", token.span))
            }

            TokenKind::Keyword(Keyword::Exists) => {
                self.advance();
                self.expect(&TokenKind::LeftParen)?;
                self.parse_select_statement()?;
                self.expect(&TokenKind::RightParen)?;
                Ok(self.unsupported_expr("EXISTS subquery", token.span))
            }

            TokenKind::Keyword(Keyword::Default) => {
                self.advance();
                Ok(self.unsupported_expr("DEFAULT value", token.span))
            }

            // Identifier (column reference or function call)
            TokenKind::Identifier(name) => {
                let name = name.clone();
                let span = token.span;
                self.advance();

                // Check for function call
                if self.check(&TokenKind::LeftParen) {
                    self.parse_function_args()?;
                    return Ok(self.unsupported_expr(format!("function {name}()"), span));
                }

                // Check for qualified name (table.column or table.*)
                if self.check(&TokenKind::Dot) {
                    self.advance();
                    if self.check(&TokenKind::Star) {
                        self.advance();
                        return Ok(Expression::Wildcard { table: Some(name) });
                    }
                    let column = self.expect_identifier()?;
                    return Ok(Expression::Column {
                        table: Some(name),
                        name: column,
                        span: span.merge(self.previous.span),
                    });
                }

                Ok(Expression::Column {
                    table: None,
                    name,
                    span,
                })
            }

            _ => Err(ParseError::unexpected(
                "expression",
                self.current.kind.clone(),
                self.current.span,
            )),
        }
    }

    /// Parses `(arg)`, `(*)` or `(DISTINCT arg)` after an aggregate keyword.
    fn parse_aggregate(&mut self, keyword: Keyword) -> Result<Expression, ParseError> {
        let function = match keyword {
            Keyword::Count => AggregateFunction::Count,
            Keyword::Sum => AggregateFunction::Sum,
            Keyword::Avg => AggregateFunction::Avg,
            Keyword::Min => AggregateFunction::Min,
            _ => AggregateFunction::Max,
        };

        self.expect(&TokenKind::LeftParen)?;

        let distinct = if self.check_keyword(Keyword::Distinct) {
            self.advance();
            true
        } else {
            false
        };

        let arg = if self.check(&TokenKind::Star) {
            if function != AggregateFunction::Count {
                return Err(ParseError::new(
                    format!("{}(*) is not valid", keyword.as_str()),
                    self.current.span,
                ));
            }
            self.advance();
            None
        } else {
            Some(Box::new(self.parse_expression(0)?))
        };

        self.expect(&TokenKind::RightParen)?;

        Ok(Expression::Aggregate {
            function,
            arg,
            distinct,
        })
    }

    /// Consumes the argument list of a function call.
    fn parse_function_args(&mut self) -> Result<(), ParseError> {
        self.expect(&TokenKind::LeftParen)?;
        if self.check_keyword(Keyword::Distinct) {
            self.advance();
        }
        if self.check(&TokenKind::Star) {
            self.advance();
        } else if !self.check(&TokenKind::RightParen) {
            self.parse_expression_list()?;
        }
        self.expect(&TokenKind::RightParen)
    }

    /// Parses the body of `CAST(expr AS type)`.
    fn parse_cast_expression(&mut self) -> Result<(), ParseError> {
        self.expect(&TokenKind::LeftParen)?;
        self.parse_expression(0)?;
        self.expect_keyword(Keyword::As)?;
        self.expect_identifier()?;
        if self.check(&TokenKind::LeftParen) {
            self.advance();
            self.parse_expression_list()?;
            self.expect(&TokenKind::RightParen)?;
        }
        self.expect(&TokenKind::RightParen)
    }

    /// Parses a CASE expression.
    fn parse_case_expression(&mut self) -> Result<(), ParseError> {
        self.expect_keyword(Keyword::Case)?;

        // Simple CASE (CASE expr WHEN ...)
        if !self.check_keyword(Keyword::When) {
            self.parse_expression(0)?;
        }

        if !self.check_keyword(Keyword::When) {
            return Err(ParseError::unexpected(
                "WHEN",
                self.current.kind.clone(),
                self.current.span,
            ));
        }
        while self.check_keyword(Keyword::When) {
            self.advance();
            self.parse_expression(0)?;
            self.expect_keyword(Keyword::Then)?;
            self.parse_expression(0)?;
        }

        if self.check_keyword(Keyword::Else) {
            self.advance();
            self.parse_expression(0)?;
        }

        self.expect_keyword(Keyword::End)
    }

    /// Parses a comma-separated list of expressions.
    fn parse_expression_list(&mut self) -> Result<Vec<Expression>, ParseError> {
        let mut exprs = vec![];
        loop {
            exprs.push(self.parse_expression(0)?);
            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        Ok(exprs)
    }

    /// Parses a comma-separated list of identifiers.
    fn parse_identifier_list(&mut self) -> Result<Vec<String>, ParseError> {
        let mut idents = vec![];
        loop {
            idents.push(self.expect_identifier()?);
            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        Ok(idents)
    }

    // --- Helper methods ---

    /// Records the first unsupported construct; later ones are ignored.
    fn mark_unsupported(&mut self, feature: impl Into<String>, start: Span) {
        if self.unsupported.is_none() {
            self.unsupported = Some((feature.into(), start.merge(self.previous.span)));
        }
    }

    /// Builds an unsupported expression spanning from `start` to the last
    /// consumed token.
    fn unsupported_expr(&self, feature: impl Into<String>, start: Span) -> Expression {
        Expression::Unsupported {
            feature: feature.into(),
            span: start.merge(self.previous.span),
        }
    }

    /// Checks if the current token begins a new statement.
    fn starts_statement(&self) -> bool {
        matches!(
            self.current.kind,
            TokenKind::Keyword(
                Keyword::Select | Keyword::Insert | Keyword::Update | Keyword::Delete | Keyword::With
            )
        )
    }

    /// Advances to the next token.
    fn advance(&mut self) {
        self.previous = std::mem::replace(&mut self.current, self.lexer.next_token());
    }

    /// Checks if the current token matches the given kind.
    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current.kind) == std::mem::discriminant(kind)
    }

    /// Checks if the current token is the given keyword.
    fn check_keyword(&self, keyword: Keyword) -> bool {
        matches!(&self.current.kind, TokenKind::Keyword(kw) if *kw == keyword)
    }

    /// Expects the current token to be the given kind.
    fn expect(&mut self, kind: &TokenKind) -> Result<(), ParseError> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::unexpected(
                format!("{kind:?}"),
                self.current.kind.clone(),
                self.current.span,
            ))
        }
    }

    /// Expects the current token to be the given keyword.
    fn expect_keyword(&mut self, keyword: Keyword) -> Result<(), ParseError> {
        if self.check_keyword(keyword) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::unexpected(
                keyword.as_str(),
                self.current.kind.clone(),
                self.current.span,
            ))
        }
    }

    /// Expects and returns an identifier.
    fn expect_identifier(&mut self) -> Result<String, ParseError> {
        match &self.current.kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(ParseError::unexpected(
                "identifier",
                self.current.kind.clone(),
                self.current.span,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{LogicalOp, MathOp};

    fn parse(sql: &str) -> Result<Statement, ParseError> {
        parse_sql(sql)
    }

    fn parse_select(sql: &str) -> SelectStatement {
        match parse(sql).unwrap() {
            Statement::Select(select) => select,
            other => panic!("Expected SELECT statement, got {other:?}"),
        }
    }

    #[test]
    fn test_simple_select() {
        let select = parse_select("SELECT id, title FROM movies");
        assert_eq!(select.columns.len(), 2);
        assert_eq!(select.from.unwrap().table.name, "movies");
    }

    #[test]
    fn test_expression_precedence() {
        // 1 + 2 * 3 should be parsed as 1 + (2 * 3)
        let select = parse_select("SELECT 1 + 2 * 3 FROM t");
        let Expression::Arithmetic { op, right, .. } = &select.columns[0].expr else {
            panic!("Expected arithmetic expression");
        };
        assert_eq!(*op, MathOp::Add);
        assert!(matches!(
            right.as_ref(),
            Expression::Arithmetic {
                op: MathOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn test_and_chain_is_flat() {
        let select = parse_select("SELECT id FROM t WHERE a = 1 AND b = 2 AND c = 3");
        let Some(Expression::Logical { op, operands }) = select.where_clause else {
            panic!("Expected logical WHERE");
        };
        assert_eq!(op, LogicalOp::And);
        assert_eq!(operands.len(), 3);
    }

    #[test]
    fn test_not_binds_looser_than_comparison() {
        let select = parse_select("SELECT id FROM t WHERE NOT a = 1");
        let Some(Expression::Logical { op, operands }) = select.where_clause else {
            panic!("Expected NOT");
        };
        assert_eq!(op, LogicalOp::Not);
        assert!(matches!(operands[0], Expression::Comparison { .. }));
    }

    #[test]
    fn test_negated_predicates() {
        let select =
            parse_select("SELECT id FROM t WHERE a NOT IN (1, 2) AND b NOT LIKE 'x%' AND c NOT BETWEEN 1 AND 5");
        let Some(Expression::Logical { operands, .. }) = select.where_clause else {
            panic!("Expected AND");
        };
        assert!(matches!(
            operands[0],
            Expression::SetMembership { negated: true, .. }
        ));
        assert!(matches!(
            operands[1],
            Expression::Pattern { negated: true, .. }
        ));
        assert!(matches!(
            operands[2],
            Expression::Between { negated: true, .. }
        ));
    }

    #[test]
    fn test_is_not_null() {
        let select = parse_select("SELECT id FROM t WHERE deleted_at IS NOT NULL");
        assert!(matches!(
            select.where_clause,
            Some(Expression::Comparison {
                op: ComparisonOp::IsNot,
                ..
            })
        ));
    }

    #[test]
    fn test_join_chain() {
        let select = parse_select(
            "SELECT m.id FROM movies m LEFT OUTER JOIN ratings r ON m.id = r.movie_id JOIN tags USING (id)",
        );
        let from = select.from.unwrap();
        assert_eq!(from.table.alias.as_deref(), Some("m"));
        assert_eq!(from.joins.len(), 2);
        assert_eq!(from.joins[0].join_type, JoinType::Left);
        assert!(matches!(from.joins[1].constraint, JoinConstraint::Using(_)));
    }

    #[test]
    fn test_insert_values_and_returning() {
        let Statement::Insert(insert) =
            parse("INSERT INTO movies (id, title) VALUES (1, 'A'), (2, 'B') RETURNING id").unwrap()
        else {
            panic!("Expected INSERT statement");
        };
        assert_eq!(insert.table, "movies");
        assert_eq!(insert.rows.len(), 2);
        assert_eq!(insert.returning.len(), 1);
    }

    #[test]
    fn test_insert_row_width_mismatch() {
        let err = parse("INSERT INTO movies (id, title) VALUES (1)").unwrap_err();
        assert!(err.message.contains("1 values but 2 columns"));
    }

    #[test]
    fn test_update_and_delete() {
        let Statement::Update(update) =
            parse("UPDATE movies SET title = 'B', year = year + 1 WHERE id = 1").unwrap()
        else {
            panic!("Expected UPDATE statement");
        };
        assert_eq!(update.assignments.len(), 2);
        assert!(update.where_clause.is_some());

        let Statement::Delete(delete) = parse("DELETE FROM movies WHERE id = 1;").unwrap() else {
            panic!("Expected DELETE statement");
        };
        assert_eq!(delete.table, "movies");
    }

    #[test]
    fn test_statement_level_unsupported() {
        let sql = "SELECT id FROM a UNION SELECT id FROM b";
        let Statement::Unsupported { feature, span } = parse(sql).unwrap() else {
            panic!("Expected unsupported statement");
        };
        assert_eq!(feature, "UNION");
        assert_eq!(span.slice(sql), Some("UNION SELECT id FROM b"));

        assert!(matches!(
            parse("WITH x AS (SELECT 1 FROM t) SELECT * FROM x").unwrap(),
            Statement::Unsupported { .. }
        ));
        assert!(matches!(
            parse("INSERT INTO a SELECT * FROM b").unwrap(),
            Statement::Unsupported { .. }
        ));
    }

    #[test]
    fn test_expression_level_unsupported_keeps_span() {
        let sql = "SELECT CASE WHEN a = 1 THEN 'x' END FROM t";
        let select = parse_select(sql);
        let Expression::Unsupported { feature, span } = &select.columns[0].expr else {
            panic!("Expected unsupported expression");
        };
        assert_eq!(feature, "CASE expression");
        assert_eq!(span.slice(sql), Some("CASE WHEN a = 1 THEN 'x' END"));
    }

    #[test]
    fn test_multiple_statements_rejected() {
        let err = parse("SELECT id FROM a; SELECT id FROM b").unwrap_err();
        assert!(err.message.contains("Multiple statements"));
    }

    #[test]
    fn test_empty_and_oversized_input() {
        assert!(parse("   ").unwrap_err().message.contains("Empty"));
        let long = format!("SELECT id FROM t WHERE title = '{}'", "x".repeat(MAX_STATEMENT_LENGTH));
        assert!(parse(&long).unwrap_err().message.contains("limit"));
    }

    #[test]
    fn test_aggregate_keyword_as_column() {
        let select = parse_select("SELECT max, COUNT(DISTINCT genre) FROM t");
        assert!(matches!(&select.columns[0].expr, Expression::Column { name, .. } if name == "max"));
        assert!(matches!(
            select.columns[1].expr,
            Expression::Aggregate {
                function: AggregateFunction::Count,
                distinct: true,
                ..
            }
        ));
    }
}
