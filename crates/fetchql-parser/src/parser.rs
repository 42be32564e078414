//! Recursive-descent parser: token stream → [`Statement`].

use fetchql_ast::*;
use fetchql_common::Error;

use crate::token::{Keyword, Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type PResult<T> = Result<T, Error>;

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse_statement(&mut self) -> PResult<Statement> {
        let stmt = match self.peek_kind() {
            TokenKind::Keyword(Keyword::Select) => self.parse_select_chain()?,
            TokenKind::Keyword(Keyword::Insert) => Statement::Insert(self.parse_insert()?),
            TokenKind::Keyword(Keyword::Update) => Statement::Update(self.parse_update()?),
            TokenKind::Keyword(Keyword::Delete) => Statement::Delete(self.parse_delete()?),
            TokenKind::Keyword(Keyword::Declare) => Statement::Declare(self.parse_declare()?),
            TokenKind::Keyword(Keyword::Set) => Statement::Set(self.parse_set()?),
            _ => return Err(self.error("expected SELECT, INSERT, UPDATE, DELETE, DECLARE, or SET")),
        };
        self.skip_semicolon();
        if self.peek_kind() != TokenKind::Eof {
            return Err(self.error("unexpected trailing input"));
        }
        Ok(stmt)
    }

    fn skip_semicolon(&mut self) {
        if self.peek_kind() == TokenKind::Semicolon {
            self.pos += 1;
        }
    }

    // ---- statement forms ----

    fn parse_select_chain(&mut self) -> PResult<Statement> {
        let left = Statement::Select(self.parse_select()?);
        if self.eat_keyword(Keyword::Union) {
            let all = self.eat_keyword(Keyword::All);
            let right = self.parse_select_chain()?;
            return Ok(Statement::Union(UnionStatement {
                left: Box::new(left),
                right: Box::new(right),
                all,
            }));
        }
        Ok(left)
    }

    fn parse_select(&mut self) -> PResult<SelectStatement> {
        self.expect_keyword(Keyword::Select)?;
        let distinct = self.eat_keyword(Keyword::Distinct);
        let top = if self.eat_keyword(Keyword::Top) {
            Some(self.parse_u32_literal()?)
        } else {
            None
        };
        let columns = self.parse_select_items()?;
        self.expect_keyword(Keyword::From)?;
        let from = Some(self.parse_table_ref()?);
        let mut joins = Vec::new();
        while let Some(join) = self.try_parse_join()? {
            joins.push(join);
        }
        let where_clause = if self.eat_keyword(Keyword::Where) {
            Some(self.parse_condition()?)
        } else {
            None
        };
        let group_by = if self.eat_keyword(Keyword::Group) {
            self.expect_keyword(Keyword::By)?;
            self.parse_group_by_items()?
        } else {
            Vec::new()
        };
        let having = if self.eat_keyword(Keyword::Having) {
            Some(self.parse_condition()?)
        } else {
            None
        };
        let order_by = if self.eat_keyword(Keyword::Order) {
            self.expect_keyword(Keyword::By)?;
            self.parse_order_by_items()?
        } else {
            Vec::new()
        };
        Ok(SelectStatement {
            distinct,
            top,
            columns,
            from,
            joins,
            where_clause,
            group_by,
            having,
            order_by,
        })
    }

    fn parse_select_items(&mut self) -> PResult<Vec<SelectItem>> {
        let mut items = vec![self.parse_select_item()?];
        while self.eat(TokenKind::Comma) {
            items.push(self.parse_select_item()?);
        }
        Ok(items)
    }

    fn parse_select_item(&mut self) -> PResult<SelectItem> {
        let expr = self.parse_expr()?;
        let alias = if self.eat_keyword(Keyword::As) {
            Some(self.expect_ident()?)
        } else if let TokenKind::Ident(name) = self.peek_kind() {
            self.pos += 1;
            Some(name)
        } else {
            None
        };
        Ok(SelectItem { expr, alias })
    }

    fn parse_table_ref(&mut self) -> PResult<TableRef> {
        let name = self.expect_ident()?;
        let alias = if self.eat_keyword(Keyword::As) {
            Some(self.expect_ident()?)
        } else if let TokenKind::Ident(name) = self.peek_kind() {
            self.pos += 1;
            Some(name)
        } else {
            None
        };
        Ok(TableRef { name, alias })
    }

    fn try_parse_join(&mut self) -> PResult<Option<Join>> {
        let pos = self.peek().pos;
        let join_type = if self.eat_keyword(Keyword::Inner) {
            self.expect_keyword(Keyword::Join)?;
            JoinType::Inner
        } else if self.eat_keyword(Keyword::Left) {
            self.eat_keyword(Keyword::Outer);
            self.expect_keyword(Keyword::Join)?;
            JoinType::Left
        } else if self.eat_keyword(Keyword::Right) {
            self.eat_keyword(Keyword::Outer);
            self.expect_keyword(Keyword::Join)?;
            JoinType::Right
        } else if self.eat_keyword(Keyword::Full) {
            self.eat_keyword(Keyword::Outer);
            self.expect_keyword(Keyword::Join)?;
            JoinType::Full
        } else if self.eat_keyword(Keyword::Join) {
            JoinType::Inner
        } else {
            return Ok(None);
        };
        let table = self.parse_table_ref()?;
        self.expect_keyword(Keyword::On)?;
        let left_col = self.parse_column_ref()?;
        self.expect(TokenKind::Eq)?;
        let right_col = self.parse_column_ref()?;
        Ok(Some(Join {
            pos,
            table,
            join_type,
            left_col,
            right_col,
        }))
    }

    fn parse_group_by_items(&mut self) -> PResult<Vec<GroupByItem>> {
        let mut items = vec![self.parse_group_by_item()?];
        while self.eat(TokenKind::Comma) {
            items.push(self.parse_group_by_item()?);
        }
        Ok(items)
    }

    fn parse_group_by_item(&mut self) -> PResult<GroupByItem> {
        if let TokenKind::Ident(name) = self.peek_kind() {
            if let Some(part) = date_part_from_name(&name) {
                if self.peek_at(1).kind == TokenKind::LParen {
                    self.pos += 2;
                    let column = self.parse_column_ref()?;
                    self.expect(TokenKind::RParen)?;
                    return Ok(GroupByItem::DatePart { part, column });
                }
            }
        }
        Ok(GroupByItem::Column(self.parse_column_ref()?))
    }

    fn parse_order_by_items(&mut self) -> PResult<Vec<OrderByItem>> {
        let mut items = vec![self.parse_order_by_item()?];
        while self.eat(TokenKind::Comma) {
            items.push(self.parse_order_by_item()?);
        }
        Ok(items)
    }

    fn parse_order_by_item(&mut self) -> PResult<OrderByItem> {
        let name = self.expect_ident()?;
        let descending = if self.eat_keyword(Keyword::Desc) {
            true
        } else {
            self.eat_keyword(Keyword::Asc);
            false
        };
        Ok(OrderByItem { name, descending })
    }

    fn parse_insert(&mut self) -> PResult<InsertStatement> {
        self.expect_keyword(Keyword::Insert)?;
        self.expect_keyword(Keyword::Into)?;
        let table = self.expect_ident()?;
        let mut columns = Vec::new();
        if self.eat(TokenKind::LParen) {
            columns.push(self.expect_ident()?);
            while self.eat(TokenKind::Comma) {
                columns.push(self.expect_ident()?);
            }
            self.expect(TokenKind::RParen)?;
        }
        let source = if self.eat_keyword(Keyword::Values) {
            let mut rows = vec![self.parse_value_row()?];
            while self.eat(TokenKind::Comma) {
                rows.push(self.parse_value_row()?);
            }
            InsertSource::Values(rows)
        } else if self.peek_kind() == TokenKind::Keyword(Keyword::Select) {
            InsertSource::Select(Box::new(self.parse_select()?))
        } else {
            return Err(self.error("expected VALUES or SELECT after INSERT INTO"));
        };
        Ok(InsertStatement {
            table,
            columns,
            source,
        })
    }

    fn parse_value_row(&mut self) -> PResult<Vec<Expr>> {
        self.expect(TokenKind::LParen)?;
        let mut values = vec![self.parse_expr()?];
        while self.eat(TokenKind::Comma) {
            values.push(self.parse_expr()?);
        }
        self.expect(TokenKind::RParen)?;
        Ok(values)
    }

    fn parse_update(&mut self) -> PResult<UpdateStatement> {
        self.expect_keyword(Keyword::Update)?;
        let table = self.expect_ident()?;
        self.expect_keyword(Keyword::Set)?;
        let mut set = vec![self.parse_set_clause()?];
        while self.eat(TokenKind::Comma) {
            set.push(self.parse_set_clause()?);
        }
        let where_clause = if self.eat_keyword(Keyword::Where) {
            Some(self.parse_condition()?)
        } else {
            None
        };
        Ok(UpdateStatement {
            table,
            set,
            where_clause,
        })
    }

    fn parse_set_clause(&mut self) -> PResult<(String, Expr)> {
        let name = self.expect_ident()?;
        self.expect(TokenKind::Eq)?;
        let value = self.parse_expr()?;
        Ok((name, value))
    }

    fn parse_delete(&mut self) -> PResult<DeleteStatement> {
        self.expect_keyword(Keyword::Delete)?;
        self.expect_keyword(Keyword::From)?;
        let table = self.expect_ident()?;
        let where_clause = if self.eat_keyword(Keyword::Where) {
            Some(self.parse_condition()?)
        } else {
            None
        };
        Ok(DeleteStatement { table, where_clause })
    }

    fn parse_declare(&mut self) -> PResult<DeclareStatement> {
        self.expect_keyword(Keyword::Declare)?;
        let name = self.expect_variable()?;
        let sql_type = self.expect_ident()?;
        let initial = if self.eat(TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(DeclareStatement {
            name,
            sql_type,
            initial,
        })
    }

    fn parse_set(&mut self) -> PResult<SetStatement> {
        self.expect_keyword(Keyword::Set)?;
        let name = self.expect_variable()?;
        self.expect(TokenKind::Eq)?;
        let value = self.parse_expr()?;
        Ok(SetStatement { name, value })
    }

    // ---- conditions (WHERE / HAVING / ON) ----

    pub fn parse_condition(&mut self) -> PResult<Cond> {
        self.parse_cond_or()
    }

    fn parse_cond_or(&mut self) -> PResult<Cond> {
        let mut left = self.parse_cond_and()?;
        while self.eat_keyword(Keyword::Or) {
            let pos = left.pos;
            let right = self.parse_cond_and()?;
            left = Cond::new(pos, CondKind::Or(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_cond_and(&mut self) -> PResult<Cond> {
        let mut left = self.parse_cond_not()?;
        while self.eat_keyword(Keyword::And) {
            let pos = left.pos;
            let right = self.parse_cond_not()?;
            left = Cond::new(pos, CondKind::And(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_cond_not(&mut self) -> PResult<Cond> {
        if self.peek_kind() == TokenKind::Keyword(Keyword::Not) {
            let pos = self.peek().pos;
            self.pos += 1;
            let inner = self.parse_cond_not()?;
            return Ok(Cond::new(pos, CondKind::Not(Box::new(inner))));
        }
        self.parse_cond_primary()
    }

    fn parse_cond_primary(&mut self) -> PResult<Cond> {
        if self.eat(TokenKind::LParen) {
            // Could be a parenthesized condition or a parenthesized scalar
            // expression that is itself the left side of a comparison; try
            // condition first since that's overwhelmingly the common case
            // for a top-level WHERE/HAVING term.
            let checkpoint = self.pos;
            if let Ok(cond) = self.parse_cond_or() {
                if self.eat(TokenKind::RParen) && !self.at_comparison_continuation() {
                    return Ok(cond);
                }
            }
            self.pos = checkpoint;
            let expr = self.parse_expr()?;
            self.expect(TokenKind::RParen)?;
            let wrapped = Expr::new(expr.pos, ExprKind::Parenthesis(Box::new(expr)));
            return self.parse_cond_tail(wrapped);
        }
        let expr = self.parse_expr()?;
        self.parse_cond_tail(expr)
    }

    fn parse_cond_tail(&mut self, expr: Expr) -> PResult<Cond> {
        let pos = expr.pos;
        let negated = self.eat_keyword(Keyword::Not);

        if self.eat_keyword(Keyword::Like) {
            let pattern_expr = self.parse_expr()?;
            let pattern = match pattern_expr.kind {
                ExprKind::Literal(Literal::String(s)) => s,
                _ => return Err(self.error_at(pos, "LIKE pattern must be a string literal")),
            };
            let column = self.require_column(&expr)?;
            return Ok(Cond::new(pos, CondKind::Like { column, pattern, negated }));
        }
        if self.eat_keyword(Keyword::In) {
            self.expect(TokenKind::LParen)?;
            let mut values = vec![self.parse_expr()?];
            while self.eat(TokenKind::Comma) {
                values.push(self.parse_expr()?);
            }
            self.expect(TokenKind::RParen)?;
            let column = self.require_column(&expr)?;
            return Ok(Cond::new(pos, CondKind::In { column, values, negated }));
        }
        if self.eat_keyword(Keyword::Between) {
            let low = self.parse_additive()?;
            self.expect_keyword(Keyword::And)?;
            let high = self.parse_additive()?;
            let column = self.require_column(&expr)?;
            return Ok(Cond::new(
                pos,
                CondKind::Between { column, low, high, negated },
            ));
        }
        if negated {
            // NOT was consumed speculatively for LIKE/IN/BETWEEN; none matched.
            return Err(self.error_at(pos, "expected LIKE, IN, or BETWEEN after NOT"));
        }
        if self.eat_keyword(Keyword::Is) {
            let is_negated = self.eat_keyword(Keyword::Not);
            self.expect_keyword(Keyword::Null)?;
            let column = self.require_column(&expr)?;
            return Ok(Cond::new(
                pos,
                CondKind::IsNull { column, negated: is_negated },
            ));
        }
        if let Some(op) = self.try_compare_op() {
            let right = self.parse_additive()?;
            return Ok(Cond::new(pos, CondKind::Comparison { op, left: expr, right }));
        }
        Ok(Cond::new(pos, CondKind::Expression(expr)))
    }

    /// Whether the current token could continue a comparison begun by the
    /// expression just parsed — used to tell a parenthesized *condition*
    /// apart from a parenthesized *scalar expression* that is itself the
    /// left operand of a comparison, e.g. `(revenue + 10) > cost`.
    fn at_comparison_continuation(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Eq
                | TokenKind::Ne
                | TokenKind::Lt
                | TokenKind::Le
                | TokenKind::Gt
                | TokenKind::Ge
                | TokenKind::Keyword(Keyword::Like)
                | TokenKind::Keyword(Keyword::In)
                | TokenKind::Keyword(Keyword::Between)
                | TokenKind::Keyword(Keyword::Is)
        )
    }

    fn require_column(&self, expr: &Expr) -> PResult<ColumnRef> {
        expr.as_column()
            .cloned()
            .ok_or_else(|| self.error_at(expr.pos, "expected a column reference"))
    }

    fn try_compare_op(&mut self) -> Option<CompareOp> {
        let op = match self.peek_kind() {
            TokenKind::Eq => CompareOp::Eq,
            TokenKind::Ne => CompareOp::Ne,
            TokenKind::Lt => CompareOp::Lt,
            TokenKind::Le => CompareOp::Le,
            TokenKind::Gt => CompareOp::Gt,
            TokenKind::Ge => CompareOp::Ge,
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    // ---- scalar expressions ----

    pub fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_additive()
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let pos = left.pos;
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::new(pos, ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) });
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            let pos = left.pos;
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::new(pos, ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) });
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        if self.peek_kind() == TokenKind::Minus {
            let pos = self.peek().pos;
            self.pos += 1;
            let inner = self.parse_unary()?;
            return Ok(Expr::new(pos, ExprKind::Unary { op: UnaryOp::Neg, expr: Box::new(inner) }));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Int(v) => {
                self.pos += 1;
                Ok(Expr::literal(tok.pos, Literal::Int(v)))
            }
            TokenKind::Float(v) => {
                self.pos += 1;
                Ok(Expr::literal(tok.pos, Literal::Float(v)))
            }
            TokenKind::Str(s) => {
                self.pos += 1;
                Ok(Expr::literal(tok.pos, Literal::String(s)))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.pos += 1;
                Ok(Expr::literal(tok.pos, Literal::Bool(true)))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.pos += 1;
                Ok(Expr::literal(tok.pos, Literal::Bool(false)))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.pos += 1;
                Ok(Expr::literal(tok.pos, Literal::Null))
            }
            TokenKind::Minus => {
                self.pos += 1;
                let inner = self.parse_primary()?;
                Ok(Expr::new(tok.pos, ExprKind::Unary { op: UnaryOp::Neg, expr: Box::new(inner) }))
            }
            TokenKind::Variable(name) => {
                self.pos += 1;
                Ok(Expr::new(tok.pos, ExprKind::Variable(name)))
            }
            TokenKind::LParen => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(Expr::new(tok.pos, ExprKind::Parenthesis(Box::new(inner))))
            }
            TokenKind::Keyword(Keyword::Case) => self.parse_case(),
            TokenKind::Keyword(Keyword::Iif) => self.parse_iif(),
            TokenKind::Keyword(Keyword::Cast) => self.parse_cast(),
            TokenKind::Ident(_) => self.parse_ident_led_expr(),
            _ => Err(self.error("expected an expression")),
        }
    }

    fn parse_ident_led_expr(&mut self) -> PResult<Expr> {
        let start = self.peek().pos;
        let first = self.expect_ident()?;
        if self.peek_kind() == TokenKind::LParen {
            self.pos += 1;
            let args = self.parse_function_args()?;
            self.expect(TokenKind::RParen)?;
            return Ok(Expr::new(start, ExprKind::FunctionCall { name: first, args }));
        }
        if self.eat(TokenKind::Dot) {
            let name = self.expect_ident()?;
            return Ok(Expr::column(start, ColumnRef::qualified(first, name)));
        }
        Ok(Expr::column(start, ColumnRef::new(first)))
    }

    fn parse_function_args(&mut self) -> PResult<Vec<Expr>> {
        if self.peek_kind() == TokenKind::RParen {
            return Ok(Vec::new());
        }
        if self.peek_kind() == TokenKind::Star {
            let pos = self.peek().pos;
            self.pos += 1;
            return Ok(vec![Expr::column(pos, ColumnRef::new("*"))]);
        }
        let mut args = vec![self.parse_expr()?];
        while self.eat(TokenKind::Comma) {
            args.push(self.parse_expr()?);
        }
        Ok(args)
    }

    fn parse_case(&mut self) -> PResult<Expr> {
        let start = self.peek().pos;
        self.pos += 1;
        let mut when_then = Vec::new();
        while self.eat_keyword(Keyword::When) {
            let cond = self.parse_condition()?;
            self.expect_keyword(Keyword::Then)?;
            let expr = self.parse_expr()?;
            when_then.push((cond, expr));
        }
        if when_then.is_empty() {
            return Err(self.error("CASE requires at least one WHEN clause"));
        }
        let else_ = if self.eat_keyword(Keyword::Else) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.expect_keyword(Keyword::End)?;
        Ok(Expr::new(start, ExprKind::Case { when_then, else_ }))
    }

    fn parse_iif(&mut self) -> PResult<Expr> {
        let start = self.peek().pos;
        self.pos += 1;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_condition()?;
        self.expect(TokenKind::Comma)?;
        let then = self.parse_expr()?;
        self.expect(TokenKind::Comma)?;
        let els = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        Ok(Expr::new(
            start,
            ExprKind::Iif { cond: Box::new(cond), then: Box::new(then), els: Box::new(els) },
        ))
    }

    fn parse_cast(&mut self) -> PResult<Expr> {
        let start = self.peek().pos;
        self.pos += 1;
        self.expect(TokenKind::LParen)?;
        let expr = self.parse_expr()?;
        self.expect_keyword(Keyword::As)?;
        let target_type = self.expect_ident()?;
        self.expect(TokenKind::RParen)?;
        Ok(Expr::new(start, ExprKind::Cast { expr: Box::new(expr), target_type }))
    }

    fn parse_column_ref(&mut self) -> PResult<ColumnRef> {
        let first = self.expect_ident()?;
        if self.eat(TokenKind::Dot) {
            let name = self.expect_ident()?;
            return Ok(ColumnRef::qualified(first, name));
        }
        Ok(ColumnRef::new(first))
    }

    fn parse_u32_literal(&mut self) -> PResult<u32> {
        match self.peek_kind() {
            TokenKind::Int(v) if v >= 0 => {
                self.pos += 1;
                Ok(v as u32)
            }
            _ => Err(self.error("expected a non-negative integer literal")),
        }
    }

    // ---- token helpers ----

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .unwrap_or_else(|| self.tokens.last().unwrap())
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind.clone()
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == kind {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: Keyword) -> bool {
        self.eat(TokenKind::Keyword(kw))
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<()> {
        if self.eat(kind.clone()) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {kind:?}")))
        }
    }

    fn expect_keyword(&mut self, kw: Keyword) -> PResult<()> {
        self.expect(TokenKind::Keyword(kw))
    }

    fn expect_ident(&mut self) -> PResult<String> {
        match self.peek_kind() {
            TokenKind::Ident(s) => {
                self.pos += 1;
                Ok(s)
            }
            _ => Err(self.error("expected an identifier")),
        }
    }

    fn expect_variable(&mut self) -> PResult<String> {
        match self.peek_kind() {
            TokenKind::Variable(s) => {
                self.pos += 1;
                Ok(s)
            }
            _ => Err(self.error("expected a variable name (e.g. @total)")),
        }
    }

    fn error(&self, msg: &str) -> Error {
        self.error_at(self.peek().pos, msg)
    }

    fn error_at(&self, pos: usize, msg: impl Into<String>) -> Error {
        Error::parse(msg, pos)
    }
}

fn date_part_from_name(name: &str) -> Option<DatePart> {
    Some(match name.to_ascii_uppercase().as_str() {
        "YEAR" => DatePart::Year,
        "MONTH" => DatePart::Month,
        "DAY" => DatePart::Day,
        "QUARTER" => DatePart::Quarter,
        "WEEK" => DatePart::Week,
        _ => return None,
    })
}
