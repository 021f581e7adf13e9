//! Recursive-descent parser.
//!
//! One method per precedence level.  Errors are reported to the diagnostics
//! sink; the offending statement is abandoned (panic mode) and the parser
//! synchronizes to the next statement boundary, so a single pass can surface
//! several independent diagnostics.

use std::rc::Rc;

use crate::ast::{
    AssignOp, BinOp, Expr, ExprId, FunctionDecl, InterruptKind, Lit, LogicalOp, PostfixOp, Stmt,
    UnaryOp, VarRef,
};
use crate::diag::{Diagnostics, Position};
use crate::interner::Symbol;
use crate::token::Token;

/// Marker bubbled out of parsing rules once an error has been reported,
/// unwinding to the nearest statement boundary.
struct ParsePanic;

type ParseResult<T> = Result<T, ParsePanic>;

#[derive(Debug)]
pub struct Parser {
    tokens: Vec<(Position, Token)>,
    current: usize,
    loop_depth: u32,
    next_expr_id: ExprId,
    diagnostics: Rc<Diagnostics>,
}

impl Parser {
    /// `first_expr_id` seeds the expression-id counter; a session reuses one
    /// counter across parses so resolver side-table keys never collide.
    pub fn new(
        tokens: Vec<(Position, Token)>,
        diagnostics: Rc<Diagnostics>,
        first_expr_id: ExprId,
    ) -> Parser {
        Parser {
            tokens,
            current: 0,
            loop_depth: 0,
            next_expr_id: first_expr_id,
            diagnostics,
        }
    }

    /// The id the next parsed variable or assignment would receive.
    pub fn next_expr_id(&self) -> ExprId {
        self.next_expr_id
    }

    /// Parses the whole token list into top-level statements.  Statements
    /// that fail to parse are dropped after their diagnostics are recorded.
    pub fn parse(&mut self) -> Vec<Stmt> {
        let mut statements = vec![];
        while !self.is_at_end() {
            match self.declaration() {
                Ok(stmt) => statements.push(stmt),
                Err(ParsePanic) => self.synchronize(),
            }
        }
        statements
    }

    fn declaration(&mut self) -> ParseResult<Stmt> {
        // `fun` only starts a declaration when an identifier follows;
        // otherwise it is an anonymous function expression and the statement
        // rules take over.  This is the parser's only two-token lookahead.
        if matches!(self.peek(), Token::Fun) && self.next_is_identifier() {
            return self.function();
        }
        if matches!(self.peek(), Token::Var) {
            self.advance();
            return self.var_declaration();
        }
        self.statement()
    }

    /// Parses `IDENTIFIER ( "=" conditional )? ";"`; the `var` keyword has
    /// been consumed.  The initializer sits above comma precedence so that
    /// `var x = a, b;` does not parse as a comma expression.
    fn var_declaration(&mut self) -> ParseResult<Stmt> {
        let (name, pos) = self.consume_identifier("Expect variable name.")?;
        let init = if matches!(self.peek(), Token::Equal) {
            self.advance();
            Some(Box::new(self.conditional()?))
        } else {
            None
        };
        self.consume(Token::Semicolon, "Expect ';' after variable declaration.")?;
        Ok(Stmt::VarDecl { name, pos, init })
    }

    fn function(&mut self) -> ParseResult<Stmt> {
        self.advance(); // fun
        let (name, pos) = self.consume_identifier("Expect function name.")?;
        let fun = self.function_body()?;
        Ok(Stmt::FunDecl { name, pos, fun })
    }

    /// Parses `"(" parameters? ")" block`: everything after the name (or
    /// after `fun`, for the anonymous form).
    fn function_body(&mut self) -> ParseResult<Rc<FunctionDecl>> {
        let pos = self.current_pos();
        self.consume(Token::LeftParen, "Expect '(' after function name.")?;
        let mut params = vec![];
        if !matches!(self.peek(), Token::RightParen) {
            loop {
                if params.len() >= 255 {
                    self.report_current("Can't have more than 255 parameters.");
                }
                let (param, _) = self.consume_identifier("Expect parameter name.")?;
                params.push(param);
                if !matches!(self.peek(), Token::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.consume(Token::RightParen, "Expect ')' after parameters.")?;
        self.consume(Token::LeftCurly, "Expect '{' before function body.")?;
        let body = self.block_statements()?;
        Ok(Rc::new(FunctionDecl { pos, params, body }))
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        match self.peek() {
            Token::For => {
                self.advance();
                self.for_statement()
            }
            Token::If => {
                self.advance();
                self.if_statement()
            }
            Token::While => {
                self.advance();
                self.while_statement()
            }
            Token::Return | Token::Break | Token::Continue => self.interrupt_statement(),
            Token::Print => {
                let pos = self.current_pos();
                self.advance();
                let expr = Box::new(self.expression()?);
                self.consume(Token::Semicolon, "Expect ';' after value.")?;
                Ok(Stmt::Print { pos, expr })
            }
            Token::LeftCurly => {
                self.advance();
                Ok(Stmt::Block(self.block_statements()?))
            }
            _ => {
                let expr = Box::new(self.expression()?);
                self.consume(Token::Semicolon, "Expect ';' after value.")?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    /// `for "(" ( varDecl | exprStmt | ";" ) expression? ";" expression? ")"
    /// statement`.  An absent condition defaults to true.
    fn for_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(Token::LeftParen, "Expect '(' after 'for'.")?;
        let init = match self.peek() {
            Token::Semicolon => {
                self.advance();
                None
            }
            Token::Var => {
                self.advance();
                Some(Box::new(self.var_declaration()?))
            }
            _ => {
                let expr = Box::new(self.expression()?);
                self.consume(Token::Semicolon, "Expect ';' after value.")?;
                Some(Box::new(Stmt::Expr(expr)))
            }
        };

        let cond = if matches!(self.peek(), Token::Semicolon) {
            Expr::Literal(Lit::Bool(true))
        } else {
            self.expression()?
        };
        self.consume(Token::Semicolon, "Expect ';' after loop condition.")?;

        let incr = if matches!(self.peek(), Token::RightParen) {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        self.consume(Token::RightParen, "Expect ')' after for clauses.")?;

        self.loop_depth += 1;
        let body = self.statement();
        self.loop_depth -= 1;

        Ok(Stmt::For {
            init,
            cond: Box::new(cond),
            incr,
            body: Box::new(body?),
        })
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(Token::LeftParen, "Expect '(' after 'if'.")?;
        let cond = Box::new(self.expression()?);
        self.consume(Token::RightParen, "Expect ')' after 'if' condition.")?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if matches!(self.peek(), Token::Else) {
            self.advance();
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(Token::LeftParen, "Expect '(' after 'while'.")?;
        let cond = Box::new(self.expression()?);
        self.consume(Token::RightParen, "Expect ')' after condition.")?;

        self.loop_depth += 1;
        let body = self.statement();
        self.loop_depth -= 1;

        Ok(Stmt::While {
            cond,
            body: Box::new(body?),
        })
    }

    /// `return expression? ";" | break ";" | continue ";"`.
    fn interrupt_statement(&mut self) -> ParseResult<Stmt> {
        let pos = self.current_pos();
        let kind = match self.peek() {
            Token::Return => InterruptKind::Return,
            Token::Break => InterruptKind::Break,
            _ => InterruptKind::Continue,
        };
        self.advance();

        let value = match kind {
            InterruptKind::Return => {
                let value = if matches!(self.peek(), Token::Semicolon) {
                    None
                } else {
                    Some(Box::new(self.expression()?))
                };
                self.consume(Token::Semicolon, "Expect ';' after return value.")?;
                value
            }
            InterruptKind::Break | InterruptKind::Continue => {
                if self.loop_depth == 0 {
                    self.report_previous("Must be inside a loop to use 'break' or 'continue'.");
                }
                self.consume(Token::Semicolon, "Expect ';' after 'break'.")?;
                None
            }
        };
        Ok(Stmt::Interrupt { kind, pos, value })
    }

    /// Parses `declaration*` up to the closing brace.  Recovers inside the
    /// block so one bad statement does not hide its siblings.
    fn block_statements(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut statements = vec![];
        while !matches!(self.peek(), Token::RightCurly) && !self.is_at_end() {
            match self.declaration() {
                Ok(stmt) => statements.push(stmt),
                Err(ParsePanic) => self.synchronize(),
            }
        }
        self.consume(Token::RightCurly, "Expect '}' after block.")?;
        Ok(statements)
    }

    fn expression(&mut self) -> ParseResult<Expr> {
        self.comma()
    }

    /// `assignment ( "," assignment )*`, optionally followed by
    /// `"?" expression ":" conditional` to form a ternary.
    fn comma(&mut self) -> ParseResult<Expr> {
        let mut expr = self.assignment()?;
        while matches!(self.peek(), Token::Comma) {
            let pos = self.current_pos();
            self.advance();
            let rhs = self.assignment()?;
            expr = Expr::Binary {
                op: BinOp::Comma,
                pos,
                lhs: Box::new(expr),
                rhs: Box::new(rhs),
            };
        }
        if matches!(self.peek(), Token::Question) {
            let pos = self.current_pos();
            self.advance();
            let then_branch = self.expression()?;
            self.consume(
                Token::Colon,
                "Expect ':' after then branch of conditional expression.",
            )?;
            let else_branch = self.conditional()?;
            expr = Expr::Ternary {
                cond: Box::new(expr),
                pos,
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            };
        }
        Ok(expr)
    }

    /// The ternary rule without comma underneath, for contexts where a comma
    /// already has a meaning (variable initializers, ternary else-branches).
    fn conditional(&mut self) -> ParseResult<Expr> {
        let mut expr = self.assignment()?;
        if matches!(self.peek(), Token::Question) {
            let pos = self.current_pos();
            self.advance();
            let then_branch = self.expression()?;
            self.consume(
                Token::Colon,
                "Expect ':' after then branch of conditional expression.",
            )?;
            let else_branch = self.expression()?;
            expr = Expr::Ternary {
                cond: Box::new(expr),
                pos,
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            };
        }
        Ok(expr)
    }

    fn assignment(&mut self) -> ParseResult<Expr> {
        let expr = self.or()?;

        let op = match self.peek() {
            Token::Equal => Some(AssignOp::Set),
            Token::PlusEqual => Some(AssignOp::Add),
            Token::MinusEqual => Some(AssignOp::Sub),
            Token::StarEqual => Some(AssignOp::Mul),
            Token::SlashEqual => Some(AssignOp::Div),
            _ => None,
        };
        if let Some(op) = op {
            let pos = self.current_pos();
            self.advance();
            let value = self.assignment()?;
            if let Expr::Var(var) = expr {
                return Ok(Expr::Assign {
                    id: self.new_expr_id(),
                    name: var.name,
                    op,
                    pos,
                    value: Box::new(value),
                });
            }
            // Reported but not fatal: the surrounding statement still parses.
            self.report(
                pos,
                &format!(" at '{}'", op.lexeme()),
                "Invalid assignment target",
            );
            return Ok(expr);
        }
        Ok(expr)
    }

    fn or(&mut self) -> ParseResult<Expr> {
        let mut expr = self.and()?;
        while matches!(self.peek(), Token::Or) {
            self.advance();
            let rhs = self.and()?;
            expr = Expr::Logical {
                op: LogicalOp::Or,
                lhs: Box::new(expr),
                rhs: Box::new(rhs),
            };
        }
        Ok(expr)
    }

    fn and(&mut self) -> ParseResult<Expr> {
        let mut expr = self.equality()?;
        while matches!(self.peek(), Token::And) {
            self.advance();
            let rhs = self.equality()?;
            expr = Expr::Logical {
                op: LogicalOp::And,
                lhs: Box::new(expr),
                rhs: Box::new(rhs),
            };
        }
        Ok(expr)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        let mut expr = self.comparison()?;
        loop {
            let op = match self.peek() {
                Token::EqualEqual => BinOp::Equal,
                Token::BangEqual => BinOp::NotEqual,
                _ => break,
            };
            let pos = self.current_pos();
            self.advance();
            let rhs = self.comparison()?;
            expr = Expr::Binary {
                op,
                pos,
                lhs: Box::new(expr),
                rhs: Box::new(rhs),
            };
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let mut expr = self.term()?;
        loop {
            let op = match self.peek() {
                Token::Less => BinOp::Less,
                Token::LessEqual => BinOp::LessEqual,
                Token::Greater => BinOp::Greater,
                Token::GreaterEqual => BinOp::GreaterEqual,
                _ => break,
            };
            let pos = self.current_pos();
            self.advance();
            let rhs = self.term()?;
            expr = Expr::Binary {
                op,
                pos,
                lhs: Box::new(expr),
                rhs: Box::new(rhs),
            };
        }
        Ok(expr)
    }

    fn term(&mut self) -> ParseResult<Expr> {
        let mut expr = self.factor()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            let pos = self.current_pos();
            self.advance();
            let rhs = self.factor()?;
            expr = Expr::Binary {
                op,
                pos,
                lhs: Box::new(expr),
                rhs: Box::new(rhs),
            };
        }
        Ok(expr)
    }

    fn factor(&mut self) -> ParseResult<Expr> {
        let mut expr = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                _ => break,
            };
            let pos = self.current_pos();
            self.advance();
            let rhs = self.unary()?;
            expr = Expr::Binary {
                op,
                pos,
                lhs: Box::new(expr),
                rhs: Box::new(rhs),
            };
        }
        Ok(expr)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        match self.peek() {
            Token::Bang => {
                let pos = self.current_pos();
                self.advance();
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    pos,
                    operand: Box::new(self.unary()?),
                })
            }
            Token::Minus => {
                let pos = self.current_pos();
                self.advance();
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    pos,
                    operand: Box::new(self.unary()?),
                })
            }
            Token::PlusPlus | Token::MinusMinus => {
                let (op, lexeme) = if matches!(self.peek(), Token::PlusPlus) {
                    (UnaryOp::Inc, "++")
                } else {
                    (UnaryOp::Dec, "--")
                };
                let pos = self.current_pos();
                self.advance();
                let operand = self.primary()?;
                if !matches!(operand, Expr::Var(_)) {
                    self.report(
                        pos,
                        &format!(" at '{}'", lexeme),
                        "Can only increment or decrement variables.",
                    );
                }
                Ok(Expr::Unary {
                    op,
                    pos,
                    operand: Box::new(operand),
                })
            }
            _ => self.postfix(),
        }
    }

    /// `call ( "++" | "--" | "\" )?`.
    fn postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.call()?;

        if matches!(self.peek(), Token::PlusPlus | Token::MinusMinus) {
            let (op, lexeme) = if matches!(self.peek(), Token::PlusPlus) {
                (PostfixOp::Inc, "++")
            } else {
                (PostfixOp::Dec, "--")
            };
            let pos = self.current_pos();
            self.advance();
            if !matches!(expr, Expr::Var(_)) {
                self.report(
                    pos,
                    &format!(" at '{}'", lexeme),
                    "Can only increment or decrement variables.",
                );
            }
            expr = Expr::Postfix {
                op,
                pos,
                operand: Box::new(expr),
            };
            if matches!(self.peek(), Token::PlusPlus | Token::MinusMinus) {
                self.advance();
                self.report_previous("Cannot concatenate operators '++' and '--'.");
            }
        }

        if matches!(self.peek(), Token::Backslash) {
            let pos = self.current_pos();
            self.advance();
            expr = Expr::Postfix {
                op: PostfixOp::Newline,
                pos,
                operand: Box::new(expr),
            };
        }

        Ok(expr)
    }

    fn call(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;
        while matches!(self.peek(), Token::LeftParen) {
            self.advance();
            expr = self.finish_call(expr)?;
        }
        Ok(expr)
    }

    /// Arguments sit at assignment precedence so commas separate them.
    fn finish_call(&mut self, callee: Expr) -> ParseResult<Expr> {
        let mut args = vec![];
        if !matches!(self.peek(), Token::RightParen) {
            loop {
                if args.len() >= 255 {
                    self.report_current("Can't have more than 255 arguments.");
                }
                args.push(self.assignment()?);
                if !matches!(self.peek(), Token::Comma) {
                    break;
                }
                self.advance();
            }
        }
        let pos = self.current_pos();
        self.consume(Token::RightParen, "Expect ')' after arguments.")?;
        Ok(Expr::Call {
            callee: Box::new(callee),
            pos,
            args,
        })
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let pos = self.current_pos();
        match self.peek().clone() {
            Token::False => {
                self.advance();
                Ok(Expr::Literal(Lit::Bool(false)))
            }
            Token::True => {
                self.advance();
                Ok(Expr::Literal(Lit::Bool(true)))
            }
            Token::Nil => {
                self.advance();
                Ok(Expr::Literal(Lit::Nil))
            }
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Literal(Lit::Number(n)))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Literal(Lit::Str(Rc::from(s.as_str()))))
            }
            Token::Fun => {
                self.advance();
                Ok(Expr::Function(self.function_body()?))
            }
            Token::Identifier(name) => {
                self.advance();
                Ok(Expr::Var(VarRef {
                    id: self.new_expr_id(),
                    name,
                    pos,
                }))
            }
            Token::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume(Token::RightParen, "Expect ')' after expression.")?;
                Ok(Expr::Group(Box::new(expr)))
            }

            // Error productions: a leading binary operator.  Report, consume
            // the would-be right operand at the matching precedence, and hand
            // back a placeholder so parsing can go on.
            Token::BangEqual | Token::EqualEqual => {
                self.advance();
                self.report_previous("Missing left-hand operand.");
                self.equality()?;
                Ok(Expr::Literal(Lit::Nil))
            }
            Token::Greater | Token::GreaterEqual | Token::Less | Token::LessEqual => {
                self.advance();
                self.report_previous("Missing left-hand operand.");
                self.comparison()?;
                Ok(Expr::Literal(Lit::Nil))
            }
            Token::Plus => {
                self.advance();
                self.report_previous("Missing left-hand operand.");
                self.term()?;
                Ok(Expr::Literal(Lit::Nil))
            }
            Token::Slash | Token::Star => {
                self.advance();
                self.report_previous("Missing left-hand operand.");
                self.factor()?;
                Ok(Expr::Literal(Lit::Nil))
            }

            _ => Err(self.error("Expect expression.")),
        }
    }

    /// Discards tokens until a likely statement boundary: just past a `;`,
    /// or in front of a keyword that starts a statement.
    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if matches!(self.previous(), Token::Semicolon) {
                return;
            }
            match self.peek() {
                Token::Class
                | Token::Fun
                | Token::Var
                | Token::For
                | Token::If
                | Token::While
                | Token::Print
                | Token::Break
                | Token::Continue
                | Token::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    fn new_expr_id(&mut self) -> ExprId {
        let id = self.next_expr_id;
        self.next_expr_id += 1;
        id
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current].1
    }

    fn next_is_identifier(&self) -> bool {
        matches!(
            self.tokens.get(self.current + 1),
            Some((_, Token::Identifier(_)))
        )
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1].1
    }

    fn current_pos(&self) -> Position {
        self.tokens[self.current].0
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.current += 1;
        }
    }

    fn consume(&mut self, expected: Token, message: &str) -> ParseResult<()> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn consume_identifier(&mut self, message: &str) -> ParseResult<(Symbol, Position)> {
        if let Token::Identifier(name) = self.peek() {
            let name = name.clone();
            let pos = self.current_pos();
            self.advance();
            Ok((name, pos))
        } else {
            Err(self.error(message))
        }
    }

    /// Reports at the current token and hands back the panic marker.
    fn error(&mut self, message: &str) -> ParsePanic {
        let (pos, token) = &self.tokens[self.current];
        self.diagnostics
            .static_error(*pos, &location_of(token), message);
        ParsePanic
    }

    fn report_current(&self, message: &str) {
        let (pos, token) = &self.tokens[self.current];
        self.report(*pos, &location_of(token), message);
    }

    fn report_previous(&self, message: &str) {
        let (pos, token) = &self.tokens[self.current - 1];
        self.report(*pos, &location_of(token), message);
    }

    fn report(&self, pos: Position, location: &str, message: &str) {
        self.diagnostics.static_error(pos, location, message);
    }
}

fn location_of(token: &Token) -> String {
    match token {
        Token::Eof => " at end".to_string(),
        t => format!(" at '{}'", t),
    }
}
