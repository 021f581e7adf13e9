//! Lexical scope resolution.
//!
//! A single pre-execution pass over the AST that binds every local variable
//! use to the distance (in scopes) between the use and the declaration.
//! Globals stay out of the table and fall back to the global environment at
//! run time.  The pass also enforces the scope rules the parser cannot see:
//! reading a local inside its own initializer, redeclaring a name in the
//! same local scope, and `return` outside any function.

use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use crate::ast::{Expr, ExprId, FunctionDecl, InterruptKind, Stmt};
use crate::diag::{Diagnostics, Position};
use crate::interner::Symbol;

#[derive(Debug, Error, PartialEq)]
pub enum ResolveError {
    #[error("Can't read local variable in its own initializer.")]
    ReadInOwnInitializer,
    #[error("Already a variable with this name in this scope.")]
    DuplicateDeclaration,
    #[error("Can't return from top-level code.")]
    TopLevelReturn,
}

/// The side-table produced by resolution: expression identity → number of
/// environments to skip when looking the name up.
pub type Locals = HashMap<ExprId, usize>;

#[derive(Debug, Clone, Copy, PartialEq)]
enum BindState {
    Declared,
    Defined,
}

#[derive(Debug)]
pub struct Resolver {
    scopes: Vec<HashMap<Symbol, BindState>>,
    function_depth: u32,
    locals: Locals,
    diagnostics: Rc<Diagnostics>,
}

impl Resolver {
    pub fn new(diagnostics: Rc<Diagnostics>) -> Resolver {
        Resolver {
            scopes: vec![],
            function_depth: 0,
            locals: Locals::new(),
            diagnostics,
        }
    }

    /// Walks the program once and returns the side-table.  Scope errors have
    /// been reported to the sink when this returns.
    pub fn resolve(mut self, statements: &[Stmt]) -> Locals {
        self.resolve_stmts(statements);
        self.locals
    }

    fn resolve_stmts(&mut self, statements: &[Stmt]) {
        for stmt in statements {
            self.resolve_stmt(stmt);
        }
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(expr) | Stmt::Print { expr, .. } => self.resolve_expr(expr),
            Stmt::VarDecl { name, pos, init } => {
                self.declare(name, *pos);
                if let Some(init) = init {
                    self.resolve_expr(init);
                }
                self.define(name);
            }
            Stmt::FunDecl { name, pos, fun } => {
                // The name is defined before the body resolves, so the
                // function can call itself.
                self.declare(name, *pos);
                self.define(name);
                self.resolve_function(fun);
            }
            Stmt::Block(statements) => {
                self.scopes.push(HashMap::new());
                self.resolve_stmts(statements);
                self.scopes.pop();
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(cond);
                self.resolve_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.resolve_stmt(else_branch);
                }
            }
            Stmt::While { cond, body } => {
                self.resolve_expr(cond);
                self.resolve_stmt(body);
            }
            // The initializer shares the enclosing scope; only the body (a
            // block, usually) introduces one.
            Stmt::For {
                init,
                cond,
                incr,
                body,
            } => {
                if let Some(init) = init {
                    self.resolve_stmt(init);
                }
                self.resolve_expr(cond);
                if let Some(incr) = incr {
                    self.resolve_expr(incr);
                }
                self.resolve_stmt(body);
            }
            Stmt::Interrupt { kind, pos, value } => {
                if *kind == InterruptKind::Return && self.function_depth == 0 {
                    self.error(*pos, "return", ResolveError::TopLevelReturn);
                }
                if let Some(value) = value {
                    self.resolve_expr(value);
                }
            }
        }
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(_) => {}
            Expr::Group(inner) => self.resolve_expr(inner),
            Expr::Var(var) => {
                if let Some(scope) = self.scopes.last() {
                    if scope.get(&var.name) == Some(&BindState::Declared) {
                        self.error(
                            var.pos,
                            var.name.as_str(),
                            ResolveError::ReadInOwnInitializer,
                        );
                    }
                }
                self.resolve_local(var.id, &var.name);
            }
            Expr::Assign {
                id, name, value, ..
            } => {
                self.resolve_expr(value);
                self.resolve_local(*id, name);
            }
            Expr::Unary { operand, .. } | Expr::Postfix { operand, .. } => {
                self.resolve_expr(operand)
            }
            Expr::Binary { lhs, rhs, .. } | Expr::Logical { lhs, rhs, .. } => {
                self.resolve_expr(lhs);
                self.resolve_expr(rhs);
            }
            Expr::Ternary {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                self.resolve_expr(cond);
                self.resolve_expr(then_branch);
                self.resolve_expr(else_branch);
            }
            Expr::Call { callee, args, .. } => {
                self.resolve_expr(callee);
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            Expr::Function(fun) => self.resolve_function(fun),
        }
    }

    /// Parameters and body statements share one scope, mirroring the call
    /// frame the evaluator builds.
    fn resolve_function(&mut self, fun: &FunctionDecl) {
        self.function_depth += 1;
        self.scopes.push(HashMap::new());
        for param in &fun.params {
            self.declare(param, fun.pos);
            self.define(param);
        }
        self.resolve_stmts(&fun.body);
        self.scopes.pop();
        self.function_depth -= 1;
    }

    /// Finds the innermost scope containing `name` and records its distance.
    /// Unresolved names are left to the global environment.
    fn resolve_local(&mut self, id: ExprId, name: &Symbol) {
        for (i, scope) in self.scopes.iter().enumerate().rev() {
            if scope.contains_key(name) {
                self.locals.insert(id, self.scopes.len() - 1 - i);
                return;
            }
        }
    }

    fn declare(&mut self, name: &Symbol, pos: Position) {
        let duplicate = match self.scopes.last_mut() {
            Some(scope) => scope.insert(name.clone(), BindState::Declared).is_some(),
            None => return,
        };
        if duplicate {
            self.error(pos, name.as_str(), ResolveError::DuplicateDeclaration);
        }
    }

    fn define(&mut self, name: &Symbol) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.clone(), BindState::Defined);
        }
    }

    fn error(&self, pos: Position, lexeme: &str, error: ResolveError) {
        self.diagnostics
            .static_error(pos, &format!(" at '{}'", lexeme), &error.to_string());
    }
}
