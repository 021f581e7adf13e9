use std::io::prelude::*;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::ast::{
    AssignOp, BinOp, Expr, ExprId, InterruptKind, Lit, LogicalOp, PostfixOp, Stmt, UnaryOp, VarRef,
};
use crate::ctx::Context;
use crate::diag::{Position, RuntimeError, RuntimeErrorKind};
use crate::env::Env;
use crate::interner::Symbol;
use crate::resolver::Locals;
use crate::value::{Function, FunctionBody, NativeFn, Value};

/// Outcome of executing a statement.  `Break`/`Continue` are consumed by the
/// enclosing loop, `Return` by the enclosing call frame; `Normal` falls
/// through to the next statement.
#[derive(Debug, PartialEq)]
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Walks the AST and executes it.
///
/// All program output goes through the injected writer.  Variable accesses
/// use the resolver's side-table when a distance was recorded and fall back
/// to the global environment otherwise.
#[derive(Debug)]
pub struct Evaluator<'t, W: Write> {
    output: &'t mut W,
    globals: Rc<Env>,
    locals: Locals,
}

impl<'t, W: Write> Evaluator<'t, W> {
    pub fn new(output: &'t mut W, ctx: Rc<Context>) -> Evaluator<'t, W> {
        let globals = Env::new();
        define_native(&globals, &ctx, "clock", 0, native_clock);
        define_native(&globals, &ctx, "println", 1, native_println);
        Evaluator {
            output,
            globals,
            locals: Locals::new(),
        }
    }

    /// Merges freshly resolved distances in.  The table accumulates over a
    /// session: closures created by earlier runs keep their entries.
    pub fn add_locals(&mut self, locals: Locals) {
        self.locals.extend(locals);
    }

    /// Executes top-level statements against the global environment,
    /// stopping at the first runtime error.
    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<(), RuntimeError> {
        let globals = self.globals.clone();
        for stmt in statements {
            // Interrupts cannot reach the top level: the parser rejects
            // stray break/continue and the resolver stray returns.
            self.exec_stmt(stmt, &globals)?;
        }
        Ok(())
    }

    fn exec_stmts(&mut self, statements: &[Stmt], env: &Rc<Env>) -> Result<Flow, RuntimeError> {
        for stmt in statements {
            match self.exec_stmt(stmt, env)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &Rc<Env>) -> Result<Flow, RuntimeError> {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval_expr(expr, env)?;
            }
            Stmt::Print { pos, expr } => {
                let value = self.eval_expr(expr, env)?;
                write!(self.output, "{}", value)
                    .map_err(|e| RuntimeError::new(*pos, e.into()))?;
            }
            Stmt::VarDecl { name, pos, init } => {
                let value = match init {
                    Some(init) => self.eval_expr(init, env)?,
                    None => Value::Uninit,
                };
                env.define(name, value)
                    .map_err(|kind| RuntimeError::new(*pos, kind))?;
            }
            Stmt::FunDecl { name, pos, fun } => {
                let function = Function::user(Some(name.clone()), fun.clone(), env.clone());
                env.define(name, Value::Function(function))
                    .map_err(|kind| RuntimeError::new(*pos, kind))?;
            }
            Stmt::Block(statements) => {
                let child = Env::with_parent(Some(env.clone()));
                return self.exec_stmts(statements, &child);
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.eval_expr(cond, env)?.is_truthy() {
                    return self.exec_stmt(then_branch, env);
                } else if let Some(else_branch) = else_branch {
                    return self.exec_stmt(else_branch, env);
                }
            }
            Stmt::While { cond, body } => {
                while self.eval_expr(cond, env)?.is_truthy() {
                    match self.exec_stmt(body, env)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
            }
            Stmt::For {
                init,
                cond,
                incr,
                body,
            } => {
                if let Some(init) = init {
                    self.exec_stmt(init, env)?;
                }
                while self.eval_expr(cond, env)?.is_truthy() {
                    match self.exec_stmt(body, env)? {
                        // A continue still runs the increment below.
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                    if let Some(incr) = incr {
                        self.eval_expr(incr, env)?;
                    }
                }
            }
            Stmt::Interrupt { kind, value, .. } => {
                return Ok(match kind {
                    InterruptKind::Break => Flow::Break,
                    InterruptKind::Continue => Flow::Continue,
                    InterruptKind::Return => {
                        let value = match value {
                            Some(value) => self.eval_expr(value, env)?,
                            None => Value::Nil,
                        };
                        Flow::Return(value)
                    }
                });
            }
        }
        Ok(Flow::Normal)
    }

    fn eval_expr(&mut self, expr: &Expr, env: &Rc<Env>) -> Result<Value, RuntimeError> {
        let value = match expr {
            Expr::Literal(lit) => match lit {
                Lit::Nil => Value::Nil,
                Lit::Bool(b) => Value::Bool(*b),
                Lit::Number(n) => Value::Number(*n),
                Lit::Str(s) => Value::Str(s.clone()),
            },
            Expr::Group(inner) => self.eval_expr(inner, env)?,
            Expr::Var(var) => self.look_up(var, env)?,
            Expr::Assign {
                id,
                name,
                op,
                pos,
                value,
            } => {
                let value = self.eval_expr(value, env)?;
                let old = self.fetch(*id, name, env).ok_or_else(|| {
                    RuntimeError::new(
                        *pos,
                        RuntimeErrorKind::UndefinedVariable {
                            name: name.to_string(),
                        },
                    )
                })?;
                let value = match op {
                    AssignOp::Set => value,
                    AssignOp::Add => add(old, value, *pos)?,
                    AssignOp::Sub => {
                        let (l, r) = number_operands(old, value, "-=", *pos)?;
                        Value::Number(l - r)
                    }
                    AssignOp::Mul => {
                        let (l, r) = number_operands(old, value, "*=", *pos)?;
                        Value::Number(l * r)
                    }
                    AssignOp::Div => {
                        let (l, r) = number_operands(old, value, "/=", *pos)?;
                        Value::Number(l / r)
                    }
                };
                self.store(*id, name, *pos, value.clone(), env)?;
                value
            }
            Expr::Unary { op, pos, operand } => match op {
                UnaryOp::Not => {
                    let value = self.eval_expr(operand, env)?;
                    Value::Bool(!value.is_truthy())
                }
                UnaryOp::Neg => match self.eval_expr(operand, env)? {
                    Value::Number(n) => Value::Number(-n),
                    _ => {
                        return Err(RuntimeError::new(
                            *pos,
                            RuntimeErrorKind::OperandMustBeNumber { operator: "-" },
                        ))
                    }
                },
                UnaryOp::Inc => self.increment(operand, 1.0, true, "++", *pos, env)?,
                UnaryOp::Dec => self.increment(operand, -1.0, true, "--", *pos, env)?,
            },
            Expr::Postfix { op, pos, operand } => match op {
                PostfixOp::Inc => self.increment(operand, 1.0, false, "++", *pos, env)?,
                PostfixOp::Dec => self.increment(operand, -1.0, false, "--", *pos, env)?,
                PostfixOp::Newline => match self.eval_expr(operand, env)? {
                    Value::Str(s) => Value::Str(format!("{}\n", s).into()),
                    _ => {
                        return Err(RuntimeError::new(
                            *pos,
                            RuntimeErrorKind::BackslashOnNonString,
                        ))
                    }
                },
            },
            Expr::Binary { op, pos, lhs, rhs } => {
                let l = self.eval_expr(lhs, env)?;
                let r = self.eval_expr(rhs, env)?;
                match op {
                    BinOp::Add => add(l, r, *pos)?,
                    BinOp::Sub | BinOp::Mul | BinOp::Div => {
                        let (l, r) = number_operands(l, r, op.lexeme(), *pos)?;
                        Value::Number(match op {
                            BinOp::Sub => l - r,
                            BinOp::Mul => l * r,
                            _ => l / r,
                        })
                    }
                    BinOp::Less | BinOp::LessEqual | BinOp::Greater | BinOp::GreaterEqual => {
                        let (l, r) = number_operands(l, r, op.lexeme(), *pos)?;
                        Value::Bool(match op {
                            BinOp::Less => l < r,
                            BinOp::LessEqual => l <= r,
                            BinOp::Greater => l > r,
                            _ => l >= r,
                        })
                    }
                    BinOp::Equal => Value::Bool(l == r),
                    BinOp::NotEqual => Value::Bool(l != r),
                    // The sequencing operator doubles as string joining: if
                    // either side is a string the pair concatenates.
                    BinOp::Comma => {
                        if matches!(l, Value::Str(_)) || matches!(r, Value::Str(_)) {
                            Value::Str(format!("{}{}", l, r).into())
                        } else {
                            r
                        }
                    }
                }
            }
            Expr::Logical { op, lhs, rhs } => {
                let l = self.eval_expr(lhs, env)?;
                match op {
                    LogicalOp::Or if l.is_truthy() => l,
                    LogicalOp::And if !l.is_truthy() => l,
                    _ => self.eval_expr(rhs, env)?,
                }
            }
            // Both branches evaluate before the condition picks one.
            Expr::Ternary {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                let cond = self.eval_expr(cond, env)?;
                let then_value = self.eval_expr(then_branch, env)?;
                let else_value = self.eval_expr(else_branch, env)?;
                if cond.is_truthy() {
                    then_value
                } else {
                    else_value
                }
            }
            Expr::Call { callee, pos, args } => {
                let callee = self.eval_expr(callee, env)?;
                let mut arg_values = Vec::with_capacity(args.len());
                for arg in args {
                    arg_values.push(self.eval_expr(arg, env)?);
                }
                self.call(callee, arg_values, *pos)?
            }
            Expr::Function(decl) => {
                Value::Function(Function::user(None, decl.clone(), env.clone()))
            }
        };
        Ok(value)
    }

    fn call(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        pos: Position,
    ) -> Result<Value, RuntimeError> {
        let fun = match &callee {
            Value::Function(fun) => fun.clone(),
            _ => return Err(RuntimeError::new(pos, RuntimeErrorKind::NotCallable)),
        };
        if args.len() != fun.arity() {
            return Err(RuntimeError::new(
                pos,
                RuntimeErrorKind::ArityMismatch {
                    expected: fun.arity(),
                    found: args.len(),
                },
            ));
        }
        match fun.body() {
            FunctionBody::Native { call, .. } => call(&mut *self.output, &callee, &args)
                .map_err(|kind| RuntimeError::new(pos, kind)),
            FunctionBody::User { decl, closure } => {
                let call_env = Env::with_parent(Some(closure.clone()));
                for (param, arg) in decl.params.iter().zip(args) {
                    call_env
                        .define(param, arg)
                        .map_err(|kind| RuntimeError::new(pos, kind))?;
                }
                // The frame consumes a return; break/continue cannot cross a
                // call boundary.
                match self.exec_stmts(&decl.body, &call_env)? {
                    Flow::Return(value) => Ok(value),
                    _ => Ok(Value::Nil),
                }
            }
        }
    }

    /// Reads a variable through its resolved distance, or from globals.
    fn look_up(&self, var: &VarRef, env: &Rc<Env>) -> Result<Value, RuntimeError> {
        let value = match self.locals.get(&var.id) {
            Some(&distance) => env.get_at(distance, &var.name),
            None => self.globals.get(&var.name),
        };
        match value {
            Some(Value::Uninit) => Err(RuntimeError::new(
                var.pos,
                RuntimeErrorKind::UninitializedVariable {
                    name: var.name.to_string(),
                },
            )),
            Some(value) => Ok(value),
            None => Err(RuntimeError::new(
                var.pos,
                RuntimeErrorKind::UndefinedVariable {
                    name: var.name.to_string(),
                },
            )),
        }
    }

    /// The old-value fetch for assignments: same resolution path as
    /// [`Self::look_up`] but without the uninitialized-read check, so plain
    /// `=` can overwrite a declared-but-unassigned binding.
    fn fetch(&self, id: ExprId, name: &Symbol, env: &Rc<Env>) -> Option<Value> {
        match self.locals.get(&id) {
            Some(&distance) => env.get_at(distance, name),
            None => self.globals.get(name),
        }
    }

    fn store(
        &self,
        id: ExprId,
        name: &Symbol,
        pos: Position,
        value: Value,
        env: &Rc<Env>,
    ) -> Result<(), RuntimeError> {
        match self.locals.get(&id) {
            Some(&distance) => env.assign_at(distance, name, value),
            None => self.globals.assign(name, value),
        }
        .map_err(|kind| RuntimeError::new(pos, kind))
    }

    /// Shared core of the four increment/decrement forms.  The prefix forms
    /// hand back the updated value, the postfix forms the original.
    fn increment(
        &mut self,
        operand: &Expr,
        delta: f64,
        return_new: bool,
        operator: &'static str,
        pos: Position,
        env: &Rc<Env>,
    ) -> Result<Value, RuntimeError> {
        let var = match operand {
            Expr::Var(var) => var,
            _ => {
                return Err(RuntimeError::new(
                    pos,
                    RuntimeErrorKind::InvalidIncrementTarget,
                ))
            }
        };
        let old = match self.look_up(var, env)? {
            Value::Number(n) => n,
            _ => {
                return Err(RuntimeError::new(
                    pos,
                    RuntimeErrorKind::OperandMustBeNumber { operator },
                ))
            }
        };
        let new = old + delta;
        self.store(var.id, &var.name, pos, Value::Number(new), env)?;
        Ok(Value::Number(if return_new { new } else { old }))
    }
}

/// The overloaded `+`: numeric addition, or concatenation when either side
/// is a string (the other side is stringified).
fn add(l: Value, r: Value, pos: Position) -> Result<Value, RuntimeError> {
    match (&l, &r) {
        (Value::Number(l), Value::Number(r)) => Ok(Value::Number(l + r)),
        (Value::Str(_), _) | (_, Value::Str(_)) => {
            Ok(Value::Str(format!("{}{}", l, r).into()))
        }
        _ => Err(RuntimeError::new(pos, RuntimeErrorKind::AddOperands)),
    }
}

fn number_operands(
    l: Value,
    r: Value,
    operator: &'static str,
    pos: Position,
) -> Result<(f64, f64), RuntimeError> {
    match (l, r) {
        (Value::Number(l), Value::Number(r)) => Ok((l, r)),
        _ => Err(RuntimeError::new(
            pos,
            RuntimeErrorKind::OperandsMustBeNumbers { operator },
        )),
    }
}

fn define_native(globals: &Rc<Env>, ctx: &Context, name: &str, arity: usize, call: NativeFn) {
    let sym = ctx.symbol(name);
    globals
        .define(&sym, Value::Function(Function::native(sym.clone(), arity, call)))
        .expect("error when binding native function");
}

fn native_clock(
    _out: &mut dyn Write,
    _callee: &Value,
    _args: &[Value],
) -> Result<Value, RuntimeErrorKind> {
    Ok(Value::Number(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("error when getting current time")
            .as_secs_f64(),
    ))
}

/// Prints its argument followed by a newline and evaluates to itself.
fn native_println(
    out: &mut dyn Write,
    callee: &Value,
    args: &[Value],
) -> Result<Value, RuntimeErrorKind> {
    writeln!(out, "{}", args[0])?;
    Ok(callee.clone())
}
