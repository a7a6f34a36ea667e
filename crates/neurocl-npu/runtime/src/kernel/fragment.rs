// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Restricted elementwise language
//!
//! Kernel bodies are small imperative fragments over named scalars:
//! assignments, conditionals, arithmetic, a handful of math builtins, and
//! (for direct-function kernels only) indexed loads and stores. The same
//! tree is rendered to WGSL for GPU devices and interpreted by the host
//! device, so both produce identical results for the same fragment.

use std::collections::BTreeSet;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Name of the output vector a direct-function fragment stores into
pub const DIRECT_OUTPUT_NAME: &str = "y";

/// Math builtins available to fragments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// ln(1 + x)
    Log1p,
    /// e^x
    Exp,
    /// Natural logarithm
    Log,
    /// Larger of two values
    Max,
    /// Smaller of two values
    Min,
    /// Absolute value
    Abs,
    /// Square root
    Sqrt,
    /// Hyperbolic tangent
    Tanh,
}

impl Builtin {
    /// Number of arguments the builtin takes
    pub fn arity(self) -> usize {
        match self {
            Builtin::Max | Builtin::Min => 2,
            _ => 1,
        }
    }

    /// Lower-case builtin name
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Log1p => "log1p",
            Builtin::Exp => "exp",
            Builtin::Log => "log",
            Builtin::Max => "max",
            Builtin::Min => "min",
            Builtin::Abs => "abs",
            Builtin::Sqrt => "sqrt",
            Builtin::Tanh => "tanh",
        }
    }

    /// Evaluate on host floats (arity already checked)
    pub fn apply(self, args: &[f32]) -> f32 {
        match self {
            Builtin::Log1p => args[0].ln_1p(),
            Builtin::Exp => args[0].exp(),
            Builtin::Log => args[0].ln(),
            Builtin::Max => args[0].max(args[1]),
            Builtin::Min => args[0].min(args[1]),
            Builtin::Abs => args[0].abs(),
            Builtin::Sqrt => args[0].sqrt(),
            Builtin::Tanh => args[0].tanh(),
        }
    }
}

/// Arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    /// Operator symbol
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    /// Evaluate on host floats
    pub fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    /// Operator symbol
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
        }
    }

    /// Evaluate on host floats
    pub fn apply(self, a: f32, b: f32) -> bool {
        match self {
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
        }
    }
}

/// Scalar expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Float literal
    Const(f32),
    /// Named scalar (input, output, parameter, constant or local)
    Var(String),
    /// Arithmetic negation
    Neg(Box<Expr>),
    /// Binary arithmetic
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// Builtin call
    Call(Builtin, Vec<Expr>),
    /// `cond ? a : b`
    Select(Box<Cond>, Box<Expr>, Box<Expr>),
    /// Element of a named vector (direct-function kernels only)
    Index(String, Box<Expr>),
}

/// Boolean condition
#[derive(Debug, Clone, PartialEq)]
pub enum Cond {
    Compare(CmpOp, Expr, Expr),
    And(Box<Cond>, Box<Cond>),
    Or(Box<Cond>, Box<Cond>),
    Not(Box<Cond>),
}

/// Statement
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `name = value`
    Assign(String, Expr),
    /// Two-armed conditional (either arm may be empty)
    If {
        cond: Cond,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
    /// `target[index] = value` (direct-function kernels only)
    Store {
        target: String,
        index: Expr,
        value: Expr,
    },
}

/// Fragment: local declarations plus a statement list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    /// Scratch scalars, zero-initialised per element
    pub locals: Vec<String>,
    /// Statements executed per element
    pub body: Vec<Stmt>,
}

impl Expr {
    /// Float literal
    pub fn c(value: f32) -> Self {
        Expr::Const(value)
    }

    /// Named scalar
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    /// Builtin call
    pub fn call(builtin: Builtin, args: Vec<Expr>) -> Self {
        Expr::Call(builtin, args)
    }

    /// Conditional value
    pub fn select(cond: Cond, then: impl Into<Expr>, otherwise: impl Into<Expr>) -> Self {
        Expr::Select(Box::new(cond), Box::new(then.into()), Box::new(otherwise.into()))
    }

    /// Element `index` of vector `name`
    pub fn index(name: impl Into<String>, index: impl Into<Expr>) -> Self {
        Expr::Index(name.into(), Box::new(index.into()))
    }

    pub fn log1p(self) -> Self {
        Expr::Call(Builtin::Log1p, vec![self])
    }

    pub fn exp(self) -> Self {
        Expr::Call(Builtin::Exp, vec![self])
    }

    pub fn max(self, other: impl Into<Expr>) -> Self {
        Expr::Call(Builtin::Max, vec![self, other.into()])
    }

    pub fn min(self, other: impl Into<Expr>) -> Self {
        Expr::Call(Builtin::Min, vec![self, other.into()])
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Cond {
        Cond::Compare(CmpOp::Lt, self, rhs.into())
    }

    pub fn le(self, rhs: impl Into<Expr>) -> Cond {
        Cond::Compare(CmpOp::Le, self, rhs.into())
    }

    pub fn gt(self, rhs: impl Into<Expr>) -> Cond {
        Cond::Compare(CmpOp::Gt, self, rhs.into())
    }

    pub fn ge(self, rhs: impl Into<Expr>) -> Cond {
        Cond::Compare(CmpOp::Ge, self, rhs.into())
    }

    pub fn equals(self, rhs: impl Into<Expr>) -> Cond {
        Cond::Compare(CmpOp::Eq, self, rhs.into())
    }
}

impl From<f32> for Expr {
    fn from(value: f32) -> Self {
        Expr::Const(value)
    }
}

impl From<&str> for Expr {
    fn from(name: &str) -> Self {
        Expr::Var(name.to_string())
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<R: Into<Expr>> $trait<R> for Expr {
            type Output = Expr;

            fn $method(self, rhs: R) -> Expr {
                Expr::Binary($op, Box::new(self), Box::new(rhs.into()))
            }
        }
    };
}

impl_binary_op!(Add, add, BinaryOp::Add);
impl_binary_op!(Sub, sub, BinaryOp::Sub);
impl_binary_op!(Mul, mul, BinaryOp::Mul);
impl_binary_op!(Div, div, BinaryOp::Div);

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

impl Cond {
    pub fn and(self, other: Cond) -> Cond {
        Cond::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Cond) -> Cond {
        Cond::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Cond {
        Cond::Not(Box::new(self))
    }
}

impl Stmt {
    /// `name = value`
    pub fn assign(name: impl Into<String>, value: impl Into<Expr>) -> Self {
        Stmt::Assign(name.into(), value.into())
    }

    /// Conditional with an empty else arm
    pub fn when(cond: Cond, then: Vec<Stmt>) -> Self {
        Stmt::If {
            cond,
            then,
            otherwise: Vec::new(),
        }
    }

    /// Two-armed conditional
    pub fn if_else(cond: Cond, then: Vec<Stmt>, otherwise: Vec<Stmt>) -> Self {
        Stmt::If {
            cond,
            then,
            otherwise,
        }
    }

    /// `target[index] = value`
    pub fn store(target: impl Into<String>, index: impl Into<Expr>, value: impl Into<Expr>) -> Self {
        Stmt::Store {
            target: target.into(),
            index: index.into(),
            value: value.into(),
        }
    }
}

impl Fragment {
    /// Fragment without locals
    pub fn new(body: Vec<Stmt>) -> Self {
        Self {
            locals: Vec::new(),
            body,
        }
    }

    /// Declare scratch locals
    pub fn with_locals<I, S>(mut self, locals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.locals.extend(locals.into_iter().map(Into::into));
        self
    }

    /// Every scalar name the fragment reads
    pub fn referenced_names(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        for stmt in &self.body {
            stmt_reads(stmt, &mut names);
        }
        names
    }

    /// Every scalar name the fragment assigns
    pub fn assigned_names(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        for stmt in &self.body {
            stmt_writes(stmt, &mut names);
        }
        names
    }

    /// Walk every expression in the fragment
    pub fn visit_exprs<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        for stmt in &self.body {
            visit_stmt(stmt, f);
        }
    }

    /// Walk every statement in the fragment, nested ones included
    pub fn visit_stmts<'a>(&'a self, f: &mut dyn FnMut(&'a Stmt)) {
        fn walk<'a>(stmts: &'a [Stmt], f: &mut dyn FnMut(&'a Stmt)) {
            for stmt in stmts {
                f(stmt);
                if let Stmt::If { then, otherwise, .. } = stmt {
                    walk(then, f);
                    walk(otherwise, f);
                }
            }
        }
        walk(&self.body, f);
    }
}

fn visit_stmt<'a>(stmt: &'a Stmt, f: &mut dyn FnMut(&'a Expr)) {
    match stmt {
        Stmt::Assign(_, value) => visit_expr(value, f),
        Stmt::If {
            cond,
            then,
            otherwise,
        } => {
            visit_cond(cond, f);
            for s in then.iter().chain(otherwise) {
                visit_stmt(s, f);
            }
        }
        Stmt::Store { index, value, .. } => {
            visit_expr(index, f);
            visit_expr(value, f);
        }
    }
}

fn visit_cond<'a>(cond: &'a Cond, f: &mut dyn FnMut(&'a Expr)) {
    match cond {
        Cond::Compare(_, a, b) => {
            visit_expr(a, f);
            visit_expr(b, f);
        }
        Cond::And(a, b) | Cond::Or(a, b) => {
            visit_cond(a, f);
            visit_cond(b, f);
        }
        Cond::Not(a) => visit_cond(a, f),
    }
}

fn visit_expr<'a>(expr: &'a Expr, f: &mut dyn FnMut(&'a Expr)) {
    f(expr);
    match expr {
        Expr::Const(_) | Expr::Var(_) => {}
        Expr::Neg(a) => visit_expr(a, f),
        Expr::Binary(_, a, b) => {
            visit_expr(a, f);
            visit_expr(b, f);
        }
        Expr::Call(_, args) => {
            for a in args {
                visit_expr(a, f);
            }
        }
        Expr::Select(cond, a, b) => {
            visit_cond(cond, f);
            visit_expr(a, f);
            visit_expr(b, f);
        }
        Expr::Index(_, index) => visit_expr(index, f),
    }
}

fn stmt_reads<'a>(stmt: &'a Stmt, names: &mut BTreeSet<&'a str>) {
    visit_stmt(stmt, &mut |expr: &'a Expr| {
        if let Expr::Var(name) = expr {
            names.insert(name.as_str());
        }
    });
}

fn stmt_writes<'a>(stmt: &'a Stmt, names: &mut BTreeSet<&'a str>) {
    match stmt {
        Stmt::Assign(name, _) => {
            names.insert(name.as_str());
        }
        Stmt::If { then, otherwise, .. } => {
            for s in then.iter().chain(otherwise) {
                stmt_writes(s, names);
            }
        }
        Stmt::Store { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_overloads_build_tree() {
        let e = Expr::var("a") * 2.0 + "b";
        assert_eq!(
            e,
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Binary(
                    BinaryOp::Mul,
                    Box::new(Expr::var("a")),
                    Box::new(Expr::c(2.0))
                )),
                Box::new(Expr::var("b"))
            )
        );
    }

    #[test]
    fn test_referenced_and_assigned_names() {
        let fragment = Fragment::new(vec![
            Stmt::assign("tmp", Expr::var("x") + "p"),
            Stmt::if_else(
                Expr::var("tmp").gt(0.0),
                vec![Stmt::assign("y", "tmp")],
                vec![Stmt::assign("y", Expr::c(0.0))],
            ),
        ])
        .with_locals(["tmp"]);

        let reads: Vec<&str> = fragment.referenced_names().into_iter().collect();
        assert_eq!(reads, vec!["p", "tmp", "x"]);
        let writes: Vec<&str> = fragment.assigned_names().into_iter().collect();
        assert_eq!(writes, vec!["tmp", "y"]);
    }

    #[test]
    fn test_builtin_apply() {
        assert_eq!(Builtin::Max.apply(&[1.0, 3.0]), 3.0);
        assert!((Builtin::Log1p.apply(&[1.0]) - std::f32::consts::LN_2).abs() < 1e-6);
        assert_eq!(Builtin::Max.arity(), 2);
        assert_eq!(Builtin::Exp.arity(), 1);
    }
}
