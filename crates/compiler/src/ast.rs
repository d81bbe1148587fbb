//! Abstract syntax tree for Hawk programs.
//!
//! Three families of nodes: statements, expressions, and primaries
//! (folded into [`ExprKind`]). Every node carries the source location of
//! the token it started at. Variable primaries are already resolved into
//! scoped slots by the parser; only implicit named variables stay by name.

use std::collections::HashMap;
use std::rc::Rc;

use hawk_core::{Loc, Rex};

/// A parsed program: the tree root owned by the interpreter handle.
#[derive(Debug, Default)]
pub struct Program {
    pub begins: Vec<Stmt>,
    pub ends: Vec<Stmt>,
    pub chain: Vec<PatternAction>,
    pub funs: HashMap<String, Rc<FunDef>>,
    /// Global names by slot; built-ins first, embedder and `@global`
    /// registrations after.
    pub globals: Vec<String>,
    /// Implicitly created named variables.
    pub named: Vec<String>,
    /// Evaluator stack limit requested by `@pragma stack_limit`.
    pub rtx_stack_limit: Option<usize>,
}

#[derive(Debug)]
pub struct PatternAction {
    pub pattern: Pattern,
    /// `None` for a blockless pattern, which prints `$0`.
    pub action: Option<Stmt>,
    pub loc: Loc,
}

#[derive(Debug)]
pub enum Pattern {
    /// No pattern: the action applies to every record.
    All,
    Expr(Expr),
    Range(Expr, Expr),
}

/// A function definition.
#[derive(Debug)]
pub struct FunDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Stmt,
    pub loc: Loc,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub mode: ParamMode,
}

/// How an argument binds to its parameter slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamMode {
    Value,
    Reference,
}

#[derive(Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub loc: Loc,
}

#[derive(Debug)]
pub enum StmtKind {
    /// `;`
    Null,
    /// `{ ... }` with the number of locals declared directly in it.
    Block { nlocals: usize, body: Vec<Stmt> },
    Expr(Expr),
    If {
        test: Expr,
        then: Box<Stmt>,
        alt: Option<Box<Stmt>>,
    },
    While { test: Expr, body: Box<Stmt> },
    DoWhile { test: Expr, body: Box<Stmt> },
    For {
        init: Option<Expr>,
        test: Option<Expr>,
        incr: Option<Expr>,
        body: Box<Stmt>,
    },
    /// `for (var in container) body`
    ForIn {
        var: Expr,
        list: Expr,
        body: Box<Stmt>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Exit { val: Option<Expr>, abort: bool },
    Next,
    /// `nextfile` / `nextofile`; `out` distinguishes the output side.
    NextFile { out: bool },
    Delete(Expr),
    Reset(Expr),
    Print {
        args: Vec<Expr>,
        out: Option<(OutType, Expr)>,
    },
    Printf {
        args: Vec<Expr>,
        out: Option<(OutType, Expr)>,
    },
}

/// Output redirection targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutType {
    Console,
    /// `> file`
    File,
    /// `>> file`
    ApFile,
    /// `| cmd`
    Pipe,
    /// `|| cmd` under the `RW_PIPE` trait.
    RwPipe,
}

/// Input sources for `getline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InType {
    Console,
    /// `getline < file`
    File,
    /// `cmd | getline`
    Pipe,
    /// `cmd || getline` under the `RW_PIPE` trait.
    RwPipe,
}

#[derive(Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub loc: Loc,
    /// Whether the expression was written inside its own parentheses.
    /// `print (1 > 2)` must not be split into a redirection.
    pub paren: bool,
}

#[derive(Debug)]
pub enum ExprKind {
    // primaries
    Int(i64),
    Flt(f64),
    Str(String),
    Mbs(Vec<u8>),
    Char(char),
    ByteChar(u8),
    /// A regex literal, compiled at parse time.
    Rex(Rc<Rex>),
    /// A function used as a value.
    FunRef(String),
    /// `$expr`
    Positional(Box<Expr>),
    Named(String),
    NamedIdx(String, Vec<Expr>),
    Global(usize),
    GlobalIdx(usize, Vec<Expr>),
    Local(usize),
    LocalIdx(usize, Vec<Expr>),
    Arg(usize),
    ArgIdx(usize, Vec<Expr>),

    // expressions
    /// `(e)` or `(e1, e2, ...)`
    Group(Vec<Expr>),
    Assign {
        op: AssignOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary { op: UnOp, operand: Box<Expr> },
    IncPre { op: IncOp, operand: Box<Expr> },
    IncPost { op: IncOp, operand: Box<Expr> },
    Cond {
        test: Box<Expr>,
        then: Box<Expr>,
        alt: Box<Expr>,
    },
    CallIntrinsic {
        name: String,
        spec: Rc<crate::hawk::IntrinsicSpec>,
        args: Vec<Expr>,
    },
    CallUser { name: String, args: Vec<Expr> },
    /// Calling through a variable holding a function reference.
    CallVar { var: Box<Expr>, args: Vec<Expr> },
    Getline {
        var: Option<Box<Expr>>,
        in_type: InType,
        src: Option<Box<Expr>>,
    },
}

impl Expr {
    pub fn new(kind: ExprKind, loc: Loc) -> Expr {
        Expr {
            kind,
            loc,
            paren: false,
        }
    }

    /// Whether the node may appear on the left of an assignment or be
    /// passed to a reference parameter.
    pub fn is_lvalue(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Named(_)
                | ExprKind::NamedIdx(..)
                | ExprKind::Global(_)
                | ExprKind::GlobalIdx(..)
                | ExprKind::Local(_)
                | ExprKind::LocalIdx(..)
                | ExprKind::Arg(_)
                | ExprKind::ArgIdx(..)
                | ExprKind::Positional(_)
        )
    }
}

/// Compound assignment operators; `None` is plain `=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    None,
    Plus,
    Minus,
    Mul,
    Div,
    Idiv,
    Mod,
    Exp,
    Concat,
    Shr,
    Shl,
    Band,
    Bxor,
    Bor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Lor,
    Land,
    In,
    Ma,
    Nm,
    Bor,
    Bxor,
    Band,
    Teq,
    Tne,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Shl,
    Shr,
    Concat,
    Plus,
    Minus,
    Mul,
    Div,
    Idiv,
    Mod,
    Exp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Plus,
    Minus,
    LNot,
    BNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncOp {
    Plus,
    Minus,
}

impl Program {
    pub fn find_fun(&self, name: &str) -> Option<&Rc<FunDef>> {
        self.funs.get(name)
    }

    pub fn find_global(&self, name: &str) -> Option<usize> {
        self.globals.iter().position(|g| g == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lvalue_classification() {
        let loc = Loc::default();
        assert!(Expr::new(ExprKind::Global(3), loc.clone()).is_lvalue());
        assert!(Expr::new(
            ExprKind::Positional(Box::new(Expr::new(ExprKind::Int(1), loc.clone()))),
            loc.clone()
        )
        .is_lvalue());
        assert!(!Expr::new(ExprKind::Int(1), loc).is_lvalue());
    }
}
