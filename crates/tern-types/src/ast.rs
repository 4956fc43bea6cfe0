//! AST node types for Tern source programs.
//!
//! Every node carries a [`Span`] for error reporting. Item order follows the
//! source; the emitter relies on it for function and global indices.

use crate::{Span, TypeDecl};

// ══════════════════════════════════════════════════════════════════════════════
// Top Level
// ══════════════════════════════════════════════════════════════════════════════

/// A parsed compilation unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub items: Vec<Item>,
    pub span: Span,
}

impl Program {
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.items.iter().filter_map(|item| match item {
            Item::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn globals(&self) -> impl Iterator<Item = &VarDecl> {
        self.items.iter().filter_map(|item| match item {
            Item::Var(v) => Some(v),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Function(FunctionDecl),
    Var(VarDecl),
    Const(ConstDecl),
}

/// A spanned identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Declarations
// ══════════════════════════════════════════════════════════════════════════════

/// `fn Name(a: Int, b: Int): Int { ... }`
///
/// Declarations with `@extern` have no body.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Ident,
    pub params: Vec<Param>,
    pub ret: TypeDecl,
    pub body: Option<Block>,
    pub extern_attr: Option<ExternAttr>,
    pub span: Span,
}

impl FunctionDecl {
    pub fn is_extern(&self) -> bool {
        self.extern_attr.is_some()
    }
}

/// `@extern("library")` or `@extern("library", "symbol")`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternAttr {
    pub library: String,
    /// Defaults to the function name when absent.
    pub symbol: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub ty: TypeDecl,
    pub span: Span,
}

/// `var name: Type [= init];`, both at top level and inside blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: Ident,
    pub ty: TypeDecl,
    pub init: Option<Expr>,
    pub span: Span,
}

/// `const name: Type = value;`
#[derive(Debug, Clone, PartialEq)]
pub struct ConstDecl {
    pub name: Ident,
    pub ty: TypeDecl,
    pub value: Expr,
    pub span: Span,
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Var(VarDecl),
    Assign(AssignStmt),
    Return(ReturnStmt),
    If(IfStmt),
    Expr(ExprStmt),
    Block(Block),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Var(s) => s.span,
            Stmt::Assign(s) => s.span,
            Stmt::Return(s) => s.span,
            Stmt::If(s) => s.span,
            Stmt::Expr(s) => s.span,
            Stmt::Block(s) => s.span,
        }
    }
}

/// `target = value;` where target is a name or an index expression.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignStmt {
    pub target: Expr,
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStmt {
    pub value: Option<Expr>,
    pub span: Span,
}

/// `if cond { ... } [elif cond { ... }]* [else { ... }]`
#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub cond: Expr,
    pub then_block: Block,
    pub else_branch: Option<ElseBranch>,
    pub span: Span,
}

/// `elif` chains nest as another [`IfStmt`].
#[derive(Debug, Clone, PartialEq)]
pub enum ElseBranch {
    Elif(Box<IfStmt>),
    Else(Block),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprStmt {
    pub expr: Expr,
    pub span: Span,
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Strip redundant parentheses.
    pub fn peel(&self) -> &Expr {
        let mut e = self;
        while let ExprKind::Group(inner) = &e.kind {
            e = inner;
        }
        e
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    IntLit(u64),
    FloatLit(f64),
    StringLit(String),
    Identifier(String),
    /// `( expr )`
    Group(Box<Expr>),
    Call {
        callee: Ident,
        args: Vec<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `object.field`
    Dot {
        object: Box<Expr>,
        field: Ident,
    },
    /// `[a, b, c]`
    ArrayList(Vec<Expr>),
    /// `array[index]`
    Index {
        array: Box<Expr>,
        index: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Less,
    Greater,
    LessEq,
    GreaterEq,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::NotEq | Self::Less | Self::Greater | Self::LessEq | Self::GreaterEq
        )
    }

    /// The comparison that holds when `self` does not.
    pub fn inverse(self) -> Self {
        match self {
            Self::Eq => Self::NotEq,
            Self::NotEq => Self::Eq,
            Self::Less => Self::GreaterEq,
            Self::GreaterEq => Self::Less,
            Self::Greater => Self::LessEq,
            Self::LessEq => Self::Greater,
            other => other,
        }
    }

    /// The comparison with operands swapped: `a < b` is `b > a`.
    pub fn mirror(self) -> Self {
        match self {
            Self::Less => Self::Greater,
            Self::Greater => Self::Less,
            Self::LessEq => Self::GreaterEq,
            Self::GreaterEq => Self::LessEq,
            other => other,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Less => "<",
            Self::Greater => ">",
            Self::LessEq => "<=",
            Self::GreaterEq => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `!x`
    Not,
}
