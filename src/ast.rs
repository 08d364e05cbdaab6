//! Abstract syntax tree shared by every pass.
//!
//! The parser builds the tree with every decoration left as `None`; the
//! analyzer fills decorations in place and the code generator only reads
//! them.

use crate::ty::Type;

/// Location of a variable: the lexical depth of the declaring function body
/// (its `display` slot) and the word offset inside that function's frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
  pub depth: usize,
  pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
  pub name: String,
  pub ty: Type,
  pub line: usize,
  pub slot: Option<Slot>,
}

impl VarDecl {
  pub fn new(name: impl Into<String>, ty: Type, line: usize) -> Self {
    Self {
      name: name.into(),
      ty,
      line,
      slot: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
  pub name: String,
  pub ret: Type,
  pub params: Vec<VarDecl>,
  pub locals: Vec<VarDecl>,
  pub nested: Vec<Function>,
  pub body: Vec<Stmt>,
  pub line: usize,
  /// Unique assembly label.
  pub label: Option<String>,
  /// Lexical depth of the function body; main's body is depth 0.
  pub depth: Option<usize>,
}

impl Function {
  /// Number of words the caller reserves for this function's locals.
  pub fn frame_locals(&self) -> usize {
    self.locals.len()
  }

  pub fn param_types(&self) -> Vec<Type> {
    self.params.iter().map(|param| param.ty).collect()
  }
}

/// Resolved callee, filled in by the analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallTarget {
  pub label: String,
  pub depth: usize,
  pub params: usize,
  pub locals: usize,
  pub ret: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
  pub name: String,
  pub args: Vec<Expr>,
  pub target: Option<CallTarget>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
  pub kind: StmtKind,
  pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
  Print { expr: Expr, newline: bool },
  Return(Option<Expr>),
  Assign {
    name: String,
    expr: Expr,
    slot: Option<Slot>,
  },
  While { cond: Expr, body: Vec<Stmt> },
  IfThenElse {
    cond: Expr,
    then_body: Vec<Stmt>,
    else_body: Vec<Stmt>,
  },
  Call(Call),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
  Add,
  Sub,
  Mul,
  Div,
  Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  And,
  Or,
}

impl LogicOp {
  /// Ordering comparisons only make sense on integers.
  pub fn is_ordering(self) -> bool {
    matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge)
  }

  pub fn is_connective(self) -> bool {
    matches!(self, Self::And | Self::Or)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
  pub kind: ExprKind,
  pub line: usize,
  pub ty: Option<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
  Integer(i32),
  Boolean(bool),
  Str { text: String, label: Option<String> },
  Var { name: String, slot: Option<Slot> },
  Call(Call),
  Arith {
    op: ArithOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
  Logic {
    op: LogicOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
}

impl Expr {
  pub fn new(kind: ExprKind, line: usize) -> Self {
    Self {
      kind,
      line,
      ty: None,
    }
  }

  pub fn integer(value: i32, line: usize) -> Self {
    Self::new(ExprKind::Integer(value), line)
  }

  pub fn boolean(value: bool, line: usize) -> Self {
    Self::new(ExprKind::Boolean(value), line)
  }

  pub fn string(text: impl Into<String>, line: usize) -> Self {
    Self::new(
      ExprKind::Str {
        text: text.into(),
        label: None,
      },
      line,
    )
  }

  pub fn var(name: impl Into<String>, line: usize) -> Self {
    Self::new(
      ExprKind::Var {
        name: name.into(),
        slot: None,
      },
      line,
    )
  }

  pub fn call(name: impl Into<String>, args: Vec<Expr>, line: usize) -> Self {
    Self::new(
      ExprKind::Call(Call {
        name: name.into(),
        args,
        target: None,
      }),
      line,
    )
  }

  pub fn arith(op: ArithOp, lhs: Expr, rhs: Expr, line: usize) -> Self {
    Self::new(
      ExprKind::Arith {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
      },
      line,
    )
  }

  pub fn logic(op: LogicOp, lhs: Expr, rhs: Expr, line: usize) -> Self {
    Self::new(
      ExprKind::Logic {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
      },
      line,
    )
  }
}

/// A string literal placed in the `.data` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringConstant {
  pub label: String,
  pub text: String,
}

/// Program-level decorations around the root function.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
  pub root: Function,
  pub strings: Vec<StringConstant>,
  /// Number of `display` slots, one per lexical depth.
  pub display_size: usize,
}

impl Program {
  pub fn new(root: Function) -> Self {
    Self {
      root,
      strings: Vec::new(),
      display_size: 0,
    }
  }
}
