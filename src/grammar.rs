//! The rule table driving the chart parser.
//!
//! Every rule pairs a production with a construction action. The parser
//! hands each action the fragments matched by the production (raw tokens for
//! terminals, already-built values for nonterminals) and pushes back the one
//! fragment it returns. Operator precedence and left associativity are
//! encoded directly in the nonterminal hierarchy `expr → conjunction →
//! literal → comparand → addend → term → factor → atom`.

use snafu::OptionExt;

use crate::ast::{ArithOp, Call, Expr, Function, LogicOp, Stmt, StmtKind, VarDecl};
use crate::error::{CompileError, CompileResult, InternalSnafu, InvalidIntegerSnafu};
use crate::tokenizer::{Token, TokenKind};
use crate::ty::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NonTerminal {
  Fun,
  Var,
  ParamList,
  Params,
  FunType,
  VarList,
  FunList,
  StatementList,
  Statement,
  ElseStatement,
  ArgList,
  Args,
  Expr,
  Conjunction,
  Literal,
  Comparand,
  Addend,
  Term,
  Factor,
  Atom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
  T(TokenKind),
  N(NonTerminal),
}

/// Intermediate values living on the derivation stack.
#[derive(Debug)]
pub enum Fragment {
  Token(Token),
  Function(Function),
  Functions(Vec<Function>),
  Var(VarDecl),
  Vars(Vec<VarDecl>),
  Type(Type),
  Stmt(Stmt),
  Stmts(Vec<Stmt>),
  Expr(Expr),
  Exprs(Vec<Expr>),
}

impl Fragment {
  fn describe(&self) -> &'static str {
    match self {
      Self::Token(_) => "token",
      Self::Function(_) => "function",
      Self::Functions(_) => "function list",
      Self::Var(_) => "variable",
      Self::Vars(_) => "variable list",
      Self::Type(_) => "type",
      Self::Stmt(_) => "statement",
      Self::Stmts(_) => "statement list",
      Self::Expr(_) => "expression",
      Self::Exprs(_) => "expression list",
    }
  }
}

/// The fragments matched by one production, consumed left to right.
pub struct Children(std::vec::IntoIter<Fragment>);

macro_rules! take {
  ($name:ident, $variant:ident, $out:ty) => {
    pub fn $name(&mut self) -> CompileResult<$out> {
      match self.next()? {
        Fragment::$variant(value) => Ok(value),
        other => Err(mismatch(stringify!($variant), &other)),
      }
    }
  };
}

impl Children {
  pub fn new(fragments: Vec<Fragment>) -> Self {
    Self(fragments.into_iter())
  }

  fn next(&mut self) -> CompileResult<Fragment> {
    self.0.next().context(InternalSnafu {
      message: "construction action ran out of children",
    })
  }

  /// Drop a fragment whose value the action does not need.
  pub fn skip(&mut self) -> CompileResult<()> {
    self.next().map(drop)
  }

  take!(token, Token, Token);
  take!(function, Function, Function);
  take!(functions, Functions, Vec<Function>);
  take!(var, Var, VarDecl);
  take!(vars, Vars, Vec<VarDecl>);
  take!(ty, Type, Type);
  take!(stmt, Stmt, Stmt);
  take!(stmts, Stmts, Vec<Stmt>);
  take!(expr, Expr, Expr);
  take!(exprs, Exprs, Vec<Expr>);
}

fn mismatch(expected: &str, found: &Fragment) -> CompileError {
  CompileError::internal(format!(
    "construction action expected {expected}, found {}",
    found.describe()
  ))
}

pub type Action = fn(&mut Children) -> CompileResult<Fragment>;

pub struct Rule {
  pub lhs: NonTerminal,
  pub rhs: &'static [Symbol],
  pub build: Action,
}

use NonTerminal as NT;
use Symbol::{N, T};
use TokenKind as TK;

/// The start rule is always at index 0.
pub static RULES: &[Rule] = &[
  Rule {
    lhs: NT::Fun,
    rhs: &[
      N(NT::FunType),
      T(TK::Id),
      T(TK::LParen),
      N(NT::ParamList),
      T(TK::RParen),
      T(TK::Begin),
      N(NT::VarList),
      N(NT::FunList),
      N(NT::StatementList),
      T(TK::End),
    ],
    build: function,
  },
  Rule {
    lhs: NT::Var,
    rhs: &[T(TK::Type), T(TK::Id)],
    build: var,
  },
  Rule {
    lhs: NT::ParamList,
    rhs: &[N(NT::Params)],
    build: pass_through,
  },
  Rule {
    lhs: NT::ParamList,
    rhs: &[],
    build: |_| Ok(Fragment::Vars(Vec::new())),
  },
  Rule {
    lhs: NT::Params,
    rhs: &[N(NT::Var)],
    build: |c| Ok(Fragment::Vars(vec![c.var()?])),
  },
  Rule {
    lhs: NT::Params,
    rhs: &[N(NT::Params), T(TK::Comma), N(NT::Var)],
    build: |c| {
      let mut vars = c.vars()?;
      c.skip()?;
      vars.push(c.var()?);
      Ok(Fragment::Vars(vars))
    },
  },
  Rule {
    lhs: NT::FunType,
    rhs: &[T(TK::Type)],
    build: |c| Ok(Fragment::Type(keyword_type(&c.token()?)?)),
  },
  Rule {
    lhs: NT::FunType,
    rhs: &[],
    build: |_| Ok(Fragment::Type(Type::Void)),
  },
  Rule {
    lhs: NT::VarList,
    rhs: &[N(NT::VarList), N(NT::Var), T(TK::Semicolon)],
    build: |c| {
      let mut vars = c.vars()?;
      vars.push(c.var()?);
      Ok(Fragment::Vars(vars))
    },
  },
  Rule {
    lhs: NT::VarList,
    rhs: &[],
    build: |_| Ok(Fragment::Vars(Vec::new())),
  },
  Rule {
    lhs: NT::FunList,
    rhs: &[N(NT::FunList), N(NT::Fun)],
    build: |c| {
      let mut funs = c.functions()?;
      funs.push(c.function()?);
      Ok(Fragment::Functions(funs))
    },
  },
  Rule {
    lhs: NT::FunList,
    rhs: &[],
    build: |_| Ok(Fragment::Functions(Vec::new())),
  },
  Rule {
    lhs: NT::StatementList,
    rhs: &[N(NT::StatementList), N(NT::Statement)],
    build: |c| {
      let mut stmts = c.stmts()?;
      stmts.push(c.stmt()?);
      Ok(Fragment::Stmts(stmts))
    },
  },
  Rule {
    lhs: NT::StatementList,
    rhs: &[],
    build: |_| Ok(Fragment::Stmts(Vec::new())),
  },
  Rule {
    lhs: NT::Statement,
    rhs: &[
      T(TK::Id),
      T(TK::LParen),
      N(NT::ArgList),
      T(TK::RParen),
      T(TK::Semicolon),
    ],
    build: |c| {
      let name = c.token()?;
      c.skip()?;
      let args = c.exprs()?;
      Ok(Fragment::Stmt(Stmt {
        kind: StmtKind::Call(Call {
          name: name.text,
          args,
          target: None,
        }),
        line: name.line,
      }))
    },
  },
  Rule {
    lhs: NT::Statement,
    rhs: &[T(TK::Id), T(TK::Assign), N(NT::Expr), T(TK::Semicolon)],
    build: |c| {
      let name = c.token()?;
      c.skip()?;
      let expr = c.expr()?;
      Ok(Fragment::Stmt(Stmt {
        kind: StmtKind::Assign {
          name: name.text,
          expr,
          slot: None,
        },
        line: name.line,
      }))
    },
  },
  Rule {
    lhs: NT::Statement,
    rhs: &[T(TK::Return), N(NT::Expr), T(TK::Semicolon)],
    build: |c| {
      let keyword = c.token()?;
      let expr = c.expr()?;
      Ok(Fragment::Stmt(Stmt {
        kind: StmtKind::Return(Some(expr)),
        line: keyword.line,
      }))
    },
  },
  Rule {
    lhs: NT::Statement,
    rhs: &[T(TK::Return), T(TK::Semicolon)],
    build: |c| {
      let keyword = c.token()?;
      Ok(Fragment::Stmt(Stmt {
        kind: StmtKind::Return(None),
        line: keyword.line,
      }))
    },
  },
  Rule {
    lhs: NT::Statement,
    rhs: &[T(TK::Print), N(NT::Expr), T(TK::Semicolon)],
    build: |c| {
      let keyword = c.token()?;
      let expr = c.expr()?;
      Ok(Fragment::Stmt(Stmt {
        kind: StmtKind::Print {
          expr,
          newline: keyword.text == "println",
        },
        line: keyword.line,
      }))
    },
  },
  Rule {
    lhs: NT::Statement,
    rhs: &[
      T(TK::If),
      N(NT::Expr),
      T(TK::Begin),
      N(NT::StatementList),
      T(TK::End),
      N(NT::ElseStatement),
    ],
    build: |c| {
      let keyword = c.token()?;
      let cond = c.expr()?;
      c.skip()?;
      let then_body = c.stmts()?;
      c.skip()?;
      let else_body = c.stmts()?;
      Ok(Fragment::Stmt(Stmt {
        kind: StmtKind::IfThenElse {
          cond,
          then_body,
          else_body,
        },
        line: keyword.line,
      }))
    },
  },
  Rule {
    lhs: NT::ElseStatement,
    rhs: &[T(TK::Else), T(TK::Begin), N(NT::StatementList), T(TK::End)],
    build: |c| {
      c.skip()?;
      c.skip()?;
      Ok(Fragment::Stmts(c.stmts()?))
    },
  },
  Rule {
    lhs: NT::ElseStatement,
    rhs: &[],
    build: |_| Ok(Fragment::Stmts(Vec::new())),
  },
  Rule {
    lhs: NT::Statement,
    rhs: &[
      T(TK::While),
      N(NT::Expr),
      T(TK::Begin),
      N(NT::StatementList),
      T(TK::End),
    ],
    build: |c| {
      let keyword = c.token()?;
      let cond = c.expr()?;
      c.skip()?;
      let body = c.stmts()?;
      Ok(Fragment::Stmt(Stmt {
        kind: StmtKind::While { cond, body },
        line: keyword.line,
      }))
    },
  },
  Rule {
    lhs: NT::ArgList,
    rhs: &[N(NT::Args)],
    build: pass_through,
  },
  Rule {
    lhs: NT::ArgList,
    rhs: &[],
    build: |_| Ok(Fragment::Exprs(Vec::new())),
  },
  Rule {
    lhs: NT::Args,
    rhs: &[N(NT::Expr)],
    build: |c| Ok(Fragment::Exprs(vec![c.expr()?])),
  },
  Rule {
    lhs: NT::Args,
    rhs: &[N(NT::Args), T(TK::Comma), N(NT::Expr)],
    build: |c| {
      let mut args = c.exprs()?;
      c.skip()?;
      args.push(c.expr()?);
      Ok(Fragment::Exprs(args))
    },
  },
  Rule {
    lhs: NT::Expr,
    rhs: &[N(NT::Conjunction)],
    build: pass_through,
  },
  Rule {
    lhs: NT::Expr,
    rhs: &[N(NT::Expr), T(TK::Or), N(NT::Conjunction)],
    build: logic,
  },
  Rule {
    lhs: NT::Expr,
    rhs: &[T(TK::String)],
    build: |c| {
      let token = c.token()?;
      Ok(Fragment::Expr(Expr::string(token.text, token.line)))
    },
  },
  Rule {
    lhs: NT::Conjunction,
    rhs: &[N(NT::Literal)],
    build: pass_through,
  },
  Rule {
    lhs: NT::Conjunction,
    rhs: &[N(NT::Conjunction), T(TK::And), N(NT::Literal)],
    build: logic,
  },
  Rule {
    lhs: NT::Literal,
    rhs: &[N(NT::Comparand)],
    build: pass_through,
  },
  Rule {
    lhs: NT::Literal,
    rhs: &[T(TK::Not), N(NT::Comparand)],
    build: |c| {
      let not = c.token()?;
      let operand = c.expr()?;
      let falsity = Expr::boolean(false, not.line);
      let negated = Expr::logic(LogicOp::Eq, falsity, operand, not.line);
      Ok(Fragment::Expr(negated))
    },
  },
  Rule {
    lhs: NT::Comparand,
    rhs: &[N(NT::Addend)],
    build: pass_through,
  },
  Rule {
    lhs: NT::Comparand,
    rhs: &[N(NT::Addend), T(TK::Equals), N(NT::Addend)],
    build: logic,
  },
  Rule {
    lhs: NT::Comparand,
    rhs: &[N(NT::Addend), T(TK::NotEquals), N(NT::Addend)],
    build: logic,
  },
  Rule {
    lhs: NT::Comparand,
    rhs: &[N(NT::Addend), T(TK::Less), N(NT::Addend)],
    build: logic,
  },
  Rule {
    lhs: NT::Comparand,
    rhs: &[N(NT::Addend), T(TK::LessEq), N(NT::Addend)],
    build: logic,
  },
  Rule {
    lhs: NT::Comparand,
    rhs: &[N(NT::Addend), T(TK::Greater), N(NT::Addend)],
    build: logic,
  },
  Rule {
    lhs: NT::Comparand,
    rhs: &[N(NT::Addend), T(TK::GreaterEq), N(NT::Addend)],
    build: logic,
  },
  Rule {
    lhs: NT::Addend,
    rhs: &[N(NT::Term)],
    build: pass_through,
  },
  Rule {
    lhs: NT::Addend,
    rhs: &[N(NT::Addend), T(TK::Minus), N(NT::Term)],
    build: arith,
  },
  Rule {
    lhs: NT::Addend,
    rhs: &[N(NT::Addend), T(TK::Plus), N(NT::Term)],
    build: arith,
  },
  Rule {
    lhs: NT::Term,
    rhs: &[N(NT::Factor)],
    build: pass_through,
  },
  Rule {
    lhs: NT::Term,
    rhs: &[N(NT::Term), T(TK::Mod), N(NT::Factor)],
    build: arith,
  },
  Rule {
    lhs: NT::Term,
    rhs: &[N(NT::Term), T(TK::Divide), N(NT::Factor)],
    build: arith,
  },
  Rule {
    lhs: NT::Term,
    rhs: &[N(NT::Term), T(TK::Times), N(NT::Factor)],
    build: arith,
  },
  Rule {
    lhs: NT::Factor,
    rhs: &[N(NT::Atom)],
    build: pass_through,
  },
  Rule {
    lhs: NT::Factor,
    rhs: &[T(TK::Plus), N(NT::Atom)],
    build: |c| {
      c.skip()?;
      Ok(Fragment::Expr(c.expr()?))
    },
  },
  Rule {
    lhs: NT::Factor,
    rhs: &[T(TK::Minus), N(NT::Atom)],
    build: |c| {
      let minus = c.token()?;
      let operand = c.expr()?;
      let zero = Expr::integer(0, minus.line);
      let negated = Expr::arith(ArithOp::Sub, zero, operand, minus.line);
      Ok(Fragment::Expr(negated))
    },
  },
  Rule {
    lhs: NT::Atom,
    rhs: &[T(TK::Boolean)],
    build: |c| {
      let token = c.token()?;
      let value = Expr::boolean(token.text == "true", token.line);
      Ok(Fragment::Expr(value))
    },
  },
  Rule {
    lhs: NT::Atom,
    rhs: &[T(TK::Integer)],
    build: |c| {
      let token = c.token()?;
      let value: i32 = token.text.parse().ok().context(InvalidIntegerSnafu {
        line: token.line,
        text: token.text.as_str(),
      })?;
      Ok(Fragment::Expr(Expr::integer(value, token.line)))
    },
  },
  Rule {
    lhs: NT::Atom,
    rhs: &[T(TK::Id), T(TK::LParen), N(NT::ArgList), T(TK::RParen)],
    build: |c| {
      let name = c.token()?;
      c.skip()?;
      let args = c.exprs()?;
      Ok(Fragment::Expr(Expr::call(name.text, args, name.line)))
    },
  },
  Rule {
    lhs: NT::Atom,
    rhs: &[T(TK::Id)],
    build: |c| {
      let name = c.token()?;
      Ok(Fragment::Expr(Expr::var(name.text, name.line)))
    },
  },
  Rule {
    lhs: NT::Atom,
    rhs: &[T(TK::LParen), N(NT::Expr), T(TK::RParen)],
    build: |c| {
      c.skip()?;
      Ok(Fragment::Expr(c.expr()?))
    },
  },
];

/// Rule indices defining `lhs`, in table order.
pub fn rules_for(lhs: NonTerminal) -> impl Iterator<Item = usize> {
  RULES
    .iter()
    .enumerate()
    .filter(move |(_, rule)| rule.lhs == lhs)
    .map(|(index, _)| index)
}

fn pass_through(c: &mut Children) -> CompileResult<Fragment> {
  c.next()
}

fn keyword_type(token: &Token) -> CompileResult<Type> {
  Type::from_keyword(&token.text).context(InternalSnafu {
    message: format!("`{}` lexed as a type keyword", token.text),
  })
}

fn function(c: &mut Children) -> CompileResult<Fragment> {
  let ret = c.ty()?;
  let name = c.token()?;
  c.skip()?;
  let params = c.vars()?;
  c.skip()?;
  c.skip()?;
  let locals = c.vars()?;
  let nested = c.functions()?;
  let body = c.stmts()?;
  Ok(Fragment::Function(Function {
    name: name.text,
    ret,
    params,
    locals,
    nested,
    body,
    line: name.line,
    label: None,
    depth: None,
  }))
}

fn var(c: &mut Children) -> CompileResult<Fragment> {
  let ty_token = c.token()?;
  let ty = keyword_type(&ty_token)?;
  let name = c.token()?;
  Ok(Fragment::Var(VarDecl::new(name.text, ty, ty_token.line)))
}

fn binary_parts(c: &mut Children) -> CompileResult<(Expr, Token, Expr)> {
  let lhs = c.expr()?;
  let op = c.token()?;
  let rhs = c.expr()?;
  Ok((lhs, op, rhs))
}

fn arith(c: &mut Children) -> CompileResult<Fragment> {
  let (lhs, op, rhs) = binary_parts(c)?;
  let op_kind = match op.kind {
    TK::Plus => ArithOp::Add,
    TK::Minus => ArithOp::Sub,
    TK::Times => ArithOp::Mul,
    TK::Divide => ArithOp::Div,
    TK::Mod => ArithOp::Mod,
    other => return Err(unknown_operator(other)),
  };
  Ok(Fragment::Expr(Expr::arith(op_kind, lhs, rhs, op.line)))
}

fn logic(c: &mut Children) -> CompileResult<Fragment> {
  let (lhs, op, rhs) = binary_parts(c)?;
  let op_kind = match op.kind {
    TK::Equals => LogicOp::Eq,
    TK::NotEquals => LogicOp::Ne,
    TK::Less => LogicOp::Lt,
    TK::LessEq => LogicOp::Le,
    TK::Greater => LogicOp::Gt,
    TK::GreaterEq => LogicOp::Ge,
    TK::And => LogicOp::And,
    TK::Or => LogicOp::Or,
    other => return Err(unknown_operator(other)),
  };
  Ok(Fragment::Expr(Expr::logic(op_kind, lhs, rhs, op.line)))
}

fn unknown_operator(kind: TokenKind) -> CompileError {
  CompileError::internal(format!("{kind:?} is not a binary operator"))
}
