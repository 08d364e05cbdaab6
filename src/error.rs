//! Shared error type returned at every stage boundary of the pipeline.
//!
//! Every problem is fatal: the first error aborts the compilation and no
//! partial output is produced. Lines are stored 0-based, as the tokenizer
//! counts them, and printed 1-based.

use std::fmt;

use snafu::Snafu;

use crate::tokenizer::TokenKind;
use crate::ty::Type;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompileError {
  #[snafu(display("lexical error at line {}: {kind}", line + 1))]
  Lexical { line: usize, kind: LexErrorKind },

  #[snafu(display("syntax error at line {}: unexpected {found:?}", line + 1))]
  Syntax { line: usize, found: TokenKind },

  #[snafu(display("syntax error: unexpected end of input"))]
  UnexpectedEof,

  #[snafu(display("syntax error at line {}: integer literal {text} is out of range", line + 1))]
  InvalidInteger { line: usize, text: String },

  #[snafu(display("syntax error at line {}: nesting deeper than {limit} levels", line + 1))]
  NestingTooDeep { line: usize, limit: usize },

  #[snafu(display("semantic error at line {}: {kind}", line + 1))]
  Semantic {
    line: usize,
    kind: SemanticErrorKind,
  },

  #[snafu(display("internal compiler error: {message}"))]
  Internal { message: String },
}

impl CompileError {
  pub fn internal(message: impl Into<String>) -> Self {
    Self::Internal {
      message: message.into(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexErrorKind {
  UnexpectedCharacter(char),
  UnterminatedString,
  UnterminatedComment,
}

impl fmt::Display for LexErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::UnexpectedCharacter(c) => write!(f, "illegal character {c:?}"),
      Self::UnterminatedString => write!(f, "unterminated string literal"),
      Self::UnterminatedComment => write!(f, "unterminated comment"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticErrorKind {
  NoEntryPoint,
  UndeclaredVariable(String),
  /// No visible overload accepts the argument types.
  UndeclaredFunction { name: String, args: Vec<Type> },
  DoubleDeclaration(String),
  TypeMismatch {
    context: &'static str,
    expected: Type,
    found: Type,
  },
  NonBooleanCondition(&'static str),
  /// A value of this type cannot appear in the given context at all.
  InvalidOperand { context: &'static str, found: Type },
}

impl fmt::Display for SemanticErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::NoEntryPoint => write!(
        f,
        "no valid entry point: expected `main()` with no parameters and no return type"
      ),
      Self::UndeclaredVariable(name) => write!(f, "no declaration for the variable {name}"),
      Self::UndeclaredFunction { name, args } => {
        let args = args
          .iter()
          .map(Type::to_string)
          .collect::<Vec<_>>()
          .join(", ");
        write!(f, "no declaration for the function {name}({args})")
      }
      Self::DoubleDeclaration(name) => write!(f, "double declaration of {name}"),
      Self::TypeMismatch {
        context,
        expected,
        found,
      } => write!(
        f,
        "incompatible types in {context}: expected {expected}, found {found}"
      ),
      Self::NonBooleanCondition(construct) => {
        write!(f, "non-boolean expression in {construct} statement")
      }
      Self::InvalidOperand { context, found } => {
        write!(f, "{found} value cannot be used in {context}")
      }
    }
  }
}
