use std::fmt;

/// Static types of the language. Every value occupies one 32-bit word;
/// `Str` only ever describes string literals, which can be printed but not
/// stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
  Int,
  Bool,
  Str,
  Void,
}

impl Type {
  /// Map a `TYPE` keyword lexeme to its type.
  pub fn from_keyword(word: &str) -> Option<Self> {
    match word {
      "int" => Some(Self::Int),
      "bool" => Some(Self::Bool),
      _ => None,
    }
  }

  /// Types that fit in a machine word and can live in a variable.
  pub fn is_scalar(self) -> bool {
    matches!(self, Self::Int | Self::Bool)
  }
}

impl fmt::Display for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Int => "int",
      Self::Bool => "bool",
      Self::Str => "string",
      Self::Void => "void",
    };
    f.write_str(name)
  }
}
