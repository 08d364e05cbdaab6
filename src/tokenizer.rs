//! Lexical analysis: turns the raw input string into a vector of tokens.
//!
//! The scanner walks the input once, character by character, switching
//! between five states (idle, line comment, integer, string, word).
//! Two-character operators are matched before single-character ones so that
//! `==` never splits into two `=` tokens.

use snafu::ensure;

use crate::error::{CompileResult, LexErrorKind, LexicalSnafu};

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
  Id,
  Integer,
  String,
  /// `true` or `false`.
  Boolean,
  /// `int` or `bool`.
  Type,
  /// `print` or `println`.
  Print,
  If,
  Else,
  While,
  Return,

  Equals,
  NotEquals,
  LessEq,
  GreaterEq,
  And,
  Or,

  Assign,
  Less,
  Greater,
  Not,
  Plus,
  Minus,
  Times,
  Divide,
  Mod,
  LParen,
  RParen,
  Begin,
  End,
  Semicolon,
  Comma,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
  pub kind: TokenKind,
  pub text: String,
  /// 0-based source line.
  pub line: usize,
}

impl Token {
  pub fn new(kind: TokenKind, text: impl Into<String>, line: usize) -> Self {
    Self {
      kind,
      text: text.into(),
      line,
    }
  }
}

const DOUBLE_CHAR: [(&str, TokenKind); 6] = [
  ("==", TokenKind::Equals),
  ("!=", TokenKind::NotEquals),
  ("<=", TokenKind::LessEq),
  (">=", TokenKind::GreaterEq),
  ("&&", TokenKind::And),
  ("||", TokenKind::Or),
];

fn single_char(c: char) -> Option<TokenKind> {
  let kind = match c {
    '=' => TokenKind::Assign,
    '<' => TokenKind::Less,
    '>' => TokenKind::Greater,
    '!' => TokenKind::Not,
    '+' => TokenKind::Plus,
    '-' => TokenKind::Minus,
    '*' => TokenKind::Times,
    '/' => TokenKind::Divide,
    '%' => TokenKind::Mod,
    '(' => TokenKind::LParen,
    ')' => TokenKind::RParen,
    '{' => TokenKind::Begin,
    '}' => TokenKind::End,
    ';' => TokenKind::Semicolon,
    ',' => TokenKind::Comma,
    _ => return None,
  };
  Some(kind)
}

fn keyword(word: &str) -> Option<TokenKind> {
  let kind = match word {
    "true" | "false" => TokenKind::Boolean,
    "int" | "bool" => TokenKind::Type,
    "print" | "println" => TokenKind::Print,
    "if" => TokenKind::If,
    "else" => TokenKind::Else,
    "while" => TokenKind::While,
    "return" => TokenKind::Return,
    _ => return None,
  };
  Some(kind)
}

fn is_word_start(c: char) -> bool {
  c.is_ascii_alphabetic() || c == '_'
}

fn is_word_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_'
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
  Idle,
  LineComment,
  Integer,
  Str,
  Word,
}

/// Lex the whole input into a flat vector of tokens.
pub fn tokenize(input: &str) -> CompileResult<Vec<Token>> {
  let mut tokens = Vec::new();
  let mut state = State::Idle;
  let mut accum = String::new();
  let mut line = 0;
  let mut i = 0;

  while let Some(c) = input[i..].chars().next() {
    let rest = &input[i..];
    let mut step = c.len_utf8();

    match state {
      State::Idle => {
        if rest.starts_with("//") {
          state = State::LineComment;
          step = 2;
        } else if c.is_ascii_digit() {
          state = State::Integer;
          accum.push(c);
        } else if c == '"' {
          state = State::Str;
        } else if is_word_start(c) {
          state = State::Word;
          accum.push(c);
        } else if let Some((op, kind)) = DOUBLE_CHAR.iter().find(|(op, _)| rest.starts_with(op)) {
          tokens.push(Token::new(*kind, *op, line));
          step = op.len();
        } else if let Some(kind) = single_char(c) {
          tokens.push(Token::new(kind, c, line));
        } else {
          ensure!(
            c.is_ascii_whitespace(),
            LexicalSnafu {
              line,
              kind: LexErrorKind::UnexpectedCharacter(c),
            }
          );
        }
      }
      State::LineComment => {
        if c == '\n' {
          state = State::Idle;
        }
      }
      State::Integer => {
        if c.is_ascii_digit() {
          accum.push(c);
        } else {
          let text = std::mem::take(&mut accum);
          tokens.push(Token::new(TokenKind::Integer, text, line));
          state = State::Idle;
          // rescan this character from the idle state
          continue;
        }
      }
      State::Str => {
        if c != '"' || accum.ends_with('\\') {
          accum.push(c);
        } else {
          let text = std::mem::take(&mut accum);
          tokens.push(Token::new(TokenKind::String, text, line));
          state = State::Idle;
        }
      }
      State::Word => {
        if is_word_char(c) {
          accum.push(c);
        } else {
          let kind = keyword(&accum).unwrap_or(TokenKind::Id);
          tokens.push(Token::new(kind, std::mem::take(&mut accum), line));
          state = State::Idle;
          continue;
        }
      }
    }

    if c == '\n' {
      line += 1;
    }
    i += step;
  }

  match state {
    State::Idle => {}
    State::Integer => tokens.push(Token::new(TokenKind::Integer, accum, line)),
    State::Word => {
      let kind = keyword(&accum).unwrap_or(TokenKind::Id);
      tokens.push(Token::new(kind, accum, line));
    }
    State::Str => {
      return LexicalSnafu {
        line,
        kind: LexErrorKind::UnterminatedString,
      }
      .fail();
    }
    State::LineComment => {
      return LexicalSnafu {
        line,
        kind: LexErrorKind::UnterminatedComment,
      }
      .fail();
    }
  }

  Ok(tokens)
}
