//! Crate root: wires together the compilation pipeline.
//!
//! Data flows strictly forward, from source text to assembly text:
//! - `tokenizer` performs lexical analysis and produces a flat token stream.
//! - `grammar` holds the rule table; `parser` runs the chart parser over it
//!   and builds the raw AST defined in `ast`.
//! - `analyzer` (backed by `symtable`) resolves names, checks types and
//!   decorates the tree in place.
//! - `codegen` lowers the decorated tree into x86-32 AT&T assembly, using
//!   the fixed text in `templates`.
//! - `toolchain` assembles and links the result with the system tools.
//! - `error` defines the error type shared by every stage.

pub mod analyzer;
pub mod ast;
pub mod codegen;
pub mod error;
pub mod grammar;
pub mod label;
pub mod parser;
pub mod symtable;
pub mod tokenizer;
pub mod toolchain;
pub mod ty;

mod templates;

pub use error::{CompileError, CompileResult};

use crate::ast::Program;
use crate::label::Labels;

/// Compile a source string into AT&T assembly.
pub fn compile(source: &str) -> CompileResult<String> {
  let tokens = tokenizer::tokenize(source)?;
  let mut program = Program::new(parser::parse(tokens)?);
  let mut labels = Labels::new();
  analyzer::analyze(&mut program, &mut labels)?;
  codegen::generate(&program, &mut labels)
}

#[cfg(test)]
mod tests {
  use indoc::indoc;

  use super::*;

  const SQRT: &str = indoc! {"
    main() {
      // square root of a fixed-point number
      // stored in a 32 bit integer variable, shift is the precision

      int sqrt(int n, int shift) {
        int x;
        int x_old;
        int n_one;

        if n > 65535 { // pay attention to potential overflows
          return 2 * sqrt(n / 4, shift);
        }
        x = shift; // initial guess 1.0, can do better, but oh well
        n_one = n * shift; // need to compensate for fixp division
        while true {
          x_old = x;
          x = (x + n_one / x) / 2;
          if abs(x - x_old) <= 1 {
            return x;
          }
        }
      }

      int abs(int x) {
        if x < 0 {
          return -x;
        } else {
          return x;
        }
      }

      // 25735 is approximately equal to pi * 8192;
      // expected value of the output is sqrt(pi) * 8192 approx 14519

      println sqrt(25735, 8192);
    }
  "};

  #[test]
  fn compiling_twice_is_byte_identical() {
    assert_eq!(compile(SQRT).unwrap(), compile(SQRT).unwrap());
  }

  #[test]
  fn errors_from_every_stage_surface() {
    let err = |source: &str| compile(source).unwrap_err();
    assert!(matches!(err("main() { $ }"), CompileError::Lexical { .. }));
    assert!(matches!(err("main() { ; }"), CompileError::Syntax { .. }));
    assert!(matches!(err("main() {"), CompileError::UnexpectedEof));
    assert!(matches!(err("f() { }"), CompileError::Semantic { .. }));
  }

  #[test]
  fn nesting_is_bounded_before_analysis() {
    let nested = |depth: usize| {
      let expr = format!("{}1{}", "-(".repeat(depth), ")".repeat(depth));
      format!("main() {{ println {expr}; }}")
    };
    let asm = compile(&nested(parser::MAX_NESTING - 2)).unwrap();
    assert!(asm.contains("call print_int32"));

    let err = compile(&nested(2000)).unwrap_err();
    assert!(matches!(err, CompileError::NestingTooDeep { .. }));
  }

  #[test]
  fn program_skeleton_is_complete() {
    let asm = compile(SQRT).unwrap();
    for needle in [
      ".global _start",
      "truestr: .ascii \"true\"",
      "display: .skip 8",
      "_start:",
      "call main_1",
      "sqrt_2:",
      "abs_3:",
      "print_int32:",
    ] {
      assert!(asm.contains(needle), "missing {needle}");
    }
  }
}
