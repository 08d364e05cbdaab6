//! Semantic analysis: name resolution, type checking and labelling.
//!
//! The analyzer walks the raw tree once and fills in every decoration the
//! code generator relies on: expression types, variable slots, call targets,
//! function labels and depths, and the program's string table.

use snafu::{OptionExt, ensure};

use crate::ast::{
  ArithOp, Call, CallTarget, Expr, ExprKind, Function, LogicOp, Program, Slot, Stmt, StmtKind,
  StringConstant,
};
use crate::error::{CompileResult, InternalSnafu, SemanticErrorKind, SemanticSnafu};
use crate::label::Labels;
use crate::symtable::{Signature, SymbolTable};
use crate::ty::Type;

/// Check and decorate `program` in place.
pub fn analyze(program: &mut Program, labels: &mut Labels) -> CompileResult<()> {
  let root = &mut program.root;
  ensure!(
    root.name == "main" && root.params.is_empty() && root.ret == Type::Void,
    SemanticSnafu {
      line: root.line,
      kind: SemanticErrorKind::NoEntryPoint,
    }
  );

  let mut analyzer = Analyzer {
    table: SymbolTable::new(),
    labels,
    strings: Vec::new(),
    max_depth: 0,
  };
  let target = analyzer.register(root, 0);
  analyzer.table.declare_fun(root, target)?;
  analyzer.function(root)?;

  program.strings = analyzer.strings;
  program.display_size = analyzer.max_depth + 1;
  Ok(())
}

struct Analyzer<'a> {
  table: SymbolTable,
  labels: &'a mut Labels,
  strings: Vec<StringConstant>,
  max_depth: usize,
}

impl Analyzer<'_> {
  /// Give a function its label and body depth, returning what callers need.
  fn register(&mut self, function: &mut Function, depth: usize) -> CallTarget {
    let label = self.labels.function(&function.name);
    function.label = Some(label.clone());
    function.depth = Some(depth);
    CallTarget {
      label,
      depth,
      params: function.params.len(),
      locals: function.frame_locals(),
      ret: function.ret,
    }
  }

  fn function(&mut self, function: &mut Function) -> CompileResult<()> {
    let depth = function.depth.context(InternalSnafu {
      message: format!("function {} analyzed before registration", function.name),
    })?;
    self.max_depth = self.max_depth.max(depth);
    self.table.push_scope(function.ret);

    for (offset, var) in function
      .params
      .iter_mut()
      .chain(function.locals.iter_mut())
      .enumerate()
    {
      let slot = Slot { depth, offset };
      self.table.declare_var(var, slot)?;
      var.slot = Some(slot);
    }

    // all siblings first, so they can call each other in any order
    for nested in &mut function.nested {
      let target = self.register(nested, depth + 1);
      self.table.declare_fun(nested, target)?;
    }
    for nested in &mut function.nested {
      self.function(nested)?;
    }

    self.stmts(&mut function.body)?;
    self.table.pop_scope();
    Ok(())
  }

  fn stmts(&mut self, stmts: &mut [Stmt]) -> CompileResult<()> {
    stmts.iter_mut().try_for_each(|stmt| self.stmt(stmt))
  }

  fn stmt(&mut self, stmt: &mut Stmt) -> CompileResult<()> {
    let line = stmt.line;
    match &mut stmt.kind {
      StmtKind::Print { expr, .. } => {
        let found = self.expr(expr)?;
        ensure!(
          found != Type::Void,
          SemanticSnafu {
            line,
            kind: SemanticErrorKind::InvalidOperand {
              context: "print statement",
              found,
            },
          }
        );
      }
      StmtKind::Return(value) => {
        let expected = self.table.return_type().context(InternalSnafu {
          message: "return statement outside of any function",
        })?;
        let found = match value {
          Some(expr) => self.expr(expr)?,
          None => Type::Void,
        };
        expect_type(line, "return statement", expected, found)?;
      }
      StmtKind::Assign { name, expr, slot } => {
        let found = self.expr(expr)?;
        let var = self.table.lookup_var(name).with_context(|| SemanticSnafu {
          line,
          kind: SemanticErrorKind::UndeclaredVariable(name.clone()),
        })?;
        expect_type(line, "assignment", var.ty, found)?;
        *slot = Some(var.slot);
      }
      StmtKind::While { cond, body } => {
        self.condition(cond, "while", line)?;
        self.stmts(body)?;
      }
      StmtKind::IfThenElse {
        cond,
        then_body,
        else_body,
      } => {
        self.condition(cond, "if", line)?;
        self.stmts(then_body)?;
        self.stmts(else_body)?;
      }
      StmtKind::Call(call) => {
        self.call(call, line)?;
      }
    }
    Ok(())
  }

  fn condition(
    &mut self,
    cond: &mut Expr,
    construct: &'static str,
    line: usize,
  ) -> CompileResult<()> {
    let found = self.expr(cond)?;
    ensure!(
      found == Type::Bool,
      SemanticSnafu {
        line,
        kind: SemanticErrorKind::NonBooleanCondition(construct),
      }
    );
    Ok(())
  }

  fn expr(&mut self, expr: &mut Expr) -> CompileResult<Type> {
    let line = expr.line;
    let ty = match &mut expr.kind {
      ExprKind::Integer(_) => Type::Int,
      ExprKind::Boolean(_) => Type::Bool,
      ExprKind::Str { text, label } => {
        let fresh = self.labels.string();
        self.strings.push(StringConstant {
          label: fresh.clone(),
          text: text.clone(),
        });
        *label = Some(fresh);
        Type::Str
      }
      ExprKind::Var { name, slot } => {
        let var = self.table.lookup_var(name).with_context(|| SemanticSnafu {
          line,
          kind: SemanticErrorKind::UndeclaredVariable(name.clone()),
        })?;
        *slot = Some(var.slot);
        var.ty
      }
      ExprKind::Call(call) => self.call(call, line)?,
      ExprKind::Arith { op, lhs, rhs } => {
        let context = arith_context(*op);
        for operand in [lhs, rhs] {
          let found = self.expr(operand)?;
          expect_type(line, context, Type::Int, found)?;
        }
        Type::Int
      }
      ExprKind::Logic { op, lhs, rhs } => {
        let op = *op;
        let left = self.expr(lhs)?;
        let right = self.expr(rhs)?;
        self.logic(op, left, right, line)?;
        Type::Bool
      }
    };
    expr.ty = Some(ty);
    Ok(ty)
  }

  fn logic(&self, op: LogicOp, left: Type, right: Type, line: usize) -> CompileResult<()> {
    let expected = if op.is_ordering() {
      Type::Int
    } else if op.is_connective() {
      Type::Bool
    } else {
      // equality works on any word-sized value, as long as both sides agree
      ensure!(
        left.is_scalar(),
        SemanticSnafu {
          line,
          kind: SemanticErrorKind::InvalidOperand {
            context: "equality comparison",
            found: left,
          },
        }
      );
      left
    };
    let context = if op.is_connective() {
      "logical operation"
    } else {
      "comparison"
    };
    expect_type(line, context, expected, left)?;
    expect_type(line, context, expected, right)
  }

  fn call(&mut self, call: &mut Call, line: usize) -> CompileResult<Type> {
    let args = call
      .args
      .iter_mut()
      .map(|arg| self.expr(arg))
      .collect::<CompileResult<Vec<_>>>()?;
    let signature = Signature::new(call.name.as_str(), args);
    let target = self
      .table
      .lookup_fun(&signature)
      .cloned()
      .with_context(|| SemanticSnafu {
        line,
        kind: SemanticErrorKind::UndeclaredFunction {
          name: signature.name.clone(),
          args: signature.params.clone(),
        },
      })?;
    let ret = target.ret;
    call.target = Some(target);
    Ok(ret)
  }
}

fn arith_context(op: ArithOp) -> &'static str {
  match op {
    ArithOp::Div | ArithOp::Mod => "division",
    ArithOp::Add | ArithOp::Sub | ArithOp::Mul => "arithmetic operation",
  }
}

fn expect_type(
  line: usize,
  context: &'static str,
  expected: Type,
  found: Type,
) -> CompileResult<()> {
  ensure!(
    found == expected,
    SemanticSnafu {
      line,
      kind: SemanticErrorKind::TypeMismatch {
        context,
        expected,
        found,
      },
    }
  );
  Ok(())
}

#[cfg(test)]
mod tests {
  use indoc::indoc;

  use super::*;
  use crate::error::CompileError;
  use crate::parser::parse;
  use crate::tokenizer::tokenize;

  fn analyzed(source: &str) -> CompileResult<Program> {
    let mut program = Program::new(parse(tokenize(source)?)?);
    analyze(&mut program, &mut Labels::new())?;
    Ok(program)
  }

  fn slot(depth: usize, offset: usize) -> Option<Slot> {
    Some(Slot { depth, offset })
  }

  fn semantic_error(source: &str) -> (usize, SemanticErrorKind) {
    match analyzed(source) {
      Err(CompileError::Semantic { line, kind }) => (line, kind),
      other => panic!("expected a semantic error, got {other:?}"),
    }
  }

  #[test]
  fn entry_point_must_be_plain_main() {
    for source in [
      "foo() { }",
      "main(int a) { }",
      "int main() { return 0; }",
      "bool main() { return true; }",
    ] {
      let (line, kind) = semantic_error(source);
      assert_eq!(line, 0, "{source}");
      assert_eq!(kind, SemanticErrorKind::NoEntryPoint, "{source}");
    }
  }

  #[test]
  fn decorates_labels_depths_and_slots() {
    let source = indoc! {"
      main() {
        int x;
        bool y;
        int inc(int a) {
          int b;
          b = a + x;
          return b;
        }
        x = inc(1);
      }
    "};
    let program = analyzed(source).unwrap();
    let root = &program.root;
    assert_eq!(root.label.as_deref(), Some("main_1"));
    assert_eq!(root.depth, Some(0));
    assert_eq!(root.locals[1].slot, slot(0, 1));

    let inc = &root.nested[0];
    assert_eq!(inc.label.as_deref(), Some("inc_2"));
    assert_eq!(inc.depth, Some(1));
    assert_eq!(inc.params[0].slot, slot(1, 0));
    assert_eq!(inc.locals[0].slot, slot(1, 1));
    assert_eq!(program.display_size, 2);

    let assign = &inc.body[0].kind;
    let StmtKind::Assign { slot: target, .. } = assign else {
      panic!("expected an assignment");
    };
    assert_eq!(*target, slot(1, 1));
    let StmtKind::Assign { expr, .. } = assign else {
      unreachable!();
    };
    let ExprKind::Arith { rhs, .. } = &expr.kind else {
      panic!("expected an addition");
    };
    assert_eq!(
      rhs.kind,
      ExprKind::Var {
        name: "x".to_string(),
        slot: slot(0, 0),
      }
    );

    let StmtKind::Assign { expr, .. } = &root.body[0].kind else {
      panic!("expected an assignment");
    };
    assert_eq!(expr.ty, Some(Type::Int));
    let ExprKind::Call(call) = &expr.kind else {
      panic!("expected a call");
    };
    assert_eq!(
      call.target,
      Some(CallTarget {
        label: "inc_2".to_string(),
        depth: 1,
        params: 1,
        locals: 1,
        ret: Type::Int,
      })
    );
  }

  #[test]
  fn shadowed_variables_resolve_to_the_inner_slot() {
    let source = indoc! {"
      main() {
        int x;
        f() {
          bool x;
          x = true;
        }
        x = 1;
      }
    "};
    let program = analyzed(source).unwrap();
    let StmtKind::Assign { slot: inner, .. } = &program.root.nested[0].body[0].kind else {
      panic!("expected an assignment");
    };
    assert_eq!(*inner, slot(1, 0));
    let StmtKind::Assign { slot: outer, .. } = &program.root.body[0].kind else {
      panic!("expected an assignment");
    };
    assert_eq!(*outer, slot(0, 0));
  }

  #[test]
  fn overloads_resolve_by_argument_types() {
    let source = indoc! {"
      main() {
        int f(int a) { return a; }
        bool f(bool a) { return a; }
        println f(1);
        println f(true);
      }
    "};
    let program = analyzed(source).unwrap();
    let labels: Vec<&str> = program
      .root
      .body
      .iter()
      .map(|stmt| match &stmt.kind {
        StmtKind::Print { expr, .. } => match &expr.kind {
          ExprKind::Call(call) => call.target.as_ref().map(|t| t.label.as_str()).unwrap(),
          _ => panic!("expected a call"),
        },
        _ => panic!("expected a print"),
      })
      .collect();
    assert_eq!(labels, ["f_2", "f_3"]);

    let (line, kind) = semantic_error(indoc! {"
      main() {
        int f(int a) { return a; }
        f(true, 1);
      }
    "});
    assert_eq!(line, 2);
    assert_eq!(
      kind,
      SemanticErrorKind::UndeclaredFunction {
        name: "f".to_string(),
        args: vec![Type::Bool, Type::Int],
      }
    );
  }

  #[test]
  fn siblings_can_call_each_other_before_definition() {
    let source = indoc! {"
      main() {
        bool even(int n) {
          if n == 0 { return true; }
          return odd(n - 1);
        }
        bool odd(int n) {
          if n == 0 { return false; }
          return even(n - 1);
        }
        println even(10);
      }
    "};
    assert!(analyzed(source).is_ok());
  }

  #[test]
  fn double_declaration_in_one_scope() {
    let (line, kind) = semantic_error("main() {\n int x;\n bool x;\n}");
    assert_eq!(line, 2);
    assert_eq!(kind, SemanticErrorKind::DoubleDeclaration("x".to_string()));

    let (_, kind) = semantic_error("main() {\n f(int a) { int a; }\n}");
    assert_eq!(kind, SemanticErrorKind::DoubleDeclaration("a".to_string()));
  }

  #[test]
  fn undeclared_names() {
    let (line, kind) = semantic_error("main() {\n  y = 1;\n}");
    assert_eq!(line, 1);
    assert_eq!(kind, SemanticErrorKind::UndeclaredVariable("y".to_string()));

    let (_, kind) = semantic_error("main() { print z; }");
    assert_eq!(kind, SemanticErrorKind::UndeclaredVariable("z".to_string()));

    // nested functions are not visible outside their parent
    let (_, kind) = semantic_error("main() { f() { g() { } } g(); }");
    assert!(matches!(kind, SemanticErrorKind::UndeclaredFunction { .. }));
  }

  #[test]
  fn type_errors() {
    let cases = [
      ("main() { int x; x = true; }", "assignment"),
      ("main() { print 1 + true; }", "arithmetic operation"),
      ("main() { print 1 < true; }", "comparison"),
      ("main() { print true < false; }", "comparison"),
      ("main() { print 1 && true; }", "logical operation"),
      ("main() { print 1 == true; }", "comparison"),
      ("main() { int f() { return true; } }", "return statement"),
      ("main() { int f() { return; } }", "return statement"),
      ("main() { return 1; }", "return statement"),
    ];
    for (source, expected) in cases {
      let (_, kind) = semantic_error(source);
      let SemanticErrorKind::TypeMismatch { context, .. } = &kind else {
        panic!("{source}: unexpected {kind:?}");
      };
      assert_eq!(*context, expected, "{source}");
    }
  }

  #[test]
  fn conditions_must_be_boolean() {
    let (_, kind) = semantic_error("main() { if 1 { } }");
    assert_eq!(kind, SemanticErrorKind::NonBooleanCondition("if"));
    let (_, kind) = semantic_error("main() { while 0 { } }");
    assert_eq!(kind, SemanticErrorKind::NonBooleanCondition("while"));
  }

  #[test]
  fn void_and_string_values_are_limited() {
    let (_, kind) = semantic_error("main() { f() { } print f(); }");
    assert_eq!(
      kind,
      SemanticErrorKind::InvalidOperand {
        context: "print statement",
        found: Type::Void,
      }
    );
    let (_, kind) = semantic_error("main() { f() { } print f() == f(); }");
    assert_eq!(
      kind,
      SemanticErrorKind::InvalidOperand {
        context: "equality comparison",
        found: Type::Void,
      }
    );
  }

  #[test]
  fn strings_are_collected_in_order() {
    let program = analyzed(r#"main() { f() { println "b"; } print "a"; f(); }"#).unwrap();
    let strings: Vec<(&str, &str)> = program
      .strings
      .iter()
      .map(|s| (s.label.as_str(), s.text.as_str()))
      .collect();
    assert_eq!(strings, [(".Lstr3", "b"), (".Lstr4", "a")]);
  }

  #[test]
  fn call_statements_may_discard_results() {
    assert!(analyzed("main() { int f() { return 1; } f(); }").is_ok());
  }

  #[test]
  fn main_can_be_called_recursively() {
    assert!(analyzed("main() { f() { main(); } }").is_ok());
  }
}
