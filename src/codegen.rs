//! Code generation: lower the decorated AST into AT&T x86-32 assembly.
//!
//! Every expression leaves its value in `%eax`; binary operators park the
//! left operand on the stack while the right one is evaluated. Variables are
//! reached through the `display`, one frame pointer per lexical depth, so a
//! nested function can read and write the locals of every enclosing function.

use snafu::OptionExt;

use crate::ast::{ArithOp, Call, Expr, ExprKind, Function, LogicOp, Program, Slot, Stmt, StmtKind};
use crate::error::{CompileError, CompileResult, InternalSnafu};
use crate::label::Labels;
use crate::templates;
use crate::ty::Type;

/// Emit the whole program. `program` must have been analyzed.
pub fn generate(program: &Program, labels: &mut Labels) -> CompileResult<String> {
  let mut generator = Generator {
    asm: String::new(),
    labels,
  };
  generator.function(&program.root)?;
  let main = function_label(&program.root)?;
  Ok(templates::program(
    &program.strings,
    program.display_size,
    program.root.frame_locals(),
    main,
    &generator.asm,
  ))
}

fn function_label(function: &Function) -> CompileResult<&str> {
  function.label.as_deref().context(InternalSnafu {
    message: format!("function {} has no label", function.name),
  })
}

fn display(depth: usize) -> String {
  format!("display+{}", 4 * depth)
}

fn frame_offset(offset: usize) -> isize {
  -4 * offset as isize
}

struct Generator<'a> {
  asm: String,
  labels: &'a mut Labels,
}

impl Generator<'_> {
  /// Append one indented instruction line.
  fn emit(&mut self, instruction: &str) {
    self.asm.push_str(&format!("    {instruction}\n"));
  }

  fn label(&mut self, label: &str) {
    self.asm.push_str(&format!("{label}:\n"));
  }

  /// Emit a function's own code, then its nested functions.
  fn function(&mut self, function: &Function) -> CompileResult<()> {
    self.label(function_label(function)?);
    for stmt in &function.body {
      self.stmt(stmt)?;
    }
    self.emit("ret");

    for nested in &function.nested {
      self.function(nested)?;
    }
    Ok(())
  }

  fn stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
    match &stmt.kind {
      StmtKind::Print { expr, newline } => {
        self.print(expr)?;
        if *newline {
          self.emit("pushl $10");
          self.emit("movl $4, %eax");
          self.emit("movl $1, %ebx");
          self.emit("movl %esp, %ecx");
          self.emit("movl $1, %edx");
          self.emit("int $0x80");
          self.emit("addl $4, %esp");
        }
      }
      StmtKind::Return(value) => {
        if let Some(expr) = value {
          self.expr(expr)?;
        }
        self.emit("ret");
      }
      StmtKind::Assign { name, expr, slot } => {
        let slot = slot.context(InternalSnafu {
          message: format!("assignment to {name} is unresolved"),
        })?;
        self.expr(expr)?;
        self.emit(&format!("movl {}, %ebx", display(slot.depth)));
        self.emit(&format!("movl %eax, {}(%ebx)", frame_offset(slot.offset)));
      }
      StmtKind::While { cond, body } => {
        let (start, end) = self.labels.pair("while");
        self.label(&start);
        self.expr(cond)?;
        self.emit("testl %eax, %eax");
        self.emit(&format!("jz {end}"));
        for stmt in body {
          self.stmt(stmt)?;
        }
        self.emit(&format!("jmp {start}"));
        self.label(&end);
      }
      StmtKind::IfThenElse {
        cond,
        then_body,
        else_body,
      } => {
        let (otherwise, end) = self.labels.pair("if");
        self.expr(cond)?;
        self.emit("testl %eax, %eax");
        self.emit(&format!("jz {otherwise}"));
        for stmt in then_body {
          self.stmt(stmt)?;
        }
        self.emit(&format!("jmp {end}"));
        self.label(&otherwise);
        for stmt in else_body {
          self.stmt(stmt)?;
        }
        self.label(&end);
      }
      StmtKind::Call(call) => self.call(call)?,
    }
    Ok(())
  }

  /// Write the value of `expr` to stdout with a raw `write` system call.
  fn print(&mut self, expr: &Expr) -> CompileResult<()> {
    match expr.ty {
      Some(Type::Int) => {
        self.expr(expr)?;
        self.emit("pushl %eax");
        self.emit("call print_int32");
        self.emit("addl $4, %esp");
      }
      Some(Type::Bool) => {
        self.expr(expr)?;
        self.emit("movl $truestr, %ecx");
        self.emit("movl $truestr_len, %edx");
        self.emit("testl %eax, %eax");
        self.emit("jnz 0f");
        self.emit("movl $falsestr, %ecx");
        self.emit("movl $falsestr_len, %edx");
        self.label("0");
        self.emit("movl $4, %eax");
        self.emit("movl $1, %ebx");
        self.emit("int $0x80");
      }
      Some(Type::Str) => {
        let ExprKind::Str {
          label: Some(label), ..
        } = &expr.kind
        else {
          return Err(CompileError::internal("string value without a data label"));
        };
        self.emit("movl $4, %eax");
        self.emit("movl $1, %ebx");
        self.emit(&format!("movl ${label}, %ecx"));
        self.emit(&format!("movl ${label}_len, %edx"));
        self.emit("int $0x80");
      }
      Some(Type::Void) | None => {
        let message = format!("cannot print an expression of type {:?}", expr.ty);
        return Err(CompileError::internal(message));
      }
    }
    Ok(())
  }

  fn expr(&mut self, expr: &Expr) -> CompileResult<()> {
    match &expr.kind {
      ExprKind::Integer(value) => self.emit(&format!("movl ${value}, %eax")),
      ExprKind::Boolean(value) => self.emit(&format!("movl ${}, %eax", u8::from(*value))),
      ExprKind::Str { .. } => {
        return Err(CompileError::internal("string literal used as a value"));
      }
      ExprKind::Var { name, slot } => {
        let Slot { depth, offset } = slot.context(InternalSnafu {
          message: format!("variable {name} is unresolved"),
        })?;
        self.emit(&format!("movl {}, %eax", display(depth)));
        self.emit(&format!("movl {}(%eax), %eax", frame_offset(offset)));
      }
      ExprKind::Call(call) => self.call(call)?,
      ExprKind::Arith { op, lhs, rhs } => {
        self.operands(lhs, rhs)?;
        match op {
          ArithOp::Add => self.emit("addl %ebx, %eax"),
          ArithOp::Sub => self.emit("subl %ebx, %eax"),
          ArithOp::Mul => self.emit("imull %ebx, %eax"),
          ArithOp::Div => {
            self.emit("cdq");
            self.emit("idivl %ebx");
          }
          ArithOp::Mod => {
            self.emit("cdq");
            self.emit("idivl %ebx");
            self.emit("movl %edx, %eax");
          }
        }
      }
      ExprKind::Logic { op, lhs, rhs } => {
        self.operands(lhs, rhs)?;
        let set = match op {
          LogicOp::And => {
            self.emit("andl %ebx, %eax");
            return Ok(());
          }
          LogicOp::Or => {
            self.emit("orl %ebx, %eax");
            return Ok(());
          }
          LogicOp::Eq => "sete",
          LogicOp::Ne => "setne",
          LogicOp::Lt => "setl",
          LogicOp::Le => "setle",
          LogicOp::Gt => "setg",
          LogicOp::Ge => "setge",
        };
        self.emit("cmpl %ebx, %eax");
        self.emit(&format!("{set} %al"));
        self.emit("movzbl %al, %eax");
      }
    }
    Ok(())
  }

  /// Leave the left operand in `%eax` and the right one in `%ebx`.
  fn operands(&mut self, lhs: &Expr, rhs: &Expr) -> CompileResult<()> {
    self.expr(lhs)?;
    self.emit("pushl %eax");
    self.expr(rhs)?;
    self.emit("movl %eax, %ebx");
    self.emit("popl %eax");
    Ok(())
  }

  /// Save the callee's display slot, build its frame (arguments, then
  /// locals), point the slot at the first argument and call. The slot is
  /// restored from the stack afterwards; the result stays in `%eax`.
  fn call(&mut self, call: &Call) -> CompileResult<()> {
    let target = call.target.as_ref().context(InternalSnafu {
      message: format!("call to {} is unresolved", call.name),
    })?;
    let slot = display(target.depth);

    self.emit(&format!("pushl {slot}"));
    for arg in &call.args {
      self.expr(arg)?;
      self.emit("pushl %eax");
    }
    if target.locals > 0 {
      self.emit(&format!("subl ${}, %esp", 4 * target.locals));
    }
    let frame_base = 4 * ((target.locals + call.args.len()) as isize - 1);
    self.emit(&format!("leal {frame_base}(%esp), %eax"));
    self.emit(&format!("movl %eax, {slot}"));
    self.emit(&format!("call {}", target.label));
    self.emit(&format!("movl {slot}, %esp"));
    self.emit("addl $4, %esp");
    self.emit(&format!("popl {slot}"));
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use indoc::indoc;

  use super::*;
  use crate::analyzer::analyze;
  use crate::parser::parse;
  use crate::tokenizer::tokenize;

  fn assembly(source: &str) -> String {
    let mut labels = Labels::new();
    let mut program = Program::new(parse(tokenize(source).unwrap()).unwrap());
    analyze(&mut program, &mut labels).unwrap();
    generate(&program, &mut labels).unwrap()
  }

  /// Indent every line the way emitted instructions are indented.
  fn instructions(text: &str) -> String {
    text.lines().map(|line| format!("    {line}\n")).collect()
  }

  #[test]
  fn locals_are_addressed_through_the_display() {
    let asm = assembly("main() { int a; int b; b = 7; a = b; }");
    assert!(asm.contains(indoc! {"
      main_1:
          movl $7, %eax
          movl display+0, %ebx
          movl %eax, -4(%ebx)
          movl display+0, %eax
          movl -4(%eax), %eax
          movl display+0, %ebx
          movl %eax, 0(%ebx)
          ret
    "}));
    assert!(asm.contains("display: .skip 4\n"));
    assert!(asm.contains("    subl $8, %esp\n    call main_1\n"));
  }

  #[test]
  fn binary_operators_park_the_left_operand() {
    let asm = assembly("main() { print 7 - 2; }");
    assert!(asm.contains(&instructions(indoc! {"
          movl $7, %eax
          pushl %eax
          movl $2, %eax
          movl %eax, %ebx
          popl %eax
          subl %ebx, %eax
          pushl %eax
          call print_int32
          addl $4, %esp
    "})));
  }

  #[test]
  fn comparisons_set_a_flag_byte() {
    let asm = assembly("main() { println 1 >= 2; }");
    let compare = instructions("cmpl %ebx, %eax\nsetge %al\nmovzbl %al, %eax");
    assert!(asm.contains(&compare));
    assert!(asm.contains("    movl $truestr, %ecx\n"));
    assert!(asm.contains("    pushl $10\n"));
  }

  #[test]
  fn division_and_remainder() {
    let asm = assembly("main() { print 7 / 2; print 7 % 2; }");
    assert!(asm.contains(&instructions("cdq\nidivl %ebx\npushl %eax")));
    let remainder = instructions("cdq\nidivl %ebx\nmovl %edx, %eax");
    assert!(asm.contains(&remainder));
  }

  #[test]
  fn calls_link_the_callee_frame() {
    let source = indoc! {"
      main() {
        int f(int a, int b) {
          int c;
          c = a + b;
          return c;
        }
        print f(1, 2);
      }
    "};
    let asm = assembly(source);
    assert!(asm.contains(&instructions(indoc! {"
          pushl display+4
          movl $1, %eax
          pushl %eax
          movl $2, %eax
          pushl %eax
          subl $4, %esp
          leal 8(%esp), %eax
          movl %eax, display+4
          call f_2
          movl display+4, %esp
          addl $4, %esp
          popl display+4
    "})));
    // parameters first, then locals
    let store = instructions("movl display+4, %ebx\nmovl %eax, -8(%ebx)");
    assert!(asm.contains(&store));
    assert!(asm.contains("display: .skip 8\n"));
  }

  #[test]
  fn calls_without_frame_words_still_balance() {
    let asm = assembly("main() { f() { } f(); }");
    assert!(asm.contains(&instructions(indoc! {"
      pushl display+4
      leal -4(%esp), %eax
      movl %eax, display+4
    "})));
  }

  #[test]
  fn nested_functions_follow_their_parent() {
    let asm = assembly("main() { f() { g() { } g(); } f(); }");
    let main = asm.find("main_1:").unwrap();
    let f = asm.find("f_2:").unwrap();
    let g = asm.find("g_3:").unwrap();
    assert!(main < f && f < g);
    assert!(asm.contains("display: .skip 12\n"));
  }

  #[test]
  fn control_flow_labels_are_unique() {
    let source = indoc! {"
      main() {
        int i;
        while i < 3 {
          if i == 1 { print 1; } else { print 2; }
          while false { }
          i = i + 1;
        }
      }
    "};
    let asm = assembly(source);
    for label in [".Lwhile2", ".Lif3", ".Lwhile4"] {
      assert_eq!(asm.matches(&format!("{label}:")).count(), 1, "{label}");
      assert_eq!(asm.matches(&format!("{label}_end:")).count(), 1, "{label}");
    }
  }

  #[test]
  fn strings_are_written_from_data() {
    let asm = assembly(r#"main() { println "hello"; }"#);
    assert!(asm.contains(".Lstr2: .ascii \"hello\"\n"));
    let write = instructions("movl $.Lstr2, %ecx\nmovl $.Lstr2_len, %edx");
    assert!(asm.contains(&write));
  }

  #[test]
  fn undecorated_tree_is_an_internal_error() {
    let program = Program::new(parse(tokenize("main() { }").unwrap()).unwrap());
    assert!(matches!(
      generate(&program, &mut Labels::new()),
      Err(CompileError::Internal { .. })
    ));
  }
}
