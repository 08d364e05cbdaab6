//! Fixed assembly text: the program skeleton and the runtime routines every
//! generated program carries.

use indoc::{formatdoc, indoc};

use crate::ast::StringConstant;

/// Decimal output of the signed 32-bit argument on the stack.
///
/// Digits are produced by repeated unsigned division of the absolute value
/// and stored back to front in a 16-byte buffer below the return address.
pub const PRINT_INT32: &str = indoc! {"
  print_int32:
      movl 4(%esp), %eax
      movl %eax, %esi
      cdq
      xorl %edx, %eax
      subl %edx, %eax
      movl %esp, %ecx
      subl $16, %esp
      movl $10, %ebx
  0:  xorl %edx, %edx
      divl %ebx
      decl %ecx
      addb $48, %dl
      movb %dl, (%ecx)
      testl %eax, %eax
      jnz 0b
      testl %esi, %esi
      jns 1f
      decl %ecx
      movb $45, (%ecx)
  1:  movl $4, %eax
      movl $1, %ebx
      movl %esp, %edx
      addl $16, %edx
      subl %ecx, %edx
      int $0x80
      addl $16, %esp
      ret
"};

/// `.ascii` directive plus a `_len` symbol for one string literal.
pub fn string_constant(constant: &StringConstant) -> String {
  formatdoc!(
    "
    {label}: .ascii \"{text}\"
        {label}_len = . - {label}
    ",
    label = constant.label,
    text = escape(&constant.text),
  )
}

/// Raw newlines may appear inside source strings but not inside `.ascii`.
fn escape(text: &str) -> String {
  text.replace('\n', "\\n")
}

/// Whole-program layout around the already generated functions.
///
/// `_start` points `display[0]` at main's frame, reserves main's locals,
/// calls it and exits with status 0.
pub fn program(
  strings: &[StringConstant],
  display_size: usize,
  main_locals: usize,
  main: &str,
  functions: &str,
) -> String {
  let strings: String = strings.iter().map(string_constant).collect();
  formatdoc!(
    "
    .global _start
        .data
    {strings}truestr: .ascii \"true\"
        truestr_len = . - truestr
    falsestr: .ascii \"false\"
        falsestr_len = . - falsestr
        .bss
        .align 4
    display: .skip {display_bytes}
        .text
    _start:
        leal -4(%esp), %eax
        movl %eax, display
        subl ${locals_bytes}, %esp
        call {main}
        addl ${locals_bytes}, %esp
        movl $1, %eax
        xorl %ebx, %ebx
        int $0x80
    {functions}{runtime}",
    strings = strings,
    display_bytes = 4 * display_size,
    locals_bytes = 4 * main_locals,
    main = main,
    functions = functions,
    runtime = PRINT_INT32,
  )
}
