//! Lexically scoped symbol table used by the analyzer.
//!
//! There is one global level, holding only the entry point, and one scope per
//! function body currently being analyzed. Variables are keyed by name and
//! functions by [`Signature`], so functions can be overloaded on their
//! parameter types but not on their return type.

use rustc_hash::FxHashMap;
use snafu::{OptionExt, ensure};

use crate::ast::{CallTarget, Function, Slot, VarDecl};
use crate::error::{CompileResult, InternalSnafu, SemanticErrorKind, SemanticSnafu};
use crate::ty::Type;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
  pub name: String,
  pub params: Vec<Type>,
}

impl Signature {
  pub fn new(name: impl Into<String>, params: Vec<Type>) -> Self {
    Self {
      name: name.into(),
      params,
    }
  }

  pub fn of(function: &Function) -> Self {
    Self::new(function.name.as_str(), function.param_types())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarInfo {
  pub ty: Type,
  pub slot: Slot,
}

#[derive(Debug)]
struct Scope {
  vars: FxHashMap<String, VarInfo>,
  funs: FxHashMap<Signature, CallTarget>,
  /// Declared return type of the function owning this scope.
  ret: Type,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
  globals: FxHashMap<Signature, CallTarget>,
  scopes: Vec<Scope>,
}

impl SymbolTable {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push_scope(&mut self, ret: Type) {
    self.scopes.push(Scope {
      vars: FxHashMap::default(),
      funs: FxHashMap::default(),
      ret,
    });
  }

  pub fn pop_scope(&mut self) {
    self.scopes.pop();
  }

  /// Return type of the innermost function being analyzed.
  pub fn return_type(&self) -> Option<Type> {
    self.scopes.last().map(|scope| scope.ret)
  }

  pub fn declare_var(&mut self, decl: &VarDecl, slot: Slot) -> CompileResult<()> {
    let scope = self.scopes.last_mut().context(InternalSnafu {
      message: format!("variable {} declared outside of any function", decl.name),
    })?;
    ensure!(
      !scope.vars.contains_key(&decl.name),
      SemanticSnafu {
        line: decl.line,
        kind: SemanticErrorKind::DoubleDeclaration(decl.name.clone()),
      }
    );
    let info = VarInfo { ty: decl.ty, slot };
    scope.vars.insert(decl.name.clone(), info);
    Ok(())
  }

  /// Register a function in the innermost scope, or in the global level when
  /// no function body is open yet.
  pub fn declare_fun(&mut self, function: &Function, target: CallTarget) -> CompileResult<()> {
    let funs = match self.scopes.last_mut() {
      Some(scope) => &mut scope.funs,
      None => &mut self.globals,
    };
    let signature = Signature::of(function);
    ensure!(
      !funs.contains_key(&signature),
      SemanticSnafu {
        line: function.line,
        kind: SemanticErrorKind::DoubleDeclaration(function.name.clone()),
      }
    );
    funs.insert(signature, target);
    Ok(())
  }

  pub fn lookup_var(&self, name: &str) -> Option<VarInfo> {
    self
      .scopes
      .iter()
      .rev()
      .find_map(|scope| scope.vars.get(name).copied())
  }

  pub fn lookup_fun(&self, signature: &Signature) -> Option<&CallTarget> {
    self
      .scopes
      .iter()
      .rev()
      .find_map(|scope| scope.funs.get(signature))
      .or_else(|| self.globals.get(signature))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::CompileError;

  fn function(name: &str, params: &[Type], ret: Type) -> Function {
    Function {
      name: name.to_string(),
      ret,
      params: params
        .iter()
        .enumerate()
        .map(|(i, ty)| VarDecl::new(format!("p{i}"), *ty, 0))
        .collect(),
      locals: Vec::new(),
      nested: Vec::new(),
      body: Vec::new(),
      line: 7,
      label: None,
      depth: None,
    }
  }

  fn target(label: &str, ret: Type) -> CallTarget {
    CallTarget {
      label: label.to_string(),
      depth: 1,
      params: 0,
      locals: 0,
      ret,
    }
  }

  fn slot(depth: usize, offset: usize) -> Slot {
    Slot { depth, offset }
  }

  #[test]
  fn inner_declarations_shadow_outer_ones() {
    let mut table = SymbolTable::new();
    table.push_scope(Type::Void);
    let outer = slot(0, 0);
    let int_x = VarDecl::new("x", Type::Int, 1);
    table.declare_var(&int_x, outer).unwrap();

    table.push_scope(Type::Int);
    let inner = slot(1, 0);
    let bool_x = VarDecl::new("x", Type::Bool, 3);
    table.declare_var(&bool_x, inner).unwrap();
    assert_eq!(
      table.lookup_var("x"),
      Some(VarInfo {
        ty: Type::Bool,
        slot: inner,
      })
    );
    assert_eq!(table.return_type(), Some(Type::Int));

    table.pop_scope();
    assert_eq!(table.lookup_var("x").map(|var| var.slot), Some(outer));
    assert_eq!(table.return_type(), Some(Type::Void));
    assert_eq!(table.lookup_var("y"), None);
  }

  #[test]
  fn same_level_redeclaration_is_rejected() {
    let mut table = SymbolTable::new();
    table.push_scope(Type::Void);
    let first = VarDecl::new("x", Type::Int, 1);
    let second = VarDecl::new("x", Type::Bool, 2);
    table.declare_var(&first, slot(0, 0)).unwrap();
    let err = table.declare_var(&second, slot(0, 1)).unwrap_err();
    assert!(matches!(
      err,
      CompileError::Semantic {
        line: 2,
        kind: SemanticErrorKind::DoubleDeclaration(ref name),
      } if name == "x"
    ));
  }

  #[test]
  fn overloads_are_keyed_by_parameter_types() {
    let mut table = SymbolTable::new();
    table.push_scope(Type::Void);
    let by_int = function("f", &[Type::Int], Type::Int);
    let by_bool = function("f", &[Type::Bool], Type::Bool);
    let int_target = target("f_1", Type::Int);
    let bool_target = target("f_2", Type::Bool);
    table.declare_fun(&by_int, int_target).unwrap();
    table.declare_fun(&by_bool, bool_target).unwrap();

    let label = |params: Vec<Type>| {
      let found = table.lookup_fun(&Signature::new("f", params));
      found.map(|target| target.label.clone())
    };
    assert_eq!(label(vec![Type::Int]).as_deref(), Some("f_1"));
    assert_eq!(label(vec![Type::Bool]).as_deref(), Some("f_2"));
    assert_eq!(label(Vec::new()), None);

    // a different return type alone is not a new signature
    let by_ret = function("f", &[Type::Int], Type::Bool);
    let clash = target("f_3", Type::Bool);
    let err = table.declare_fun(&by_ret, clash).unwrap_err();
    assert!(matches!(
      err,
      CompileError::Semantic {
        line: 7,
        kind: SemanticErrorKind::DoubleDeclaration(_),
      }
    ));
  }

  #[test]
  fn globals_are_visible_from_every_scope() {
    let mut table = SymbolTable::new();
    let main = function("main", &[], Type::Void);
    let entry = target("main_1", Type::Void);
    table.declare_fun(&main, entry).unwrap();
    table.push_scope(Type::Void);
    table.push_scope(Type::Int);
    let found = table.lookup_fun(&Signature::of(&main));
    assert_eq!(found.map(|target| target.label.as_str()), Some("main_1"));
  }

  #[test]
  fn variables_need_an_open_scope() {
    let mut table = SymbolTable::new();
    let decl = VarDecl::new("x", Type::Int, 0);
    let err = table.declare_var(&decl, slot(0, 0)).unwrap_err();
    assert!(matches!(err, CompileError::Internal { .. }));
  }
}
