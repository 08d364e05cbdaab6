//! Earley chart parser producing the raw AST.
//!
//! Recognition fills one chart per input position with parse items. Items
//! are stored in a single arena and refer to each other through integer
//! handles: `prev` points at the same rule instance one dot earlier and
//! `child` at the completed item that carried the dot over a nonterminal.
//! Once the input is recognised, those backpointers are walked to recover
//! the sequence of rule completions, which is then replayed against a stack
//! of fragments to run the grammar's construction actions.

use rustc_hash::FxHashSet;
use snafu::{OptionExt, ensure};

use crate::ast::{Expr, ExprKind, Function, Stmt, StmtKind};
use crate::error::{
  CompileError, CompileResult, InternalSnafu, NestingTooDeepSnafu, SyntaxSnafu, UnexpectedEofSnafu,
};
use crate::grammar::{Children, Fragment, NonTerminal, RULES, Symbol, rules_for};
use crate::tokenizer::{Token, TokenKind};

type ItemId = usize;

/// Deepest function, block or expression nesting accepted. The later passes
/// recurse once per level.
pub const MAX_NESTING: usize = 256;

#[derive(Debug, Clone, Copy)]
struct Item {
  rule: usize,
  dot: usize,
  /// Input position where the rule instance started.
  start: usize,
  /// Input position reached by the dot.
  end: usize,
  prev: Option<ItemId>,
  child: Option<ItemId>,
}

impl Item {
  fn next_symbol(&self) -> Option<Symbol> {
    RULES[self.rule].rhs.get(self.dot).copied()
  }

  fn is_complete(&self) -> bool {
    self.dot == RULES[self.rule].rhs.len()
  }
}

#[derive(Debug, Default)]
struct Chart {
  items: Vec<ItemId>,
  seen: FxHashSet<(usize, usize, usize)>,
}

struct Recognizer<'a> {
  tokens: &'a [Token],
  arena: Vec<Item>,
  charts: Vec<Chart>,
}

impl<'a> Recognizer<'a> {
  fn new(tokens: &'a [Token]) -> Self {
    let charts = (0..=tokens.len()).map(|_| Chart::default()).collect();
    Self {
      tokens,
      arena: Vec::new(),
      charts,
    }
  }

  /// Add an item to a chart unless an item with the same rule, dot and
  /// start is already there. The first derivation found for a state wins.
  fn add(&mut self, column: usize, item: Item) {
    let chart = &mut self.charts[column];
    if chart.seen.insert((item.rule, item.dot, item.start)) {
      chart.items.push(self.arena.len());
      self.arena.push(item);
    }
  }

  fn advance(&mut self, column: usize, id: ItemId, child: Option<ItemId>) {
    let item = self.arena[id];
    self.add(
      column,
      Item {
        rule: item.rule,
        dot: item.dot + 1,
        start: item.start,
        end: column,
        prev: Some(id),
        child,
      },
    );
  }

  fn predict(&mut self, column: usize, id: ItemId, expected: NonTerminal) {
    for rule in rules_for(expected) {
      self.add(
        column,
        Item {
          rule,
          dot: 0,
          start: column,
          end: column,
          prev: None,
          child: None,
        },
      );
    }

    // An empty-span completion of `expected` may already have run before
    // this item showed up; it would never advance it otherwise.
    let nullable: Vec<ItemId> = self.charts[column]
      .items
      .iter()
      .copied()
      .filter(|&other| {
        let other = &self.arena[other];
        other.start == column && other.is_complete() && RULES[other.rule].lhs == expected
      })
      .collect();
    for completed in nullable {
      self.advance(column, id, Some(completed));
    }
  }

  fn complete(&mut self, column: usize, id: ItemId) {
    let item = self.arena[id];
    let wanted = Some(Symbol::N(RULES[item.rule].lhs));
    let waiting: Vec<ItemId> = self.charts[item.start]
      .items
      .iter()
      .copied()
      .filter(|&parent| self.arena[parent].next_symbol() == wanted)
      .collect();
    for parent in waiting {
      self.advance(column, parent, Some(id));
    }
  }

  fn scan(&mut self, column: usize, id: ItemId, expected: TokenKind) {
    let Some(token) = self.tokens.get(column) else {
      return;
    };
    if token.kind == expected {
      self.advance(column + 1, id, None);
    }
  }

  /// Run the chart loop and return the handle of the completed start item.
  fn recognize(&mut self) -> CompileResult<ItemId> {
    self.add(
      0,
      Item {
        rule: 0,
        dot: 0,
        start: 0,
        end: 0,
        prev: None,
        child: None,
      },
    );

    for column in 0..=self.tokens.len() {
      let mut index = 0;
      while index < self.charts[column].items.len() {
        let id = self.charts[column].items[index];
        match self.arena[id].next_symbol() {
          None => self.complete(column, id),
          Some(Symbol::T(kind)) => self.scan(column, id, kind),
          Some(Symbol::N(nt)) => self.predict(column, id, nt),
        }
        index += 1;
      }

      if let Some(token) = self.tokens.get(column)
        && self.charts[column + 1].items.is_empty()
      {
        return SyntaxSnafu {
          line: token.line,
          found: token.kind,
        }
        .fail();
      }
    }

    let last = self.tokens.len();
    self.charts[last]
      .items
      .iter()
      .copied()
      .find(|&id| {
        let item = &self.arena[id];
        item.rule == 0 && item.start == 0 && item.is_complete()
      })
      .context(UnexpectedEofSnafu)
  }

  /// Post-order list of completed items below (and including) `root`,
  /// i.e. rule completions ordered by the position where each ends.
  fn completions(&self, root: ItemId) -> Vec<ItemId> {
    let mut order = Vec::new();
    let mut stack = vec![(root, false)];
    while let Some((id, expanded)) = stack.pop() {
      if expanded {
        order.push(id);
        continue;
      }
      stack.push((id, true));
      // Walking `prev` visits the children right to left, so the leftmost
      // child ends up on top of the stack.
      let mut cursor = Some(id);
      while let Some(current) = cursor {
        let item = &self.arena[current];
        if let Some(child) = item.child {
          stack.push((child, false));
        }
        cursor = item.prev;
      }
    }
    order
  }
}

/// Parse a token vector into the root function of the program.
pub fn parse(tokens: Vec<Token>) -> CompileResult<Function> {
  let completions: Vec<(usize, usize)> = {
    let mut recognizer = Recognizer::new(&tokens);
    let root = recognizer.recognize()?;
    recognizer
      .completions(root)
      .into_iter()
      .map(|id| (recognizer.arena[id].rule, recognizer.arena[id].end))
      .collect()
  };

  let mut input = tokens.into_iter();
  let mut consumed = 0;
  let mut stack: Vec<Fragment> = Vec::new();
  for (rule, end) in completions {
    let fresh = end.checked_sub(consumed).context(InternalSnafu {
      message: "derivation completions out of input order",
    })?;
    stack.extend(input.by_ref().take(fresh).map(Fragment::Token));
    consumed = end;

    let arity = RULES[rule].rhs.len();
    let split = stack.len().checked_sub(arity).context(InternalSnafu {
      message: "derivation stack underflow",
    })?;
    let children = stack.split_off(split);
    let built = (RULES[rule].build)(&mut Children::new(children))?;
    stack.push(built);
  }

  let root = match (stack.pop(), stack.is_empty()) {
    (Some(Fragment::Function(root)), true) => root,
    _ => return Err(CompileError::internal("derivation left no single root")),
  };
  check_nesting(&root)?;
  Ok(root)
}

#[derive(Clone, Copy)]
enum Node<'a> {
  Function(&'a Function),
  Stmt(&'a Stmt),
  Expr(&'a Expr),
}

/// Reject trees nested deeper than [`MAX_NESTING`], without recursing.
fn check_nesting(root: &Function) -> CompileResult<()> {
  let mut pending = vec![(Node::Function(root), 0)];
  while let Some((node, depth)) = pending.pop() {
    let line = match node {
      Node::Function(function) => function.line,
      Node::Stmt(stmt) => stmt.line,
      Node::Expr(expr) => expr.line,
    };
    ensure!(
      depth <= MAX_NESTING,
      NestingTooDeepSnafu {
        line,
        limit: MAX_NESTING,
      }
    );

    let inner = depth + 1;
    match node {
      Node::Function(function) => {
        let nested = function.nested.iter().map(Node::Function);
        let body = function.body.iter().map(Node::Stmt);
        pending.extend(nested.chain(body).map(|node| (node, inner)));
      }
      Node::Stmt(stmt) => match &stmt.kind {
        StmtKind::Print { expr, .. } | StmtKind::Assign { expr, .. } => {
          pending.push((Node::Expr(expr), inner));
        }
        StmtKind::Return(value) => {
          pending.extend(value.iter().map(|expr| (Node::Expr(expr), inner)));
        }
        StmtKind::While { cond, body } => {
          pending.push((Node::Expr(cond), inner));
          pending.extend(body.iter().map(|stmt| (Node::Stmt(stmt), inner)));
        }
        StmtKind::IfThenElse {
          cond,
          then_body,
          else_body,
        } => {
          pending.push((Node::Expr(cond), inner));
          let branches = then_body.iter().chain(else_body);
          pending.extend(branches.map(|stmt| (Node::Stmt(stmt), inner)));
        }
        StmtKind::Call(call) => {
          pending.extend(call.args.iter().map(|arg| (Node::Expr(arg), inner)));
        }
      },
      Node::Expr(expr) => match &expr.kind {
        ExprKind::Call(call) => {
          pending.extend(call.args.iter().map(|arg| (Node::Expr(arg), inner)));
        }
        ExprKind::Arith { lhs, rhs, .. } | ExprKind::Logic { lhs, rhs, .. } => {
          pending.push((Node::Expr(lhs), inner));
          pending.push((Node::Expr(rhs), inner));
        }
        ExprKind::Integer(_)
        | ExprKind::Boolean(_)
        | ExprKind::Str { .. }
        | ExprKind::Var { .. } => {}
      },
    }
  }
  Ok(())
}
