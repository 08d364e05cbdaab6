/// Source of unique assembly labels for one compilation.
///
/// Both the analyzer (function and string labels) and the code generator
/// (control-flow labels) draw from the same counter, so one `Labels` value
/// is created per compilation and threaded through the passes.
#[derive(Debug, Default)]
pub struct Labels {
  next: usize,
}

impl Labels {
  pub fn new() -> Self {
    Self::default()
  }

  fn fresh(&mut self) -> usize {
    self.next += 1;
    self.next
  }

  pub fn function(&mut self, name: &str) -> String {
    format!("{name}_{}", self.fresh())
  }

  pub fn string(&mut self) -> String {
    format!(".Lstr{}", self.fresh())
  }

  /// A pair of labels for one `if` or `while` construct.
  pub fn pair(&mut self, kind: &str) -> (String, String) {
    let id = self.fresh();
    (format!(".L{kind}{id}"), format!(".L{kind}{id}_end"))
  }
}
