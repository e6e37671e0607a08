use thiserror::Error;

/// What kind of reference chain closed on itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
  Alias,
  Dependency,
}

impl std::fmt::Display for CycleKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      CycleKind::Alias => write!(f, "alias"),
      CycleKind::Dependency => write!(f, "dependency"),
    }
  }
}

/// Compile-time errors. The first error aborts the compile; every variant
/// carries a 1-based source position.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
  #[error("parse error at line {line}, column {column}: {message}")]
  Parse {
    line: usize,
    column: usize,
    message: String,
    snippet: String,
  },
  #[error("duplicate {what} `{name}` at line {line}, column {column}")]
  DuplicateName {
    what: &'static str,
    name: String,
    line: usize,
    column: usize,
  },
  #[error("unknown recipe `{name}` at line {line}, column {column}")]
  UnknownRecipe {
    name: String,
    line: usize,
    column: usize,
  },
  #[error("{kind} cycle through `{name}` at line {line}, column {column}")]
  Cycle {
    kind: CycleKind,
    name: String,
    line: usize,
    column: usize,
  },
  #[error("unknown attribute `{name}` at line {line}, column {column}")]
  UnknownAttribute {
    name: String,
    line: usize,
    column: usize,
  },
  #[error("unknown setting `{name}` at line {line}, column {column}")]
  UnknownSetting {
    name: String,
    line: usize,
    column: usize,
  },
  #[error("function `{name}` is not supported at line {line}, column {column}")]
  UnimplementedFunction {
    name: String,
    line: usize,
    column: usize,
  },
  #[error("{feature} is not supported at line {line}, column {column}")]
  UnimplementedFeature {
    feature: String,
    line: usize,
    column: usize,
  },
  #[error("invalid parameter in recipe `{recipe}` at line {line}, column {column}: {message}")]
  InvalidParameter {
    recipe: String,
    message: String,
    line: usize,
    column: usize,
  },
}

impl CompileError {
  pub fn line(&self) -> usize {
    match self {
      CompileError::Parse { line, .. }
      | CompileError::DuplicateName { line, .. }
      | CompileError::UnknownRecipe { line, .. }
      | CompileError::Cycle { line, .. }
      | CompileError::UnknownAttribute { line, .. }
      | CompileError::UnknownSetting { line, .. }
      | CompileError::UnimplementedFunction { line, .. }
      | CompileError::UnimplementedFeature { line, .. }
      | CompileError::InvalidParameter { line, .. } => *line,
    }
  }

  pub fn column(&self) -> usize {
    match self {
      CompileError::Parse { column, .. }
      | CompileError::DuplicateName { column, .. }
      | CompileError::UnknownRecipe { column, .. }
      | CompileError::Cycle { column, .. }
      | CompileError::UnknownAttribute { column, .. }
      | CompileError::UnknownSetting { column, .. }
      | CompileError::UnimplementedFunction { column, .. }
      | CompileError::UnimplementedFeature { column, .. }
      | CompileError::InvalidParameter { column, .. } => *column,
    }
  }
}
