pub mod error;
pub mod phases;
pub mod pipeline;

use std::path::PathBuf;

use anyhow::Result;

pub use crate::error::CompileError;
pub use crate::phases::parse::Justfile;
pub use crate::pipeline::{Pipeline, PipelineOptions};

/// Find a justfile in the current directory or parent directories
pub fn find_justfile() -> Result<PathBuf> {
  let pipeline = Pipeline::new();
  pipeline.find_justfile()
}

/// Parse justfile text and return its AST
pub fn parse_justfile(content: &str) -> Result<Justfile, CompileError> {
  let pipeline = Pipeline::new();
  let tokens = pipeline.tokenize.tokenize(content)?;
  pipeline.parse.parse(tokens)
}

/// Compile justfile text into a POSIX shell script
pub fn compile_justfile(content: &str, outfile_name: &str) -> Result<String, CompileError> {
  let pipeline = Pipeline::new();
  pipeline.compile_str(content, outfile_name)
}
