use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::error::CompileError;
use crate::phases::{AnalyzePhase, EmitPhase, ParsePhase, TokenizePhase};

/// Filenames probed when no justfile path is given, in priority order.
const JUSTFILE_NAMES: [&str; 4] = ["justfile", ".justfile", "Justfile", ".Justfile"];

#[derive(Default)]
pub struct PipelineOptions {
  pub directory: Option<PathBuf>,
  pub outfile_name: Option<String>,
}

pub struct Pipeline {
  pub tokenize: TokenizePhase,
  pub parse: ParsePhase,
  pub analyze: AnalyzePhase,
  pub emit: EmitPhase,
  pub options: PipelineOptions,
}

impl Default for Pipeline {
  fn default() -> Self {
    Self::with_options(PipelineOptions::default())
  }
}

impl Pipeline {
  pub fn new() -> Self {
    Self::with_options(PipelineOptions::default())
  }

  pub fn with_options(options: PipelineOptions) -> Self {
    Self {
      tokenize: TokenizePhase::new(),
      parse: ParsePhase::new(),
      analyze: AnalyzePhase::new(),
      emit: EmitPhase::new(),
      options,
    }
  }

  /// Finds a justfile in the working directory or any parent directory.
  pub fn find_justfile(&self) -> Result<PathBuf> {
    let mut current_dir = if let Some(dir) = &self.options.directory {
      dir.clone()
    } else {
      std::env::current_dir()?
    };
    loop {
      for name in JUSTFILE_NAMES {
        let candidate = current_dir.join(name);
        if candidate.is_file() {
          return Ok(candidate);
        }
      }
      if let Some(parent) = current_dir.parent() {
        current_dir = parent.to_path_buf();
      } else {
        break;
      }
    }
    Err(anyhow::anyhow!(
      "No justfile found in current directory or parent directories"
    ))
  }

  /// Compiles justfile text into a shell script named `outfile_name`.
  pub fn compile_str(&self, content: &str, outfile_name: &str) -> Result<String, CompileError> {
    let tokens = self.tokenize.tokenize(content)?;
    debug!(tokens = tokens.len(), "tokenized justfile");
    let justfile = self.parse.parse(tokens)?;
    debug!(items = justfile.items.len(), "parsed justfile");
    let model = self.analyze.analyze(justfile, content)?;
    debug!(
      recipes = model.recipes.len(),
      variables = model.variables.len(),
      "built semantic model"
    );
    Ok(self.emit.emit(&model, outfile_name))
  }

  /// Reads and compiles the justfile at `path`.
  pub fn compile_file(&self, path: &PathBuf) -> Result<String> {
    let content = fs::read_to_string(path)
      .with_context(|| format!("could not read justfile at `{}`", path.display()))?;
    let outfile_name = self
      .options
      .outfile_name
      .clone()
      .unwrap_or_else(|| "just.sh".to_string());
    let script = self.compile_str(&content, &outfile_name)?;
    Ok(script)
  }
}
