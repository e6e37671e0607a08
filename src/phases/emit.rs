use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::phases::analyze::{Model, RecipeModel};
use crate::phases::parse::{
  expression_to_string, ConditionOperator, Expression, Fragment, Line, Parameter, Recipe,
  VariadicKind,
};
use crate::phases::runtime;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maps a justfile identifier to a shell-safe name. Hyphens are not portable
/// in `sh` identifiers; prefixes (`VAR_`, `FUN_`, ...) are added by callers.
pub fn mangle(name: &str) -> String {
  name.replace('-', "_")
}

/// Single-quotes an arbitrary string for the shell; embedded quotes become
/// `'\''`.
pub fn quote_single(s: &str) -> String {
  format!("'{}'", s.replace('\'', "'\\''"))
}

fn var_name(name: &str) -> String {
  format!("VAR_{}", mangle(name))
}

fn fun_name(name: &str) -> String {
  format!("FUN_{}", mangle(name))
}

/// Lowers an expression to a shell word whose expansion yields its value.
pub fn evaluate(expression: &Expression) -> String {
  match expression {
    Expression::Literal(text) => quote_single(text),
    Expression::Variable { name, .. } => format!("\"${{{}}}\"", var_name(name)),
    Expression::Concat(left, right) => format!("{}{}", evaluate(left), evaluate(right)),
    Expression::Join(left, right) => match (left.as_ref(), right.as_ref()) {
      // Two literals collapse at emit time, deduplicating the separator.
      (Expression::Literal(a), Expression::Literal(b)) => {
        quote_single(&format!("{}/{}", a.trim_end_matches('/'), b))
      }
      _ => format!("{}'/'{}", evaluate(left), evaluate(right)),
    },
    Expression::Backtick { command, .. } => format!("\"$({})\"", command),
    Expression::Conditional { lhs, rhs, operator, then_value, else_value } => {
      let condition = match operator {
        ConditionOperator::Equal => {
          format!("[ {} = {} ]", evaluate(lhs), evaluate(rhs))
        }
        ConditionOperator::NotEqual => {
          format!("[ {} != {} ]", evaluate(lhs), evaluate(rhs))
        }
        ConditionOperator::Matches => format!(
          "printf '%s' {} | grep -E -- {} > /dev/null",
          evaluate(lhs),
          evaluate(rhs)
        ),
      };
      format!(
        "\"$( if {}; then printf '%s' {}; else printf '%s' {}; fi )\"",
        condition,
        evaluate(then_value),
        evaluate(else_value)
      )
    }
    Expression::Call { name, arguments, .. } => {
      let mut rendered = String::new();
      for argument in arguments {
        rendered.push(' ');
        rendered.push_str(&evaluate(argument));
      }
      format!("\"$({}{})\"", name, rendered)
    }
  }
}

/// Picks a heredoc delimiter that does not occur in any of the texts.
fn heredoc_delimiter(texts: &[&str]) -> String {
  let mut delimiter = "JUSTSH_EOF".to_string();
  while texts.iter().any(|t| t.contains(&delimiter)) {
    delimiter.push_str("_X");
  }
  delimiter
}

fn header_comment(text: &str) -> String {
  let border = "#".repeat(79);
  let mut out = String::new();
  out.push_str(&border);
  out.push('\n');
  for line in text.lines() {
    if line.is_empty() {
      out.push_str("#\n");
    } else {
      out.push_str("# ");
      out.push_str(line);
      out.push('\n');
    }
  }
  out.push_str(&border);
  out
}

#[derive(Default)]
pub struct EmitPhase;

impl EmitPhase {
  pub fn new() -> Self {
    Self
  }

  /// Assembles the complete shell script for `model`. Output is a pure
  /// function of the model and the outfile name.
  pub fn emit(&self, model: &Model, outfile_name: &str) -> String {
    let mut out = String::new();
    out.push_str(runtime::STRICT_PREAMBLE);
    out.push('\n');
    out.push_str(&self.autogen_comment(outfile_name));
    out.push_str("\n\n");

    out.push_str(&header_comment("Runtime helpers"));
    out.push_str("\n\n");
    out.push_str(runtime::HELPERS);
    out.push('\n');
    out.push_str(
      &runtime::USAGE_TEMPLATE
        .replace("@SCRIPT_NAME@", outfile_name)
        .replace("@VERSION@", VERSION),
    );
    out.push('\n');
    out.push_str(&self.builtin_functions(model));

    out.push_str(&header_comment("Initialization and variables"));
    out.push_str("\n\n");
    out.push_str(&self.init_section(model));
    out.push('\n');
    out.push_str(&self.assign_variables_function(model));
    out.push_str("\n\n");

    out.push_str(&header_comment("Recipes"));
    out.push_str("\n\n");
    out.push_str(&self.recipes_section(model));

    out.push_str(&header_comment("Subcommands"));
    out.push_str("\n\n");
    out.push_str(&self.subcommands_section(model, outfile_name));

    out.push_str(&header_comment("Main entrypoint"));
    out.push_str("\n\n");
    out.push_str(&self.main_entrypoint(model, outfile_name));
    out.push('\n');
    out
  }

  fn autogen_comment(&self, outfile_name: &str) -> String {
    header_comment(&format!(
      "\nThis script was generated from a justfile by justsh {}.\n\nRun `./{} --dump` to recover the original justfile.\n",
      VERSION, outfile_name
    ))
  }

  fn builtin_functions(&self, model: &Model) -> String {
    if model.used_functions.is_empty() {
      return String::new();
    }
    let mut emitted: BTreeSet<&str> = BTreeSet::new();
    let mut out = String::new();
    out.push_str(&header_comment("Builtin functions"));
    out.push_str("\n\n");
    for name in &model.used_functions {
      for dep in runtime::builtin_dependencies(name) {
        if emitted.insert(dep) {
          out.push_str(runtime::builtin_source(dep));
          out.push('\n');
        }
      }
      let source = runtime::builtin_source(name);
      if !source.is_empty() && emitted.insert(name.as_str()) {
        out.push_str(source);
        out.push('\n');
      }
    }
    out
  }

  fn init_section(&self, model: &Model) -> String {
    let (shell, shell_args) = match &model.settings.shell {
      Some(items) => (items[0].clone(), items[1..].join(" ")),
      None => ("sh".to_string(), "-cu".to_string()),
    };
    let tempdir = match &model.settings.tempdir {
      Some(dir) => format!("TMPDIR={}\nexport TMPDIR\n", quote_single(dir)),
      None => String::new(),
    };
    let mut out = runtime::INIT_TEMPLATE
      .replace("@SHELL@", &shell.replace('\'', "'\\''"))
      .replace("@SHELL_ARGS@", &shell_args.replace('\'', "'\\''"))
      .replace("@TEMPDIR@", &tempdir);
    if model.settings.dotenv_load {
      let file = match (&model.settings.dotenv_path, &model.settings.dotenv_filename) {
        (Some(path), _) if path.starts_with('/') => quote_single(path),
        (Some(path), _) => format!("\"${{JUSTFILE_DIRECTORY}}\"/{}", quote_single(path)),
        (None, Some(name)) => format!("\"${{JUSTFILE_DIRECTORY}}\"/{}", quote_single(name)),
        (None, None) => "\"${JUSTFILE_DIRECTORY}\"/'.env'".to_string(),
      };
      out.push('\n');
      out.push_str(&runtime::DOTENV_TEMPLATE.replace("@DOTENV_FILE@", &file));
    }
    out
  }

  fn assign_variables_function(&self, model: &Model) -> String {
    let mut lines = String::new();
    if model.variables.is_empty() {
      lines.push_str("  # No user-declared variables\n");
    } else {
      for variable in &model.variables {
        let _ = writeln!(
          lines,
          "  {}={} || exit \"${{?}}\"",
          var_name(&variable.name),
          evaluate(&variable.value)
        );
      }
    }
    format!(
      "assign_variables() {{\n  test -z \"${{HAS_RUN_assign_variables:-}}\" || return 0\n\n{}\n  HAS_RUN_assign_variables='true'\n}}",
      lines
    )
  }

  fn recipes_section(&self, model: &Model) -> String {
    let mut out = String::new();
    for entry in &model.recipes {
      out.push_str(&self.recipe_functions(model, entry));
      out.push('\n');
    }
    for alias in &model.aliases {
      let target = &model.alias_targets[&alias.name];
      let _ = writeln!(
        out,
        "{}() {{\n  {} \"${{@}}\"\n}}\n",
        fun_name(&alias.name),
        fun_name(target)
      );
    }
    out.push_str(&self.platform_dispatchers(model));
    out
  }

  fn platform_dispatchers(&self, model: &Model) -> String {
    let mut out = String::new();
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for entry in &model.recipes {
      if entry.platforms.is_empty() || !seen.insert(entry.recipe.name.as_str()) {
        continue;
      }
      let variants: Vec<&RecipeModel> = model
        .recipes
        .iter()
        .filter(|e| e.recipe.name == entry.recipe.name)
        .collect();
      let mut branches = String::new();
      let mut first = true;
      for variant in &variants {
        for platform in &variant.platforms {
          let probe = if platform == "unix" { "os_family" } else { "os" };
          let keyword = if first { "if" } else { "elif" };
          first = false;
          let _ = writeln!(
            branches,
            "  {} [ \"$({})\" = '{}' ]; then\n    {} \"${{@}}\"",
            keyword,
            probe,
            platform,
            fun_name(&variant.function_name)
          );
        }
      }
      let _ = writeln!(
        out,
        "{}() {{\n{}  else\n    err \"Justfile does not contain recipe \\`{}\\` for this platform\"\n    exit 1\n  fi\n}}\n",
        fun_name(&entry.recipe.name),
        branches,
        entry.recipe.name
      );
    }
    out
  }

  /// The `PRE_` + `FUN_` pair for one recipe.
  fn recipe_functions(&self, model: &Model, entry: &RecipeModel) -> String {
    let recipe = &entry.recipe;
    let fname = mangle(&entry.function_name);
    let recipe_flag = mangle(&recipe.name);
    let shebang = recipe.body.first().map(|l| l.is_shebang()).unwrap_or(false);

    let mut pre = String::new();
    self.min_args_check(entry, &mut pre);
    self.param_assignments(recipe, &mut pre);
    self.before_dependencies(entry, &mut pre);
    self.banner(entry, &mut pre);
    if pre.is_empty() {
      pre.push_str("  :\n");
    }

    let mut body = String::new();
    if !entry.no_cd && !shebang {
      body.push_str("  OLD_WD=\"$(pwd)\"\n  cd \"${JUSTFILE_DIRECTORY}\"\n\n");
    }
    if shebang {
      self.shebang_body(model, entry, &mut body);
    } else {
      self.regular_body(model, entry, &mut body);
    }
    if !entry.no_cd && !shebang {
      body.push_str("\n  cd \"${OLD_WD}\"\n");
    }
    self.after_dependencies(entry, &mut body);

    format!(
      "PRE_{fname}() {{\n{pre}}}\n\nFUN_{fname}() {{\n  CACHE_KEY_{fname}=\"$(run_cache_key '{name}' \"${{@}}\")\"\n  if [ \"${{FORCE_RUN}}\" != 'true' ] && [ \"${{FORCE_{recipe_flag}:-}}\" != 'true' ] \\\n      && [ -e \"${{CACHE_KEY_{fname}}}\" ]; then\n    return 0\n  fi\n  PRE_{fname} \"${{@}}\"\n{shift_tail}{body}\n  if [ -z \"${{FORCE_{recipe_flag}:-}}\" ]; then\n    HAS_RUN_{fname}=1\n    run_cache_mark \"${{CACHE_KEY_{fname}}}\"\n  fi\n}}\n",
      fname = fname,
      name = entry.function_name,
      recipe_flag = recipe_flag,
      pre = pre,
      shift_tail = self.variadic_shift(model, recipe),
      body = body,
    )
  }

  /// When positional arguments are on and the recipe is variadic, the body
  /// consumes `"${@}"`; drop the named parameters first.
  fn variadic_shift(&self, model: &Model, recipe: &Recipe) -> String {
    if !model.settings.positional_arguments
      || recipe.variadic.is_none()
      || recipe.parameters.is_empty()
    {
      return String::new();
    }
    format!(
      "  if [ \"${{#}}\" -ge {n} ]; then\n    shift {n}\n  elif [ \"${{#}}\" -gt 0 ]; then\n    shift \"${{#}}\"\n  fi\n",
      n = recipe.parameters.len()
    )
  }

  fn min_args_check(&self, entry: &RecipeModel, out: &mut String) {
    let recipe = &entry.recipe;
    let mut min_args = recipe
      .parameters
      .iter()
      .filter(|p| p.default.is_none())
      .count();
    if let Some(variadic) = &recipe.variadic {
      if variadic.kind == VariadicKind::Plus && variadic.param.default.is_none() {
        min_args += 1;
      }
    }
    if min_args == 0 {
      return;
    }
    let at_least = if recipe.variadic.is_some()
      || recipe.parameters.iter().any(|p| p.default.is_some())
    {
      "at least "
    } else {
      ""
    };
    let mut display = quote_single(&format!("{} ", recipe.name));
    for param in &recipe.parameters {
      display.push_str(&parameter_display(param, None));
      display.push_str("' '");
    }
    if let Some(variadic) = &recipe.variadic {
      display.push_str(&parameter_display(&variadic.param, Some(variadic.kind)));
      display.push_str("' '");
    }
    let display = display.trim_end_matches("' '").to_string();
    let _ = writeln!(
      out,
      "  if [ \"${{#}}\" -lt {min} ]; then\n    (\n      err \"Recipe \\`{name}\\` got ${{#}} arguments but takes {at_least}{min}\"\n      echo \"${{COLOR_BOLD}}usage:${{COLOR_RESET}}\"\n      echo \"    ${{0}} \"{display}\n    ) >&2\n    exit 1\n  fi",
      min = min_args,
      name = recipe.name,
      at_least = at_least,
      display = display,
    );
  }

  fn param_assignments(&self, recipe: &Recipe, out: &mut String) {
    for (index, param) in recipe.parameters.iter().enumerate() {
      let _ = writeln!(
        out,
        "  {}=\"${{{}:-}}\"",
        var_name(&param.name),
        index + 1
      );
      if let Some(default) = &param.default {
        let _ = writeln!(
          out,
          "  if [ \"${{#}}\" -lt {} ]; then\n    {}={}\n  fi",
          index + 1,
          var_name(&param.name),
          evaluate(default)
        );
      }
    }
    if let Some(variadic) = &recipe.variadic {
      if !recipe.parameters.is_empty() {
        let _ = writeln!(
          out,
          "  if [ \"${{#}}\" -ge {n} ]; then\n    shift {n}\n  elif [ \"${{#}}\" -gt 0 ]; then\n    shift \"${{#}}\"\n  fi",
          n = recipe.parameters.len()
        );
      }
      if let Some(default) = &variadic.param.default {
        let _ = writeln!(
          out,
          "  if [ \"${{#}}\" -lt 1 ]; then\n    set -- {}\n  fi",
          evaluate(default)
        );
      }
      let _ = writeln!(out, "  {}=\"${{*:-}}\"", var_name(&variadic.param.name));
    }
  }

  fn before_dependencies(&self, entry: &RecipeModel, out: &mut String) {
    let recipe_flag = mangle(&entry.recipe.name);
    for dependency in &entry.recipe.dependencies {
      let dep_flag = mangle(&dependency.name);
      let mut args = String::new();
      for argument in &dependency.arguments {
        args.push(' ');
        args.push_str(&evaluate(argument));
      }
      let _ = writeln!(
        out,
        "  if [ \"${{FORCE_{recipe_flag}:-}}\" = 'true' ]; then\n    FORCE_{dep_flag}='true'\n  fi\n  {fun}{args}\n  if [ \"${{FORCE_{recipe_flag}:-}}\" = 'true' ]; then\n    FORCE_{dep_flag}=\n  fi",
        recipe_flag = recipe_flag,
        dep_flag = dep_flag,
        fun = fun_name(&dependency.name),
        args = args,
      );
    }
  }

  fn after_dependencies(&self, entry: &RecipeModel, out: &mut String) {
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for dependency in &entry.recipe.after_dependencies {
      if !seen.insert(dependency.name.as_str()) {
        continue;
      }
      let dep_flag = mangle(&dependency.name);
      let mut args = String::new();
      for argument in &dependency.arguments {
        args.push(' ');
        args.push_str(&evaluate(argument));
      }
      let _ = writeln!(
        out,
        "\n  FORCE_{dep_flag}='true'\n  {fun}{args}\n  FORCE_{dep_flag}=",
        dep_flag = dep_flag,
        fun = fun_name(&dependency.name),
        args = args,
      );
    }
  }

  fn banner(&self, entry: &RecipeModel, out: &mut String) {
    let recipe = &entry.recipe;
    if recipe.body.is_empty()
      || entry.private
      || recipe.quiet
      || recipe.body.iter().all(|line| line.silent)
    {
      return;
    }
    let _ = writeln!(
      out,
      "  if should_banner 'true'; then\n    echo \"${{COLOR_RECIPE}}===> {}${{COLOR_RESET}}\" >&2\n  fi",
      recipe.name
    );
  }

  /// Renders one body line as a concatenation of quoted fragments and
  /// `INTERP_` expansions, replacing a leading `just ` with a re-invocation
  /// of this script.
  fn body_line_exec(
    &self,
    model: &Model,
    entry: &RecipeModel,
    line: &Line,
    interp_counter: &mut usize,
  ) -> String {
    let mut exec = String::new();
    for (index, fragment) in line.fragments.iter().enumerate() {
      match fragment {
        Fragment::Text(text) => {
          let mut text = text.as_str();
          if index == 0 && model.settings.shell.is_none() && text.starts_with("just ") {
            if entry.recipe.attributes.iter().any(|a| a.name == "no-cd") {
              exec.push_str("\"${0}\"");
            } else {
              exec.push_str("\"./$(basename \"${0}\")\"");
            }
            text = &text[4..];
          }
          exec.push_str(&quote_single(text));
        }
        Fragment::Interpolation(_) => {
          exec.push_str(&format!("\"${{INTERP_{}}}\"", interp_counter));
          *interp_counter += 1;
        }
      }
    }
    exec
  }

  fn interpolation_assignments(
    &self,
    entry: &RecipeModel,
    line: &Line,
    counter: &mut usize,
    out: &mut String,
  ) {
    for fragment in &line.fragments {
      if let Fragment::Interpolation(expression) = fragment {
        let _ = writeln!(
          out,
          "  INTERP_{}={} || recipe_error '{}' {}",
          counter,
          evaluate(expression),
          entry.recipe.name,
          line.line
        );
        *counter += 1;
      }
    }
  }

  fn env_prefix(&self, model: &Model, entry: &RecipeModel) -> String {
    let mut names: Vec<String> = Vec::new();
    for variable in &model.variables {
      if variable.exported && !names.contains(&variable.name) {
        names.push(variable.name.clone());
      }
    }
    let recipe = &entry.recipe;
    for param in recipe
      .parameters
      .iter()
      .chain(recipe.variadic.as_ref().map(|v| &v.param))
    {
      if (param.export || model.settings.export) && !names.contains(&param.name) {
        names.push(param.name.clone());
      }
    }
    let mut out = String::new();
    for name in names {
      let _ = write!(out, "\"{}=${{{}}}\" ", mangle(&name), var_name(&name));
    }
    out
  }

  fn positional_arguments(&self, model: &Model, entry: &RecipeModel, with_name: bool) -> String {
    if !model.settings.positional_arguments {
      return String::new();
    }
    let mut out = String::new();
    if with_name {
      let _ = write!(out, " '{}'", entry.recipe.name);
    }
    for param in &entry.recipe.parameters {
      let _ = write!(out, " \"${{{}}}\"", var_name(&param.name));
    }
    if entry.recipe.variadic.is_some() {
      out.push_str(" \"${@}\"");
    }
    out
  }

  fn regular_body(&self, model: &Model, entry: &RecipeModel, out: &mut String) {
    let mut interp_counter = 1;
    let env_prefix = self.env_prefix(model, entry);
    let positional = self.positional_arguments(model, entry, true);
    for line in &entry.recipe.body {
      if model.settings.ignore_comments {
        if let Some(Fragment::Text(text)) = line.fragments.first() {
          if text.starts_with('#') {
            continue;
          }
        }
      }
      let exec_start = interp_counter;
      self.interpolation_assignments(entry, line, &mut interp_counter, out);
      let mut exec_counter = exec_start;
      let exec = self.body_line_exec(model, entry, line, &mut exec_counter);
      // recipe-level `@` inverts the per-line default
      let echo_default = if entry.recipe.quiet == line.silent {
        "true"
      } else {
        "false"
      };
      let _ = writeln!(
        out,
        "  if should_echo '{}'; then\n    echo_recipe_line {}\n  fi",
        echo_default, exec
      );
      let tail = if line.ignore_errors {
        " \\\n      || true".to_string()
      } else if entry.no_exit_message {
        String::new()
      } else {
        format!(" \\\n      || recipe_error '{}' {}", entry.recipe.name, line.line)
      };
      let _ = writeln!(
        out,
        "  if [ \"${{DRY_RUN}}\" != 'true' ]; then\n    env {}\"${{DEFAULT_SHELL}}\" ${{DEFAULT_SHELL_ARGS}} \\\n      {}{}{}\n  fi",
        env_prefix, exec, positional, tail
      );
    }
  }

  fn shebang_body(&self, model: &Model, entry: &RecipeModel, out: &mut String) {
    let mut interp_counter = 1;
    for line in &entry.recipe.body {
      self.interpolation_assignments(entry, line, &mut interp_counter, out);
    }
    let mut exec_counter = 1;
    let mut content = String::new();
    for (index, line) in entry.recipe.body.iter().enumerate() {
      if index > 0 {
        content.push_str("'\n'");
      }
      let exec = self.body_line_exec(model, entry, line, &mut exec_counter);
      content.push_str(&exec);
    }
    // Adjacent quotes concatenate into one argument for echo.
    let content = content.replace("''\n''", "\n");
    let env_prefix = self.env_prefix(model, entry);
    let positional = self.positional_arguments(model, entry, false);
    let tail = if entry.no_exit_message {
      String::new()
    } else {
      format!(" \\\n      || recipe_error '{}'", entry.recipe.name)
    };
    let _ = writeln!(
      out,
      "  TEMPFILE=\"$(mktemp \"${{RUN_CACHE_DIR}}/recipe_XXXXXX\")\"\n  chmod +x \"${{TEMPFILE}}\"\n  echo {} > \"${{TEMPFILE}}\"\n  if should_echo 'false'; then\n    cat \"${{TEMPFILE}}\"\n  fi\n  if [ \"${{DRY_RUN}}\" != 'true' ]; then\n    env {}\"${{TEMPFILE}}\"{}{}\n  fi\n  rm -f \"${{TEMPFILE}}\"",
      content, env_prefix, positional, tail
    );
  }

  fn subcommands_section(&self, model: &Model, outfile_name: &str) -> String {
    let mut out = String::new();
    out.push_str(&self.list_function(model));
    out.push('\n');
    out.push_str(&self.summary_function(model));
    out.push('\n');
    out.push_str(&self.dump_function(model));
    out.push('\n');
    out.push_str(&self.evaluate_function(model));
    out.push('\n');
    out.push_str(&self.choose_function(model));
    out.push('\n');
    out.push_str(&self.show_function(model));
    out.push('\n');
    out.push_str(&self.unknown_target_function(model, outfile_name));
    out.push('\n');
    out
  }

  fn list_target_line(&self, model: &Model, target: &str) -> String {
    let mut line = format!("    echo \"${{LIST_PREFIX}}\"{}", quote_single(target));
    if let Some((parameters, variadic)) = model.parameters_by_name.get(
      model
        .alias_targets
        .get(target)
        .map(|s| s.as_str())
        .unwrap_or(target),
    ) {
      for param in parameters {
        line.push_str("' '");
        line.push_str(&parameter_display(param, None));
      }
      if let Some(variadic) = variadic {
        line.push_str("' '");
        line.push_str(&parameter_display(&variadic.param, Some(variadic.kind)));
      }
    }
    if let Some(doc) = model.docstrings.get(target) {
      line.push_str("\"${COLOR_DOC}\"");
      line.push_str(&quote_single(&format!(" # {}", doc)));
      line.push_str("\"${COLOR_RESET}\"");
    }
    line
  }

  fn list_function(&self, model: &Model) -> String {
    let sorted: Vec<String> = model
      .sorted_public_targets
      .iter()
      .map(|t| self.list_target_line(model, t))
      .collect();
    let unsorted: Vec<String> = model
      .unique_targets
      .iter()
      .filter(|t| !model.private.contains(*t))
      .map(|t| self.list_target_line(model, t))
      .collect();
    let sorted = if sorted.is_empty() {
      "    true".to_string()
    } else {
      sorted.join("\n")
    };
    let unsorted = if unsorted.is_empty() {
      "    true".to_string()
    } else {
      unsorted.join("\n")
    };
    format!(
      "listfn() {{\n  while [ \"${{#}}\" -gt 0 ]; do\n    case \"${{1}}\" in\n    --list-heading)\n      shift\n      LIST_HEADING=\"${{1:-}}\"\n      ;;\n    --list-prefix)\n      shift\n      LIST_PREFIX=\"${{1:-}}\"\n      ;;\n    -u|--unsorted)\n      SORTED='false'\n      ;;\n    esac\n    shift\n  done\n\n  printf '%s' \"${{LIST_HEADING}}\"\n  if [ \"${{SORTED}}\" = 'true' ]; then\n{}\n  else\n{}\n  fi\n}}\n",
      sorted, unsorted
    )
  }

  fn summary_function(&self, model: &Model) -> String {
    let body = if model.public_recipes.is_empty() {
      "  echo 'Justfile contains no recipes.' >&2".to_string()
    } else {
      format!("  echo {}", quote_single(&model.public_recipes.join(" ")))
    };
    format!("summarizefn() {{\n{}\n}}\n", body)
  }

  fn dump_function(&self, model: &Model) -> String {
    let text = model.source.trim();
    let delimiter = heredoc_delimiter(&[text]);
    format!(
      "dumpfn() {{\n  cat <<\"{delim}\"\n{}\n{delim}\n}}\n",
      text,
      delim = delimiter
    )
  }

  fn evaluate_function(&self, model: &Model) -> String {
    let mut names: Vec<&str> = model.variables.iter().map(|v| v.name.as_str()).collect();
    names.sort_unstable();
    let echo_lines = if names.is_empty() {
      "    true".to_string()
    } else {
      let max_len = names.iter().map(|n| n.len()).max().unwrap_or(0);
      names
        .iter()
        .map(|name| {
          let padding = " ".repeat(max_len - name.len() + 1);
          format!(
            "    echo {}\"${{{}}}\"'\"'",
            quote_single(&format!("{}{}:= \"", name, padding)),
            var_name(name)
          )
        })
        .collect::<Vec<_>>()
        .join("\n")
    };
    let cases = if model.variables.is_empty() {
      "    # No user-declared variables".to_string()
    } else {
      model
        .variables
        .iter()
        .map(|variable| {
          format!(
            "    {})\n      printf '%s' \"${{{}}}\"\n      ;;",
            variable.name,
            var_name(&variable.name)
          )
        })
        .collect::<Vec<_>>()
        .join("\n")
    };
    format!(
      "evaluatefn() {{\n  assign_variables || exit \"${{?}}\"\n  if [ \"${{#}}\" = '0' ]; then\n{}\n  else\n    case \"${{1}}\" in\n{}\n    *)\n      err 'Justfile does not contain variable `'\"${{1}}\"'`.'\n      exit 1\n      ;;\n    esac\n  fi\n}}\n",
      echo_lines, cases
    )
  }

  fn choose_function(&self, model: &Model) -> String {
    let targets: Vec<String> = model
      .unique_targets
      .iter()
      .filter(|t| !model.private.contains(*t))
      .map(|t| quote_single(t))
      .collect();
    let list = if targets.is_empty() {
      "''".to_string()
    } else {
      targets.join(" ")
    };
    format!(
      "choosefn() {{\n  echo {} \\\n    | \"${{DEFAULT_SHELL}}\" ${{DEFAULT_SHELL_ARGS}} \"${{CHOOSER}}\"\n}}\n",
      list
    )
  }

  fn show_function(&self, model: &Model) -> String {
    let mut sources: Vec<(String, String)> = Vec::new();
    for entry in &model.recipes {
      if !sources.iter().any(|(n, _)| n == &entry.recipe.name) {
        sources.push((entry.recipe.name.clone(), entry.recipe.source.clone()));
      }
    }
    for alias in &model.aliases {
      let target_source = sources
        .iter()
        .find(|(n, _)| n == &model.alias_targets[&alias.name])
        .map(|(_, s)| s.clone())
        .unwrap_or_default();
      sources.push((
        alias.name.clone(),
        format!("alias {} := {}\n{}", alias.name, alias.target, target_source),
      ));
    }
    let texts: Vec<&str> = sources.iter().map(|(_, s)| s.as_str()).collect();
    let delimiter = heredoc_delimiter(&texts);
    let cases = sources
      .iter()
      .map(|(name, source)| {
        format!(
          "  {})\n    cat <<\"{delim}\"\n{}\n{delim}\n    ;;",
          name,
          source.trim_end(),
          delim = delimiter
        )
      })
      .collect::<Vec<_>>()
      .join("\n");
    format!(
      "showfn() {{\n  case \"${{1:-}}\" in\n{}\n  *)\n    err 'Justfile does not contain recipe `'\"${{1:-}}\"'`.'\n    exit 1\n    ;;\n  esac\n}}\n",
      cases
    )
  }

  fn unknown_target_function(&self, model: &Model, outfile_name: &str) -> String {
    let fallback = if model.settings.fallback {
      format!(
        "  if [ -x '../{name}' ]; then\n    cd ..\n    exec './{name}' \"${{@}}\"\n  fi\n",
        name = outfile_name
      )
    } else {
      String::new()
    };
    format!(
      "unknown_target() {{\n  assign_variables || exit \"${{?}}\"\n{}  err 'Justfile does not contain recipe `'\"${{1}}\"'`.'\n  exit 1\n}}\n",
      fallback
    )
  }

  fn target_case(&self, model: &Model, target: &str) -> String {
    let resolved = model
      .alias_targets
      .get(target)
      .map(|s| s.as_str())
      .unwrap_or(target);
    let fun = fun_name(resolved);
    let (parameters, variadic) = model
      .parameters_by_name
      .get(resolved)
      .cloned()
      .unwrap_or((Vec::new(), None));

    // Each recipe receives only the arguments it can consume; the rest of the
    // command line names further recipes. A variadic recipe takes everything.
    let n = parameters.len();
    let subset_args = |count: usize| -> String {
      (1..=count).map(|i| format!(" \"${{{}}}\"", i)).collect()
    };
    let (call, shift_tail) = if variadic.is_some() {
      (format!("    {} \"${{@}}\"\n", fun), "    break\n".to_string())
    } else if n == 0 {
      (format!("    {}\n", fun), String::new())
    } else {
      let mut arity_cases = String::new();
      for provided in 0..n {
        let _ = writeln!(
          arity_cases,
          "    {}) {}{} ;;",
          provided,
          fun,
          subset_args(provided)
        );
      }
      let call = format!(
        "    case \"${{#}}\" in\n{}    *) {}{} ;;\n    esac\n",
        arity_cases,
        fun,
        subset_args(n)
      );
      let shift_tail = format!(
        "    if [ \"${{#}}\" -ge {n} ]; then\n      shift {n}\n    elif [ \"${{#}}\" -gt 0 ]; then\n      shift \"${{#}}\"\n    fi\n",
        n = n
      );
      (call, shift_tail)
    };
    format!(
      "  {target})\n    shift\n    assign_variables || exit \"${{?}}\"\n{call}    RUN_DEFAULT='false'\n{shift_tail}    ;;\n",
      target = target,
      call = call,
      shift_tail = shift_tail,
    )
  }

  fn default_call(&self, model: &Model) -> String {
    let default = match model.recipe_names.first() {
      Some(name) => name,
      None => {
        return "  assign_variables || exit \"${?}\"\n  echo 'Justfile contains no recipes.' >&2\n  exit 0".to_string();
      }
    };
    let (parameters, variadic) = model
      .parameters_by_name
      .get(default)
      .cloned()
      .unwrap_or((Vec::new(), None));
    let mut required = parameters.iter().filter(|p| p.default.is_none()).count();
    if let Some(v) = &variadic {
      if v.kind == VariadicKind::Plus && v.param.default.is_none() {
        required += 1;
      }
    }
    let mut out = String::new();
    if required > 0 {
      let plural = if required == 1 { "" } else { "s" };
      let _ = writeln!(
        out,
        "  err 'Recipe `{}` cannot be used as default recipe since it requires at least {} argument{}.'\n  exit 1",
        default, required, plural
      );
      return out.trim_end().to_string();
    }
    let _ = write!(
      out,
      "  assign_variables || exit \"${{?}}\"\n  {} \"${{@}}\"",
      fun_name(default)
    );
    out
  }

  fn main_entrypoint(&self, model: &Model, outfile_name: &str) -> String {
    let target_cases: String = model
      .unique_targets
      .iter()
      .map(|t| self.target_case(model, t))
      .collect::<Vec<_>>()
      .join("\n");
    let value_guard = |flag: &str, needed: usize| {
      format!(
        "      [ \"${{#}}\" -ge {} ] || die 'option `{}` requires a value' 2",
        needed, flag
      )
    };
    let init_source = "default:\n    echo 'Hello, world!'";
    let init_delimiter = heredoc_delimiter(&[init_source]);

    format!(
      r#"RUN_DEFAULT='true'
TARGETS_ONLY='false'
while [ "${{#}}" -gt 0 ]; do
  case "${{1}}" in

{target_cases}
  *)
    if [ "${{TARGETS_ONLY}}" = 'true' ]; then
      unknown_target "${{@}}"
    fi
    case "${{1}}" in
    --)
      TARGETS_ONLY='true'
      shift
      ;;
    -l|--list)
      shift
      listfn "${{@}}"
      RUN_DEFAULT='false'
      break
      ;;
    --summary)
      shift
      summarizefn "${{@}}"
      RUN_DEFAULT='false'
      break
      ;;
    --show)
{guard_show}
      shift
      RUN_DEFAULT='false'
      showfn "${{1}}"
      break
      ;;
    --dump)
      RUN_DEFAULT='false'
      dumpfn
      break
      ;;
    --evaluate)
      shift
      RUN_DEFAULT='false'
      evaluatefn "${{@}}"
      break
      ;;
    --choose)
      shift
      assign_variables || exit "${{?}}"
      CHOSEN_TARGET="$(choosefn)" || exit "${{?}}"
      env "${{0}}" "${{CHOSEN_TARGET}}" "${{@}}"
      RUN_DEFAULT='false'
      break
      ;;
    --chooser)
{guard_chooser}
      shift
      CHOOSER="${{1}}"
      shift
      ;;
    --list-heading)
{guard_list_heading}
      shift
      LIST_HEADING="${{1}}"
      shift
      ;;
    --list-prefix)
{guard_list_prefix}
      shift
      LIST_PREFIX="${{1}}"
      shift
      ;;
    -u|--unsorted)
      SORTED='false'
      shift
      ;;
    -q|--quiet)
      QUIET='true'
      shift
      ;;
    --verbose)
      VERBOSE='true'
      shift
      ;;
    -n|--dry-run)
      DRY_RUN='true'
      shift
      ;;
    --force)
      FORCE_RUN='true'
      shift
      ;;
    --color)
{guard_color}
      shift
      set_color_mode "${{1}}"
      shift
      ;;
    --shell)
{guard_shell}
      shift
      DEFAULT_SHELL="${{1}}"
      shift
      ;;
    --shell-arg)
{guard_shell_arg}
      shift
      if [ "${{SHELL_ARGS_OVERRIDDEN}}" != 'true' ]; then
        DEFAULT_SHELL_ARGS=''
        SHELL_ARGS_OVERRIDDEN='true'
      fi
      DEFAULT_SHELL_ARGS="${{DEFAULT_SHELL_ARGS}} ${{1}}"
      shift
      ;;
    -f|--justfile)
{guard_justfile}
      shift
      warn "-f/--justfile has no effect: the justfile is inlined in this script"
      shift
      ;;
    -d|--working-directory)
{guard_workdir}
      shift
      cd "${{1}}" || die "cannot change directory to \`${{1}}\`" 2
      JUSTFILE_DIRECTORY="$(pwd)"
      shift
      ;;
    --set)
{guard_set}
      shift
      SET_VAR_NAME="${{1}}"
      shift
      SET_VAR_VALUE="${{1}}"
      shift
      assign_variables || exit "${{?}}"
      set_var "${{SET_VAR_NAME}}" "${{SET_VAR_VALUE}}"
      ;;
    -V|--version)
      echo "{script_name} {version}"
      RUN_DEFAULT='false'
      break
      ;;
    -h|--help)
      usage
      RUN_DEFAULT='false'
      break
      ;;
    --init)
      RUN_DEFAULT='false'
      if [ -f 'justfile' ]; then
        err "Justfile \`$(realpath_portable 'justfile')\` already exists"
        exit 1
      fi
      cat > 'justfile' <<"{init_delim}"
{init_source}
{init_delim}
      echo 'Wrote justfile to `'"$(realpath_portable 'justfile')"'`'
      break
      ;;
    -*)
      err "Found argument '${{1}}' that wasn't expected, or isn't valid in this context"
      echo >&2
      err_usage
      exit 2
      ;;
    *=*)
      SET_VAR_NAME="$(
        echo "${{1}}" | tr '\n' '\r' | sed 's/\([^=]*\)=.*/\1/g' | tr '\r' '\n'
      )"
      SET_VAR_VALUE="$(
        echo "${{1}}" | tr '\n' '\r' | sed 's/[^=]*=\(.*\)/\1/g' | tr '\r' '\n'
      )"
      shift
      assign_variables || exit "${{?}}"
      set_var "${{SET_VAR_NAME}}" "${{SET_VAR_VALUE}}"
      ;;
    *)
      unknown_target "${{@}}"
      ;;
    esac
    ;;
  esac
done

if [ "${{RUN_DEFAULT}}" = 'true' ]; then
{default_call}
fi"#,
      target_cases = target_cases,
      guard_show = value_guard("--show", 2),
      guard_chooser = value_guard("--chooser", 2),
      guard_list_heading = value_guard("--list-heading", 2),
      guard_list_prefix = value_guard("--list-prefix", 2),
      guard_color = value_guard("--color", 2),
      guard_shell = value_guard("--shell", 2),
      guard_shell_arg = value_guard("--shell-arg", 2),
      guard_justfile = value_guard("--justfile", 2),
      guard_workdir = value_guard("--working-directory", 2),
      guard_set = value_guard("--set", 3),
      script_name = outfile_name,
      version = VERSION,
      init_delim = init_delimiter,
      init_source = init_source,
      default_call = self.default_call(model),
    )
  }
}

/// Colored display of one parameter for usage and list output, built from
/// shell-quoted pieces.
fn parameter_display(param: &Parameter, variadic: Option<VariadicKind>) -> String {
  let mut out = String::new();
  match variadic {
    Some(VariadicKind::Star) => out.push_str("\"${COLOR_VARIADIC}\"'*'\"${COLOR_RESET}\""),
    Some(VariadicKind::Plus) => out.push_str("\"${COLOR_VARIADIC}\"'+'\"${COLOR_RESET}\""),
    None => {}
  }
  if param.export {
    out.push_str("'$'");
  }
  out.push_str("\"${COLOR_RECIPE}\"");
  out.push_str(&quote_single(&param.name));
  out.push_str("\"${COLOR_RESET}\"");
  if let Some(default) = &param.default {
    out.push_str("'='\"${COLOR_DEFAULT}\"");
    out.push_str(&quote_single(&expression_to_string(default, 1)));
    out.push_str("\"${COLOR_RESET}\"");
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::phases::analyze::AnalyzePhase;
  use crate::phases::parse::ParsePhase;
  use crate::phases::tokenize::TokenizePhase;

  fn emit(content: &str) -> String {
    let tokens = TokenizePhase::new().tokenize(content).unwrap();
    let justfile = ParsePhase::new().parse(tokens).unwrap();
    let model = AnalyzePhase::new().analyze(justfile, content).unwrap();
    EmitPhase::new().emit(&model, "just.sh")
  }

  #[test]
  fn test_mangle() {
    assert_eq!(mangle("build-all"), "build_all");
    assert_eq!(mangle("plain"), "plain");
    assert_eq!(mangle("a-b-c"), "a_b_c");
  }

  #[test]
  fn test_quote_single_round_trip_shape() {
    assert_eq!(quote_single("plain"), "'plain'");
    assert_eq!(quote_single("it's"), "'it'\\''s'");
    assert_eq!(quote_single(""), "''");
    assert_eq!(quote_single("a\nb"), "'a\nb'");
  }

  #[test]
  fn test_evaluate_literal() {
    assert_eq!(evaluate(&Expression::Literal("hi".to_string())), "'hi'");
  }

  #[test]
  fn test_evaluate_variable() {
    let expression = Expression::Variable {
      name: "build-dir".to_string(),
      line: 1,
      column: 1,
    };
    assert_eq!(evaluate(&expression), "\"${VAR_build_dir}\"");
  }

  #[test]
  fn test_evaluate_concat() {
    let expression = Expression::Concat(
      Box::new(Expression::Literal("a".to_string())),
      Box::new(Expression::Variable {
        name: "b".to_string(),
        line: 1,
        column: 1,
      }),
    );
    assert_eq!(evaluate(&expression), "'a'\"${VAR_b}\"");
  }

  #[test]
  fn test_evaluate_join_literals_collapse() {
    let expression = Expression::Join(
      Box::new(Expression::Literal("a/".to_string())),
      Box::new(Expression::Literal("b".to_string())),
    );
    assert_eq!(evaluate(&expression), "'a/b'");
  }

  #[test]
  fn test_evaluate_join_runtime() {
    let expression = Expression::Join(
      Box::new(Expression::Variable {
        name: "a".to_string(),
        line: 1,
        column: 1,
      }),
      Box::new(Expression::Literal("b".to_string())),
    );
    assert_eq!(evaluate(&expression), "\"${VAR_a}\"'/''b'");
  }

  #[test]
  fn test_evaluate_call() {
    let expression = Expression::Call {
      name: "join".to_string(),
      arguments: vec![
        Expression::Literal("a".to_string()),
        Expression::Literal("b".to_string()),
      ],
      line: 1,
      column: 1,
    };
    assert_eq!(evaluate(&expression), "\"$(join 'a' 'b')\"");
  }

  #[test]
  fn test_evaluate_conditional() {
    let expression = Expression::Conditional {
      lhs: Box::new(Expression::Literal("a".to_string())),
      rhs: Box::new(Expression::Literal("b".to_string())),
      operator: crate::phases::parse::ConditionOperator::Equal,
      then_value: Box::new(Expression::Literal("x".to_string())),
      else_value: Box::new(Expression::Literal("y".to_string())),
    };
    assert_eq!(
      evaluate(&expression),
      "\"$( if [ 'a' = 'b' ]; then printf '%s' 'x'; else printf '%s' 'y'; fi )\""
    );
  }

  #[test]
  fn test_heredoc_delimiter_avoids_collision() {
    assert_eq!(heredoc_delimiter(&["plain text"]), "JUSTSH_EOF");
    assert_eq!(heredoc_delimiter(&["JUSTSH_EOF in here"]), "JUSTSH_EOF_X");
  }

  #[test]
  fn test_emit_is_deterministic() {
    let content = "x := \"1\"\nhello:\n    echo world\n";
    assert_eq!(emit(content), emit(content));
  }

  #[test]
  fn test_emit_starts_with_shebang() {
    let script = emit("hello:\n    echo world\n");
    assert!(script.starts_with("#!/bin/sh\n"));
  }

  #[test]
  fn test_emit_contains_recipe_function() {
    let script = emit("hello:\n    echo world\n");
    assert!(script.contains("FUN_hello() {"));
    assert!(script.contains("PRE_hello() {"));
    assert!(script.contains("echo_recipe_line 'echo world'"));
  }

  #[test]
  fn test_emit_mangles_hyphenated_names() {
    let script = emit("build-all:\n    make\n");
    assert!(script.contains("FUN_build_all() {"));
    assert!(script.contains("  build-all)"));
  }

  #[test]
  fn test_emit_variable_assignment() {
    let script = emit("x := \"1\"\ny := x + \"2\"\n");
    assert!(script.contains("VAR_x='1' || exit \"${?}\""));
    assert!(script.contains("VAR_y=\"${VAR_x}\"'2' || exit \"${?}\""));
  }

  #[test]
  fn test_emit_only_used_builtins() {
    let script = emit("x := os()\nhello:\n    echo {{x}}\n");
    assert!(script.contains("os() {"));
    assert!(!script.contains("sha256() {"));
  }

  #[test]
  fn test_emit_interpolation_hoisting() {
    let script = emit("greet name:\n    echo \"hello {{name}}\"\n");
    assert!(script.contains("INTERP_1=\"${VAR_name}\" || recipe_error 'greet' 2"));
    assert!(script.contains("\"${INTERP_1}\""));
  }

  #[test]
  fn test_emit_dependency_invocation() {
    let script = emit("a:\n    echo a\nb: a\n    echo b\n");
    assert!(script.contains("PRE_b() {"));
    assert!(script.contains("  FUN_a\n"));
  }

  #[test]
  fn test_emit_alias_function_and_case() {
    let script = emit("alias t := test\ntest:\n    echo ok\n");
    assert!(script.contains("FUN_t() {\n  FUN_test \"${@}\"\n}"));
    assert!(script.contains("  t)"));
  }

  #[test]
  fn test_emit_default_parameter() {
    let script = emit("greet name=\"world\":\n    echo \"hello {{name}}\"\n");
    assert!(script.contains("VAR_name=\"${1:-}\""));
    assert!(script.contains("VAR_name='world'"));
  }

  #[test]
  fn test_emit_shebang_recipe_uses_tempfile() {
    let script = emit("py:\n    #!/usr/bin/env python3\n    print(1)\n");
    assert!(script.contains("TEMPFILE=\"$(mktemp"));
    assert!(script.contains("chmod +x \"${TEMPFILE}\""));
  }

  #[test]
  fn test_emit_ignore_error_prefix() {
    let script = emit("r:\n    -false\n    echo after\n");
    assert!(script.contains("|| true"));
  }

  #[test]
  fn test_emit_no_exit_message() {
    let script = emit("[no-exit-message]\nr:\n    false\n");
    assert!(!script.contains("recipe_error 'r'"));
  }

  #[test]
  fn test_emit_failure_reports_justfile_line() {
    let script = emit("r:\n    echo one\n    false\n");
    assert!(script.contains("recipe_error 'r' 3"));
  }

  #[test]
  fn test_emit_platform_dispatcher() {
    let script = emit("[linux]\nb:\n    echo l\n[macos]\nb:\n    echo m\n");
    assert!(script.contains("FUN_b_linux() {"));
    assert!(script.contains("FUN_b_macos() {"));
    assert!(script.contains("[ \"$(os)\" = 'linux' ]"));
  }

  #[test]
  fn test_emit_dump_contains_source() {
    let script = emit("hello:\n    echo world\n");
    assert!(script.contains("dumpfn() {"));
    assert!(script.contains("hello:\n    echo world"));
  }

  #[test]
  fn test_emit_evaluate_alignment() {
    let script = emit("x := \"1\"\nlong_name := \"2\"\n");
    assert!(script.contains("'long_name := \"'\"${VAR_long_name}\"'\"'"));
    assert!(script.contains("'x         := \"'\"${VAR_x}\"'\"'"));
  }

  #[test]
  fn test_emit_no_recipes_message() {
    let script = emit("x := \"1\"\n");
    assert!(script.contains("Justfile contains no recipes."));
    assert!(script.contains("exit 0"));
  }

  #[test]
  fn test_emit_exported_variable_in_env() {
    let script = emit("export FOO := \"bar\"\nr:\n    echo \"${FOO}\"\n");
    assert!(script.contains("env \"FOO=${VAR_FOO}\" \"${DEFAULT_SHELL}\""));
  }

  #[test]
  fn test_emit_export_parameter_in_env() {
    let script = emit("r $NAME:\n    echo \"${NAME}\"\n");
    assert!(script.contains("\"NAME=${VAR_NAME}\""));
  }

  #[test]
  fn test_emit_positional_arguments() {
    let script = emit("set positional-arguments\nr a:\n    echo \"$1\"\n");
    assert!(script.contains("'r' \"${VAR_a}\""));
  }

  #[test]
  fn test_emit_shell_setting() {
    let script = emit("set shell := [\"bash\", \"-uc\"]\nr:\n    echo hi\n");
    assert!(script.contains("DEFAULT_SHELL='bash'"));
    assert!(script.contains("DEFAULT_SHELL_ARGS='-uc'"));
  }

  #[test]
  fn test_emit_dotenv() {
    let script = emit("set dotenv-load\nr:\n    echo hi\n");
    assert!(script.contains("load_dotenv"));
    assert!(script.contains("'.env'"));
  }

  #[test]
  fn test_emit_after_dependencies_force() {
    let script = emit("a:\n    echo a\nb: && a\n    echo b\n");
    assert!(script.contains("FORCE_a='true'"));
    assert!(script.contains("FORCE_a=\n"));
  }

  #[test]
  fn test_emit_quiet_recipe_inverts_echo() {
    let script = emit("@r:\n    echo hi\n    @echo shown\n");
    // recipe-level @ silences plain lines and re-enables @-prefixed ones
    assert!(script.contains("should_echo 'false'"));
    assert!(script.contains("should_echo 'true'"));
  }

  #[test]
  fn test_emit_unknown_flag_exits_2() {
    let script = emit("r:\n    echo hi\n");
    assert!(script.contains("exit 2"));
  }

  #[test]
  fn test_emit_fallback() {
    let script = emit("set fallback\nr:\n    echo hi\n");
    assert!(script.contains("exec './just.sh'"));
  }

  #[test]
  fn test_emit_banner_suppressed_for_private() {
    let script = emit("[private]\nsecret:\n    echo s\nshown:\n    echo ok\n");
    assert!(script.contains("===> shown"));
    assert!(!script.contains("===> secret"));
  }
}
