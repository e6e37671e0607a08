use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::warn;

use crate::error::{CompileError, CycleKind};
use crate::phases::emit::mangle;
use crate::phases::parse::{
  Alias, Attribute, Dependency, Expression, Fragment, Item, Justfile, Parameter, Recipe,
  SettingValue, Variadic,
};
use crate::phases::runtime;

const PLATFORM_ATTRIBUTES: [&str; 4] = ["windows", "macos", "linux", "unix"];
const RECIPE_ATTRIBUTES: [&str; 9] = [
  "private",
  "no-cd",
  "no-exit-message",
  "linewise",
  "confirm",
  "windows",
  "macos",
  "linux",
  "unix",
];

/// Typed view of the recognized `set` keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
  pub export: bool,
  pub positional_arguments: bool,
  pub allow_duplicate_recipes: bool,
  pub dotenv_load: bool,
  pub dotenv_filename: Option<String>,
  pub dotenv_path: Option<String>,
  pub fallback: bool,
  pub ignore_comments: bool,
  pub shell: Option<Vec<String>>,
  pub tempdir: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDef {
  pub name: String,
  pub value: Expression,
  pub exported: bool,
  pub line: usize,
}

/// A recipe plus everything the code generator needs to know about it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeModel {
  pub recipe: Recipe,
  /// Unmangled function base name; platform variants get a suffix.
  pub function_name: String,
  pub platforms: Vec<String>,
  pub private: bool,
  pub no_cd: bool,
  pub no_exit_message: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Model {
  pub settings: Settings,
  pub variables: Vec<VariableDef>,
  pub recipes: Vec<RecipeModel>,
  pub aliases: Vec<Alias>,
  /// Alias name → recipe name after resolving chains.
  pub alias_targets: BTreeMap<String, String>,
  /// Aliases grouped by their resolved target.
  pub aliases_by_target: BTreeMap<String, Vec<String>>,
  pub docstrings: BTreeMap<String, String>,
  pub private: BTreeSet<String>,
  /// Unique recipe names in declaration order, private included.
  pub recipe_names: Vec<String>,
  /// Unique public recipe names in declaration order.
  pub public_recipes: Vec<String>,
  /// Dispatchable names: every recipe followed by its aliases.
  pub unique_targets: Vec<String>,
  /// Public recipes and aliases, alphabetized, for `--list`.
  pub sorted_public_targets: Vec<String>,
  /// Last-seen parameter list per recipe name, for listings and usage text.
  pub parameters_by_name: BTreeMap<String, (Vec<Parameter>, Option<Variadic>)>,
  /// Builtin functions referenced anywhere in the file.
  pub used_functions: BTreeSet<String>,
  /// The justfile text, replayed by `--dump`.
  pub source: String,
}

#[derive(Default)]
pub struct AnalyzePhase;

impl AnalyzePhase {
  pub fn new() -> Self {
    Self
  }

  pub fn analyze(&self, justfile: Justfile, source: &str) -> Result<Model, CompileError> {
    let mut model = Model {
      source: source.to_string(),
      ..Model::default()
    };

    self.process_settings(&justfile, &mut model)?;
    self.process_variables(&justfile, &mut model)?;
    self.process_recipes(&justfile, &mut model)?;
    self.process_aliases(&justfile, &mut model)?;
    self.resolve_dependencies(&mut model)?;
    self.detect_dependency_cycles(&model)?;
    self.process_docstrings(&justfile, &mut model);
    self.process_used_functions(&mut model)?;
    self.process_target_lists(&mut model);
    Ok(model)
  }

  fn process_settings(&self, justfile: &Justfile, model: &mut Model) -> Result<(), CompileError> {
    const KNOWN: [&str; 12] = [
      "export",
      "positional-arguments",
      "allow-duplicate-recipes",
      "dotenv-load",
      "dotenv-filename",
      "dotenv-path",
      "fallback",
      "ignore-comments",
      "shell",
      "tempdir",
      "windows-powershell",
      "windows-shell",
    ];
    let mut seen: HashSet<String> = HashSet::new();
    for item in &justfile.items {
      let setting = match item {
        Item::Setting(setting) => setting,
        _ => continue,
      };
      let name = setting.name.as_str();
      if !KNOWN.contains(&name) {
        return Err(CompileError::UnknownSetting {
          name: name.to_string(),
          line: setting.line,
          column: setting.column,
        });
      }
      if !seen.insert(name.to_string()) {
        return Err(CompileError::DuplicateName {
          what: "setting",
          name: name.to_string(),
          line: setting.line,
          column: setting.column,
        });
      }

      let bad_value = || CompileError::Parse {
        line: setting.line,
        column: setting.column,
        message: format!("invalid value for setting `{}`", name),
        snippet: String::new(),
      };
      match (name, &setting.value) {
        ("export", SettingValue::Bool(b)) => model.settings.export = *b,
        ("positional-arguments", SettingValue::Bool(b)) => {
          model.settings.positional_arguments = *b
        }
        ("allow-duplicate-recipes", SettingValue::Bool(b)) => {
          model.settings.allow_duplicate_recipes = *b
        }
        ("dotenv-load", SettingValue::Bool(b)) => model.settings.dotenv_load = *b,
        ("fallback", SettingValue::Bool(b)) => model.settings.fallback = *b,
        ("ignore-comments", SettingValue::Bool(b)) => model.settings.ignore_comments = *b,
        ("dotenv-filename", SettingValue::Str(s)) => {
          model.settings.dotenv_filename = Some(s.clone())
        }
        ("dotenv-path", SettingValue::Str(s)) => model.settings.dotenv_path = Some(s.clone()),
        ("tempdir", SettingValue::Str(s)) => model.settings.tempdir = Some(s.clone()),
        ("shell", SettingValue::List(items)) => {
          if items.len() < 2 {
            return Err(CompileError::Parse {
              line: setting.line,
              column: setting.column,
              message: "`shell` setting must have at least two elements".to_string(),
              snippet: String::new(),
            });
          }
          model.settings.shell = Some(items.clone());
        }
        ("windows-powershell", SettingValue::Bool(true)) | ("windows-shell", _) => {
          return Err(CompileError::UnimplementedFeature {
            feature: format!("setting `{}`", name),
            line: setting.line,
            column: setting.column,
          });
        }
        ("windows-powershell", SettingValue::Bool(false)) => {}
        _ => return Err(bad_value()),
      }
    }
    Ok(())
  }

  fn process_variables(&self, justfile: &Justfile, model: &mut Model) -> Result<(), CompileError> {
    let mut mangled: HashMap<String, String> = HashMap::new();
    for item in &justfile.items {
      let assignment = match item {
        Item::Assignment(assignment) => assignment,
        _ => continue,
      };
      let shell_name = mangle(&assignment.name);
      if let Some(existing) = mangled.insert(shell_name, assignment.name.clone()) {
        let what = if existing == assignment.name {
          "variable"
        } else {
          "variable (names collide after `-` is mapped to `_`)"
        };
        return Err(CompileError::DuplicateName {
          what,
          name: assignment.name.clone(),
          line: assignment.line,
          column: assignment.column,
        });
      }
      model.variables.push(VariableDef {
        name: assignment.name.clone(),
        value: assignment.value.clone(),
        exported: assignment.exported || model.settings.export,
        line: assignment.line,
      });
    }
    Ok(())
  }

  fn validate_attributes(&self, attributes: &[Attribute]) -> Result<(), CompileError> {
    for attribute in attributes {
      if attribute.name == "confirm" {
        return Err(CompileError::UnimplementedFeature {
          feature: "attribute `confirm`".to_string(),
          line: attribute.line,
          column: attribute.column,
        });
      }
      if !RECIPE_ATTRIBUTES.contains(&attribute.name.as_str()) {
        return Err(CompileError::UnknownAttribute {
          name: attribute.name.clone(),
          line: attribute.line,
          column: attribute.column,
        });
      }
    }
    Ok(())
  }

  fn validate_parameters(&self, recipe: &Recipe) -> Result<(), CompileError> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut defaulted = false;
    let all: Vec<&Parameter> = recipe
      .parameters
      .iter()
      .chain(recipe.variadic.as_ref().map(|v| &v.param))
      .collect();
    for param in &recipe.parameters {
      if param.default.is_some() {
        defaulted = true;
      } else if defaulted {
        return Err(CompileError::InvalidParameter {
          recipe: recipe.name.clone(),
          message: format!(
            "parameter `{}` without a default follows a parameter with one",
            param.name
          ),
          line: param.line,
          column: param.column,
        });
      }
    }
    for param in &all {
      if !seen.insert(param.name.as_str()) {
        return Err(CompileError::InvalidParameter {
          recipe: recipe.name.clone(),
          message: format!("duplicate parameter `{}`", param.name),
          line: param.line,
          column: param.column,
        });
      }
    }
    if let Some(variadic) = &recipe.variadic {
      if defaulted && variadic.param.default.is_none() {
        return Err(CompileError::InvalidParameter {
          recipe: recipe.name.clone(),
          message: "a variadic parameter following defaulted parameters must have a default"
            .to_string(),
          line: variadic.param.line,
          column: variadic.param.column,
        });
      }
    }
    // Defaults may reference earlier parameters and globals, never later
    // parameters.
    for (index, param) in all.iter().enumerate() {
      let default = match &param.default {
        Some(default) => default,
        None => continue,
      };
      let mut referenced = Vec::new();
      collect_variables(default, &mut referenced);
      for name in referenced {
        if all[index..].iter().any(|later| later.name == name) {
          return Err(CompileError::InvalidParameter {
            recipe: recipe.name.clone(),
            message: format!(
              "default for parameter `{}` references later parameter `{}`",
              param.name, name
            ),
            line: param.line,
            column: param.column,
          });
        }
      }
    }
    Ok(())
  }

  fn process_recipes(&self, justfile: &Justfile, model: &mut Model) -> Result<(), CompileError> {
    // function base name → source name, to reject `-`/`_` collisions
    let mut mangled: HashMap<String, String> = HashMap::new();
    for item in &justfile.items {
      let recipe = match item {
        Item::Recipe(recipe) => recipe,
        _ => continue,
      };
      self.validate_attributes(&recipe.attributes)?;
      self.validate_parameters(recipe)?;

      let platforms: Vec<String> = recipe
        .attributes
        .iter()
        .filter(|a| PLATFORM_ATTRIBUTES.contains(&a.name.as_str()))
        .map(|a| a.name.clone())
        .collect();
      let private = recipe.name.starts_with('_')
        || recipe.attributes.iter().any(|a| a.name == "private");
      let function_name = if platforms.is_empty() {
        recipe.name.clone()
      } else {
        format!("{}_{}", recipe.name, platforms.join("_"))
      };

      let duplicate = model
        .recipes
        .iter()
        .position(|existing| existing.function_name == function_name);
      let colliding = model.recipes.iter().any(|existing| {
        existing.recipe.name == recipe.name
          && (existing.platforms.is_empty() || platforms.is_empty())
          && existing.function_name != function_name
      });
      if (duplicate.is_some() || colliding) && !model.settings.allow_duplicate_recipes {
        return Err(CompileError::DuplicateName {
          what: "recipe",
          name: recipe.name.clone(),
          line: recipe.line,
          column: 1,
        });
      }

      let shell_name = mangle(&function_name);
      if let Some(existing) = mangled.get(&shell_name) {
        if existing != &function_name {
          return Err(CompileError::DuplicateName {
            what: "recipe (names collide after `-` is mapped to `_`)",
            name: recipe.name.clone(),
            line: recipe.line,
            column: 1,
          });
        }
      }
      mangled.insert(shell_name, function_name.clone());

      let entry = RecipeModel {
        recipe: recipe.clone(),
        function_name,
        platforms,
        private,
        no_cd: recipe.attributes.iter().any(|a| a.name == "no-cd"),
        no_exit_message: recipe.attributes.iter().any(|a| a.name == "no-exit-message"),
      };
      match duplicate {
        // allow-duplicate-recipes: the later definition wins in place
        Some(index) => model.recipes[index] = entry,
        None => model.recipes.push(entry),
      }

      let params = (recipe.parameters.clone(), recipe.variadic.clone());
      if let Some(previous) = model.parameters_by_name.get(&recipe.name) {
        if previous != &params {
          warn!(
            recipe = recipe.name.as_str(),
            "recipe has platform variants with different parameters; listings use the last one"
          );
        }
      }
      model.parameters_by_name.insert(recipe.name.clone(), params);

      if private {
        model.private.insert(recipe.name.clone());
      }
      if !model.recipe_names.contains(&recipe.name) {
        model.recipe_names.push(recipe.name.clone());
        if !private {
          model.public_recipes.push(recipe.name.clone());
        }
      }
    }
    Ok(())
  }

  fn process_aliases(&self, justfile: &Justfile, model: &mut Model) -> Result<(), CompileError> {
    for item in &justfile.items {
      let alias = match item {
        Item::Alias(alias) => alias,
        _ => continue,
      };
      for attribute in &alias.attributes {
        if attribute.name != "private" {
          return Err(CompileError::UnknownAttribute {
            name: attribute.name.clone(),
            line: attribute.line,
            column: attribute.column,
          });
        }
      }
      if model.recipe_names.contains(&alias.name)
        || model.aliases.iter().any(|a| a.name == alias.name)
      {
        return Err(CompileError::DuplicateName {
          what: "alias",
          name: alias.name.clone(),
          line: alias.line,
          column: alias.column,
        });
      }
      if alias.name.starts_with('_') || alias.attributes.iter().any(|a| a.name == "private") {
        model.private.insert(alias.name.clone());
      }
      model.aliases.push(alias.clone());
    }

    // Resolve alias chains to recipes, rejecting cycles and dangling targets.
    let by_name: HashMap<&str, &Alias> =
      model.aliases.iter().map(|a| (a.name.as_str(), a)).collect();
    let mut targets = BTreeMap::new();
    let mut by_target: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for alias in &model.aliases {
      let mut visited: HashSet<&str> = HashSet::new();
      visited.insert(alias.name.as_str());
      let mut current = alias.target.as_str();
      loop {
        if model.recipe_names.iter().any(|n| n == current) {
          break;
        }
        if !visited.insert(current) {
          return Err(CompileError::Cycle {
            kind: CycleKind::Alias,
            name: alias.name.clone(),
            line: alias.line,
            column: alias.column,
          });
        }
        match by_name.get(current) {
          Some(next) => current = next.target.as_str(),
          None => {
            return Err(CompileError::UnknownRecipe {
              name: current.to_string(),
              line: alias.line,
              column: alias.column,
            })
          }
        }
      }
      targets.insert(alias.name.clone(), current.to_string());
      by_target
        .entry(current.to_string())
        .or_default()
        .push(alias.name.clone());
    }
    model.alias_targets = targets;
    model.aliases_by_target = by_target;
    Ok(())
  }

  fn resolve_dependencies(&self, model: &mut Model) -> Result<(), CompileError> {
    let recipe_names: HashSet<String> = model.recipe_names.iter().cloned().collect();
    let alias_targets = model.alias_targets.clone();
    let parameters = model.parameters_by_name.clone();
    for entry in &mut model.recipes {
      let recipe_name = entry.recipe.name.clone();
      for dependency in entry
        .recipe
        .dependencies
        .iter_mut()
        .chain(entry.recipe.after_dependencies.iter_mut())
      {
        if !recipe_names.contains(&dependency.name) {
          match alias_targets.get(&dependency.name) {
            Some(resolved) => dependency.name = resolved.clone(),
            None => {
              return Err(CompileError::UnknownRecipe {
                name: dependency.name.clone(),
                line: dependency.line,
                column: dependency.column,
              })
            }
          }
        }
        if let Some((params, variadic)) = parameters.get(&dependency.name) {
          let required = params.iter().filter(|p| p.default.is_none()).count();
          let maximum = if variadic.is_some() {
            usize::MAX
          } else {
            params.len()
          };
          if dependency.arguments.len() < required || dependency.arguments.len() > maximum {
            return Err(CompileError::InvalidParameter {
              recipe: recipe_name.clone(),
              message: format!(
                "dependency `{}` got {} arguments but takes {}",
                dependency.name,
                dependency.arguments.len(),
                required
              ),
              line: dependency.line,
              column: dependency.column,
            });
          }
        }
      }
    }
    Ok(())
  }

  fn detect_dependency_cycles(&self, model: &Model) -> Result<(), CompileError> {
    let mut edges: BTreeMap<&str, Vec<&Dependency>> = BTreeMap::new();
    for entry in &model.recipes {
      edges.entry(entry.recipe.name.as_str()).or_default().extend(
        entry
          .recipe
          .dependencies
          .iter()
          .chain(entry.recipe.after_dependencies.iter()),
      );
    }

    fn visit<'a>(
      name: &'a str,
      edges: &BTreeMap<&'a str, Vec<&'a Dependency>>,
      done: &mut HashSet<&'a str>,
      stack: &mut Vec<&'a str>,
    ) -> Option<(String, usize, usize)> {
      if done.contains(name) {
        return None;
      }
      stack.push(name);
      for dependency in edges.get(name).into_iter().flatten() {
        if stack.contains(&dependency.name.as_str()) {
          return Some((dependency.name.clone(), dependency.line, dependency.column));
        }
        if let Some(cycle) = visit(dependency.name.as_str(), edges, done, stack) {
          return Some(cycle);
        }
      }
      stack.pop();
      done.insert(name);
      None
    }

    let mut done = HashSet::new();
    for entry in &model.recipes {
      let mut stack = Vec::new();
      if let Some((name, line, column)) =
        visit(entry.recipe.name.as_str(), &edges, &mut done, &mut stack)
      {
        return Err(CompileError::Cycle {
          kind: CycleKind::Dependency,
          name,
          line,
          column,
        });
      }
    }
    Ok(())
  }

  fn process_docstrings(&self, justfile: &Justfile, model: &mut Model) {
    for (index, item) in justfile.items.iter().enumerate() {
      match item {
        Item::Recipe(recipe) => {
          if model.private.contains(&recipe.name) || index == 0 {
            continue;
          }
          let first_line = recipe
            .attributes
            .first()
            .map(|a| a.line)
            .unwrap_or(recipe.line);
          if let Item::Comment(comment) = &justfile.items[index - 1] {
            if comment.line + 1 == first_line {
              model
                .docstrings
                .insert(recipe.name.clone(), comment.text.clone());
            }
          }
        }
        Item::Alias(alias) => {
          model
            .docstrings
            .insert(alias.name.clone(), format!("alias for `{}`", alias.target));
        }
        _ => {}
      }
    }
  }

  fn process_used_functions(&self, model: &mut Model) -> Result<(), CompileError> {
    let mut used = BTreeSet::new();

    for entry in &model.recipes {
      for platform in &entry.platforms {
        if platform == "unix" {
          used.insert("os_family".to_string());
        } else {
          used.insert("os".to_string());
        }
      }
    }

    for variable in &model.variables {
      walk_expression(&variable.value, &mut used)?;
    }
    for entry in &model.recipes {
      for param in entry
        .recipe
        .parameters
        .iter()
        .chain(entry.recipe.variadic.as_ref().map(|v| &v.param))
      {
        if let Some(default) = &param.default {
          walk_expression(default, &mut used)?;
        }
      }
      for dependency in entry
        .recipe
        .dependencies
        .iter()
        .chain(entry.recipe.after_dependencies.iter())
      {
        for argument in &dependency.arguments {
          walk_expression(argument, &mut used)?;
        }
      }
      for line in &entry.recipe.body {
        for fragment in &line.fragments {
          if let Fragment::Interpolation(expression) = fragment {
            walk_expression(expression, &mut used)?;
          }
        }
      }
    }

    model.used_functions = used;
    Ok(())
  }

  fn process_target_lists(&self, model: &mut Model) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut unique_targets = Vec::new();
    for name in &model.recipe_names {
      if !seen.insert(name.clone()) {
        continue;
      }
      unique_targets.push(name.clone());
      if let Some(aliases) = model.aliases_by_target.get(name) {
        let mut sorted = aliases.clone();
        sorted.sort();
        for alias in sorted {
          if seen.insert(alias.clone()) {
            unique_targets.push(alias);
          }
        }
      }
    }
    model.unique_targets = unique_targets;

    let mut seen: HashSet<String> = HashSet::new();
    let mut sorted_targets = Vec::new();
    let mut sorted_names = model.recipe_names.clone();
    sorted_names.sort();
    for name in sorted_names {
      if !seen.insert(name.clone()) {
        continue;
      }
      if !model.private.contains(&name) {
        sorted_targets.push(name.clone());
      }
      if let Some(aliases) = model.aliases_by_target.get(&name) {
        let mut sorted = aliases.clone();
        sorted.sort();
        for alias in sorted {
          if !model.private.contains(&alias) && seen.insert(alias.clone()) {
            sorted_targets.push(alias);
          }
        }
      }
    }
    model.sorted_public_targets = sorted_targets;
  }
}

/// Collects the names of all variable references in an expression.
fn collect_variables(expression: &Expression, out: &mut Vec<String>) {
  match expression {
    Expression::Literal(_) | Expression::Backtick { .. } => {}
    Expression::Variable { name, .. } => out.push(name.clone()),
    Expression::Concat(left, right) | Expression::Join(left, right) => {
      collect_variables(left, out);
      collect_variables(right, out);
    }
    Expression::Conditional { lhs, rhs, then_value, else_value, .. } => {
      collect_variables(lhs, out);
      collect_variables(rhs, out);
      collect_variables(then_value, out);
      collect_variables(else_value, out);
    }
    Expression::Call { arguments, .. } => {
      for argument in arguments {
        collect_variables(argument, out);
      }
    }
  }
}

/// Collects builtin function names, rejecting calls that are not in the
/// supported table.
fn walk_expression(
  expression: &Expression,
  used: &mut BTreeSet<String>,
) -> Result<(), CompileError> {
  match expression {
    Expression::Literal(_) | Expression::Variable { .. } | Expression::Backtick { .. } => Ok(()),
    Expression::Concat(left, right) | Expression::Join(left, right) => {
      walk_expression(left, used)?;
      walk_expression(right, used)
    }
    Expression::Conditional { lhs, rhs, then_value, else_value, .. } => {
      walk_expression(lhs, used)?;
      walk_expression(rhs, used)?;
      walk_expression(then_value, used)?;
      walk_expression(else_value, used)
    }
    Expression::Call { name, arguments, line, column } => {
      if !runtime::is_builtin(name) {
        return Err(CompileError::UnimplementedFunction {
          name: name.clone(),
          line: *line,
          column: *column,
        });
      }
      used.insert(name.clone());
      for argument in arguments {
        walk_expression(argument, used)?;
      }
      Ok(())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::phases::parse::ParsePhase;
  use crate::phases::tokenize::TokenizePhase;

  fn analyze(content: &str) -> Result<Model, CompileError> {
    let tokens = TokenizePhase::new().tokenize(content)?;
    let justfile = ParsePhase::new().parse(tokens)?;
    AnalyzePhase::new().analyze(justfile, content)
  }

  #[test]
  fn test_variables_in_order() {
    let model = analyze("x := \"1\"\ny := x + \"2\"\n").unwrap();
    assert_eq!(model.variables.len(), 2);
    assert_eq!(model.variables[0].name, "x");
    assert_eq!(model.variables[1].name, "y");
  }

  #[test]
  fn test_duplicate_variable_is_error() {
    let result = analyze("x := \"1\"\nx := \"2\"\n");
    assert!(matches!(
      result,
      Err(CompileError::DuplicateName { what: "variable", .. })
    ));
  }

  #[test]
  fn test_mangle_collision_is_error() {
    let result = analyze("a-b := \"1\"\na_b := \"2\"\n");
    assert!(matches!(result, Err(CompileError::DuplicateName { .. })));
  }

  #[test]
  fn test_exported_variable() {
    let model = analyze("export FOO := \"bar\"\n").unwrap();
    assert!(model.variables[0].exported);
  }

  #[test]
  fn test_export_setting_exports_everything() {
    let model = analyze("set export\nx := \"1\"\n").unwrap();
    assert!(model.variables[0].exported);
  }

  #[test]
  fn test_duplicate_recipe_is_error() {
    let result = analyze("a:\n    true\na:\n    false\n");
    assert!(matches!(
      result,
      Err(CompileError::DuplicateName { what: "recipe", .. })
    ));
  }

  #[test]
  fn test_allow_duplicate_recipes_last_wins() {
    let model =
      analyze("set allow-duplicate-recipes\na:\n    echo one\na:\n    echo two\n").unwrap();
    assert_eq!(model.recipes.len(), 1);
    assert_eq!(model.recipe_names, vec!["a"]);
    let body = &model.recipes[0].recipe.body;
    assert_eq!(body.len(), 1);
  }

  #[test]
  fn test_platform_variants_coexist() {
    let model = analyze("[linux]\nb:\n    echo l\n[macos]\nb:\n    echo m\n").unwrap();
    assert_eq!(model.recipes.len(), 2);
    assert_eq!(model.recipes[0].function_name, "b_linux");
    assert_eq!(model.recipes[1].function_name, "b_macos");
    assert_eq!(model.recipe_names, vec!["b"]);
    assert!(model.used_functions.contains("os"));
  }

  #[test]
  fn test_unknown_setting_is_error() {
    let result = analyze("set frobnicate\n");
    assert!(matches!(result, Err(CompileError::UnknownSetting { .. })));
  }

  #[test]
  fn test_duplicate_setting_is_error() {
    let result = analyze("set dotenv-load\nset dotenv-load\n");
    assert!(matches!(result, Err(CompileError::DuplicateName { .. })));
  }

  #[test]
  fn test_windows_shell_is_unimplemented() {
    let result = analyze("set windows-shell := [\"pwsh\", \"-c\"]\n");
    assert!(matches!(result, Err(CompileError::UnimplementedFeature { .. })));
  }

  #[test]
  fn test_short_shell_list_is_error() {
    let result = analyze("set shell := [\"sh\"]\n");
    assert!(matches!(result, Err(CompileError::Parse { .. })));
  }

  #[test]
  fn test_unknown_attribute_is_error() {
    let result = analyze("[frobnicate]\na:\n    true\n");
    assert!(matches!(result, Err(CompileError::UnknownAttribute { .. })));
  }

  #[test]
  fn test_confirm_attribute_is_unimplemented() {
    let result = analyze("[confirm]\na:\n    true\n");
    assert!(matches!(result, Err(CompileError::UnimplementedFeature { .. })));
  }

  #[test]
  fn test_unknown_dependency_is_error() {
    let result = analyze("a: missing\n    true\n");
    assert!(matches!(result, Err(CompileError::UnknownRecipe { name, .. }) if name == "missing"));
  }

  #[test]
  fn test_dependency_cycle_is_error() {
    let result = analyze("a: b\n    true\nb: a\n    true\n");
    assert!(matches!(
      result,
      Err(CompileError::Cycle { kind: CycleKind::Dependency, .. })
    ));
  }

  #[test]
  fn test_self_dependency_is_cycle() {
    let result = analyze("a: a\n    true\n");
    assert!(matches!(result, Err(CompileError::Cycle { .. })));
  }

  #[test]
  fn test_alias_resolution() {
    let model = analyze("alias t := test\ntest:\n    echo ok\n").unwrap();
    assert_eq!(model.alias_targets.get("t"), Some(&"test".to_string()));
    assert_eq!(model.unique_targets, vec!["test", "t"]);
  }

  #[test]
  fn test_alias_chain_resolution() {
    let model = analyze("alias a := b\nalias b := c\nc:\n    true\n").unwrap();
    assert_eq!(model.alias_targets.get("a"), Some(&"c".to_string()));
  }

  #[test]
  fn test_alias_cycle_is_error() {
    let result = analyze("alias a := b\nalias b := a\nc:\n    true\n");
    assert!(matches!(
      result,
      Err(CompileError::Cycle { kind: CycleKind::Alias, .. })
    ));
  }

  #[test]
  fn test_alias_to_missing_recipe_is_error() {
    let result = analyze("alias t := missing\na:\n    true\n");
    assert!(matches!(result, Err(CompileError::UnknownRecipe { .. })));
  }

  #[test]
  fn test_docstring_attachment() {
    let model = analyze("# builds the thing\nbuild:\n    make\n").unwrap();
    assert_eq!(
      model.docstrings.get("build"),
      Some(&"builds the thing".to_string())
    );
  }

  #[test]
  fn test_docstring_not_attached_across_blank_line() {
    let model = analyze("# stray comment\n\nbuild:\n    make\n").unwrap();
    assert_eq!(model.docstrings.get("build"), None);
  }

  #[test]
  fn test_docstring_skips_attribute_lines() {
    let model = analyze("# docs\n[no-cd]\nbuild:\n    make\n").unwrap();
    assert_eq!(model.docstrings.get("build"), Some(&"docs".to_string()));
  }

  #[test]
  fn test_private_recipes() {
    let model =
      analyze("_hidden:\n    true\n[private]\nsecret:\n    true\nshown:\n    true\n").unwrap();
    assert!(model.private.contains("_hidden"));
    assert!(model.private.contains("secret"));
    assert_eq!(model.public_recipes, vec!["shown"]);
    assert_eq!(model.sorted_public_targets, vec!["shown"]);
  }

  #[test]
  fn test_unknown_function_is_error() {
    let result = analyze("x := datetime(\"%F\")\n");
    assert!(matches!(
      result,
      Err(CompileError::UnimplementedFunction { name, .. }) if name == "datetime"
    ));
  }

  #[test]
  fn test_used_functions_collected() {
    let model = analyze("x := os()\ny := join(\"a\", \"b\")\n").unwrap();
    assert!(model.used_functions.contains("os"));
    assert!(model.used_functions.contains("join"));
  }

  #[test]
  fn test_dependency_argument_count_checked() {
    let result = analyze("a x y:\n    true\nb: (a \"1\")\n    true\n");
    assert!(matches!(result, Err(CompileError::InvalidParameter { .. })));
  }

  #[test]
  fn test_required_after_default_is_error() {
    let result = analyze("a x=\"1\" y:\n    true\n");
    assert!(matches!(result, Err(CompileError::InvalidParameter { .. })));
  }

  #[test]
  fn test_default_referencing_earlier_parameter_is_ok() {
    let model = analyze("a x=\"1\" y=x:\n    true\n").unwrap();
    assert_eq!(model.recipes[0].recipe.parameters.len(), 2);
  }

  #[test]
  fn test_default_referencing_later_parameter_is_error() {
    let result = analyze("a x=y y=\"1\":\n    true\n");
    assert!(matches!(result, Err(CompileError::InvalidParameter { .. })));
  }

  #[test]
  fn test_sorted_targets_for_list() {
    let model = analyze("zeta:\n    true\nalpha:\n    true\n").unwrap();
    assert_eq!(model.sorted_public_targets, vec!["alpha", "zeta"]);
    assert_eq!(model.unique_targets, vec!["zeta", "alpha"]);
  }
}
