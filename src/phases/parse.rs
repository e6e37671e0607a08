use crate::error::CompileError;
use crate::phases::tokenize::{split_name, AttributeEntry, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOperator {
  Equal,
  NotEqual,
  Matches,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
  Literal(String),
  Variable {
    name: String,
    line: usize,
    column: usize,
  },
  Concat(Box<Expression>, Box<Expression>),
  Join(Box<Expression>, Box<Expression>),
  Backtick {
    command: String,
    line: usize,
  },
  Conditional {
    lhs: Box<Expression>,
    rhs: Box<Expression>,
    operator: ConditionOperator,
    then_value: Box<Expression>,
    else_value: Box<Expression>,
  },
  Call {
    name: String,
    arguments: Vec<Expression>,
    line: usize,
    column: usize,
  },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
  Text(String),
  Interpolation(Expression),
}

/// One line of a recipe body.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
  pub silent: bool,
  pub ignore_errors: bool,
  pub fragments: Vec<Fragment>,
  pub line: usize,
}

impl Line {
  /// True when the line begins a shebang body (`#!...`).
  pub fn is_shebang(&self) -> bool {
    matches!(self.fragments.first(), Some(Fragment::Text(t)) if t.starts_with("#!"))
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
  pub name: String,
  pub export: bool,
  pub default: Option<Expression>,
  pub line: usize,
  pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariadicKind {
  /// `*param` — zero or more.
  Star,
  /// `+param` — one or more.
  Plus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variadic {
  pub kind: VariadicKind,
  pub param: Parameter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
  pub name: String,
  pub arguments: Vec<Expression>,
  pub line: usize,
  pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
  pub name: String,
  pub argument: Option<String>,
  pub line: usize,
  pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
  pub name: String,
  /// Recipe-level `@` — inverts echo for every body line.
  pub quiet: bool,
  pub parameters: Vec<Parameter>,
  pub variadic: Option<Variadic>,
  pub dependencies: Vec<Dependency>,
  pub after_dependencies: Vec<Dependency>,
  pub body: Vec<Line>,
  pub attributes: Vec<Attribute>,
  pub line: usize,
  /// Normalized source text, used by the emitted `--show`.
  pub source: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
  pub name: String,
  pub value: Expression,
  pub exported: bool,
  pub line: usize,
  pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
  pub name: String,
  pub target: String,
  pub attributes: Vec<Attribute>,
  pub line: usize,
  pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
  Bool(bool),
  Str(String),
  List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Setting {
  pub name: String,
  pub value: SettingValue,
  pub line: usize,
  pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
  pub text: String,
  pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
  Assignment(Assignment),
  Alias(Alias),
  Setting(Setting),
  Comment(Comment),
  Recipe(Recipe),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Justfile {
  pub items: Vec<Item>,
}

#[derive(Default)]
pub struct ParsePhase;

impl ParsePhase {
  pub fn new() -> Self {
    Self
  }

  pub fn parse(&self, tokens: Vec<Token>) -> Result<Justfile, CompileError> {
    let mut items = Vec::new();
    let mut pending_attributes: Vec<Attribute> = Vec::new();
    let mut iter = tokens.into_iter().peekable();

    while let Some(token) = iter.next() {
      match token {
        Token::Comment { text, line } => {
          self.reject_dangling_attributes(&pending_attributes)?;
          items.push(Item::Comment(Comment { text, line }));
        }
        Token::Attributes { entries, .. } => {
          for entry in entries {
            let AttributeEntry { name, argument, line, column } = entry;
            pending_attributes.push(Attribute { name, argument, line, column });
          }
        }
        Token::Setting { name, raw_value, line, column } => {
          self.reject_dangling_attributes(&pending_attributes)?;
          let value = parse_setting_value(&name, raw_value.as_deref(), line, column)?;
          items.push(Item::Setting(Setting { name, value, line, column }));
        }
        Token::Alias { name, target, line, column } => {
          items.push(Item::Alias(Alias {
            name,
            target,
            attributes: std::mem::take(&mut pending_attributes),
            line,
            column,
          }));
        }
        Token::Assignment { name, exported, raw_expr, line, column } => {
          self.reject_dangling_attributes(&pending_attributes)?;
          let value = parse_expression_str(&raw_expr, line, column)?;
          items.push(Item::Assignment(Assignment { name, value, exported, line, column }));
        }
        Token::RecipeHeader { raw, line } => {
          let mut recipe = parse_recipe_header(&raw, line)?;
          recipe.attributes = std::mem::take(&mut pending_attributes);
          while let Some(Token::BodyLine { .. }) = iter.peek() {
            if let Some(Token::BodyLine { text, line }) = iter.next() {
              recipe.body.push(parse_body_line(&text, line)?);
            }
          }
          recipe.source = render_recipe_source(&recipe, &raw);
          items.push(Item::Recipe(recipe));
        }
        Token::BodyLine { line, text } => {
          return Err(CompileError::Parse {
            line,
            column: 1,
            message: "recipe body line outside of a recipe".to_string(),
            snippet: text,
          });
        }
      }
    }

    self.reject_dangling_attributes(&pending_attributes)?;
    Ok(Justfile { items })
  }

  fn reject_dangling_attributes(&self, pending: &[Attribute]) -> Result<(), CompileError> {
    if let Some(attr) = pending.first() {
      return Err(CompileError::Parse {
        line: attr.line,
        column: attr.column,
        message: "attributes must immediately precede a recipe or alias".to_string(),
        snippet: format!("[{}]", attr.name),
      });
    }
    Ok(())
  }
}

/// Normalized recipe text for the emitted `--show`: attributes, the header as
/// written, and the body re-indented with four spaces.
fn render_recipe_source(recipe: &Recipe, header: &str) -> String {
  let mut out = String::new();
  for attribute in &recipe.attributes {
    match &attribute.argument {
      Some(argument) => out.push_str(&format!("[{}({:?})]\n", attribute.name, argument)),
      None => out.push_str(&format!("[{}]\n", attribute.name)),
    }
  }
  out.push_str(header);
  out.push('\n');
  for line in &recipe.body {
    out.push_str("    ");
    if line.silent {
      out.push('@');
    }
    if line.ignore_errors {
      out.push('-');
    }
    for fragment in &line.fragments {
      match fragment {
        Fragment::Text(text) => out.push_str(text),
        Fragment::Interpolation(expression) => {
          out.push_str("{{ ");
          out.push_str(&expression_to_string(expression, 1));
          out.push_str(" }}");
        }
      }
    }
    out.push('\n');
  }
  out
}

/// Renders an expression back to justfile syntax, used by `--show` and by the
/// parameter listings in `--list` and usage messages.
pub fn expression_to_string(expression: &Expression, depth: usize) -> String {
  match expression {
    Expression::Literal(text) => format!("{:?}", text),
    Expression::Variable { name, .. } => name.clone(),
    Expression::Backtick { command, .. } => format!("`{}`", command),
    Expression::Call { name, arguments, .. } => {
      let rendered: Vec<String> = arguments
        .iter()
        .map(|a| expression_to_string(a, depth + 1))
        .collect();
      format!("{}({})", name, rendered.join(", "))
    }
    other if depth == 0 => format!("({})", expression_to_string(other, depth + 1)),
    Expression::Concat(left, right) => format!(
      "{} + {}",
      expression_to_string(left, depth + 1),
      expression_to_string(right, depth + 1)
    ),
    Expression::Join(left, right) => format!(
      "{} / {}",
      expression_to_string(left, depth + 1),
      expression_to_string(right, depth + 1)
    ),
    Expression::Conditional { lhs, rhs, operator, then_value, else_value } => {
      let op = match operator {
        ConditionOperator::Equal => "==",
        ConditionOperator::NotEqual => "!=",
        ConditionOperator::Matches => "=~",
      };
      format!(
        "if {} {} {} {{ {} }} else {{ {} }}",
        expression_to_string(lhs, depth + 1),
        op,
        expression_to_string(rhs, depth + 1),
        expression_to_string(then_value, depth + 1),
        expression_to_string(else_value, depth + 1)
      )
    }
  }
}

fn parse_setting_value(
  name: &str,
  raw: Option<&str>,
  line: usize,
  column: usize,
) -> Result<SettingValue, CompileError> {
  let raw = match raw {
    None => return Ok(SettingValue::Bool(true)),
    Some(raw) => raw,
  };
  if raw == "true" {
    return Ok(SettingValue::Bool(true));
  }
  if raw == "false" {
    return Ok(SettingValue::Bool(false));
  }
  let mut parser = ExprParser::new(raw, line, column);
  if raw.starts_with('[') {
    let items = parser.parse_string_list()?;
    parser.finish()?;
    return Ok(SettingValue::List(items));
  }
  if raw.starts_with('\'') || raw.starts_with('"') {
    let value = parser.parse_string()?;
    parser.finish()?;
    return Ok(SettingValue::Str(value));
  }
  Err(CompileError::Parse {
    line,
    column,
    message: format!("malformed value for setting `{}`", name),
    snippet: raw.to_string(),
  })
}

fn parse_recipe_header(raw: &str, line: usize) -> Result<Recipe, CompileError> {
  let mut parser = ExprParser::new(raw, line, 1);
  parser.skip_spaces();
  let quiet = parser.eat_char('@');
  parser.skip_spaces();
  let (name, ..) = parser.parse_name("recipe name")?;

  let mut parameters = Vec::new();
  let mut variadic = None;
  loop {
    parser.skip_spaces();
    if parser.at_end() {
      return Err(parser.error("expected `:` in recipe header"));
    }
    if parser.eat_char(':') {
      break;
    }
    if variadic.is_some() {
      return Err(CompileError::InvalidParameter {
        recipe: name.clone(),
        message: "a variadic parameter must be the last parameter".to_string(),
        line: parser.line,
        column: parser.column,
      });
    }
    let kind = if parser.eat_char('*') {
      Some(VariadicKind::Star)
    } else if parser.eat_char('+') {
      Some(VariadicKind::Plus)
    } else {
      None
    };
    let param = parse_parameter(&mut parser)?;
    match kind {
      Some(kind) => variadic = Some(Variadic { kind, param }),
      None => parameters.push(param),
    }
  }

  let mut dependencies = Vec::new();
  let mut after_dependencies = Vec::new();
  let mut after = false;
  loop {
    parser.skip_spaces();
    if parser.at_end() {
      break;
    }
    if parser.eat_str("&&") {
      if after {
        return Err(parser.error("unexpected second `&&` in dependency list"));
      }
      after = true;
      continue;
    }
    let dependency = parse_dependency(&mut parser)?;
    if after {
      after_dependencies.push(dependency);
    } else {
      dependencies.push(dependency);
    }
  }
  if after && after_dependencies.is_empty() {
    return Err(parser.error("expected dependency after `&&`"));
  }

  Ok(Recipe {
    name,
    quiet,
    parameters,
    variadic,
    dependencies,
    after_dependencies,
    body: Vec::new(),
    attributes: Vec::new(),
    line,
    source: String::new(),
  })
}

fn parse_parameter(parser: &mut ExprParser) -> Result<Parameter, CompileError> {
  let export = parser.eat_char('$');
  let (name, line, column) = parser.parse_name("parameter name")?;
  parser.skip_spaces();
  let default = if parser.eat_char('=') {
    parser.skip_spaces();
    Some(parser.parse_value()?)
  } else {
    None
  };
  Ok(Parameter { name, export, default, line, column })
}

fn parse_dependency(parser: &mut ExprParser) -> Result<Dependency, CompileError> {
  if parser.eat_char('(') {
    parser.skip_whitespace();
    let (name, line, column) = parser.parse_name("dependency name")?;
    let mut arguments = Vec::new();
    loop {
      parser.skip_whitespace();
      if parser.eat_char(')') {
        break;
      }
      if parser.at_end() {
        return Err(parser.error("expected `)` to close dependency"));
      }
      arguments.push(parser.parse_expression()?);
    }
    Ok(Dependency { name, arguments, line, column })
  } else {
    let (name, line, column) = parser.parse_name("dependency name")?;
    Ok(Dependency { name, arguments: Vec::new(), line, column })
  }
}

/// Parses one body line into its prefix and fragments. `{{{{` escapes to a
/// literal `{{`.
fn parse_body_line(text: &str, line_no: usize) -> Result<Line, CompileError> {
  let mut silent = false;
  let mut ignore_errors = false;
  let mut rest = text;
  loop {
    if !silent && rest.starts_with('@') {
      silent = true;
      rest = &rest[1..];
    } else if !ignore_errors && rest.starts_with('-') {
      ignore_errors = true;
      rest = &rest[1..];
    } else {
      break;
    }
  }

  let mut fragments = Vec::new();
  let mut text_acc = String::new();
  let mut pos = 0;
  while pos < rest.len() {
    let tail = &rest[pos..];
    if tail.starts_with("{{{{") {
      text_acc.push_str("{{");
      pos += 4;
      continue;
    }
    if tail.starts_with("{{") {
      if !text_acc.is_empty() {
        fragments.push(Fragment::Text(std::mem::take(&mut text_acc)));
      }
      let mut parser = ExprParser::new(&rest[pos + 2..], line_no, pos + 3);
      parser.skip_whitespace();
      let expression = parser.parse_expression()?;
      parser.skip_whitespace();
      if !parser.eat_str("}}") {
        return Err(CompileError::Parse {
          line: line_no,
          column: pos + 1,
          message: "expected `}}` to close interpolation".to_string(),
          snippet: text.to_string(),
        });
      }
      pos += 2 + parser.pos;
      fragments.push(Fragment::Interpolation(expression));
      continue;
    }
    let c = tail.chars().next().unwrap();
    text_acc.push(c);
    pos += c.len_utf8();
  }
  if !text_acc.is_empty() || fragments.is_empty() {
    fragments.push(Fragment::Text(text_acc));
  }

  Ok(Line { silent, ignore_errors, fragments, line: line_no })
}

/// Parses a complete expression from `text`, requiring full consumption.
pub fn parse_expression_str(
  text: &str,
  line: usize,
  column: usize,
) -> Result<Expression, CompileError> {
  let mut parser = ExprParser::new(text, line, column);
  parser.skip_whitespace();
  let expression = parser.parse_expression()?;
  parser.finish()?;
  Ok(expression)
}

/// Hand-written recursive-descent parser over one expression. Tracks line and
/// column through every advance so errors point into the source.
pub struct ExprParser<'a> {
  src: &'a str,
  pub pos: usize,
  pub line: usize,
  pub column: usize,
}

impl<'a> ExprParser<'a> {
  pub fn new(src: &'a str, line: usize, column: usize) -> Self {
    Self { src, pos: 0, line, column }
  }

  fn rest(&self) -> &'a str {
    &self.src[self.pos..]
  }

  pub fn at_end(&self) -> bool {
    self.pos >= self.src.len()
  }

  fn advance(&mut self, n: usize) {
    for c in self.src[self.pos..self.pos + n].chars() {
      if c == '\n' {
        self.line += 1;
        self.column = 1;
      } else {
        self.column += 1;
      }
    }
    self.pos += n;
  }

  pub fn skip_spaces(&mut self) {
    while self.rest().starts_with([' ', '\t']) {
      self.advance(1);
    }
  }

  pub fn skip_whitespace(&mut self) {
    while self.rest().starts_with([' ', '\t', '\n', '\r']) {
      self.advance(1);
    }
  }

  fn eat_char(&mut self, c: char) -> bool {
    if self.rest().starts_with(c) {
      self.advance(c.len_utf8());
      true
    } else {
      false
    }
  }

  fn eat_str(&mut self, s: &str) -> bool {
    if self.rest().starts_with(s) {
      self.advance(s.len());
      true
    } else {
      false
    }
  }

  fn error(&self, message: &str) -> CompileError {
    CompileError::Parse {
      line: self.line,
      column: self.column,
      message: message.to_string(),
      snippet: self.src.trim_end().to_string(),
    }
  }

  pub fn finish(&mut self) -> Result<(), CompileError> {
    self.skip_whitespace();
    if self.at_end() {
      Ok(())
    } else {
      Err(self.error(&format!("unexpected `{}`", self.rest().trim_end())))
    }
  }

  fn parse_name(&mut self, what: &str) -> Result<(String, usize, usize), CompileError> {
    let (line, column) = (self.line, self.column);
    match split_name(self.rest()) {
      Some((name, _)) => {
        let name = name.to_string();
        self.advance(name.len());
        Ok((name, line, column))
      }
      None => Err(self.error(&format!("expected {}", what))),
    }
  }

  fn peek_keyword(&self, keyword: &str) -> bool {
    let rest = self.rest();
    rest.starts_with(keyword)
      && !rest[keyword.len()..]
        .chars()
        .next()
        .map(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        .unwrap_or(false)
  }

  pub fn parse_expression(&mut self) -> Result<Expression, CompileError> {
    self.skip_whitespace();
    if self.peek_keyword("if") {
      return self.parse_conditional();
    }
    // `/ x` joins onto an empty left side, producing an absolute path.
    if self.rest().starts_with('/') {
      self.advance(1);
      let right = self.parse_expression()?;
      return Ok(Expression::Join(
        Box::new(Expression::Literal(String::new())),
        Box::new(right),
      ));
    }
    let value = self.parse_value()?;
    self.skip_whitespace();
    if self.eat_char('+') {
      let right = self.parse_expression()?;
      Ok(Expression::Concat(Box::new(value), Box::new(right)))
    } else if self.eat_char('/') {
      let right = self.parse_expression()?;
      Ok(Expression::Join(Box::new(value), Box::new(right)))
    } else {
      Ok(value)
    }
  }

  fn parse_conditional(&mut self) -> Result<Expression, CompileError> {
    if !self.eat_str("if") {
      return Err(self.error("expected `if`"));
    }
    self.skip_whitespace();
    let lhs = self.parse_sum()?;
    self.skip_whitespace();
    let operator = if self.eat_str("==") {
      ConditionOperator::Equal
    } else if self.eat_str("!=") {
      ConditionOperator::NotEqual
    } else if self.eat_str("=~") {
      ConditionOperator::Matches
    } else {
      return Err(self.error("expected `==`, `!=`, or `=~`"));
    };
    self.skip_whitespace();
    let rhs = self.parse_sum()?;
    self.skip_whitespace();
    if !self.eat_char('{') {
      return Err(self.error("expected `{` after condition"));
    }
    let then_value = self.parse_expression()?;
    self.skip_whitespace();
    if !self.eat_char('}') {
      return Err(self.error("expected `}`"));
    }
    self.skip_whitespace();
    if !self.eat_str("else") {
      return Err(self.error("expected `else`"));
    }
    self.skip_whitespace();
    let else_value = if self.peek_keyword("if") {
      self.parse_conditional()?
    } else {
      if !self.eat_char('{') {
        return Err(self.error("expected `{` or `if` after `else`"));
      }
      let value = self.parse_expression()?;
      self.skip_whitespace();
      if !self.eat_char('}') {
        return Err(self.error("expected `}`"));
      }
      value
    };
    Ok(Expression::Conditional {
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
      operator,
      then_value: Box::new(then_value),
      else_value: Box::new(else_value),
    })
  }

  /// A sum without the conditional alternative; condition operands stop at
  /// the comparison operator.
  fn parse_sum(&mut self) -> Result<Expression, CompileError> {
    let value = self.parse_value()?;
    self.skip_spaces();
    if self.eat_char('+') {
      let right = self.parse_sum()?;
      Ok(Expression::Concat(Box::new(value), Box::new(right)))
    } else if self.rest().starts_with('/') {
      self.advance(1);
      let right = self.parse_sum()?;
      Ok(Expression::Join(Box::new(value), Box::new(right)))
    } else {
      Ok(value)
    }
  }

  pub fn parse_value(&mut self) -> Result<Expression, CompileError> {
    self.skip_whitespace();
    let rest = self.rest();
    if rest.starts_with('(') {
      self.advance(1);
      let inner = self.parse_expression()?;
      self.skip_whitespace();
      if !self.eat_char(')') {
        return Err(self.error("expected `)`"));
      }
      return Ok(inner);
    }
    if rest.starts_with("```") {
      let line = self.line;
      let command = self.parse_delimited("```")?;
      return Ok(Expression::Backtick { command: dedent(&command), line });
    }
    if rest.starts_with('`') {
      let line = self.line;
      let command = self.parse_delimited("`")?;
      return Ok(Expression::Backtick { command, line });
    }
    if rest.starts_with('\'') || rest.starts_with('"') {
      let value = self.parse_string()?;
      return Ok(Expression::Literal(value));
    }
    let (line, column) = (self.line, self.column);
    if let Some((name, after)) = split_name(rest) {
      let name = name.to_string();
      self.advance(name.len());
      if after.starts_with('(') {
        self.advance(1);
        let mut arguments = Vec::new();
        loop {
          self.skip_whitespace();
          if self.eat_char(')') {
            break;
          }
          if self.at_end() {
            return Err(self.error("expected `)` to close function call"));
          }
          arguments.push(self.parse_expression()?);
          self.skip_whitespace();
          if !self.eat_char(',') && !self.rest().starts_with(')') {
            return Err(self.error("expected `,` or `)` in function call"));
          }
        }
        return Ok(Expression::Call { name, arguments, line, column });
      }
      return Ok(Expression::Variable { name, line, column });
    }
    Err(self.error("expected expression"))
  }

  /// Consumes a construct delimited by `delim` (already at the cursor) and
  /// returns its raw contents.
  fn parse_delimited(&mut self, delim: &str) -> Result<String, CompileError> {
    if !self.eat_str(delim) {
      return Err(self.error(&format!("expected `{}`", delim)));
    }
    let start = self.pos;
    loop {
      if self.at_end() {
        return Err(self.error(&format!("unterminated `{}`", delim)));
      }
      if self.rest().starts_with(delim) {
        let content = self.src[start..self.pos].to_string();
        self.advance(delim.len());
        return Ok(content);
      }
      let width = self.rest().chars().next().unwrap().len_utf8();
      self.advance(width);
    }
  }

  /// Parses any of the four string forms at the cursor.
  pub fn parse_string(&mut self) -> Result<String, CompileError> {
    let rest = self.rest();
    if rest.starts_with("'''") {
      let content = self.parse_delimited("'''")?;
      return Ok(dedent(&content));
    }
    if rest.starts_with('\'') {
      return self.parse_delimited("'");
    }
    if rest.starts_with("\"\"\"") {
      let content = self.parse_cooked("\"\"\"")?;
      return Ok(dedent(&content));
    }
    if rest.starts_with('"') {
      return self.parse_cooked("\"");
    }
    Err(self.error("expected string"))
  }

  /// A double-quoted string with C-style escapes; unknown escapes are kept
  /// verbatim.
  fn parse_cooked(&mut self, delim: &str) -> Result<String, CompileError> {
    if !self.eat_str(delim) {
      return Err(self.error("expected `\"`"));
    }
    let mut out = String::new();
    loop {
      if self.at_end() {
        return Err(self.error("unterminated string"));
      }
      if self.rest().starts_with(delim) {
        self.advance(delim.len());
        return Ok(out);
      }
      if self.rest().starts_with('\\') {
        let escape = self.rest().chars().nth(1);
        match escape {
          Some('n') => out.push('\n'),
          Some('r') => out.push('\r'),
          Some('t') => out.push('\t'),
          Some('"') => out.push('"'),
          Some('\\') => out.push('\\'),
          Some(other) => {
            out.push('\\');
            out.push(other);
          }
          None => return Err(self.error("unterminated string")),
        }
        self.advance(1 + escape.map(|c| c.len_utf8()).unwrap_or(0));
        continue;
      }
      let c = self.rest().chars().next().unwrap();
      out.push(c);
      self.advance(c.len_utf8());
    }
  }

  /// `["a", "b"]` — a bracketed list of string literals with an optional
  /// trailing comma, as used by the `shell` setting.
  pub fn parse_string_list(&mut self) -> Result<Vec<String>, CompileError> {
    if !self.eat_char('[') {
      return Err(self.error("expected `[`"));
    }
    let mut items = Vec::new();
    loop {
      self.skip_whitespace();
      if self.eat_char(']') {
        break;
      }
      if self.at_end() {
        return Err(self.error("expected `]`"));
      }
      items.push(self.parse_string()?);
      self.skip_whitespace();
      if !self.eat_char(',') && !self.rest().starts_with(']') {
        return Err(self.error("expected `,` or `]`"));
      }
    }
    Ok(items)
  }
}

/// Removes the common leading indentation from a multi-line (triple-quoted)
/// string or backtick, mirroring the reference tool's treatment.
pub fn dedent(s: &str) -> String {
  let mut s = s;
  if let Some(stripped) = s.strip_prefix('\n') {
    s = stripped;
  }
  if s.ends_with("\n\n") {
    s = &s[..s.len() - 1];
  }
  let lines: Vec<&str> = s.split('\n').collect();
  let significant: Vec<&str> = lines
    .iter()
    .copied()
    .filter(|line| !line.trim().is_empty())
    .collect();
  if significant.is_empty() {
    return s.to_string();
  }
  let mut prefix = significant[0];
  for line in &significant[1..] {
    let common = prefix
      .chars()
      .zip(line.chars())
      .take_while(|(a, b)| a == b)
      .count();
    let end = prefix
      .char_indices()
      .nth(common)
      .map(|(i, _)| i)
      .unwrap_or(prefix.len());
    prefix = &prefix[..end];
  }
  let indent_len = prefix.len() - prefix.trim_start_matches([' ', '\t']).len();
  if indent_len == 0 {
    return s.to_string();
  }
  let mut out: Vec<&str> = Vec::new();
  for line in &lines {
    if line.starts_with(prefix) {
      out.push(&line[indent_len..]);
    } else {
      out.push("");
    }
  }
  let mut joined = out.join("\n");
  if !joined.ends_with('\n') {
    joined.push('\n');
  }
  joined
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::phases::tokenize::TokenizePhase;

  fn parse(content: &str) -> Justfile {
    let tokens = TokenizePhase::new().tokenize(content).unwrap();
    ParsePhase::new().parse(tokens).unwrap()
  }

  fn first_recipe(justfile: &Justfile) -> &Recipe {
    justfile
      .items
      .iter()
      .find_map(|item| match item {
        Item::Recipe(recipe) => Some(recipe),
        _ => None,
      })
      .expect("no recipe parsed")
  }

  #[test]
  fn test_parse_simple_recipe() {
    let justfile = parse("hello:\n    echo world\n");
    let recipe = first_recipe(&justfile);
    assert_eq!(recipe.name, "hello");
    assert!(!recipe.quiet);
    assert_eq!(recipe.body.len(), 1);
    assert_eq!(
      recipe.body[0].fragments,
      vec![Fragment::Text("echo world".to_string())]
    );
  }

  #[test]
  fn test_parse_quiet_recipe() {
    let justfile = parse("@hello:\n    echo hi\n");
    assert!(first_recipe(&justfile).quiet);
  }

  #[test]
  fn test_parse_parameters() {
    let justfile = parse("greet name target=\"world\":\n    echo {{name}}\n");
    let recipe = first_recipe(&justfile);
    assert_eq!(recipe.parameters.len(), 2);
    assert_eq!(recipe.parameters[0].name, "name");
    assert_eq!(recipe.parameters[0].default, None);
    assert_eq!(recipe.parameters[1].name, "target");
    assert_eq!(
      recipe.parameters[1].default,
      Some(Expression::Literal("world".to_string()))
    );
  }

  #[test]
  fn test_parse_export_parameter() {
    let justfile = parse("run $RUST_LOG=\"debug\":\n    cargo run\n");
    let recipe = first_recipe(&justfile);
    assert!(recipe.parameters[0].export);
  }

  #[test]
  fn test_parse_variadic_star() {
    let justfile = parse("test *args:\n    cargo test {{args}}\n");
    let recipe = first_recipe(&justfile);
    let variadic = recipe.variadic.as_ref().unwrap();
    assert_eq!(variadic.kind, VariadicKind::Star);
    assert_eq!(variadic.param.name, "args");
  }

  #[test]
  fn test_parse_variadic_plus_with_default() {
    let justfile = parse("lint +files='src':\n    check {{files}}\n");
    let recipe = first_recipe(&justfile);
    let variadic = recipe.variadic.as_ref().unwrap();
    assert_eq!(variadic.kind, VariadicKind::Plus);
    assert_eq!(
      variadic.param.default,
      Some(Expression::Literal("src".to_string()))
    );
  }

  #[test]
  fn test_variadic_must_be_last() {
    let tokens = TokenizePhase::new()
      .tokenize("bad *args more:\n    true\n")
      .unwrap();
    let result = ParsePhase::new().parse(tokens);
    assert!(matches!(result, Err(CompileError::InvalidParameter { .. })));
  }

  #[test]
  fn test_parse_dependencies() {
    let justfile = parse("b: a\n    echo b\na:\n    echo a\n");
    let recipe = first_recipe(&justfile);
    assert_eq!(recipe.dependencies.len(), 1);
    assert_eq!(recipe.dependencies[0].name, "a");
  }

  #[test]
  fn test_parse_after_dependencies() {
    let justfile = parse("b: a && c\n    echo b\n");
    let recipe = first_recipe(&justfile);
    assert_eq!(recipe.dependencies[0].name, "a");
    assert_eq!(recipe.after_dependencies[0].name, "c");
  }

  #[test]
  fn test_parse_dependency_arguments() {
    let justfile = parse("b: (a \"x\" y)\n    echo b\n");
    let recipe = first_recipe(&justfile);
    let dependency = &recipe.dependencies[0];
    assert_eq!(dependency.name, "a");
    assert_eq!(dependency.arguments.len(), 2);
    assert_eq!(dependency.arguments[0], Expression::Literal("x".to_string()));
  }

  #[test]
  fn test_parse_interpolation() {
    let justfile = parse("greet name:\n    echo \"hello {{name}}\"\n");
    let recipe = first_recipe(&justfile);
    let fragments = &recipe.body[0].fragments;
    assert_eq!(fragments.len(), 3);
    assert_eq!(fragments[0], Fragment::Text("echo \"hello ".to_string()));
    assert!(matches!(
      &fragments[1],
      Fragment::Interpolation(Expression::Variable { name, .. }) if name == "name"
    ));
    assert_eq!(fragments[2], Fragment::Text("\"".to_string()));
  }

  #[test]
  fn test_parse_brace_escape() {
    let justfile = parse("r:\n    echo {{{{literal\n");
    let recipe = first_recipe(&justfile);
    assert_eq!(
      recipe.body[0].fragments,
      vec![Fragment::Text("echo {{literal".to_string())]
    );
  }

  #[test]
  fn test_parse_line_prefixes() {
    let justfile = parse("r:\n    @echo quiet\n    -false\n    @-maybe\n");
    let recipe = first_recipe(&justfile);
    assert!(recipe.body[0].silent);
    assert!(!recipe.body[0].ignore_errors);
    assert!(recipe.body[1].ignore_errors);
    assert!(recipe.body[2].silent && recipe.body[2].ignore_errors);
  }

  #[test]
  fn test_parse_concat_expression() {
    let justfile = parse("x := \"a\" + \"b\"\n");
    match &justfile.items[0] {
      Item::Assignment(assignment) => {
        assert_eq!(
          assignment.value,
          Expression::Concat(
            Box::new(Expression::Literal("a".to_string())),
            Box::new(Expression::Literal("b".to_string()))
          )
        );
      }
      other => panic!("expected assignment, got {:?}", other),
    }
  }

  #[test]
  fn test_parse_join_expression() {
    let justfile = parse("p := base / \"sub\"\n");
    match &justfile.items[0] {
      Item::Assignment(assignment) => {
        assert!(matches!(assignment.value, Expression::Join(..)));
      }
      other => panic!("expected assignment, got {:?}", other),
    }
  }

  #[test]
  fn test_parse_conditional_expression() {
    let justfile = parse("x := if os() == \"linux\" { \"l\" } else { \"o\" }\n");
    match &justfile.items[0] {
      Item::Assignment(assignment) => match &assignment.value {
        Expression::Conditional { operator, .. } => {
          assert_eq!(*operator, ConditionOperator::Equal);
        }
        other => panic!("expected conditional, got {:?}", other),
      },
      other => panic!("expected assignment, got {:?}", other),
    }
  }

  #[test]
  fn test_parse_else_if_chain() {
    let justfile =
      parse("x := if a == \"1\" { \"x\" } else if a == \"2\" { \"y\" } else { \"z\" }\n");
    match &justfile.items[0] {
      Item::Assignment(assignment) => match &assignment.value {
        Expression::Conditional { else_value, .. } => {
          assert!(matches!(**else_value, Expression::Conditional { .. }));
        }
        other => panic!("expected conditional, got {:?}", other),
      },
      other => panic!("expected assignment, got {:?}", other),
    }
  }

  #[test]
  fn test_parse_function_call() {
    let justfile = parse("x := env_var_or_default(\"HOME\", \"/tmp\")\n");
    match &justfile.items[0] {
      Item::Assignment(assignment) => match &assignment.value {
        Expression::Call { name, arguments, .. } => {
          assert_eq!(name, "env_var_or_default");
          assert_eq!(arguments.len(), 2);
        }
        other => panic!("expected call, got {:?}", other),
      },
      other => panic!("expected assignment, got {:?}", other),
    }
  }

  #[test]
  fn test_parse_backtick() {
    let justfile = parse("rev := `git rev-parse HEAD`\n");
    match &justfile.items[0] {
      Item::Assignment(assignment) => {
        assert_eq!(
          assignment.value,
          Expression::Backtick {
            command: "git rev-parse HEAD".to_string(),
            line: 1
          }
        );
      }
      other => panic!("expected assignment, got {:?}", other),
    }
  }

  #[test]
  fn test_parse_escapes_in_cooked_string() {
    let justfile = parse("x := \"a\\tb\\n\"\n");
    match &justfile.items[0] {
      Item::Assignment(assignment) => {
        assert_eq!(assignment.value, Expression::Literal("a\tb\n".to_string()));
      }
      other => panic!("expected assignment, got {:?}", other),
    }
  }

  #[test]
  fn test_raw_string_keeps_backslashes() {
    let justfile = parse("x := 'a\\tb'\n");
    match &justfile.items[0] {
      Item::Assignment(assignment) => {
        assert_eq!(assignment.value, Expression::Literal("a\\tb".to_string()));
      }
      other => panic!("expected assignment, got {:?}", other),
    }
  }

  #[test]
  fn test_parse_settings() {
    let justfile = parse("set dotenv-load\nset shell := [\"bash\", \"-cu\"]\n");
    match (&justfile.items[0], &justfile.items[1]) {
      (Item::Setting(a), Item::Setting(b)) => {
        assert_eq!(a.value, SettingValue::Bool(true));
        assert_eq!(
          b.value,
          SettingValue::List(vec!["bash".to_string(), "-cu".to_string()])
        );
      }
      other => panic!("expected settings, got {:?}", other),
    }
  }

  #[test]
  fn test_parse_attributes_attach_to_recipe() {
    let justfile = parse("[private]\n[no-cd]\nhidden:\n    true\n");
    let recipe = first_recipe(&justfile);
    assert_eq!(recipe.attributes.len(), 2);
    assert_eq!(recipe.attributes[0].name, "private");
    assert_eq!(recipe.attributes[1].name, "no-cd");
  }

  #[test]
  fn test_dangling_attribute_is_error() {
    let tokens = TokenizePhase::new()
      .tokenize("[private]\nx := \"1\"\n")
      .unwrap();
    let result = ParsePhase::new().parse(tokens);
    assert!(matches!(result, Err(CompileError::Parse { .. })));
  }

  #[test]
  fn test_dedent() {
    assert_eq!(dedent("\n  a\n  b\n"), "a\nb\n");
    assert_eq!(dedent("a\nb"), "a\nb");
  }

  #[test]
  fn test_shebang_detection() {
    let justfile = parse("py:\n    #!/usr/bin/env python3\n    print(1)\n");
    let recipe = first_recipe(&justfile);
    assert!(recipe.body[0].is_shebang());
  }

  #[test]
  fn test_expression_to_string_round_trip_shapes() {
    let expression = Expression::Concat(
      Box::new(Expression::Literal("a".to_string())),
      Box::new(Expression::Variable {
        name: "b".to_string(),
        line: 1,
        column: 1,
      }),
    );
    assert_eq!(expression_to_string(&expression, 0), "(\"a\" + b)");
  }
}
