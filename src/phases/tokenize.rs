use crate::error::CompileError;

/// Quoting context while scanning a logical line. Strings and backticks may
/// span physical lines; the scanner keeps consuming until the construct
/// closes.
#[derive(Debug, Clone, Copy, PartialEq)]
enum QuoteState {
  Normal,
  Raw,
  Cooked,
  RawTriple,
  CookedTriple,
  Tick,
  TickTriple,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeEntry {
  pub name: String,
  pub argument: Option<String>,
  pub line: usize,
  pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
  Comment {
    text: String,
    line: usize,
  },
  Attributes {
    entries: Vec<AttributeEntry>,
    line: usize,
  },
  Setting {
    name: String,
    raw_value: Option<String>,
    line: usize,
    column: usize,
  },
  Alias {
    name: String,
    target: String,
    line: usize,
    column: usize,
  },
  Assignment {
    name: String,
    exported: bool,
    raw_expr: String,
    line: usize,
    column: usize,
  },
  RecipeHeader {
    raw: String,
    line: usize,
  },
  BodyLine {
    text: String,
    line: usize,
  },
}

#[derive(Default)]
pub struct TokenizePhase;

/// Result of scanning one logical top-level line: the text with any trailing
/// comment removed, the comment if present, and the number of physical lines
/// consumed.
struct Extent {
  text: String,
  consumed: usize,
}

impl TokenizePhase {
  pub fn new() -> Self {
    Self
  }

  pub fn tokenize(&self, content: &str) -> Result<Vec<Token>, CompileError> {
    let lines: Vec<&str> = content.lines().map(|l| l.strip_suffix('\r').unwrap_or(l)).collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    // Some(indent) while inside a recipe body; the indent is the literal
    // whitespace prefix established by the first body line.
    let mut body_indent: Option<String> = None;
    let mut awaiting_body = false;

    while i < lines.len() {
      let line = lines[i];
      let line_no = i + 1;

      if line.trim().is_empty() {
        i += 1;
        continue;
      }

      let leading_ws_len = line.len() - line.trim_start_matches([' ', '\t']).len();
      if leading_ws_len > 0 {
        if awaiting_body {
          body_indent = Some(line[..leading_ws_len].to_string());
          awaiting_body = false;
        }
        match &body_indent {
          Some(indent) if line.starts_with(indent.as_str()) => {
            let indent = indent.clone();
            let (text, consumed) = join_body_continuations(&lines, i, &indent);
            tokens.push(Token::BodyLine { text, line: line_no });
            i += consumed;
            continue;
          }
          Some(_) => {
            return Err(CompileError::Parse {
              line: line_no,
              column: 1,
              message: "inconsistent leading whitespace in recipe body".to_string(),
              snippet: line.to_string(),
            });
          }
          None => {
            return Err(CompileError::Parse {
              line: line_no,
              column: 1,
              message: "unexpected indentation outside of a recipe body".to_string(),
              snippet: line.to_string(),
            });
          }
        }
      }

      // Dedent: back at the top level.
      body_indent = None;
      awaiting_body = false;

      // A leading shebang is tolerated on the very first line only.
      if line.starts_with("#!") {
        if line_no == 1 {
          i += 1;
          continue;
        }
        return Err(CompileError::Parse {
          line: line_no,
          column: 1,
          message: "`#!` is only allowed on the first line or inside a recipe body".to_string(),
          snippet: line.to_string(),
        });
      }

      if let Some(rest) = line.strip_prefix('#') {
        tokens.push(Token::Comment {
          text: rest.trim().to_string(),
          line: line_no,
        });
        i += 1;
        continue;
      }

      if line.starts_with('[') {
        let entries = parse_attribute_line(line, line_no)?;
        tokens.push(Token::Attributes { entries, line: line_no });
        i += 1;
        continue;
      }

      if starts_with_keyword(line, "import") {
        return Err(CompileError::UnimplementedFeature {
          feature: "`import`".to_string(),
          line: line_no,
          column: 1,
        });
      }

      let extent = scan_extent(&lines, i, line_no)?;
      let text = extent.text.trim_end().to_string();
      let token = if starts_with_keyword(&text, "alias") {
        parse_alias_line(&text, line_no)?
      } else if starts_with_keyword(&text, "set") {
        parse_setting_line(&text, line_no)?
      } else if starts_with_keyword(&text, "export") {
        let rest = text["export".len()..].trim_start();
        let offset = text.len() - rest.len();
        parse_assignment_line(rest, true, line_no, offset + 1)?
      } else if let Some(token) = try_parse_assignment(&text, line_no)? {
        token
      } else if find_unquoted_colon(&text).is_some() {
        awaiting_body = true;
        Token::RecipeHeader { raw: text, line: line_no }
      } else {
        return Err(CompileError::Parse {
          line: line_no,
          column: 1,
          message: "expected an assignment, alias, setting, or recipe".to_string(),
          snippet: text,
        });
      };
      tokens.push(token);
      i += extent.consumed;
    }

    Ok(tokens)
  }
}

fn starts_with_keyword(line: &str, keyword: &str) -> bool {
  line
    .strip_prefix(keyword)
    .map(|rest| rest.starts_with(' ') || rest.starts_with('\t'))
    .unwrap_or(false)
}

fn is_name_start(c: char) -> bool {
  c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Splits a leading identifier (`[A-Za-z_][A-Za-z0-9_-]*`) off `text`.
pub fn split_name(text: &str) -> Option<(&str, &str)> {
  match text.chars().next() {
    Some(c) if is_name_start(c) => {}
    _ => return None,
  }
  let end = text
    .char_indices()
    .find(|(_, c)| !is_name_char(*c))
    .map(|(i, _)| i)
    .unwrap_or(text.len());
  Some((&text[..end], &text[end..]))
}

/// Advances the quote-state machine over the head of `rest`, returning the
/// next state and the number of bytes consumed.
fn step_quote_state(state: QuoteState, rest: &str) -> (QuoteState, usize) {
  let bytes = rest.as_bytes();
  match state {
    QuoteState::Normal => {
      if rest.starts_with("'''") {
        (QuoteState::RawTriple, 3)
      } else if rest.starts_with("\"\"\"") {
        (QuoteState::CookedTriple, 3)
      } else if rest.starts_with("```") {
        (QuoteState::TickTriple, 3)
      } else {
        match bytes[0] {
          b'\'' => (QuoteState::Raw, 1),
          b'"' => (QuoteState::Cooked, 1),
          b'`' => (QuoteState::Tick, 1),
          c => (QuoteState::Normal, utf8_width(c)),
        }
      }
    }
    QuoteState::Raw => match bytes[0] {
      b'\'' => (QuoteState::Normal, 1),
      c => (state, utf8_width(c)),
    },
    QuoteState::Cooked => match bytes[0] {
      b'\\' if bytes.len() > 1 => (state, 1 + utf8_width(bytes[1])),
      b'"' => (QuoteState::Normal, 1),
      c => (state, utf8_width(c)),
    },
    QuoteState::RawTriple => {
      if rest.starts_with("'''") {
        (QuoteState::Normal, 3)
      } else {
        (state, utf8_width(bytes[0]))
      }
    }
    QuoteState::CookedTriple => {
      if rest.starts_with("\"\"\"") {
        (QuoteState::Normal, 3)
      } else {
        (state, utf8_width(bytes[0]))
      }
    }
    QuoteState::Tick => match bytes[0] {
      b'`' => (QuoteState::Normal, 1),
      c => (state, utf8_width(c)),
    },
    QuoteState::TickTriple => {
      if rest.starts_with("```") {
        (QuoteState::Normal, 3)
      } else {
        (state, utf8_width(bytes[0]))
      }
    }
  }
}

fn utf8_width(byte: u8) -> usize {
  match byte {
    b if b < 0x80 => 1,
    b if b >= 0xf0 => 4,
    b if b >= 0xe0 => 3,
    _ => 2,
  }
}

/// Scans a top-level logical line starting at `lines[start]`. Strings and
/// backticks keep the scan alive across physical lines; a trailing `\`
/// outside quotes joins the next line with its leading whitespace removed.
/// An unquoted `#` terminates the text and starts a trailing comment.
fn scan_extent(lines: &[&str], start: usize, line_no: usize) -> Result<Extent, CompileError> {
  let mut text = String::new();
  let mut state = QuoteState::Normal;
  let mut i = start;
  let mut pending: String = lines[start].to_string();

  loop {
    let mut commented = false;
    let mut pos = 0;
    while pos < pending.len() {
      let rest = &pending[pos..];
      if state == QuoteState::Normal && rest.starts_with('#') {
        commented = true;
        break;
      }
      let (next, width) = step_quote_state(state, rest);
      text.push_str(&rest[..width]);
      state = next;
      pos += width;
    }
    if commented {
      break;
    }
    match state {
      QuoteState::Normal => {
        if text.ends_with('\\') && !text.ends_with("\\\\") {
          if i + 1 >= lines.len() {
            text.pop();
            break;
          }
          text.pop();
          i += 1;
          pending = lines[i].trim_start().to_string();
          continue;
        }
        break;
      }
      _ => {
        if i + 1 >= lines.len() {
          return Err(CompileError::Parse {
            line: line_no,
            column: 1,
            message: "unterminated string or backtick".to_string(),
            snippet: lines[start].to_string(),
          });
        }
        text.push('\n');
        i += 1;
        pending = lines[i].to_string();
      }
    }
  }

  Ok(Extent {
    text,
    consumed: i - start + 1,
  })
}

/// Joins `\`-continued body lines. The recipe indent is stripped from
/// continuation lines, then any further leading whitespace is removed.
fn join_body_continuations(lines: &[&str], start: usize, indent: &str) -> (String, usize) {
  let mut text = lines[start][indent.len()..].to_string();
  let mut i = start;
  while text.ends_with('\\') && !text.ends_with("\\\\") && i + 1 < lines.len() {
    let next = lines[i + 1];
    if next.trim().is_empty() {
      break;
    }
    text.pop();
    text.push_str(next.trim_start());
    i += 1;
  }
  (text, i - start + 1)
}

/// Finds the first `:` outside quotes that is not part of `:=`.
fn find_unquoted_colon(text: &str) -> Option<usize> {
  let mut state = QuoteState::Normal;
  let mut pos = 0;
  while pos < text.len() {
    let rest = &text[pos..];
    if state == QuoteState::Normal && rest.starts_with(':') && !rest.starts_with(":=") {
      return Some(pos);
    }
    let (next, width) = step_quote_state(state, rest);
    state = next;
    pos += width;
  }
  None
}

/// Finds an unquoted `:=` in `text`.
fn find_walrus(text: &str) -> Option<usize> {
  let mut state = QuoteState::Normal;
  let mut pos = 0;
  while pos < text.len() {
    let rest = &text[pos..];
    if state == QuoteState::Normal && rest.starts_with(":=") {
      return Some(pos);
    }
    let (next, width) = step_quote_state(state, rest);
    state = next;
    pos += width;
  }
  None
}

fn parse_attribute_line(line: &str, line_no: usize) -> Result<Vec<AttributeEntry>, CompileError> {
  let trimmed = line.trim_end();
  let body = trimmed
    .strip_prefix('[')
    .and_then(|rest| rest.strip_suffix(']'))
    .ok_or_else(|| CompileError::Parse {
      line: line_no,
      column: trimmed.len(),
      message: "expected `]` to close attribute list".to_string(),
      snippet: line.to_string(),
    })?;
  let mut entries = Vec::new();
  for part in body.split(',') {
    let part = part.trim();
    if part.is_empty() {
      continue;
    }
    let column = line.find(part).map(|p| p + 1).unwrap_or(1);
    let (name, rest) = split_name(part).ok_or_else(|| CompileError::Parse {
      line: line_no,
      column,
      message: "expected attribute name".to_string(),
      snippet: line.to_string(),
    })?;
    let argument = if rest.is_empty() {
      None
    } else {
      let inner = rest
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .ok_or_else(|| CompileError::Parse {
          line: line_no,
          column,
          message: "malformed attribute argument".to_string(),
          snippet: line.to_string(),
        })?;
      Some(inner.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
    };
    entries.push(AttributeEntry {
      name: name.to_string(),
      argument,
      line: line_no,
      column,
    });
  }
  Ok(entries)
}

fn parse_alias_line(text: &str, line_no: usize) -> Result<Token, CompileError> {
  let rest = text["alias".len()..].trim_start();
  let column = text.len() - rest.len() + 1;
  let (name, rest) = split_name(rest).ok_or_else(|| CompileError::Parse {
    line: line_no,
    column,
    message: "expected alias name".to_string(),
    snippet: text.to_string(),
  })?;
  let after_name = rest.trim_start();
  let target_part = after_name.strip_prefix(":=").ok_or_else(|| CompileError::Parse {
    line: line_no,
    column,
    message: "expected `:=` after alias name".to_string(),
    snippet: text.to_string(),
  })?;
  let target_part = target_part.trim();
  let (target, tail) = split_name(target_part).ok_or_else(|| CompileError::Parse {
    line: line_no,
    column,
    message: "expected recipe name after `:=`".to_string(),
    snippet: text.to_string(),
  })?;
  if !tail.trim().is_empty() {
    return Err(CompileError::Parse {
      line: line_no,
      column,
      message: format!("unexpected `{}` after alias target", tail.trim()),
      snippet: text.to_string(),
    });
  }
  Ok(Token::Alias {
    name: name.to_string(),
    target: target.to_string(),
    line: line_no,
    column,
  })
}

fn parse_setting_line(text: &str, line_no: usize) -> Result<Token, CompileError> {
  let rest = text["set".len()..].trim_start();
  let column = text.len() - rest.len() + 1;
  let (name, rest) = split_name(rest).ok_or_else(|| CompileError::Parse {
    line: line_no,
    column,
    message: "expected setting name after `set`".to_string(),
    snippet: text.to_string(),
  })?;
  let rest = rest.trim();
  let raw_value = if rest.is_empty() {
    None
  } else if let Some(value) = rest.strip_prefix(":=") {
    Some(value.trim().to_string())
  } else {
    return Err(CompileError::Parse {
      line: line_no,
      column,
      message: "expected `:=` or end of line after setting name".to_string(),
      snippet: text.to_string(),
    });
  };
  Ok(Token::Setting {
    name: name.to_string(),
    raw_value,
    line: line_no,
    column,
  })
}

fn parse_assignment_line(
  text: &str,
  exported: bool,
  line_no: usize,
  column: usize,
) -> Result<Token, CompileError> {
  try_parse_assignment_at(text, exported, line_no, column)?.ok_or_else(|| CompileError::Parse {
    line: line_no,
    column,
    message: "expected `name := expression` after `export`".to_string(),
    snippet: text.to_string(),
  })
}

fn try_parse_assignment(text: &str, line_no: usize) -> Result<Option<Token>, CompileError> {
  try_parse_assignment_at(text, false, line_no, 1)
}

fn try_parse_assignment_at(
  text: &str,
  exported: bool,
  line_no: usize,
  column: usize,
) -> Result<Option<Token>, CompileError> {
  let walrus = match find_walrus(text) {
    Some(pos) => pos,
    None => return Ok(None),
  };
  if let Some(colon) = find_unquoted_colon(text) {
    if colon < walrus {
      return Ok(None);
    }
  }
  let (name, rest) = match split_name(text) {
    Some(pair) => pair,
    None => return Ok(None),
  };
  if !rest.trim_start().starts_with(":=") {
    return Ok(None);
  }
  let raw_expr = text[walrus + 2..].trim().to_string();
  if raw_expr.is_empty() {
    return Err(CompileError::Parse {
      line: line_no,
      column: walrus + 3,
      message: "expected expression after `:=`".to_string(),
      snippet: text.to_string(),
    });
  }
  Ok(Some(Token::Assignment {
    name: name.to_string(),
    exported,
    raw_expr,
    line: line_no,
    column,
  }))
}
