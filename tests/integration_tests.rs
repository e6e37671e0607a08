use std::fs;
use std::path::Path;

use justsh::{compile_justfile, parse_justfile, CompileError};

fn compile_sample(name: &str) -> String {
  let path = Path::new("./tests/samples").join(name);
  let content = fs::read_to_string(&path).expect("could not read sample");
  compile_justfile(&content, "just.sh").expect("sample failed to compile")
}

#[test]
fn test_all_samples_compile_deterministically() {
  let samples_dir = Path::new("./tests/samples");
  let mut checked = 0;
  for entry in fs::read_dir(samples_dir).expect("could not read samples directory") {
    let entry = entry.expect("invalid entry in samples directory");
    let path = entry.path();
    if path.extension().and_then(|e| e.to_str()) != Some("just") {
      continue;
    }
    let content = fs::read_to_string(&path).expect("could not read sample file");

    let first = compile_justfile(&content, "just.sh")
      .unwrap_or_else(|e| panic!("sample {:?} failed to compile: {}", path, e));
    let second = compile_justfile(&content, "just.sh").unwrap();

    assert_eq!(first, second, "output must be deterministic for {:?}", path);
    assert!(
      first.starts_with("#!/bin/sh\n"),
      "script for {:?} must start with a shebang",
      path
    );
    assert!(
      first.ends_with('\n'),
      "script for {:?} must end with a newline",
      path
    );
    checked += 1;
  }
  assert!(checked >= 7, "expected at least 7 samples, found {}", checked);
}

#[test]
fn test_hello_script_shape() {
  let script = compile_sample("hello.just");
  assert!(script.contains("FUN_hello() {"));
  assert!(script.contains("echo_recipe_line 'echo world'"));
  // hello is the default recipe
  assert!(script.contains("FUN_hello \"${@}\""));
}

#[test]
fn test_greet_default_argument() {
  let script = compile_sample("greet.just");
  assert!(script.contains("VAR_name=\"${1:-}\""));
  assert!(script.contains("VAR_name='world'"));
  assert!(script.contains("INTERP_1=\"${VAR_name}\""));
}

#[test]
fn test_deps_run_before_body_and_only_once() {
  let script = compile_sample("deps.just");
  let pre_b = script
    .split("PRE_b() {")
    .nth(1)
    .and_then(|s| s.split("FUN_b() {").next())
    .expect("PRE_b not found");
  assert!(pre_b.contains("FUN_a"), "b's preamble must invoke a");
  assert!(script.contains("CACHE_KEY_a=\"$(run_cache_key 'a'"));
  assert!(script.contains("HAS_RUN_a=1"));
}

#[test]
fn test_alias_dispatch() {
  let script = compile_sample("alias.just");
  assert!(script.contains("FUN_t() {\n  FUN_test \"${@}\"\n}"));
  assert!(script.contains("\n  t)\n"));
  assert!(script.contains("\n  test)\n"));
}

#[test]
fn test_evaluate_lists_variables() {
  let script = compile_sample("evaluate.just");
  assert!(script.contains("VAR_x='1'"));
  assert!(script.contains("VAR_y=\"${VAR_x}\"'2'"));
  assert!(script.contains("echo 'x := \"'\"${VAR_x}\"'\"'"));
  assert!(script.contains("echo 'y := \"'\"${VAR_y}\"'\"'"));
  // no recipes: dispatch must exit 0 with a message
  assert!(script.contains("Justfile contains no recipes."));
}

#[test]
fn test_private_recipe_hidden_from_list_but_dispatchable() {
  let script = compile_sample("private.just");
  let listfn = script
    .split("listfn() {")
    .nth(1)
    .and_then(|s| s.split("summarizefn()").next())
    .expect("listfn not found");
  assert!(!listfn.contains("'_internal'"));
  assert!(listfn.contains("'shown'"));
  // still dispatchable by name
  assert!(script.contains("\n  _internal)\n"));
}

#[test]
fn test_summary_is_declaration_order() {
  let content = "zeta:\n    true\nalpha:\n    true\n";
  let script = compile_justfile(content, "just.sh").unwrap();
  assert!(script.contains("summarizefn() {\n  echo 'zeta alpha'\n}"));
}

#[test]
fn test_kitchen_sink() {
  let script = compile_sample("kitchen.just");
  // settings
  assert!(script.contains("load_dotenv"));
  assert!(script.contains("'build' \"${VAR_target}\""), "positional arguments");
  // exported variable with literal path join collapsed
  assert!(script.contains("VAR_BUILD_DIR='target/release'"));
  // conditional lowering
  assert!(script.contains("if [ \"${VAR_version}\" = '1.2.3' ]; then printf '%s' 'stable'"));
  // after-dependency forcing
  assert!(script.contains("FORCE_report='true'"));
  // shebang recipe
  assert!(script.contains("chmod +x \"${TEMPFILE}\""));
  // platform dispatch
  assert!(script.contains("FUN_platform_linux() {"));
  assert!(script.contains("[ \"$(os)\" = 'macos' ]"));
  // docstring reaches the list
  assert!(script.contains(" # Compile everything"));
}

#[test]
fn test_dump_round_trips_source() {
  let content = fs::read_to_string("./tests/samples/hello.just").unwrap();
  let script = compile_justfile(&content, "just.sh").unwrap();
  assert!(script.contains(content.trim()));
}

#[test]
fn test_parse_error_has_position() {
  let result = compile_justfile("hello:\n    echo hi\n  bad dedent\n", "just.sh");
  match result {
    Err(CompileError::Parse { line, column, .. }) => {
      assert_eq!(line, 3);
      assert_eq!(column, 1);
    }
    other => panic!("expected parse error, got {:?}", other),
  }
}

#[test]
fn test_error_taxonomy_end_to_end() {
  let cases: Vec<(&str, fn(&CompileError) -> bool)> = vec![
    ("x := \"1\"\nx := \"2\"\n", |e| {
      matches!(e, CompileError::DuplicateName { .. })
    }),
    ("a: missing\n    true\n", |e| {
      matches!(e, CompileError::UnknownRecipe { .. })
    }),
    ("alias a := b\nalias b := a\nc:\n    true\n", |e| {
      matches!(e, CompileError::Cycle { .. })
    }),
    ("[frobnicate]\na:\n    true\n", |e| {
      matches!(e, CompileError::UnknownAttribute { .. })
    }),
    ("set frobnicate\n", |e| {
      matches!(e, CompileError::UnknownSetting { .. })
    }),
    ("x := datetime(\"%F\")\n", |e| {
      matches!(e, CompileError::UnimplementedFunction { .. })
    }),
    ("import 'x'\n", |e| {
      matches!(e, CompileError::UnimplementedFeature { .. })
    }),
    ("[confirm]\na:\n    true\n", |e| {
      matches!(e, CompileError::UnimplementedFeature { .. })
    }),
    ("bad *args more:\n    true\n", |e| {
      matches!(e, CompileError::InvalidParameter { .. })
    }),
  ];
  for (content, check) in cases {
    let error =
      compile_justfile(content, "just.sh").expect_err(&format!("expected {:?} to fail", content));
    assert!(check(&error), "unexpected error for {:?}: {}", content, error);
    assert!(error.line() >= 1);
    assert!(error.column() >= 1);
  }
}

#[test]
fn test_parse_justfile_exposes_ast() {
  let justfile = parse_justfile("hello:\n    echo world\n").unwrap();
  assert_eq!(justfile.items.len(), 1);
}

#[test]
fn test_outfile_name_threads_through() {
  let script = compile_justfile("hello:\n    echo hi\n", "build.sh").unwrap();
  assert!(script.contains("build.sh --dump"));
  assert!(script.contains("./build.sh [FLAGS]"));
}

#[test]
fn test_balanced_double_quotes_in_simple_script() {
  // a crude well-formedness check on a sample without quotes in its body
  let script = compile_sample("hello.just");
  for (index, line) in script.lines().enumerate() {
    let quotes = line.matches('"').count();
    assert!(
      quotes % 2 == 0,
      "unbalanced double quotes on line {}: {}",
      index + 1,
      line
    );
  }
}
