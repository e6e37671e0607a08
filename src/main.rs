use std::io::{IsTerminal, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::{env, fs, io};

use ansi_term::Colour;
use tracing_subscriber::EnvFilter;

use justsh::pipeline::{Pipeline, PipelineOptions};

const USAGE: &str = "\
Compile a justfile to a portable POSIX shell script

USAGE:
    justsh [OPTIONS] [JUSTFILE]

OPTIONS:
    -i, --infile <PATH>        Input justfile path (`-` for stdin)
    -o, --outfile <PATH>       Output script path (`-` for stdout) [default: ./just.sh]
        --outfile-name <NAME>  Script name referenced inside the generated script
        --verbose              Enable debug logging
        --no-color             Disable colored diagnostics
    -V, --version              Print version information
    -h, --help                 Print this help
";

struct Cli {
  infile: Option<String>,
  outfile: String,
  outfile_name: Option<String>,
  verbose: bool,
  no_color: bool,
}

enum CliAction {
  Run(Cli),
  Help,
  Version,
}

fn parse_args(args: &[String]) -> Result<CliAction, String> {
  let mut cli = Cli {
    infile: None,
    outfile: "just.sh".to_string(),
    outfile_name: None,
    verbose: false,
    no_color: false,
  };
  let mut iter = args.iter();
  while let Some(arg) = iter.next() {
    match arg.as_str() {
      "-h" | "--help" => return Ok(CliAction::Help),
      "-V" | "--version" => return Ok(CliAction::Version),
      "--verbose" => cli.verbose = true,
      "--no-color" => cli.no_color = true,
      "-i" | "--infile" => {
        cli.infile = Some(
          iter
            .next()
            .ok_or_else(|| format!("option `{}` requires a value", arg))?
            .clone(),
        );
      }
      "-o" | "--outfile" => {
        cli.outfile = iter
          .next()
          .ok_or_else(|| format!("option `{}` requires a value", arg))?
          .clone();
      }
      "--outfile-name" => {
        cli.outfile_name = Some(
          iter
            .next()
            .ok_or_else(|| format!("option `{}` requires a value", arg))?
            .clone(),
        );
      }
      other if other.starts_with('-') && other != "-" => {
        return Err(format!("unrecognized option `{}`", other));
      }
      other => {
        if cli.infile.is_some() {
          return Err(format!("unexpected argument `{}`", other));
        }
        cli.infile = Some(other.to_string());
      }
    }
  }
  Ok(CliAction::Run(cli))
}

fn print_error(message: &str, no_color: bool) {
  let colored = !no_color && io::stderr().is_terminal();
  if colored {
    eprintln!("{}: {}", Colour::Red.bold().paint("error"), message);
  } else {
    eprintln!("error: {}", message);
  }
}

fn run(cli: Cli) -> Result<(), (String, u8)> {
  let pipeline = Pipeline::with_options(PipelineOptions {
    directory: None,
    outfile_name: cli.outfile_name.clone(),
  });

  let content = match cli.infile.as_deref() {
    Some("-") => {
      let mut buffer = String::new();
      io::stdin()
        .read_to_string(&mut buffer)
        .map_err(|e| (format!("could not read stdin: {}", e), 1))?;
      buffer
    }
    Some(path) => fs::read_to_string(path)
      .map_err(|e| (format!("could not read justfile at `{}`: {}", path, e), 1))?,
    None => {
      let path = pipeline.find_justfile().map_err(|e| (e.to_string(), 1))?;
      fs::read_to_string(&path)
        .map_err(|e| (format!("could not read justfile at `{}`: {}", path.display(), e), 1))?
    }
  };

  let outfile_name = cli.outfile_name.clone().unwrap_or_else(|| {
    if cli.outfile == "-" {
      "just.sh".to_string()
    } else {
      PathBuf::from(&cli.outfile)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "just.sh".to_string())
    }
  });

  let script = pipeline
    .compile_str(&content, &outfile_name)
    .map_err(|e| (e.to_string(), 1))?;

  if cli.outfile == "-" {
    io::stdout()
      .write_all(script.as_bytes())
      .map_err(|e| (format!("could not write to stdout: {}", e), 1))?;
  } else {
    fs::write(&cli.outfile, &script)
      .map_err(|e| (format!("could not write `{}`: {}", cli.outfile, e), 1))?;
    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      let metadata = fs::metadata(&cli.outfile)
        .map_err(|e| (format!("could not stat `{}`: {}", cli.outfile, e), 1))?;
      let mut permissions = metadata.permissions();
      permissions.set_mode(permissions.mode() | 0o755);
      fs::set_permissions(&cli.outfile, permissions)
        .map_err(|e| (format!("could not chmod `{}`: {}", cli.outfile, e), 1))?;
    }
  }
  Ok(())
}

fn main() -> ExitCode {
  let args: Vec<String> = env::args().skip(1).collect();
  let cli = match parse_args(&args) {
    Ok(CliAction::Help) => {
      print!("{}", USAGE);
      return ExitCode::SUCCESS;
    }
    Ok(CliAction::Version) => {
      println!("justsh {}", env!("CARGO_PKG_VERSION"));
      return ExitCode::SUCCESS;
    }
    Ok(CliAction::Run(cli)) => cli,
    Err(message) => {
      print_error(&message, false);
      eprint!("{}", USAGE);
      return ExitCode::from(2);
    }
  };

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
    )
    .with_writer(io::stderr)
    .init();

  let no_color = cli.no_color;
  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err((message, code)) => {
      print_error(&message, no_color);
      ExitCode::from(code)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_args_defaults() {
    match parse_args(&[]).unwrap() {
      CliAction::Run(cli) => {
        assert_eq!(cli.infile, None);
        assert_eq!(cli.outfile, "just.sh");
        assert!(!cli.verbose);
      }
      _ => panic!("expected run action"),
    }
  }

  #[test]
  fn test_parse_args_positional_justfile() {
    match parse_args(&["my.just".to_string()]).unwrap() {
      CliAction::Run(cli) => assert_eq!(cli.infile.as_deref(), Some("my.just")),
      _ => panic!("expected run action"),
    }
  }

  #[test]
  fn test_parse_args_unknown_flag() {
    assert!(parse_args(&["--frobnicate".to_string()]).is_err());
  }

  #[test]
  fn test_parse_args_missing_value() {
    assert!(parse_args(&["-o".to_string()]).is_err());
  }

  #[test]
  fn test_parse_args_stdin_marker() {
    match parse_args(&["-".to_string()]).unwrap() {
      CliAction::Run(cli) => assert_eq!(cli.infile.as_deref(), Some("-")),
      _ => panic!("expected run action"),
    }
  }
}
