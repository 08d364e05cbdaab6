use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result, bail};

use wendc::toolchain;

const USAGE: &str = "usage: wendc [-S] [-o DIR] <source>";

struct Options {
  /// Stop after writing the assembly.
  assembly_only: bool,
  out_dir: PathBuf,
  input: PathBuf,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Options> {
  let mut assembly_only = false;
  let mut out_dir = PathBuf::from("out");
  let mut input = None;

  while let Some(arg) = args.next() {
    match arg.as_str() {
      "-S" => assembly_only = true,
      "-o" => {
        let dir = args
          .next()
          .ok_or_else(|| anyhow::anyhow!("Missing directory after -o\n{USAGE}"))?;
        out_dir = PathBuf::from(dir);
      }
      flag if flag.starts_with('-') => bail!("Unknown option {flag}\n{USAGE}"),
      _ => {
        if input.replace(PathBuf::from(arg)).is_some() {
          bail!("Only one input file is supported\n{USAGE}");
        }
      }
    }
  }

  let input = input.ok_or_else(|| anyhow::anyhow!("{USAGE}"))?;
  Ok(Options {
    assembly_only,
    out_dir,
    input,
  })
}

fn stem(path: &Path) -> Result<String> {
  path
    .file_stem()
    .and_then(|stem| stem.to_str())
    .map(str::to_string)
    .with_context(|| format!("Invalid source file name {}", path.display()))
}

fn run() -> Result<()> {
  let options = parse_args(std::env::args().skip(1))?;
  let input = options.input.display();
  let source = fs::read_to_string(&options.input).with_context(|| format!("Reading {input}"))?;
  let asm = wendc::compile(&source).with_context(|| format!("Compiling {input}"))?;

  let stem = stem(&options.input)?;
  if options.assembly_only {
    let out_dir = &options.out_dir;
    fs::create_dir_all(out_dir).with_context(|| format!("Creating {}", out_dir.display()))?;
    toolchain::write_assembly(&asm, out_dir, &stem)?;
  } else {
    toolchain::build(&asm, &options.out_dir, &stem)?;
  }
  Ok(())
}

fn main() {
  if let Err(err) = run() {
    eprintln!("{err:#}");
    process::exit(1);
  }
}
