//! Turning emitted assembly into a runnable 32-bit executable with the
//! system assembler and linker.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};

/// Whether `as` and `ld` can be spawned at all.
pub fn is_available() -> bool {
  ["as", "ld"].iter().all(|tool| {
    Command::new(tool)
      .arg("--version")
      .output()
      .is_ok_and(|output| output.status.success())
  })
}

fn run_tool(command: &mut Command, tool: &str) -> Result<()> {
  let output = command.output().with_context(|| format!("Running {tool}"))?;
  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    bail!("{tool} failed: {stderr}");
  }
  Ok(())
}

/// Write `<dir>/<stem>.s`, assemble and link it into `<dir>/<stem>`.
pub fn build(asm: &str, dir: &Path, stem: &str) -> Result<PathBuf> {
  fs::create_dir_all(dir).with_context(|| format!("Creating {}", dir.display()))?;
  let source_path = write_assembly(asm, dir, stem)?;
  let object_path = dir.join(format!("{stem}.o"));
  let binary_path = dir.join(stem);

  run_tool(
    Command::new("as")
      .arg("--32")
      .arg(&source_path)
      .arg("-o")
      .arg(&object_path),
    "as",
  )?;
  run_tool(
    Command::new("ld")
      .arg("-m")
      .arg("elf_i386")
      .arg(&object_path)
      .arg("-o")
      .arg(&binary_path),
    "ld",
  )?;
  Ok(binary_path)
}

pub fn write_assembly(asm: &str, dir: &Path, stem: &str) -> Result<PathBuf> {
  let source_path = dir.join(format!("{stem}.s"));
  fs::write(&source_path, asm).with_context(|| format!("Writing {}", source_path.display()))?;
  Ok(source_path)
}
