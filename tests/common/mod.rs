#![allow(dead_code)]

use std::fs;
use std::path::Path;
use tempfile::TempDir;

pub const SOURCE: &str = "fn main() -> int { return 3; }\n";

pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

pub fn write_file(dir: &Path, filename: &str, content: &str) {
    fs::write(dir.join(filename), content).expect("Failed to write file");
}

pub fn write_config(dir: &Path, content: &str) {
    fs::write(dir.join("lx-build.yaml"), content).expect("Failed to write lx-build.yaml");
}

/// Copies its input to its output, like a well-behaved tool
pub fn copy_args() -> &'static str {
    r#"['-c', 'cp "$1" "$2"', 'tool', '${{ input }}', '${{ output }}']"#
}

/// Writes an executable script that prints to both streams and exits with `code`
pub fn link_args(code: i32) -> String {
    format!(
        r##"['-c', 'printf "#!/bin/sh\necho hello from main\necho warning from main >&2\nexit {}\n" > "$1"; chmod +x "$1"', 'link', '${{{{ output }}}}']"##,
        code
    )
}

/// A toolchain built from `sh` one-liners, with relative paths
pub fn fake_toolchain_config(compiler_args: &str) -> String {
    format!(
        r#"
source: main.lx
ir: main.ll
object: main.obj
executable: Main.exe
log: null
generator:
  command:
    program: sh
    args: {copy}
compiler:
  program: sh
  args: {compiler}
linker:
  program: sh
  args: {link}
"#,
        copy = copy_args(),
        compiler = compiler_args,
        link = link_args(3),
    )
}

pub fn working_toolchain_config() -> String {
    fake_toolchain_config(copy_args())
}

pub fn failing_compiler_config() -> String {
    fake_toolchain_config(
        r#"['-c', 'echo "main.ll:1:1: error: expected top-level entity" >&2; exit 1']"#,
    )
}
