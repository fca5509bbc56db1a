use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use gdml_core::types::TypeKind;
use gdml_core::{CoreError, Options, Type, compile_dir};
use tracing_subscriber::EnvFilter;

/// Typecheck GDML sources.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// A `.gdml` file, or a directory compiled as a chain of units in sorted
    /// path order.
    #[arg(short, long, value_name = "PATH")]
    input: PathBuf,

    #[arg(long, help = "Print the AST of every successfully parsed unit")]
    dump_ast: bool,

    #[arg(long, help = "Print the types each unit exports")]
    exports: bool,

    #[arg(short, long, help = "Log resolution and scope events")]
    verbose: bool,

    #[arg(long, help = "Fail if any warning was reported")]
    warnings_as_errors: bool,

    #[arg(long, value_name = "N", default_value_t = gdml_core::compiler::DEFAULT_MAX_NESTING_DEPTH)]
    max_depth: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    execute(cli)
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

fn execute(cli: Cli) -> Result<()> {
    let options = Options {
        max_nesting_depth: cli.max_depth,
        ..Options::default()
    };
    let parsers = compile_dir(&cli.input, &options)
        .with_context(|| format!("failed to load sources from {}", cli.input.display()))?;

    let mut errors = 0;
    let mut warnings = 0;
    for parser in &parsers {
        parser.dispatch_logs();
        errors += parser.errors().count();
        warnings += parser.warnings().count();

        let Some(parsed) = parser.parsed() else {
            continue;
        };
        if cli.dump_ast {
            println!("// {}", parsed.src().name());
            print!("{}", parsed.ast().debug(0));
        }
        if cli.exports {
            for ty in parsed.exported_types() {
                println!("{}", describe_export(ty));
            }
        }
    }

    if cli.warnings_as_errors {
        errors += warnings;
    }
    if errors > 0 {
        return Err(CoreError::CompileFailed {
            unit: cli.input.display().to_string(),
            errors,
        }
        .into());
    }
    Ok(())
}

fn describe_export(ty: &Type) -> String {
    let keyword = match &ty.kind {
        TypeKind::Struct(s) if s.is_extern => "extern struct",
        TypeKind::Struct(_) => "struct",
        TypeKind::Node(_) => "node",
        TypeKind::Enum(e) if e.is_extern => "extern enum",
        TypeKind::Enum(_) => "enum",
        TypeKind::Alias(_) => "alias",
        TypeKind::Function(_) => "fn",
        _ => "type",
    };
    match &ty.kind {
        TypeKind::Alias(alias) => format!("{keyword} {} = {}", alias.name, alias.target),
        _ => format!("{keyword} {ty}"),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use assert_cmd::Command;
    use predicates::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn accepts_a_valid_file() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("main.gdml");
        fs::write(
            &input_path,
            "node Button { text: string, width: float = 1.0 }\nlet ok = Button { text: \"ok\" }",
        )
        .expect("write input");

        Command::cargo_bin("gdml")
            .expect("binary exists")
            .arg("--input")
            .arg(&input_path)
            .assert()
            .success()
            .stderr(predicate::str::contains("finished with 0 errors and 0 warnings"));
    }

    #[test]
    fn reports_type_errors_and_fails() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("main.gdml");
        fs::write(&input_path, "let a = missing\nlet b: float = 1").expect("write input");

        Command::cargo_bin("gdml")
            .expect("binary exists")
            .arg("--input")
            .arg(&input_path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("error[E0201]: identifier \"missing\" is undefined"))
            .stderr(predicate::str::contains("error[E0300]"))
            .stderr(predicate::str::contains("failed with 2 error(s)"));
    }

    #[test]
    fn dumps_ast() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("main.gdml");
        fs::write(&input_path, "let x = 1 + 2").expect("write input");

        Command::cargo_bin("gdml")
            .expect("binary exists")
            .arg("--input")
            .arg(&input_path)
            .arg("--dump-ast")
            .assert()
            .success()
            .stdout(predicate::str::contains("Program\n  Let x\n    Binary +\n      Int 1\n      Int 2\n"));
    }

    #[test]
    fn lists_exports_across_a_directory() {
        let dir = tempdir().expect("tempdir");
        fs::write(
            dir.path().join("a_ui.gdml"),
            "namespace ui { node Label { text: string } }\nalias Meters = float",
        )
        .expect("write ui");
        fs::write(
            dir.path().join("b_app.gdml"),
            "struct Layout { gap: Meters, title: ui::Label }",
        )
        .expect("write app");

        Command::cargo_bin("gdml")
            .expect("binary exists")
            .arg("--input")
            .arg(dir.path())
            .arg("--exports")
            .assert()
            .success()
            .stdout(predicate::str::contains("node ui::Label"))
            .stdout(predicate::str::contains("alias Meters = float"))
            .stdout(predicate::str::contains("struct Layout"));
    }

    #[test]
    fn warnings_can_fail_the_run() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("main.gdml");
        fs::write(&input_path, "struct S { a?: int = 1 }").expect("write input");

        Command::cargo_bin("gdml")
            .expect("binary exists")
            .arg("--input")
            .arg(&input_path)
            .assert()
            .success()
            .stderr(predicate::str::contains("warning: member `a` has a default value"));

        Command::cargo_bin("gdml")
            .expect("binary exists")
            .arg("--input")
            .arg(&input_path)
            .arg("--warnings-as-errors")
            .assert()
            .failure();
    }

    #[test]
    fn reports_missing_input() {
        let dir = tempdir().expect("tempdir");

        Command::cargo_bin("gdml")
            .expect("binary exists")
            .arg("--input")
            .arg(dir.path().join("missing"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("source root was not found"));
    }

    #[test]
    fn nesting_limit_is_configurable() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("main.gdml");
        let nested = format!("let x = {}1{}", "(".repeat(12), ")".repeat(12));
        fs::write(&input_path, nested).expect("write input");

        Command::cargo_bin("gdml")
            .expect("binary exists")
            .arg("--input")
            .arg(&input_path)
            .assert()
            .success();

        Command::cargo_bin("gdml")
            .expect("binary exists")
            .arg("--input")
            .arg(&input_path)
            .arg("--max-depth")
            .arg("4")
            .assert()
            .failure()
            .stderr(predicate::str::contains("nesting exceeds the limit of 4"));
    }
}
