//! Development automation for the CallGuard workspace
//!
//! Run with: `cargo xtask <task>`. Output goes straight to the terminal with
//! `println!`; this binary is a developer tool, not a service.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::env;
use std::process::{Command, ExitCode};

use anyhow::{bail, Context, Result};

mod features;

/// A task name, its one-line description and its entry point
type Task = (&'static str, &'static str, fn() -> Result<()>);

const TASKS: &[Task] = &[
    ("ci", "Run fmt, clippy, feature matrix, tests and bench build in order", run_ci),
    ("fmt", "Check formatting", run_fmt),
    ("clippy", "Lint every target with warnings denied", run_clippy),
    ("test", "Run the workspace test suite", run_test),
    ("bench", "Compile the criterion benches without running them", run_bench),
    ("test-features", "Check each callguard-common feature tier on its own", features::check_feature_tiers),
    ("audit", "Scan dependencies with cargo-audit", run_audit),
];

fn main() -> ExitCode {
    let Some(requested) = env::args().nth(1) else {
        print_help();
        return ExitCode::SUCCESS;
    };
    if requested == "help" {
        print_help();
        return ExitCode::SUCCESS;
    }

    let Some((_, _, run)) = TASKS.iter().find(|(name, _, _)| *name == requested) else {
        eprintln!("unknown task '{requested}'\n");
        print_help();
        return ExitCode::FAILURE;
    };

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("xtask {requested} failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn print_help() {
    println!("usage: cargo xtask <task>\n\ntasks:");
    for (name, about, _) in TASKS {
        println!("    {name:<14} {about}");
    }
    println!("    {:<14} Show this message", "help");
}

/// Run `cargo` with `args`, failing with `on_failure` on a non-zero exit
pub(crate) fn cargo(args: &[&str], on_failure: &str) -> Result<()> {
    let status = Command::new("cargo")
        .args(args)
        .status()
        .with_context(|| format!("could not spawn `cargo {}`", args.join(" ")))?;
    if !status.success() {
        bail!("{on_failure}");
    }
    Ok(())
}

fn run_ci() -> Result<()> {
    let steps = TASKS.iter().filter(|(name, _, _)| !matches!(*name, "ci" | "audit"));
    let total = steps.clone().count();

    for (step, (name, about, run)) in steps.enumerate() {
        println!("==> [{}/{total}] {name}: {about}", step + 1);
        run()?;
    }

    println!("\nci passed");
    Ok(())
}

fn run_fmt() -> Result<()> {
    cargo(&["fmt", "--all", "--", "--check"], "formatting differs, run `cargo fmt --all`")
}

fn run_clippy() -> Result<()> {
    cargo(
        &["clippy", "--workspace", "--all-targets", "--all-features", "--", "-D", "warnings"],
        "clippy reported warnings",
    )
}

/// The common crate's integration tests are gated on its feature tiers, so
/// the suite runs with `--all-features`.
fn run_test() -> Result<()> {
    cargo(&["test", "--workspace", "--all-features"], "tests failed")
}

fn run_bench() -> Result<()> {
    cargo(&["bench", "-p", "callguard-core", "--no-run"], "benches failed to compile")
}

fn run_audit() -> Result<()> {
    let installed = Command::new("cargo")
        .args(["audit", "--version"])
        .output()
        .is_ok_and(|out| out.status.success());
    if !installed {
        bail!("cargo-audit is not installed (cargo install cargo-audit)");
    }
    cargo(&["audit"], "cargo-audit reported vulnerable dependencies")
}
