use anyhow::{Context, Result};
use colored::Colorize;
use std::process::{Command, Output};
use std::time::Instant;

/// Target the watch firmware builds for.
const WATCH_TARGET: &str = "thumbv7em-none-eabihf";

/// A cargo invocation and whether its failure fails the whole task.
struct Step<'a> {
    label: &'a str,
    args: &'a [&'a str],
    required: bool,
}

const STEPS: &[Step<'static>] = &[
    Step {
        label: "platform (no_std, watch target)",
        args: &["check", "-p", "platform", "--target", WATCH_TARGET, "--features", "defmt"],
        required: true,
    },
    Step {
        label: "task-timer (no_std, watch target)",
        args: &["check", "-p", "task-timer", "--target", WATCH_TARGET, "--features", "defmt"],
        required: true,
    },
    Step {
        label: "task-timer (host, tracing)",
        args: &["check", "-p", "task-timer", "--features", "std,tracing"],
        required: true,
    },
    Step {
        label: "clippy lints",
        args: &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
        required: false,
    },
    Step {
        label: "code formatting",
        args: &["fmt", "--all", "--check"],
        required: false,
    },
];

/// Library crates only: xtask is a binary with nothing to document.
const DOC_ARGS: &[&str] = &[
    "doc",
    "--no-deps",
    "-p",
    "platform",
    "-p",
    "task-timer",
    "--features",
    "task-timer/std",
];

pub fn run() -> Result<()> {
    println!();
    println!("{}", "🔍 Checking timer crates...".cyan().bold());
    println!();

    let total_start = Instant::now();
    for step in STEPS {
        run_step(step)?;
    }
    finished("checks", total_start);
    Ok(())
}

pub fn doc(open: bool) -> Result<()> {
    println!();
    println!("{}", "📚 Building documentation...".cyan().bold());
    println!();

    let total_start = Instant::now();
    let mut args = DOC_ARGS.to_vec();
    if open {
        args.push("--open");
    }
    run_step(&Step {
        label: "rustdoc (platform, task-timer)",
        args: &args,
        required: true,
    })?;
    if !open {
        println!(
            "   {}",
            "Output: target/doc/task_timer/index.html (or pass --open)".dimmed()
        );
        println!();
    }
    finished("documentation", total_start);
    Ok(())
}

fn run_step(step: &Step<'_>) -> Result<()> {
    println!("{}", format!("  Running {}...", step.label).cyan());
    let start = Instant::now();
    let output = cargo(step.args).with_context(|| format!("Failed to run {}", step.label))?;

    if output.status.success() {
        println!(
            "{}",
            format!(
                "  ✓ {} passed in {:.2}s",
                step.label,
                start.elapsed().as_secs_f64()
            )
            .green()
        );
    } else if step.required {
        eprintln!("{}", format!("  ✗ {} failed", step.label).red().bold());
        eprintln!();
        eprintln!("{}", String::from_utf8_lossy(&output.stderr));
        anyhow::bail!("{} failed", step.label);
    } else {
        // Advisory steps report but never fail the task.
        eprintln!("{}", format!("  ⚠ {} reported issues", step.label).yellow().bold());
        eprintln!();
        eprintln!("{}", String::from_utf8_lossy(&output.stderr));
    }
    println!();
    Ok(())
}

fn finished(what: &str, since: Instant) {
    println!(
        "{}",
        format!("✓ All {what} completed in {:.2}s", since.elapsed().as_secs_f64())
            .green()
            .bold()
    );
    println!();
}

fn cargo(args: &[&str]) -> std::io::Result<Output> {
    Command::new("cargo").args(args).output()
}
