//! Build automation tasks for the alarm portal.
//!
//! Run with: `cargo xtask <command>`

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use std::process::{Command, ExitCode};

/// Firmware images under `demos/`.
const FIRMWARE: [&str; 1] = ["alarm_portal"];

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation for the alarm portal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all checks: build lib and firmware, run host tests, generate docs
    CheckAll,
    /// Build library with specified features
    Build {
        #[arg(long, default_value = "pico1")]
        board: Board,
        #[arg(long, default_value = "arm")]
        arch: Arch,
        #[arg(long)]
        wifi: bool,
    },
    /// Build a firmware image
    Example {
        #[arg(default_value = "alarm_portal")]
        name: String,
        #[arg(long, default_value = "pico1")]
        board: Board,
        #[arg(long, default_value = "arm")]
        arch: Arch,
        #[arg(long)]
        wifi: bool,
    },
    /// Build UF2 firmware file for flashing to Pico
    Uf2 {
        #[arg(default_value = "alarm_portal")]
        name: String,
        #[arg(long, default_value = "pico1")]
        board: Board,
        #[arg(long, default_value = "arm")]
        arch: Arch,
        #[arg(long)]
        wifi: bool,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Board {
    Pico1,
    Pico2,
}

impl std::fmt::Display for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Board::Pico1 => write!(f, "pico1"),
            Board::Pico2 => write!(f, "pico2"),
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Arch {
    Arm,
    Riscv,
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arch::Arm => write!(f, "arm"),
            Arch::Riscv => write!(f, "riscv"),
        }
    }
}

impl Arch {
    fn target(&self, board: Board) -> &'static str {
        match (board, self) {
            (Board::Pico1, Arch::Arm) => "thumbv6m-none-eabi",
            (Board::Pico2, Arch::Arm) => "thumbv8m.main-none-eabihf",
            (Board::Pico2, Arch::Riscv) => "riscv32imac-unknown-none-elf",
            (Board::Pico1, Arch::Riscv) => panic!("Pico 1 does not support RISC-V"),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::CheckAll => check_all(),
        Commands::Build { board, arch, wifi } => build_lib(board, arch, wifi),
        Commands::Example {
            name,
            board,
            arch,
            wifi,
        } => build_example(&name, board, arch, wifi),
        Commands::Uf2 {
            name,
            board,
            arch,
            wifi,
        } => build_uf2(&name, board, arch, wifi),
    }
}

fn check_all() -> ExitCode {
    let workspace_root = workspace_root();
    // The Pico W is an RP2040 board.
    let board = Board::Pico1;
    let arch = Arch::Arm;
    let target = arch.target(board);
    let features_no_wifi = build_features(board, arch, false);
    let features_wifi = build_features(board, arch, true);

    println!("{}", "==> Building library (no wifi)...".cyan());
    if !cargo_for_target(
        &workspace_root,
        &["build", "--lib"],
        target,
        &features_no_wifi,
    ) {
        return ExitCode::FAILURE;
    }

    println!("\n{}", "==> Building library (wifi)...".cyan());
    if !cargo_for_target(
        &workspace_root,
        &["build", "--lib"],
        target,
        &features_wifi,
    ) {
        return ExitCode::FAILURE;
    }

    println!("\n{}", "==> Building firmware...".cyan());
    for example in FIRMWARE {
        println!("  {}", format!("- {example}").bright_black());
        if !cargo_for_target(
            &workspace_root,
            &["build", "--example", example],
            target,
            &features_wifi,
        ) {
            return ExitCode::FAILURE;
        }
    }

    println!("\n{}", "==> Running host tests...".cyan());
    let host_target = host_target();
    match host_target.as_deref() {
        Some(target) => {
            println!(
                "  {}",
                format!("Using host target: {target}").bright_black()
            );
        }
        None => {
            println!(
                "{}",
                "  Unable to detect host target; relying on cargo default.".bright_black()
            );
        }
    }

    let mut host_test_cmd = Command::new("cargo");
    host_test_cmd
        .current_dir(&workspace_root)
        .args(["test", "--tests"]);

    if let Some(target) = host_target {
        host_test_cmd.arg("--target").arg(target);
    }

    host_test_cmd.args(["--no-default-features", "--features", "host"]);

    if !run_command(&mut host_test_cmd) {
        return ExitCode::FAILURE;
    }

    println!("\n{}", "==> Building documentation...".cyan());
    if !cargo_for_target(
        &workspace_root,
        &["doc", "--no-deps"],
        target,
        &features_wifi,
    ) {
        return ExitCode::FAILURE;
    }

    println!("\n{}", "==> All checks passed!".green().bold());
    ExitCode::SUCCESS
}

/// Runs `cargo <args> --target <target> --features <features> --no-default-features`.
fn cargo_for_target(
    workspace_root: &std::path::Path,
    args: &[&str],
    target: &str,
    features: &str,
) -> bool {
    run_command(
        Command::new("cargo")
            .current_dir(workspace_root)
            .args(args)
            .args(["--target", target])
            .args(["--features", features, "--no-default-features"]),
    )
}

fn build_lib(board: Board, arch: Arch, wifi: bool) -> ExitCode {
    let workspace_root = workspace_root();
    let target = arch.target(board);
    let features = build_features(board, arch, wifi);
    println!(
        "{}",
        format!("Building library with features: {features}").cyan()
    );

    if cargo_for_target(&workspace_root, &["build", "--lib"], target, &features) {
        println!("{}", "Build successful!".green());
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn build_example(name: &str, board: Board, arch: Arch, wifi: bool) -> ExitCode {
    let workspace_root = workspace_root();
    let target = arch.target(board);
    let features = build_features(board, arch, wifi);
    println!(
        "{}",
        format!("Building firmware '{name}' with features: {features}").cyan()
    );

    if cargo_for_target(
        &workspace_root,
        &["build", "--example", name],
        target,
        &features,
    ) {
        println!("{}", "Build successful!".green());
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn build_uf2(name: &str, board: Board, arch: Arch, wifi: bool) -> ExitCode {
    let workspace_root = workspace_root();
    let target = arch.target(board);
    let features = build_features(board, arch, wifi);

    println!(
        "{}",
        format!("Building UF2 for '{name}' ({board}/{arch})").cyan()
    );
    println!("  Features: {}", features.bright_black());
    println!("  Target: {}", target.bright_black());

    // Build in release mode for UF2
    if !cargo_for_target(
        &workspace_root,
        &["build", "--example", name, "--release"],
        target,
        &features,
    ) {
        return ExitCode::FAILURE;
    }

    // Convert to UF2 using elf2uf2-rs
    let elf_path = format!("target/{target}/release/examples/{name}");
    let uf2_path = format!("{name}.uf2");

    println!("\n{}", "Converting to UF2 format...".cyan());

    if run_command(
        Command::new("elf2uf2-rs")
            .current_dir(&workspace_root)
            .args([&elf_path, &uf2_path]),
    ) {
        println!("{}", format!("UF2 created: {uf2_path}").green().bold());
        println!(
            "{}",
            "Hold BOOTSEL, plug in the Pico W and copy the file over.".bright_black()
        );
        ExitCode::SUCCESS
    } else {
        println!(
            "{}",
            "Note: Install elf2uf2-rs with: cargo install elf2uf2-rs".yellow()
        );
        ExitCode::FAILURE
    }
}

fn build_features(board: Board, arch: Arch, wifi: bool) -> String {
    let mut features = vec![board.to_string(), arch.to_string()];
    if wifi {
        features.push("wifi".to_string());
    }
    features.join(",")
}

fn workspace_root() -> std::path::PathBuf {
    // `cargo xtask` runs from the workspace root.
    std::env::current_dir().expect("Failed to get current directory")
}

fn host_target() -> Option<String> {
    let output = Command::new("rustc").arg("-vV").output().ok()?;
    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines() {
        if let Some(host) = line.strip_prefix("host: ") {
            return Some(host.trim().to_string());
        }
    }
    None
}

fn run_command(cmd: &mut Command) -> bool {
    match cmd.status() {
        Ok(status) => status.success(),
        Err(e) => {
            eprintln!("{}", format!("Failed to execute command: {e}").red());
            false
        }
    }
}
