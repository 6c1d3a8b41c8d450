use std::process::Command;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};

/// Crates compiled for the BPF target.
const EBPF_PACKAGES: &[&str] = &["netevent-ebpf"];

const AGENT_PACKAGE: &str = "netevent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BpfTarget {
    #[value(name = "bpfel-unknown-none")]
    BpfEl,
    #[value(name = "bpfeb-unknown-none")]
    BpfEb,
}

impl BpfTarget {
    pub fn triple(self) -> &'static str {
        match self {
            BpfTarget::BpfEl => "bpfel-unknown-none",
            BpfTarget::BpfEb => "bpfeb-unknown-none",
        }
    }
}

#[derive(Debug, Parser)]
pub struct Options {
    /// Endianness of the BPF target
    #[clap(long, value_enum, default_value_t = BpfTarget::BpfEl)]
    pub target: BpfTarget,
    /// Build the release profile
    #[clap(long)]
    pub release: bool,
}

/// `cargo build` for one kernel crate. The kernel crates need `core`
/// rebuilt for the BPF target and must not inherit the host toolchain pin.
fn ebpf_command(package: &str, target: BpfTarget, release: bool) -> Command {
    let mut cmd = Command::new("cargo");
    cmd.env_remove("RUSTUP_TOOLCHAIN").args([
        "build",
        "--package",
        package,
        "--target",
        target.triple(),
        "-Z",
        "build-std=core",
    ]);
    if release {
        cmd.arg("--release");
    }
    cmd
}

fn agent_command(release: bool) -> Command {
    let mut cmd = Command::new("cargo");
    cmd.args(["build", "--package", AGENT_PACKAGE]);
    if release {
        cmd.arg("--release");
    }
    cmd
}

fn run_to_success(mut cmd: Command, what: &str) -> Result<(), anyhow::Error> {
    let status = cmd
        .status()
        .with_context(|| format!("failed to spawn cargo for {}", what))?;
    anyhow::ensure!(status.success(), "failed to build {}: {}", what, status);
    Ok(())
}

pub fn build_ebpf(opts: &Options) -> Result<(), anyhow::Error> {
    for package in EBPF_PACKAGES {
        run_to_success(ebpf_command(package, opts.target, opts.release), package)?;
    }
    Ok(())
}

pub fn build_agent(release: bool) -> Result<(), anyhow::Error> {
    run_to_success(agent_command(release), AGENT_PACKAGE)
}
