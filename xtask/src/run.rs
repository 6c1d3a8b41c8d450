use std::process::Command;

use anyhow::Context as _;
use clap::Parser;

use crate::build::{self, BpfTarget};

#[derive(Debug, Parser)]
pub struct Options {
    /// Endianness of the BPF target
    #[clap(long, value_enum, default_value_t = BpfTarget::BpfEl)]
    pub bpf_target: BpfTarget,
    /// Build and run the release profile
    #[clap(long)]
    pub release: bool,
    /// Command the agent runs under, it needs to load BPF programs
    #[clap(short, long, default_value = "sudo -E")]
    pub runner: String,
    /// Arguments to pass to the agent
    #[clap(last = true)]
    pub run_args: Vec<String>,
}

/// Builds the kernel object and the agent, then runs the agent through
/// `runner`.
pub fn run(opts: Options) -> Result<(), anyhow::Error> {
    build::build_ebpf(&build::Options {
        target: opts.bpf_target,
        release: opts.release,
    })?;
    build::build_agent(opts.release)?;

    let profile = if opts.release { "release" } else { "debug" };
    let bin_path = format!("target/{}/netevent", profile);

    let mut runner = opts.runner.split_whitespace();
    let program = runner.next().context("runner must not be empty")?;
    let status = Command::new(program)
        .args(runner)
        .arg(&bin_path)
        .args(&opts.run_args)
        .status()
        .with_context(|| format!("failed to run {}", bin_path))?;
    anyhow::ensure!(status.success(), "netevent exited with {}", status);
    Ok(())
}
