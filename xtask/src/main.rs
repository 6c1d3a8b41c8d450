mod build;
mod run;

use clap::Parser;

#[derive(Debug, Parser)]
pub struct Options {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Parser)]
enum Command {
    /// Build the XDP capture program
    BuildEbpf(build::Options),
    /// Build everything and run the agent
    Run(run::Options),
}

fn main() {
    let opts = Options::parse();

    let ret = match opts.command {
        Command::BuildEbpf(opts) => build::build_ebpf(&opts),
        Command::Run(opts) => run::run(opts),
    };

    if let Err(e) = ret {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}
