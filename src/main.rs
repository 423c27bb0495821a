use anyhow::Result;
use cbir::cli::SubCommandExtend;
use cbir::config::{Opts, SubCommand};
use clap::Parser;
use env_logger::Env;

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();
    if let Some(threads) = opts.threads {
        rayon::ThreadPoolBuilder::new().num_threads(threads).build_global()?;
    }

    match &opts.subcmd {
        SubCommand::Extract(config) => config.run(&opts),
        SubCommand::Query(config) => config.run(&opts),
        SubCommand::Compare(config) => config.run(&opts),
    }
}
