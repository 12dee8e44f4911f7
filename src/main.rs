use clap::Parser;
use dvrvault::cli::{Cli, Commands};
use dvrvault::{Config, run};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = if cli.command == Some(Commands::Init) {
        Config::default()
    } else {
        Config::load_with_override(cli.config.as_deref())?
    };
    let worker_threads = config.general.worker_threads;

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();

    if worker_threads > 0 {
        builder.worker_threads(worker_threads);
    }

    let runtime = builder.build()?;
    runtime.block_on(run(cli, config))
}
