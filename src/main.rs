mod cli;
mod commands;

use clap::Parser;
use owo_colors::{OwoColorize, Stream::Stderr};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use cli::{Cli, Commands};

fn init_tracing(verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::builder()
            .with_default_directive(tracing::Level::WARN.into())
            .from_env_lossy()
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_filter(env_filter);
    tracing_subscriber::registry().with(stderr_layer).init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Init(args) => commands::init::run_init(cli.home, args),
        Commands::Whoami => commands::whoami::run_whoami(cli.home),
        Commands::Address => commands::address::run_address(cli.home),
        Commands::Store(args) => commands::store::run_store(cli.home, args),
        Commands::List(args) => commands::list::run_list(cli.home, args),
        Commands::Reveal(args) => commands::reveal::run_reveal(cli.home, args),
    };

    if let Err(e) = &result {
        if let Some(hint) = commands::failure_hint(e) {
            eprintln!("{}", hint.if_supports_color(Stderr, |t| t.yellow()));
        }
    }
    result
}
