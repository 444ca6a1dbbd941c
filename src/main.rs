use slimbox::cli::commands::{CliArgs, Commands};
use slimbox::cli::handlers::{
    handle_build, handle_config, handle_inspect, handle_lock, handle_plan,
};
use slimbox::util::logging::{self, parse_level};
use slimbox::VERSION;

use clap::Parser;
use std::env;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("slimbox v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match args.command {
        Commands::Plan(plan_args) => handle_plan(plan_args).await,
        Commands::Lock(lock_args) => handle_lock(lock_args),
        Commands::Build(build_args) => handle_build(build_args, args.quiet).await,
        Commands::Inspect(inspect_args) => handle_inspect(inspect_args).await,
        Commands::Config(config_args) => handle_config(config_args),
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let mut config = logging::config_from_env(|key| env::var(key).ok());
    if let Some(level_str) = &args.log_level {
        config.level = parse_level(level_str);
    } else if args.verbose {
        config.level = Level::DEBUG;
    } else if args.quiet {
        config.level = Level::ERROR;
    }
    logging::init_logging(config);
}
