use clap::Parser;
use entity_list::args::{Args, Command};
use entity_list::{commands, Config, Mode, Result};
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e}");
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().elist_home().path();
    let scope = args.common().scope();

    // This allows for running the program without a REST server. When ELIST_IN_TEST_MODE is set
    // and non-zero in length, then the mode will be Mode::Testing, otherwise it will be Mode::Rest.
    let mode = Mode::from_env();

    let _: () = match args.command() {
        Command::Init(init_args) => commands::init(home, init_args).await?.print(),

        Command::List(list_args) => {
            let list = commands::open(&Config::load(home).await?, mode, scope)?;
            commands::list(list, list_args.clone()).await?.print()
        }

        Command::Add(add_args) => {
            let list = commands::open(&Config::load(home).await?, mode, scope)?;
            commands::add(list, add_args.clone()).await?.print()
        }

        Command::Update(update_args) => {
            let list = commands::open(&Config::load(home).await?, mode, scope)?;
            commands::update(list, update_args.clone()).await?.print()
        }

        Command::Delete(delete_args) => {
            let list = commands::open(&Config::load(home).await?, mode, scope)?;
            commands::delete(list, delete_args.clone()).await?.print()
        }

        Command::Show(show_args) => {
            let list = commands::open(&Config::load(home).await?, mode, scope)?;
            commands::show(list, show_args.clone()).await?.print()
        }
    };
    Ok(())
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use default log level for this crate only.
            EnvFilter::new(format!(
                "entity_list={},{}={}",
                level,
                env!("CARGO_BIN_NAME"),
                level
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
