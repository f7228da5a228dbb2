use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use puttymux::{logging, App, Config, Multiplexer, ProcessLauncher, Puttygen, SelectBox};

#[derive(Parser, Debug)]
#[command(
    name = "puttymux",
    version,
    about = "Fuzzy PuTTY session launcher for tmux"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// PuTTY registry export to read (overrides the config file)
    #[arg(short, long, env = "PUTTYMUX_EXPORT")]
    export: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Print the command for the chosen session without running it
    #[arg(long)]
    dry_run: bool,

    /// Print the session menu and exit
    #[arg(long)]
    list: bool,
}

fn run(cli: Cli) -> puttymux::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(export) = cli.export {
        config.export_path = export;
    }

    let converter = Puttygen::new(config.converter.program.clone(), config.converter_timeout());
    let mut app = App::new(
        config,
        SelectBox::new(),
        converter,
        ProcessLauncher,
        Multiplexer::from_env(),
    )
    .dry_run(cli.dry_run);

    if cli.list {
        for item in app.menu_items()? {
            println!("{}", item.label());
        }
        return Ok(());
    }

    let outcome = app.run()?;
    tracing::debug!(?outcome, "done");
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::setup_logging(cli.log_level.as_deref());

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
