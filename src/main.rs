use anyhow::{Context, Result};
use clap::Parser;
use livecrab::backend::ReplayBackend;
use livecrab::config::Cli;
use livecrab::logging::init_logging;
use livecrab::session::Session;
use livecrab::{headless, tui};
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();
    let _guard = match init_logging(cli.logs_to_stdout(), &cli.log_file, cli.log_level) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e:?}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli) {
        error!(error = ?e, "livecrab exited with an error");
        eprintln!("Error: {e:?}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    info!(capture = ?cli.capture, tui = cli.tui, "Starting livecrab");
    let backend = ReplayBackend::new(cli.replay_options());
    let mut session = Session::with_mode(backend, cli.mode());
    session
        .apply_filter(&cli.filter)
        .with_context(|| format!("Invalid --filter {:?}", cli.filter))?;

    if cli.tui {
        return tui::run_tui(session);
    }

    headless::pump_until_finished(&mut session)?;
    let stdout = std::io::stdout();
    headless::print_view(&session, cli.limit, &mut stdout.lock())
}
