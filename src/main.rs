use clap::Parser;
use std::panic::{self, PanicHookInfo};
use switchbot_meter::app::{Cli, Command, Outcome, RealScanner, run_get, run_scan};

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;
const EXIT_TIMEOUT: i32 = 3;

/// Initialise `env_logger`; `RUST_LOG` overrides the level chosen by `-v`.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("interrupted");
}

async fn run(cli: Cli) -> i32 {
    let mut stdout = std::io::stdout();

    match cli.command {
        Command::Get(options) => {
            match run_get(options, &RealScanner, interrupted(), &mut stdout).await {
                Ok(Outcome::Captured(_)) | Ok(Outcome::Cancelled) => EXIT_SUCCESS,
                Ok(Outcome::TimedOut) => {
                    eprintln!("error: timed out");
                    EXIT_TIMEOUT
                }
                Err(why) => {
                    eprintln!("error: {why}");
                    EXIT_ERROR
                }
            }
        }
        Command::Scan(options) => {
            match run_scan(options, &RealScanner, interrupted(), &mut stdout).await {
                Ok(()) => EXIT_SUCCESS,
                Err(why) => {
                    eprintln!("error: failed to scan ble devices: {why}");
                    EXIT_ERROR
                }
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set up panic hook to ensure clean exit codes for scripts
    // that tell a missing meter apart from a crash
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    let cli = Cli::parse();
    init_logging(cli.verbose);

    std::process::exit(run(cli).await);
}
