//! Core application runner (business logic) for `switchbot-meter`.
//!
//! This module is intentionally decoupled from process exit codes, signal
//! handling and the real radio so it can be tested deterministically with an
//! injected scanner, interrupt future and output stream.

use crate::advertisement::Advertisement;
use crate::config::{ConfigError, parse_address};
use crate::decoder::{self, DecodeError};
use crate::duration::parse_duration;
use crate::filter;
use crate::mac_address::MacAddress;
use crate::measurement::Measurement;
use crate::output::{OutputFormat, OutputFormatter};
use crate::scanner::{AdvertisementResult, Backend, ScanError};
use clap::{Args, Parser, Subcommand};
use log::{debug, info};
use std::future::Future;
use std::io;
use std::io::Write;
use std::pin::Pin;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Read a SwitchBot Meter from its BLE advertisements.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Cli {
    /// Verbose output, log scanner activity to stderr
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Retrieve the temperature and humidity from the meter and print them
    Get(GetOptions),
    /// Print every advertisement seen for a while.
    ///
    /// Press Ctrl-C to stop early.
    Scan(ScanOptions),
}

/// Configuration for a single `get` invocation.
#[derive(Args, Debug, Clone)]
pub struct GetOptions {
    /// Bluetooth device address of the meter, e.g. e1:2f:3a:4b:5c:6d
    #[arg(short = 'a', long, value_parser = parse_address)]
    pub address: MacAddress,

    /// Scanning timeout: 500ms, 5s, 1m30s, ...
    #[arg(short = 't', long, default_value = "5s", value_parser = parse_duration)]
    pub timeout: Duration,

    /// Output format
    #[arg(short = 'f', long, default_value_t, value_enum)]
    pub format: OutputFormat,

    /// Bluetooth scanner backend to use
    #[arg(long, default_value_t, value_enum)]
    pub backend: Backend,
}

impl GetOptions {
    /// Build options from plain strings, validating them before any scan.
    pub fn new(address: &str, timeout: Duration, format: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            address: parse_address(address)?,
            timeout,
            format: format.parse()?,
            backend: Backend::default(),
        })
    }
}

/// Configuration for the discovery mode.
#[derive(Args, Debug, Clone)]
pub struct ScanOptions {
    /// Scanning duration: 500ms, 5s, 1m30s, ...
    #[arg(short = 'd', long, default_value = "5s", value_parser = parse_duration)]
    pub duration: Duration,

    /// Bluetooth scanner backend to use
    #[arg(long, default_value_t, value_enum)]
    pub backend: Backend,
}

/// Errors returned by the runners.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Future returned by [`Scanner::start_scan`].
pub type StartScan<'a> = Pin<
    Box<dyn Future<Output = Result<mpsc::Receiver<AdvertisementResult>, ScanError>> + Send + 'a>,
>;

/// Scanner abstraction to enable deterministic unit tests without Bluetooth hardware.
///
/// Implementations must keep the channel open until `cancel` fires; a closed
/// channel before that is reported as a transport failure.
pub trait Scanner: Send + Sync {
    fn start_scan(&self, backend: Backend, cancel: CancellationToken) -> StartScan<'_>;
}

/// Real scanner implementation that delegates to the compiled-in backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealScanner;

impl Scanner for RealScanner {
    fn start_scan(&self, backend: Backend, cancel: CancellationToken) -> StartScan<'_> {
        Box::pin(crate::scanner::start_scan(backend, cancel))
    }
}

/// Lifecycle of a `get` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    Captured,
    TimedOut,
    Cancelled,
    Failed,
}

/// How a `get` invocation ended, when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The meter was found; its reading has been written out.
    Captured(Measurement),
    /// The deadline passed without a matching advertisement.
    TimedOut,
    /// The operator interrupted the scan.
    Cancelled,
}

/// State shared between whoever delivers advertisements and the runner.
///
/// [`ScanSession::offer`] may be called concurrently and repeatedly; only the
/// first accepted advertisement is decoded; later callers return at once.
#[derive(Debug)]
pub struct ScanSession {
    target: MacAddress,
    cancel: CancellationToken,
    captured: AtomicBool,
    result: OnceLock<Result<Measurement, DecodeError>>,
}

impl ScanSession {
    pub fn new(target: MacAddress, cancel: CancellationToken) -> Self {
        Self {
            target,
            cancel,
            captured: AtomicBool::new(false),
            result: OnceLock::new(),
        }
    }

    /// Offer an advertisement to the session.
    ///
    /// Returns `true` only for the call that performed the capture. That call
    /// decodes the payload, stores the result and cancels the scan.
    pub fn offer(&self, event: &Advertisement) -> bool {
        if !filter::accepts(event, &self.target) {
            return false;
        }
        if self
            .captured
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let payload = event.first_service_data().unwrap_or_default();
        let _ = self.result.set(decoder::decode(payload));
        self.cancel.cancel();
        true
    }

    /// The captured reading, once [`offer`](Self::offer) has returned `true`.
    pub fn result(&self) -> Option<&Result<Measurement, DecodeError>> {
        self.result.get()
    }

    pub fn is_captured(&self) -> bool {
        self.captured.load(Ordering::Acquire)
    }
}

fn write_measurement(
    formatter: &dyn OutputFormatter,
    measurement: &Measurement,
    out: &mut dyn Write,
) -> io::Result<()> {
    let text = formatter.format(measurement);
    writeln!(out, "{text}")
}

/// Scan for the configured meter and write its reading to `out`.
///
/// Ends on the first matching advertisement, when `options.timeout` elapses,
/// or when `interrupt` resolves, whichever comes first. Transport errors are
/// returned as [`RunError::Scan`].
pub async fn run_get(
    options: GetOptions,
    scanner: &dyn Scanner,
    interrupt: impl Future<Output = ()>,
    out: &mut dyn Write,
) -> Result<Outcome, RunError> {
    let formatter = options.format.formatter();
    let cancel = CancellationToken::new();
    let mut state = ScanState::Idle;

    let mut advertisements = scanner.start_scan(options.backend, cancel.clone()).await?;
    let session = ScanSession::new(options.address, cancel.clone());
    info!(
        "scanning for {} (timeout {:?})",
        options.address, options.timeout
    );
    debug!("scan state: {state:?} -> {:?}", ScanState::Scanning);
    state = ScanState::Scanning;

    let deadline = tokio::time::sleep(options.timeout);
    tokio::pin!(deadline);
    tokio::pin!(interrupt);

    let mut failure = None;
    let terminal = loop {
        tokio::select! {
            biased;
            _ = &mut interrupt => break ScanState::Cancelled,
            _ = &mut deadline => break ScanState::TimedOut,
            received = advertisements.recv() => match received {
                Some(Ok(adv)) => {
                    if session.offer(&adv) {
                        break ScanState::Captured;
                    }
                }
                Some(Err(e)) => {
                    failure = Some(e);
                    break ScanState::Failed;
                }
                None => {
                    failure = Some(ScanError::StreamClosed);
                    break ScanState::Failed;
                }
            }
        }
    };
    cancel.cancel();
    debug!("scan state: {state:?} -> {terminal:?}");

    match terminal {
        ScanState::Captured => {
            let measurement = match session.result() {
                Some(Ok(measurement)) => *measurement,
                Some(Err(e)) => return Err(e.clone().into()),
                None => return Err(ScanError::StreamClosed.into()),
            };
            write_measurement(formatter.as_ref(), &measurement, out)?;
            Ok(Outcome::Captured(measurement))
        }
        ScanState::TimedOut => Ok(Outcome::TimedOut),
        ScanState::Cancelled => Ok(Outcome::Cancelled),
        ScanState::Idle | ScanState::Scanning | ScanState::Failed => {
            Err(failure.unwrap_or(ScanError::StreamClosed).into())
        }
    }
}

/// Write a summary line for every advertisement seen until `options.duration`
/// elapses or `interrupt` resolves. Both are clean terminations.
pub async fn run_scan(
    options: ScanOptions,
    scanner: &dyn Scanner,
    interrupt: impl Future<Output = ()>,
    out: &mut dyn Write,
) -> Result<(), RunError> {
    let cancel = CancellationToken::new();
    let mut advertisements = scanner.start_scan(options.backend, cancel.clone()).await?;
    info!("scanning for {:?}", options.duration);

    let deadline = tokio::time::sleep(options.duration);
    tokio::pin!(deadline);
    tokio::pin!(interrupt);

    let result = loop {
        tokio::select! {
            biased;
            _ = &mut interrupt => break Ok(()),
            _ = &mut deadline => break Ok(()),
            received = advertisements.recv() => match received {
                Some(Ok(adv)) => {
                    if let Err(e) = writeln!(out, "{adv}") {
                        break Err(e.into());
                    }
                }
                Some(Err(e)) => break Err(e.into()),
                None => break Err(ScanError::StreamClosed.into()),
            }
        }
    };
    cancel.cancel();
    result
}
