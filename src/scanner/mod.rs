//! BLE advertisement scanning.
//!
//! This module provides a common entry point over different Bluetooth
//! scanning backends. Every backend turns what it receives into
//! [`Advertisement`] values and pushes them through a channel until the
//! cancellation token given to [`start_scan`] fires.

#[cfg(feature = "bluer")]
pub mod bluer;

#[cfg(feature = "hci")]
pub mod hci;

use crate::advertisement::Advertisement;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Error type for scanner operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// The backend stopped delivering advertisements without being cancelled
    #[error("advertisement stream closed unexpectedly")]
    StreamClosed,
}

/// Convenience alias for received advertisements or transport errors.
pub type AdvertisementResult = Result<Advertisement, ScanError>;

/// Channel buffer size for received advertisements.
pub const ADVERTISEMENT_CHANNEL_BUFFER_SIZE: usize = 100;

/// Available scanner backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// BlueZ D-Bus backend (requires bluetoothd daemon)
    #[cfg(feature = "bluer")]
    Bluer,
    /// Raw HCI socket backend (direct kernel access, no daemon required)
    #[cfg(feature = "hci")]
    Hci,
}

impl Default for Backend {
    fn default() -> Self {
        #[cfg(feature = "bluer")]
        return Backend::Bluer;
        #[cfg(all(feature = "hci", not(feature = "bluer")))]
        return Backend::Hci;
        #[cfg(not(any(feature = "bluer", feature = "hci")))]
        compile_error!("At least one backend feature must be enabled");
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "bluer")]
            Backend::Bluer => write!(f, "bluer"),
            #[cfg(feature = "hci")]
            Backend::Hci => write!(f, "hci"),
            #[cfg(not(any(feature = "bluer", feature = "hci")))]
            _ => unreachable!("Backend enum has no variants when no backend features are enabled"),
        }
    }
}

/// Start scanning for advertisements using the specified backend.
///
/// Adapter setup failures are returned directly. Once running, the backend
/// forwards every advertisement it sees (duplicates included) until `cancel`
/// fires or the receiver is dropped, then releases the radio.
pub async fn start_scan(
    backend: Backend,
    cancel: CancellationToken,
) -> Result<mpsc::Receiver<AdvertisementResult>, ScanError> {
    log::debug!("starting {backend} scan");
    match backend {
        #[cfg(feature = "bluer")]
        Backend::Bluer => bluer::start_scan(cancel).await,
        #[cfg(feature = "hci")]
        Backend::Hci => hci::start_scan(cancel).await,
    }
}
