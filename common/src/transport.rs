use std::future::Future;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;

/// Payload pushed by the device on a subscribed characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub uuid: String,
    pub payload: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("timed out")]
    Timeout,
    #[error("not connected")]
    Disconnected,
    #[error("{0}")]
    Failed(String),
}

/// GATT access to one device. Connection handling, pairing and notification
/// delivery belong to the implementation.
pub trait Transport: Send + Sync {
    fn read_characteristic(
        &self,
        uuid: &str,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;

    fn write_characteristic(
        &self,
        uuid: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Starts delivering notifications of `uuid` into `inbox`.
    fn subscribe(
        &self,
        uuid: &str,
        inbox: mpsc::Sender<Notification>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
