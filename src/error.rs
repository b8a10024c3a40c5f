use derive_more::derive::{Display, Error};

/// A specialized `Result` where the error is this crate's `Error` type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Define a unified error type for this crate.
#[expect(missing_docs, reason = "The variants are self-explanatory.")]
#[derive(Debug, Display, Error)]
pub enum Error {
    // `#[error(not(source))]` below tells `derive_more` that `embassy_executor::SpawnError` does
    // not implement Rust's `core::error::Error` trait.
    #[cfg(not(feature = "host"))]
    #[display("{_0:?}")]
    TaskSpawn(#[error(not(source))] embassy_executor::SpawnError),

    #[display("SSID must be 1-32 bytes, got {len}")]
    InvalidSsid { len: usize },

    #[display("Passphrase must be 8-63 bytes, got {len}")]
    InvalidPassphrase { len: usize },

    #[display("Failed to bind UDP port {port}")]
    BindFailed { port: u16 },

    #[display("Failed to receive datagram")]
    ReceiveFailed,

    #[display("Failed to send datagram")]
    SendFailed,

    #[display("Datagram endpoint closed")]
    EndpointClosed,

    #[display("Unicast datagram could not be delivered")]
    Undeliverable,

    #[display("HTTP response headers exceed their buffer")]
    HeadersOverflow,

    #[display("HTTP response body exceeds its buffer")]
    BodyOverflow,

    #[display("No free connection slot")]
    NoFreeConnection,

    #[display("Status display error")]
    StatusDisplay,

    #[display("Service failed to start")]
    ServiceStart,
}

#[cfg(not(feature = "host"))]
impl From<embassy_executor::SpawnError> for Error {
    fn from(err: embassy_executor::SpawnError) -> Self {
        Self::TaskSpawn(err)
    }
}
