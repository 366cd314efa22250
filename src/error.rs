//! Error handling for tuner.
//!
//! Two layers of errors exist:
//!
//! * [`struct@Error`] with an [`ErrorKind`] for everything that can go wrong
//!   while talking to the network, the audio device or the file system.
//!   These follow gRPC status code categories so that callers can branch on
//!   the kind of failure instead of on the concrete source.
//! * [`PlaybackError`] for the failures that the playback engine publishes in
//!   the session state. User interfaces render these; they are never thrown
//!   at them.
//!
//! # Example
//!
//! ```rust
//! use tuner::error::{Error, ErrorKind, Result};
//!
//! fn station_file(path: &str) -> Result<String> {
//!     if path.is_empty() {
//!         return Err(Error::invalid_argument("no station file given"));
//!     }
//!
//!     // Standard errors convert with `?`.
//!     let contents = std::fs::read_to_string(path)?;
//!     Ok(contents)
//! }
//! ```

#![allow(clippy::enum_glob_use)]

use std::{fmt, time::Duration};
use thiserror::Error;

/// Main error type combining error kind and details.
#[derive(Debug)]
pub struct Error {
    /// Classification of the error
    pub kind: ErrorKind,

    /// Details of the underlying error
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

/// Standard result type for tuner operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories based on gRPC status codes.
///
/// See [gRPC status codes](https://github.com/googleapis/googleapis/blob/master/google/rpc/code.proto)
/// for the original definitions.
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u32)]
pub enum ErrorKind {
    #[error("operation was cancelled")]
    Cancelled = 1,

    #[error("unknown error")]
    Unknown = 2,

    #[error("invalid argument specified")]
    InvalidArgument = 3,

    #[error("operation timed out")]
    DeadlineExceeded = 4,

    #[error("not found")]
    NotFound = 5,

    #[error("permission denied")]
    PermissionDenied = 7,

    #[error("resource has been exhausted")]
    ResourceExhausted = 8,

    #[error("invalid state")]
    FailedPrecondition = 9,

    #[error("operation aborted")]
    Aborted = 10,

    #[error("not implemented")]
    Unimplemented = 12,

    #[error("internal error")]
    Internal = 13,

    #[error("service unavailable")]
    Unavailable = 14,

    #[error("unrecoverable data loss or corruption")]
    DataLoss = 15,
}

/// Generates one constructor per [`ErrorKind`].
macro_rules! constructors {
    ($($(#[$doc:meta])* $name:ident => $kind:ident,)*) => {
        $(
            $(#[$doc])*
            pub fn $name<E>(error: E) -> Self
            where
                E: Into<Box<dyn std::error::Error + Send + Sync>>,
            {
                Self::new(ErrorKind::$kind, error)
            }
        )*
    };
}

impl Error {
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
        }
    }

    constructors! {
        aborted => Aborted,
        /// For example a load that was superseded by another station.
        cancelled => Cancelled,
        /// For example a stream that cannot be decoded.
        data_loss => DataLoss,
        deadline_exceeded => DeadlineExceeded,
        /// For example calling `play` on an output without a source.
        failed_precondition => FailedPrecondition,
        internal => Internal,
        invalid_argument => InvalidArgument,
        not_found => NotFound,
        permission_denied => PermissionDenied,
        resource_exhausted => ResourceExhausted,
        /// For example a stream host that refuses connections.
        unavailable => Unavailable,
        unimplemented => Unimplemented,
        unknown => Unknown,
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

/// Formats the error as `"{kind}: {details}"`.
impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: ", self.kind)?;
        self.error.fmt(fmt)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match err.kind() {
            NotFound => Self::not_found(err),
            PermissionDenied => Self::permission_denied(err),
            AddrNotAvailable | ConnectionRefused | NotConnected => Self::unavailable(err),
            BrokenPipe | ConnectionReset | ConnectionAborted => Self::aborted(err),
            Interrupted | WouldBlock => Self::cancelled(err),
            UnexpectedEof => Self::data_loss(err),
            TimedOut => Self::deadline_exceeded(err),
            InvalidInput | InvalidData => Self::invalid_argument(err),
            WriteZero => Self::resource_exhausted(err),
            _ => Self::unknown(err),
        }
    }
}

/// Maps HTTP client errors by their nature:
/// * Body errors -> `DataLoss`
/// * Decode errors -> `InvalidArgument`
/// * Connect and redirect errors -> `Unavailable`
/// * Status errors -> `FailedPrecondition`
/// * Timeout errors -> `DeadlineExceeded`
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_body() {
            return Self::data_loss(err);
        }

        if err.is_decode() {
            return Self::invalid_argument(err);
        }

        if err.is_builder() {
            return Self::internal(err);
        }

        if err.is_connect() || err.is_redirect() {
            return Self::unavailable(err);
        }

        if err.is_status() {
            return Self::failed_precondition(err);
        }

        if err.is_timeout() {
            return Self::deadline_exceeded(err);
        }

        Self::unknown(err)
    }
}

/// Converts JSON errors through IO error mapping.
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        std::io::Error::from(err).into()
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::invalid_argument(e)
    }
}

/// Stream URLs come from user-supplied station lists, so a parse failure is
/// an argument problem rather than an internal one.
impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::invalid_argument(e)
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        Self::deadline_exceeded(e.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_cancelled() {
            Self::cancelled(e.to_string())
        } else {
            Self::internal(e.to_string())
        }
    }
}

impl<T> From<std::sync::PoisonError<std::sync::MutexGuard<'_, T>>> for Error {
    fn from(e: std::sync::PoisonError<std::sync::MutexGuard<'_, T>>) -> Self {
        Self::internal(e.to_string())
    }
}

impl<S> From<stream_download::StreamInitializationError<S>> for Error
where
    S: stream_download::source::SourceStream,
{
    fn from(e: stream_download::StreamInitializationError<S>) -> Self {
        Self::unavailable(e.to_string())
    }
}

/// Maps HTTP stream errors:
/// * `FetchFailure` -> `Unavailable`
/// * `ResponseFailure` -> `DataLoss`
impl<C> From<stream_download::http::HttpStreamError<C>> for Error
where
    C: stream_download::http::Client,
{
    fn from(e: stream_download::http::HttpStreamError<C>) -> Self {
        use stream_download::http::HttpStreamError::*;
        match e {
            FetchFailure(e) => Self::unavailable(e.to_string()),
            ResponseFailure(e) => Self::data_loss(e.to_string()),
        }
    }
}

impl From<rodio::StreamError> for Error {
    fn from(e: rodio::StreamError) -> Self {
        use rodio::StreamError::*;
        match e {
            NoDevice => Self::not_found(e),
            _ => Self::unavailable(e.to_string()),
        }
    }
}

impl From<rodio::PlayError> for Error {
    fn from(e: rodio::PlayError) -> Self {
        use rodio::PlayError::*;
        match e {
            DecoderError(e) => e.into(),
            NoDevice => Self::not_found(e),
        }
    }
}

/// Maps decoder errors:
/// * `UnrecognizedFormat` -> `Unimplemented`
/// * Others -> `DataLoss`
impl From<rodio::decoder::DecoderError> for Error {
    fn from(e: rodio::decoder::DecoderError) -> Self {
        use rodio::decoder::DecoderError::*;
        match e {
            UnrecognizedFormat => Self::unimplemented(e.to_string()),
            _ => Self::data_loss(e.to_string()),
        }
    }
}

/// A failure published in the playback session.
///
/// Each variant names the station it concerns so that a user interface can
/// show "unable to play {station}" without keeping its own bookkeeping.
#[derive(Clone, Debug, Error, PartialEq, Eq, Hash)]
pub enum PlaybackError {
    /// The station has no usable stream URL. Nothing was attempted.
    #[error("{station} has no playable stream")]
    NoCandidates { station: String },

    /// Every candidate stream was tried and none started playing.
    #[error("unable to play {station} ({attempts} streams tried)")]
    AllCandidatesFailed { station: String, attempts: usize },

    /// Playback was established but the stream could not be recovered after
    /// it stalled.
    #[error("lost the stream of {station} after {retries} reconnection attempts")]
    StreamLost { station: String, retries: u32 },
}

/// Why a single candidate did not start playing.
///
/// These are recovered from locally by advancing to the next candidate and
/// are only logged.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CandidateFailure {
    #[error("not ready within {0:?}")]
    Timeout(Duration),

    #[error("failed to load: {0}")]
    Load(String),

    #[error("failed to start: {0}")]
    Play(String),

    #[error("rejected by stream verification")]
    Rejected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_kinds() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind, ErrorKind::NotFound);

        let err: Error = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow").into();
        assert_eq!(err.kind, ErrorKind::DeadlineExceeded);
    }

    #[test]
    fn display_includes_kind_and_details() {
        let err = Error::unavailable("host refused connection");
        assert_eq!(
            err.to_string(),
            "service unavailable: host refused connection"
        );
    }

    #[test]
    fn playback_errors_name_the_station() {
        let err = PlaybackError::AllCandidatesFailed {
            station: "Radio Veritas".to_owned(),
            attempts: 2,
        };
        assert_eq!(err.to_string(), "unable to play Radio Veritas (2 streams tried)");
    }
}
