//! The error object threaded through every layer of the engine.
//!
//! # References
//!
//! * [RFC 8446 Section 6](https://datatracker.ietf.org/doc/html/rfc8446#section-6)

use core::panic::Location;

use crate::alert::AlertDescription;

/// A classified protocol failure.
///
/// Every variant except the last four corresponds 1:1 to an [`AlertDescription`]
/// that can be sent on the wire. The last four (`VerifyFailed`, `HrrFailed`,
/// `TrailingData`, `NoSharedCipher`) are internal-only codes that never appear
/// on the wire themselves; [`ErrorKind::wire_alert`] maps each to the closest
/// standard alert for transmission to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    UnexpectedMessage,
    BadRecordMac,
    RecordOverflow,
    HandshakeFailure,
    BadCertificate,
    UnsupportedCertificate,
    CertificateRevoked,
    CertificateExpired,
    UnknownCa,
    IllegalParameter,
    DecodeError,
    DecryptError,
    ProtocolVersion,
    InsufficientSecurity,
    InternalError,
    MissingExtension,
    UnsupportedExtension,
    UnrecognizedName,
    BadCertificateStatusResponse,
    UnknownPskIdentity,
    CertificateRequired,
    NoApplicationProtocol,
    /// A Finished message or PSK binder failed to verify.
    VerifyFailed,
    /// A HelloRetryRequest round could not produce an acceptable ClientHello'.
    HrrFailed,
    /// Bytes remained after a message that must consume its entire buffer.
    TrailingData,
    /// No cipher suite proposed by the peer is supported locally.
    NoSharedCipher,
}

impl ErrorKind {
    /// The fatal alert description that should be sent to the peer for this
    /// error, where one exists.
    pub const fn wire_alert(self) -> AlertDescription {
        match self {
            Self::UnexpectedMessage => AlertDescription::UnexpectedMessage,
            Self::BadRecordMac => AlertDescription::BadRecordMac,
            Self::RecordOverflow => AlertDescription::RecordOverflow,
            Self::HandshakeFailure => AlertDescription::HandshakeFailure,
            Self::BadCertificate => AlertDescription::BadCertificate,
            Self::UnsupportedCertificate => AlertDescription::UnsupportedCertificate,
            Self::CertificateRevoked => AlertDescription::CertificateRevoked,
            Self::CertificateExpired => AlertDescription::CertificateExpired,
            Self::UnknownCa => AlertDescription::UnknownCa,
            Self::IllegalParameter => AlertDescription::IllegalParameter,
            Self::DecodeError => AlertDescription::DecodeError,
            Self::DecryptError => AlertDescription::DecryptError,
            Self::ProtocolVersion => AlertDescription::ProtocolVersion,
            Self::InsufficientSecurity => AlertDescription::InsufficientSecurity,
            Self::InternalError => AlertDescription::InternalError,
            Self::MissingExtension => AlertDescription::MissingExtension,
            Self::UnsupportedExtension => AlertDescription::UnsupportedExtension,
            Self::UnrecognizedName => AlertDescription::UnrecognizedName,
            Self::BadCertificateStatusResponse => AlertDescription::BadCertificateStatusResponse,
            Self::UnknownPskIdentity => AlertDescription::UnknownPskIdentity,
            Self::CertificateRequired => AlertDescription::CertificateRequired,
            Self::NoApplicationProtocol => AlertDescription::NoApplicationProtocol,
            Self::VerifyFailed => AlertDescription::DecryptError,
            Self::HrrFailed => AlertDescription::IllegalParameter,
            Self::TrailingData => AlertDescription::DecodeError,
            Self::NoSharedCipher => AlertDescription::HandshakeFailure,
        }
    }
}

impl From<AlertDescription> for ErrorKind {
    fn from(desc: AlertDescription) -> Self {
        match desc {
            AlertDescription::CloseNotify => Self::UnexpectedMessage,
            AlertDescription::UnexpectedMessage => Self::UnexpectedMessage,
            AlertDescription::BadRecordMac => Self::BadRecordMac,
            AlertDescription::RecordOverflow => Self::RecordOverflow,
            AlertDescription::HandshakeFailure => Self::HandshakeFailure,
            AlertDescription::BadCertificate => Self::BadCertificate,
            AlertDescription::UnsupportedCertificate => Self::UnsupportedCertificate,
            AlertDescription::CertificateRevoked => Self::CertificateRevoked,
            AlertDescription::CertificateExpired => Self::CertificateExpired,
            AlertDescription::CertificateUnknown => Self::UnknownCa,
            AlertDescription::IllegalParameter => Self::IllegalParameter,
            AlertDescription::UnknownCa => Self::UnknownCa,
            AlertDescription::AccessDenied => Self::HandshakeFailure,
            AlertDescription::DecodeError => Self::DecodeError,
            AlertDescription::DecryptError => Self::DecryptError,
            AlertDescription::ProtocolVersion => Self::ProtocolVersion,
            AlertDescription::InsufficientSecurity => Self::InsufficientSecurity,
            AlertDescription::InternalError => Self::InternalError,
            AlertDescription::InappropriateFallback => Self::HandshakeFailure,
            AlertDescription::UserCanceled => Self::HandshakeFailure,
            AlertDescription::MissingExtension => Self::MissingExtension,
            AlertDescription::UnsupportedExtension => Self::UnsupportedExtension,
            AlertDescription::UnrecognizedName => Self::UnrecognizedName,
            AlertDescription::BadCertificateStatusResponse => Self::BadCertificateStatusResponse,
            AlertDescription::UnknownPskIdentity => Self::UnknownPskIdentity,
            AlertDescription::CertificateRequired => Self::CertificateRequired,
            AlertDescription::NoApplicationProtocol => Self::NoApplicationProtocol,
        }
    }
}

/// A protocol error with enough context to log and to report to the peer.
///
/// Constructed exactly once, at the point where a low-level parse or crypto
/// failure first becomes protocol-meaningful; never reconstructed as it is
/// propagated up through the engine.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind:?} at {file}:{line}: {message}")]
pub struct TlsError {
    pub kind: ErrorKind,
    pub file: &'static str,
    pub line: u32,
    pub message: String,
}

impl TlsError {
    #[track_caller]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let loc = Location::caller();
        let err = Self {
            kind,
            file: loc.file(),
            line: loc.line(),
            message: message.into(),
        };
        log::error!("{err}");
        err
    }
}

pub type Result<T> = core::result::Result<T, TlsError>;

/// Shorthand for constructing a [`TlsError`] at the call site, analogous to
/// `err_msg!`/`format_err!` helpers elsewhere in the corpus.
macro_rules! proto_err {
    ($kind:expr, $($arg:tt)*) => {
        $crate::error::TlsError::new($kind, format!($($arg)*))
    };
}

pub(crate) use proto_err;
