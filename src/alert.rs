//! TLS alert protocol messages.
//!
//! # References
//!
//! * [RFC 8446 Section 6](https://datatracker.ietf.org/doc/html/rfc8446#section-6)

use crate::bytes::{ByteReader, ByteWriter};
use crate::error::{ErrorKind, Result, TlsError};

/// Alert level.
///
/// ```text
/// enum { warning(1), fatal(2), (255) } AlertLevel;
/// ```
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum AlertLevel {
    Warning = 1,
    Fatal = 2,
}

impl From<AlertLevel> for u8 {
    #[inline]
    fn from(level: AlertLevel) -> Self {
        level as u8
    }
}

impl TryFrom<u8> for AlertLevel {
    type Error = u8;

    fn try_from(value: u8) -> core::result::Result<Self, u8> {
        match value {
            x if x == Self::Warning as u8 => Ok(Self::Warning),
            x if x == Self::Fatal as u8 => Ok(Self::Fatal),
            _ => Err(value),
        }
    }
}

/// Alert description.
///
/// ```text
/// enum {
///     close_notify(0),
///     unexpected_message(10),
///     bad_record_mac(20),
///     record_overflow(22),
///     handshake_failure(40),
///     bad_certificate(42),
///     unsupported_certificate(43),
///     certificate_revoked(44),
///     certificate_expired(45),
///     certificate_unknown(46),
///     illegal_parameter(47),
///     unknown_ca(48),
///     access_denied(49),
///     decode_error(50),
///     decrypt_error(51),
///     protocol_version(70),
///     insufficient_security(71),
///     internal_error(80),
///     inappropriate_fallback(86),
///     user_canceled(90),
///     missing_extension(109),
///     unsupported_extension(110),
///     unrecognized_name(112),
///     bad_certificate_status_response(113),
///     unknown_psk_identity(115),
///     certificate_required(116),
///     no_application_protocol(120),
///     (255)
/// } AlertDescription;
/// ```
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum AlertDescription {
    CloseNotify = 0,
    UnexpectedMessage = 10,
    BadRecordMac = 20,
    RecordOverflow = 22,
    HandshakeFailure = 40,
    BadCertificate = 42,
    UnsupportedCertificate = 43,
    CertificateRevoked = 44,
    CertificateExpired = 45,
    CertificateUnknown = 46,
    IllegalParameter = 47,
    UnknownCa = 48,
    AccessDenied = 49,
    DecodeError = 50,
    DecryptError = 51,
    ProtocolVersion = 70,
    InsufficientSecurity = 71,
    InternalError = 80,
    InappropriateFallback = 86,
    UserCanceled = 90,
    MissingExtension = 109,
    UnsupportedExtension = 110,
    UnrecognizedName = 112,
    BadCertificateStatusResponse = 113,
    UnknownPskIdentity = 115,
    CertificateRequired = 116,
    NoApplicationProtocol = 120,
}

impl From<AlertDescription> for u8 {
    #[inline]
    fn from(desc: AlertDescription) -> Self {
        desc as u8
    }
}

impl TryFrom<u8> for AlertDescription {
    type Error = u8;

    fn try_from(value: u8) -> core::result::Result<Self, u8> {
        Ok(match value {
            0 => Self::CloseNotify,
            10 => Self::UnexpectedMessage,
            20 => Self::BadRecordMac,
            22 => Self::RecordOverflow,
            40 => Self::HandshakeFailure,
            42 => Self::BadCertificate,
            43 => Self::UnsupportedCertificate,
            44 => Self::CertificateRevoked,
            45 => Self::CertificateExpired,
            46 => Self::CertificateUnknown,
            47 => Self::IllegalParameter,
            48 => Self::UnknownCa,
            49 => Self::AccessDenied,
            50 => Self::DecodeError,
            51 => Self::DecryptError,
            70 => Self::ProtocolVersion,
            71 => Self::InsufficientSecurity,
            80 => Self::InternalError,
            86 => Self::InappropriateFallback,
            90 => Self::UserCanceled,
            109 => Self::MissingExtension,
            110 => Self::UnsupportedExtension,
            112 => Self::UnrecognizedName,
            113 => Self::BadCertificateStatusResponse,
            115 => Self::UnknownPskIdentity,
            116 => Self::CertificateRequired,
            120 => Self::NoApplicationProtocol,
            _ => return Err(value),
        })
    }
}

/// A TLS `Alert` record payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub description: AlertDescription,
}

impl Alert {
    pub fn fatal(description: AlertDescription) -> Self {
        Self {
            level: AlertLevel::Fatal,
            description,
        }
    }

    pub fn warning(description: AlertDescription) -> Self {
        Self {
            level: AlertLevel::Warning,
            description,
        }
    }

    pub fn serialize(&self, out: &mut ByteWriter) {
        out.push_u8(self.level.into());
        out.push_u8(self.description.into());
    }

    pub fn parse(input: &mut ByteReader) -> Result<Self> {
        let level_raw = input.read_u8()?;
        let desc_raw = input.read_u8()?;

        let level = AlertLevel::try_from(level_raw).unwrap_or(AlertLevel::Fatal);
        let description = AlertDescription::try_from(desc_raw)
            .map_err(|_| TlsError::new(ErrorKind::DecodeError, "unknown alert description"))?;

        Ok(Self { level, description })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_fatal_alert() {
        let alert = Alert::fatal(AlertDescription::HandshakeFailure);
        let mut out = ByteWriter::new();
        alert.serialize(&mut out);

        let bytes = out.finish();
        assert_eq!(bytes, [2, 40]);

        let mut reader = ByteReader::new(&bytes);
        let parsed = Alert::parse(&mut reader).unwrap();
        assert_eq!(parsed.level, AlertLevel::Fatal);
        assert_eq!(parsed.description, AlertDescription::HandshakeFailure);
    }

    #[test]
    fn rejects_unknown_description() {
        let bytes = [1u8, 255];
        let mut reader = ByteReader::new(&bytes);
        assert!(Alert::parse(&mut reader).is_err());
    }
}
