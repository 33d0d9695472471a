//! # Certificate Decoding
//!
//! Decodes PEM byte streams into parsed X.509 certificate records.

use super::error::{ComponentType, ProviderError};
use chrono::{DateTime, Utc};
use x509_parser::pem::parse_x509_pem;

/// PEM label of blocks that are parsed as certificates
const CERTIFICATE_PEM_LABEL: &str = "CERTIFICATE";

/// A parsed X.509 certificate
///
/// Owns the DER encoding; the metadata is extracted once at decode time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    subject: String,
    issuer: String,
    serial_number: String,
    not_after: Option<DateTime<Utc>>,
}

impl Certificate {
    /// Parse a DER-encoded certificate
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::CertInvalid`] if the bytes are not a well-formed certificate.
    pub fn from_der(der: Vec<u8>) -> Result<Self, ProviderError> {
        let (_, parsed) = x509_parser::parse_x509_certificate(&der).map_err(|e| {
            ProviderError::cert_invalid(
                ComponentType::CertProvider,
                format!("error parsing x509 certificate: {e}"),
            )
        })?;

        let subject = parsed.subject().to_string();
        let issuer = parsed.issuer().to_string();
        let serial_number = parsed.raw_serial_as_string();
        let not_after = DateTime::from_timestamp(parsed.validity().not_after.timestamp(), 0);

        Ok(Self {
            der,
            subject,
            issuer,
            serial_number,
            not_after,
        })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Serial number as colon-separated hex
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    pub fn not_after(&self) -> Option<DateTime<Utc>> {
        self.not_after
    }
}

/// Decode PEM-encoded bytes into a certificate chain
///
/// Blocks are returned in stream order. Blocks with a label other than
/// `CERTIFICATE` are skipped. Empty input (or input that is only whitespace)
/// yields an empty chain. Any other content that does not decode as a PEM
/// block, or any certificate that fails to parse, fails the whole decode.
///
/// # Errors
///
/// Returns [`ProviderError::CertInvalid`]; no partial chain is ever returned.
pub fn decode_certificates(value: &[u8]) -> Result<Vec<Certificate>, ProviderError> {
    let mut certificates = Vec::new();
    let mut rest = value;

    while !rest.iter().all(u8::is_ascii_whitespace) {
        let (remaining, pem) = parse_x509_pem(rest).map_err(|e| {
            ProviderError::cert_invalid(
                ComponentType::CertProvider,
                format!("failed to decode pem block: {e}"),
            )
        })?;

        if pem.label == CERTIFICATE_PEM_LABEL {
            certificates.push(Certificate::from_der(pem.contents)?);
        }

        rest = remaining;
    }

    Ok(certificates)
}
