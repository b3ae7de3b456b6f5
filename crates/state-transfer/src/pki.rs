//! TLS material shared by both ends of a tunnel
//!
//! One self-signed certificate and key are generated per transport and mounted
//! on both sides, so each peer can verify the other against the same
//! certificate. The pair is never regenerated for an existing transport; rotating
//! it means building a new transport and recreating both secrets.

use rcgen::{CertificateParams, DistinguishedName, DnType, DnValue, KeyPair};

use crate::Error;

/// Validity period for tunnel certificates
pub const CERT_VALIDITY_DAYS: i64 = 365;

/// Common name of generated tunnel certificates
pub const DEFAULT_COMMON_NAME: &str = "state-transfer";

/// Organization of generated tunnel certificates
const ORGANIZATION: &str = "state-transfer";

/// PEM-encoded certificate and private key
#[derive(Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    crt: Vec<u8>,
    key: Vec<u8>,
}

impl TlsMaterial {
    /// Generate a fresh self-signed certificate and key
    pub fn generate(common_name: &str) -> Result<Self, Error> {
        let key_pair = KeyPair::generate()
            .map_err(|e| Error::pki(format!("key generation failed: {}", e)))?;

        let mut params = CertificateParams::new(vec![common_name.to_string()])
            .map_err(|e| Error::pki(format!("invalid subject name: {}", e)))?;

        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(common_name.to_string()),
        );
        dn.push(
            DnType::OrganizationName,
            DnValue::Utf8String(ORGANIZATION.to_string()),
        );
        params.distinguished_name = dn;

        let now = ::time::OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + ::time::Duration::days(CERT_VALIDITY_DAYS);

        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| Error::pki(format!("certificate generation failed: {}", e)))?;

        Ok(Self {
            crt: cert.pem().into_bytes(),
            key: key_pair.serialize_pem().into_bytes(),
        })
    }

    /// Use an existing PEM certificate and key
    pub fn from_pem(crt: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>) -> Result<Self, Error> {
        let crt = crt.into();
        let key = key.into();
        expect_pem(&crt, "tls.crt", |tag| tag == "CERTIFICATE")?;
        expect_pem(&key, "tls.key", |tag| tag.ends_with("PRIVATE KEY"))?;
        Ok(Self { crt, key })
    }

    /// PEM certificate bytes
    pub fn crt(&self) -> &[u8] {
        &self.crt
    }

    /// PEM private key bytes
    pub fn key(&self) -> &[u8] {
        &self.key
    }
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("crt_len", &self.crt.len())
            .field("key", &"<redacted>")
            .finish()
    }
}

fn expect_pem(data: &[u8], field: &str, tag_ok: impl Fn(&str) -> bool) -> Result<(), Error> {
    let parsed = ::pem::parse(data)
        .map_err(|e| Error::validation_for_field(field, format!("invalid PEM: {}", e)))?;
    if !tag_ok(parsed.tag()) {
        return Err(Error::validation_for_field(
            field,
            format!("unexpected PEM block {:?}", parsed.tag()),
        ));
    }
    Ok(())
}
