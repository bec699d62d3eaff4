use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-line-signature";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header is missing")]
    Missing,
    #[error("signature header is not valid base64")]
    Malformed,
    #[error("signature does not match request body")]
    Mismatch,
    #[error("channel secret cannot be used as an hmac key")]
    InvalidKey,
}

/// Checks `x-line-signature`: base64(HMAC-SHA256(channel_secret, raw_body)).
#[derive(Clone, Debug)]
pub struct SignatureVerifier {
    channel_secret: SecretString,
}

impl SignatureVerifier {
    pub fn new(channel_secret: SecretString) -> Self {
        Self { channel_secret }
    }

    pub fn verify(&self, body: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
        let header = header.map(str::trim).filter(|value| !value.is_empty());
        let Some(header) = header else {
            return Err(SignatureError::Missing);
        };
        let expected = STANDARD.decode(header).map_err(|_| SignatureError::Malformed)?;

        self.mac(body)?.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
    }

    /// Signature the platform would send for `body`.
    pub fn sign(&self, body: &[u8]) -> Result<String, SignatureError> {
        Ok(STANDARD.encode(self.mac(body)?.finalize().into_bytes()))
    }

    fn mac(&self, body: &[u8]) -> Result<HmacSha256, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(self.channel_secret.expose_secret().as_bytes())
            .map_err(|_| SignatureError::InvalidKey)?;
        mac.update(body);
        Ok(mac)
    }
}
