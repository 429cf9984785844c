//! Tamper-evident references to attachments.
//!
//! A signed reference lets a form carry "this attachment, with this exact
//! file" across round trips (e.g. a failed validation that redisplays the
//! form) without re-uploading and without trusting the client. Tokens have the
//! shape `base64(json)--hex(hmac_sha256(key, base64(json)))`, where the key is
//! derived from the application secret and a fixed namespace.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::UploadedFile;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

use crate::config::SigningConfig;

type HmacSha256 = Hmac<Sha256>;

const SEPARATOR: &str = "--";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signing secret must not be empty")]
    InvalidKey,

    #[error("token is not in data--digest form")]
    Malformed,

    #[error("signature does not match")]
    InvalidSignature,

    #[error("signed payload is not valid: {0}")]
    Payload(String),
}

/// Signs and verifies serializable values under a namespaced HMAC-SHA256 key.
#[derive(Clone)]
pub struct MessageVerifier {
    key: Vec<u8>,
}

impl MessageVerifier {
    pub fn new(secret: &[u8], namespace: &str) -> Result<Self, SignatureError> {
        if secret.is_empty() {
            return Err(SignatureError::InvalidKey);
        }
        let mut mac =
            HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
        mac.update(namespace.as_bytes());
        Ok(Self {
            key: mac.finalize().into_bytes().to_vec(),
        })
    }

    fn mac(&self) -> Result<HmacSha256, SignatureError> {
        HmacSha256::new_from_slice(&self.key).map_err(|_| SignatureError::InvalidKey)
    }

    pub fn generate<T: Serialize>(&self, value: &T) -> Result<String, SignatureError> {
        let json = serde_json::to_vec(value).map_err(|e| SignatureError::Payload(e.to_string()))?;
        let data = STANDARD.encode(json);
        let mut mac = self.mac()?;
        mac.update(data.as_bytes());
        let digest = hex::encode(mac.finalize().into_bytes());
        Ok(format!("{data}{SEPARATOR}{digest}"))
    }

    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, SignatureError> {
        let (data, digest) = token
            .rsplit_once(SEPARATOR)
            .filter(|(data, digest)| !data.is_empty() && !digest.is_empty())
            .ok_or(SignatureError::Malformed)?;

        // Only the canonical lowercase form is accepted, so every character of
        // the digest is significant.
        if digest.len() != 64 || !digest.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return Err(SignatureError::InvalidSignature);
        }
        let expected = hex::decode(digest).map_err(|_| SignatureError::InvalidSignature)?;

        let mut mac = self.mac()?;
        mac.update(data.as_bytes());
        mac.verify_slice(&expected)
            .map_err(|_| SignatureError::InvalidSignature)?;

        let json = STANDARD
            .decode(data)
            .map_err(|e| SignatureError::Payload(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| SignatureError::Payload(e.to_string()))
    }
}

/// Payload of a signed attachment reference.
///
/// `id` is included so two attachments that happen to point at identical file
/// data still produce different tokens. An attachment without a file signs
/// the empty structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl SignedReference {
    pub fn uploaded_file(&self) -> Result<Option<UploadedFile>, serde_json::Error> {
        self.file.as_deref().map(serde_json::from_str).transpose()
    }
}

/// A string attachable after interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Raw JSON file descriptor, e.g. from a direct upload endpoint. Not signed.
    Unsigned(UploadedFile),
    /// Verified signed reference.
    Signed(SignedReference),
}

#[derive(Clone)]
pub struct ReferenceCodec {
    verifier: MessageVerifier,
}

impl ReferenceCodec {
    pub fn new(secret: &[u8], namespace: &str) -> Result<Self, SignatureError> {
        Ok(Self {
            verifier: MessageVerifier::new(secret, namespace)?,
        })
    }

    pub fn from_config(config: &SigningConfig) -> Result<Self, SignatureError> {
        Self::new(config.secret.as_bytes(), &config.namespace)
    }

    /// Token for attachment `id` holding `file`. Deterministic for equal input.
    pub fn encode(&self, id: Uuid, file: Option<&UploadedFile>) -> Result<String, SignatureError> {
        let reference = match file {
            Some(file) => SignedReference {
                id: Some(id),
                file: Some(file.to_json().map_err(|e| SignatureError::Payload(e.to_string()))?),
            },
            None => SignedReference::default(),
        };
        self.verifier.generate(&reference)
    }

    /// Interpret a string attachable.
    ///
    /// A permissive parse as a raw JSON descriptor is attempted first; only
    /// if that fails is the input verified as a signed token.
    pub fn resolve(&self, input: &str) -> Result<Reference, SignatureError> {
        if let Ok(file) = serde_json::from_str::<UploadedFile>(input) {
            return Ok(Reference::Unsigned(file));
        }
        self.verifier.verify(input).map(Reference::Signed)
    }

    /// Verified reference payload, or `None` for anything that does not verify.
    pub fn decode_reference(&self, token: &str) -> Option<SignedReference> {
        self.verifier.verify(token).ok()
    }

    /// File descriptor carried by `input`, or `None` when it neither parses as
    /// a raw descriptor nor verifies as a signed token.
    pub fn decode(&self, input: &str) -> Option<UploadedFile> {
        match self.resolve(input).ok()? {
            Reference::Unsigned(file) => Some(file),
            Reference::Signed(reference) => reference.uploaded_file().ok().flatten(),
        }
    }
}
