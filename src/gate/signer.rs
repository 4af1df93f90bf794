//! Compact PS512 signing of access tokens.
//!
//! Tokens use the JWS compact form `header.payload.signature`, each part
//! base64url without padding. The header only names the algorithm. The
//! signature is RSASSA-PSS over SHA-512 with a salt as long as the digest,
//! so two issuances of the same claims produce different tokens.

use super::claims::{self, Claims};
use super::error::Error;
use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey, LineEnding};
use rsa::pss::{BlindedSigningKey, Signature, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use tracing::debug;

pub const ALGORITHM: &str = "PS512";

pub const MIN_KEY_BITS: usize = 2048;

#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
}

/// Keypair used to issue tokens. Owned by the issuing process; only the
/// public half ever leaves it.
pub struct SigningIdentity {
    signing_key: BlindedSigningKey<Sha512>,
    public_key: RsaPublicKey,
}

impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("bits", &(self.public_key.size() * 8))
            .finish_non_exhaustive()
    }
}

impl SigningIdentity {
    /// Generate a fresh 2048-bit keypair.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if key generation fails.
    pub fn generate() -> Result<Self, Error> {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, MIN_KEY_BITS)
            .map_err(|e| Error::Configuration(format!("failed to generate RSA key: {e}")))?;
        Self::from_private_key(private_key)
    }

    /// Load a PKCS#8 or PKCS#1 PEM encoded private key.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the key cannot be parsed, is
    /// inconsistent, or is smaller than 2048 bits.
    pub fn from_pem(pem: &str) -> Result<Self, Error> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|_| Error::Configuration("failed to parse RSA private key".to_string()))?;
        Self::from_private_key(private_key)
    }

    fn from_private_key(private_key: RsaPrivateKey) -> Result<Self, Error> {
        private_key
            .validate()
            .map_err(|e| Error::Configuration(format!("invalid RSA private key: {e}")))?;
        let bits = private_key.size() * 8;
        if bits < MIN_KEY_BITS {
            return Err(Error::Configuration(format!(
                "RSA key too small: {bits} bits, need at least {MIN_KEY_BITS}"
            )));
        }
        let public_key = private_key.to_public_key();
        Ok(Self {
            signing_key: BlindedSigningKey::<Sha512>::new(private_key),
            public_key,
        })
    }

    #[must_use]
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Sign `claims` into a compact token.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if encoding or signing fails.
    pub fn issue(&self, claims: &Claims) -> Result<String, Error> {
        let header = serde_json::to_vec(&TokenHeader {
            alg: ALGORITHM.to_string(),
        })
        .map_err(|e| Error::Configuration(format!("failed to encode token header: {e}")))?;
        let payload = claims::encode(claims)
            .map_err(|e| Error::Configuration(format!("failed to encode claims: {e}")))?;

        let signing_input = format!(
            "{}.{}",
            Base64UrlUnpadded::encode_string(&header),
            Base64UrlUnpadded::encode_string(&payload)
        );

        let mut rng = rand::thread_rng();
        let signature = self
            .signing_key
            .try_sign_with_rng(&mut rng, signing_input.as_bytes())
            .map_err(|e| Error::Configuration(format!("failed to sign token: {e}")))?;

        Ok(format!(
            "{signing_input}.{}",
            Base64UrlUnpadded::encode_string(&signature.to_vec())
        ))
    }

    /// SubjectPublicKeyInfo PEM for out-of-band distribution.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the key cannot be encoded.
    pub fn public_key_pem(&self) -> Result<String, Error> {
        self.public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| Error::Configuration(format!("failed to encode public key: {e}")))
    }

    /// SubjectPublicKeyInfo DER.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if the key cannot be encoded.
    pub fn public_key_der(&self) -> Result<Vec<u8>, Error> {
        self.public_key
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| Error::Configuration(format!("failed to encode public key: {e}")))
    }
}

/// Check the signature of `token` against `public_key` and return its claims.
///
/// Expiry is not checked here. Every failure is reported as
/// [`Error::InvalidToken`].
///
/// # Errors
/// Returns [`Error::InvalidToken`] for malformed tokens, unexpected
/// algorithms, bad signatures and undecodable claims alike.
pub fn verify(token: &str, public_key: &RsaPublicKey) -> Result<Claims, Error> {
    verify_parts(token, public_key).map_err(|reason| {
        debug!(reason, "token verification failed");
        Error::InvalidToken
    })
}

fn verify_parts(token: &str, public_key: &RsaPublicKey) -> Result<Claims, &'static str> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err("format");
    };

    let header = Base64UrlUnpadded::decode_vec(header_b64).map_err(|_| "header encoding")?;
    let header: TokenHeader = serde_json::from_slice(&header).map_err(|_| "header json")?;
    if header.alg != ALGORITHM {
        return Err("algorithm");
    }

    let signature_bytes =
        Base64UrlUnpadded::decode_vec(signature_b64).map_err(|_| "signature encoding")?;
    let signature = Signature::try_from(signature_bytes.as_slice()).map_err(|_| "signature")?;
    let verifying_key = VerifyingKey::<Sha512>::new(public_key.clone());
    let signing_input = &token[..header_b64.len() + 1 + payload_b64.len()];
    verifying_key
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| "signature")?;

    let payload = Base64UrlUnpadded::decode_vec(payload_b64).map_err(|_| "payload encoding")?;
    claims::decode(&payload).map_err(|_| "claims")
}
