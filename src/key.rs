use std::fmt;

use pkcs8::{DecodePrivateKey as _, EncodePrivateKey as _, LineEnding};
use sha2::Sha256;
use signature::{SignatureEncoding as _, Signer as _};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// A key pair usable for signing ACME requests and CSRs.
///
/// RSA keys sign with `RS256` (PKCS#1 v1.5 over SHA-256); elliptic curve
/// keys sign with `ES256`/`ES384`/`ES512` depending on the curve. Any
/// other key type or curve is unsupported and rejected at load time.
#[derive(Clone)]
pub enum KeyPair {
    Rsa(rsa::pkcs1v15::SigningKey<Sha256>),
    P256(p256::ecdsa::SigningKey),
    P384(p384::ecdsa::SigningKey),
    P521(p521::ecdsa::SigningKey),
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // never print key material
        f.debug_struct("KeyPair")
            .field("alg", &self.alg())
            .finish_non_exhaustive()
    }
}

/// Makes a P-256 private key (from which we can derive a public key).
pub fn create_p256_key() -> KeyPair {
    let csprng = &mut rand::thread_rng();
    KeyPair::P256(ecdsa::SigningKey::from(p256::SecretKey::random(csprng)))
}

/// Makes a P-384 private key.
pub fn create_p384_key() -> KeyPair {
    let csprng = &mut rand::thread_rng();
    KeyPair::P384(ecdsa::SigningKey::from(p384::SecretKey::random(csprng)))
}

/// Makes a P-521 private key.
pub fn create_p521_key() -> KeyPair {
    let csprng = &mut rand::thread_rng();
    KeyPair::P521(ecdsa::SigningKey::from(p521::SecretKey::random(csprng)).into())
}

/// Makes an RSA private key of `bits` modulus size.
///
/// ACME providers require at least 2048 bits; shorter moduli are rejected
/// here before any key generation work is done.
pub fn create_rsa_key(bits: usize) -> Result<KeyPair> {
    if bits < 2048 {
        return Err(Error::Usage(format!(
            "RSA keys must be at least 2048 bits, got {bits}"
        )));
    }

    let csprng = &mut rand::thread_rng();
    let private_key = rsa::RsaPrivateKey::new(csprng, bits)
        .map_err(|err| Error::Usage(format!("RSA key generation failed: {err}")))?;

    Ok(KeyPair::Rsa(rsa::pkcs1v15::SigningKey::new(private_key)))
}

impl KeyPair {
    /// Reads a key pair from unencrypted PKCS#8 PEM.
    pub fn from_pkcs8_pem(pem: &str) -> Result<KeyPair> {
        if let Ok(key) = rsa::pkcs1v15::SigningKey::<Sha256>::from_pkcs8_pem(pem) {
            return Ok(KeyPair::Rsa(key));
        }
        if let Ok(key) = p256::ecdsa::SigningKey::from_pkcs8_pem(pem) {
            return Ok(KeyPair::P256(key));
        }
        if let Ok(key) = p384::ecdsa::SigningKey::from_pkcs8_pem(pem) {
            return Ok(KeyPair::P384(key));
        }
        if let Ok(secret_key) = p521::SecretKey::from_pkcs8_pem(pem) {
            return Ok(KeyPair::P521(ecdsa::SigningKey::from(secret_key).into()));
        }

        Err(Error::Usage(
            "unsupported key: expected RSA or EC P-256/P-384/P-521 in PKCS#8 PEM".to_owned(),
        ))
    }

    /// Serializes the private key as unencrypted PKCS#8 PEM.
    pub fn to_pkcs8_pem(&self) -> Result<Zeroizing<String>> {
        let pem = match self {
            KeyPair::Rsa(key) => key.to_pkcs8_pem(LineEnding::LF),
            KeyPair::P256(key) => key.to_pkcs8_pem(LineEnding::LF),
            KeyPair::P384(key) => key.to_pkcs8_pem(LineEnding::LF),
            KeyPair::P521(key) => {
                p521::SecretKey::from(key.as_nonzero_scalar()).to_pkcs8_pem(LineEnding::LF)
            }
        };

        pem.map_err(|err| Error::Usage(format!("cannot serialize private key: {err}")))
    }

    /// JWS algorithm identifier for this key.
    pub(crate) fn alg(&self) -> &'static str {
        match self {
            KeyPair::Rsa(_) => "RS256",
            KeyPair::P256(_) => "ES256",
            KeyPair::P384(_) => "ES384",
            KeyPair::P521(_) => "ES512",
        }
    }

    /// Signs `message` for a JWS.
    ///
    /// ECDSA signatures are the raw fixed-length `r || s` concatenation,
    /// not DER.
    pub(crate) fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let signature = match self {
            KeyPair::Rsa(key) => key
                .try_sign(message)
                .map(|sig| sig.to_vec())
                .map_err(sign_err)?,
            KeyPair::P256(key) => {
                let sig: p256::ecdsa::Signature = key.try_sign(message).map_err(sign_err)?;
                sig.to_vec()
            }
            KeyPair::P384(key) => {
                let sig: p384::ecdsa::Signature = key.try_sign(message).map_err(sign_err)?;
                sig.to_vec()
            }
            KeyPair::P521(key) => {
                let sig: p521::ecdsa::Signature = key.try_sign(message).map_err(sign_err)?;
                sig.to_vec()
            }
        };

        Ok(signature)
    }
}

fn sign_err(err: signature::Error) -> Error {
    Error::Usage(format!("key cannot sign: {err}"))
}
