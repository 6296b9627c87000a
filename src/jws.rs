//! JWS signing as used by ACME, see
//! [RFC 8555 §6.2](https://datatracker.ietf.org/doc/html/rfc8555#section-6.2).

use rsa::traits::PublicKeyParts as _;
use serde::Serialize;
use signature::Keypair as _;

use crate::{
    error::Result,
    key::KeyPair,
    util::{base64url, sha256},
};

/// JWS protected header as defined in [RFC 8555 §6.2].
///
/// > For newAccount requests, and for revokeCert requests authenticated by a certificate key,
/// > there MUST be a "jwk" field. This field MUST contain the public key corresponding to the
/// > private key used to sign the JWS.
/// >
/// > For all other requests, the request is signed using an existing account, and there MUST be a
/// > "kid" field. This field MUST contain the account URL received by POSTing to the newAccount
/// > resource.
///
/// [RFC 8555 §6.2]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.2
#[derive(Debug, Serialize)]
pub(crate) struct JwsProtectedHeader {
    /// Signature algorithm, negotiated from the signing key type.
    alg: &'static str,

    /// Anti-replay nonce ([RFC 8555 §6.5]).
    ///
    /// Present on every request except the inner JWS of a key rollover.
    ///
    /// [RFC 8555 §6.5]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.5
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<String>,

    /// Target URL ([RFC 8555 §6.4]).
    ///
    /// [RFC 8555 §6.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.4
    url: String,

    /// Public key of the signing key.
    ///
    /// Mutually exclusive with `kid`.
    #[serde(skip_serializing_if = "Option::is_none")]
    jwk: Option<Jwk>,

    /// Account URL.
    ///
    /// Mutually exclusive with `jwk`.
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
}

impl JwsProtectedHeader {
    pub(crate) fn new_jwk(key: &KeyPair, url: &str, nonce: String) -> Self {
        JwsProtectedHeader {
            alg: key.alg(),
            nonce: Some(nonce),
            url: url.to_owned(),
            jwk: Some(Jwk::from_key(key)),
            kid: None,
        }
    }

    pub(crate) fn new_kid(key: &KeyPair, kid: &str, url: &str, nonce: String) -> Self {
        JwsProtectedHeader {
            alg: key.alg(),
            nonce: Some(nonce),
            url: url.to_owned(),
            jwk: None,
            kid: Some(kid.to_owned()),
        }
    }

    /// Header for the inner JWS of a key rollover ([RFC 8555 §7.3.5]):
    /// embedded JWK of the new key and no nonce.
    ///
    /// [RFC 8555 §7.3.5]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.3.5
    fn new_inner_jwk(key: &KeyPair, url: &str) -> Self {
        JwsProtectedHeader {
            alg: key.alg(),
            nonce: None,
            url: url.to_owned(),
            jwk: Some(Jwk::from_key(key)),
            kid: None,
        }
    }
}

/// Public key as a JWK (RFC 7517).
///
/// FIELD ORDER MATTERS: each variant declares its members in the RFC 7638
/// lexicographic order, so serializing a `Jwk` directly yields the
/// canonical form the thumbprint is computed over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub(crate) enum Jwk {
    Ec {
        crv: &'static str,
        kty: &'static str,
        x: String,
        y: String,
    },
    Rsa {
        e: String,
        kty: &'static str,
        n: String,
    },
}

impl Jwk {
    pub(crate) fn from_key(key: &KeyPair) -> Jwk {
        match key {
            KeyPair::Rsa(signing_key) => {
                let verifying_key = signing_key.verifying_key();
                let public: &rsa::RsaPublicKey = verifying_key.as_ref();

                // minimal big-endian, no leading zero octet
                Jwk::Rsa {
                    e: base64url(&public.e().to_bytes_be()),
                    kty: "RSA",
                    n: base64url(&public.n().to_bytes_be()),
                }
            }
            KeyPair::P256(signing_key) => {
                let point = signing_key.verifying_key().to_encoded_point(false);
                Jwk::ec("P-256", point.x().unwrap().as_slice(), point.y().unwrap().as_slice())
            }
            KeyPair::P384(signing_key) => {
                let point = signing_key.verifying_key().to_encoded_point(false);
                Jwk::ec("P-384", point.x().unwrap().as_slice(), point.y().unwrap().as_slice())
            }
            KeyPair::P521(signing_key) => {
                let verifying_key = p521::ecdsa::VerifyingKey::from(signing_key);
                let point = verifying_key.to_encoded_point(false);
                Jwk::ec("P-521", point.x().unwrap().as_slice(), point.y().unwrap().as_slice())
            }
        }
    }

    fn ec(crv: &'static str, x: &[u8], y: &[u8]) -> Jwk {
        // x and y come from the uncompressed SEC1 point, already padded to
        // the curve's coordinate width
        Jwk::Ec {
            crv,
            kty: "EC",
            x: base64url(x),
            y: base64url(y),
        }
    }

    /// RFC 7638 thumbprint: SHA-256 over the canonical JWK, base64url.
    pub(crate) fn thumbprint(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        Ok(base64url(&sha256(canonical)))
    }
}

/// Key authorization string for a challenge token
/// ([RFC 8555 §8.1](https://datatracker.ietf.org/doc/html/rfc8555#section-8.1)).
pub(crate) fn key_authorization(token: &str, key: &KeyPair) -> Result<String> {
    let thumbprint = Jwk::from_key(key).thumbprint()?;
    Ok(format!("{token}.{thumbprint}"))
}

/// Flattened JSON JWS serialization, see
/// [RFC 7515 §7.2.2](https://datatracker.ietf.org/doc/html/rfc7515#section-7.2.2).
#[derive(Debug, Serialize)]
pub(crate) struct FlattenedJws {
    protected: String,
    payload: String,
    signature: String,
}

/// Signs `payload` under `protected`, producing a flattened JWS.
pub(crate) fn sign<T: Serialize + ?Sized>(
    protected: &JwsProtectedHeader,
    key: &KeyPair,
    payload: &T,
) -> Result<FlattenedJws> {
    let protected = base64url(&serde_json::to_string(protected)?);

    let payload = {
        let payload_json = serde_json::to_string(payload)?;

        if payload_json == "\"\"" {
            // POST-as-GET: the payload is the empty string itself, not the
            // base64url of an encoded empty string (see api::EmptyString)
            String::new()
        } else {
            base64url(&payload_json)
        }
    };

    let signature = key.sign(format!("{protected}.{payload}").as_bytes())?;

    Ok(FlattenedJws {
        protected,
        payload,
        signature: base64url(&signature),
    })
}

/// Signs `payload` and serializes the flattened JWS to the request body.
pub(crate) fn sign_to_body<T: Serialize + ?Sized>(
    protected: &JwsProtectedHeader,
    key: &KeyPair,
    payload: &T,
) -> Result<String> {
    Ok(serde_json::to_string(&sign(protected, key, payload)?)?)
}

/// Builds the inner JWS of a key rollover request: signed by the *new*
/// key, carrying the account URL and the JWK of the *current* key.
pub(crate) fn key_change_jws(
    key_change_url: &str,
    account_url: &str,
    current_key: &KeyPair,
    new_key: &KeyPair,
) -> Result<FlattenedJws> {
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct KeyChangeClaims {
        account: String,
        old_key: Jwk,
    }

    let claims = KeyChangeClaims {
        account: account_url.to_owned(),
        old_key: Jwk::from_key(current_key),
    };

    let protected = JwsProtectedHeader::new_inner_jwk(new_key, key_change_url);
    sign(&protected, new_key, &claims)
}
