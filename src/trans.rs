use serde::Serialize;

use crate::{
    error::{Error, Result, ServerErrorKind},
    jws::{self, JwsProtectedHeader},
    key::KeyPair,
    req::{req_handle_error, req_post},
    session::Session,
};

/// How often a request is re-signed and retransmitted after the server
/// rejected its nonce.
const MAX_BAD_NONCE_RETRIES: usize = 5;

/// Signed request pipeline.
///
/// Every call consumes the session's cached nonce (fetching a fresh one
/// from `newNonce` when the slot is empty), signs the claims into a
/// flattened JWS and POSTs it. The `Replay-Nonce` of the response, success
/// or error, replaces the cached nonce.
///
/// A `badNonce` rejection is recovered transparently: the same claims are
/// re-signed with the nonce from the failed response and retransmitted, a
/// bounded number of times.
pub(crate) struct Transport<'a> {
    session: &'a Session,
}

impl<'a> Transport<'a> {
    pub(crate) fn new(session: &'a Session) -> Self {
        Transport { session }
    }

    /// Makes a call with the public key embedded as `jwk`.
    ///
    /// Only for newAccount and revocation by certificate key.
    pub(crate) async fn call_jwk<T>(
        &self,
        url: &str,
        key: &KeyPair,
        claims: &T,
    ) -> Result<reqwest::Response>
    where
        T: Serialize + ?Sized,
    {
        self.call(url, SignWith::Jwk(key), claims, None).await
    }

    /// Makes a call signed under the account URL (`kid`).
    pub(crate) async fn call_kid<T>(
        &self,
        url: &str,
        key: &KeyPair,
        kid: &str,
        claims: &T,
    ) -> Result<reqwest::Response>
    where
        T: Serialize + ?Sized,
    {
        self.call(url, SignWith::Kid { key, kid }, claims, None)
            .await
    }

    /// Same as [`call_kid`](Self::call_kid), with an explicit `Accept`
    /// header. Used for certificate downloads.
    pub(crate) async fn call_kid_accept<T>(
        &self,
        url: &str,
        key: &KeyPair,
        kid: &str,
        claims: &T,
        accept: &str,
    ) -> Result<reqwest::Response>
    where
        T: Serialize + ?Sized,
    {
        self.call(url, SignWith::Kid { key, kid }, claims, Some(accept))
            .await
    }

    async fn call<T>(
        &self,
        url: &str,
        sign_with: SignWith<'_>,
        claims: &T,
        accept: Option<&str>,
    ) -> Result<reqwest::Response>
    where
        T: Serialize + ?Sized,
    {
        let mut bad_nonce_retries = 0;

        loop {
            // Either reuse the nonce from the previous response, or fetch
            // a fresh one. Consumed from here on.
            let nonce = self.session.take_nonce().await?;

            let key = sign_with.key();
            let protected = match sign_with {
                SignWith::Jwk(key) => JwsProtectedHeader::new_jwk(key, url, nonce),
                SignWith::Kid { key, kid } => JwsProtectedHeader::new_kid(key, kid, url, nonce),
            };
            let body = jws::sign_to_body(&protected, key, claims)?;

            log::debug!("call endpoint: {url}");
            let res = req_post(
                self.session.client(),
                url,
                body,
                accept,
                self.session.accept_language(),
            )
            .await?;

            // Success or not, the response may carry the next nonce.
            self.session.extract_nonce(&res);

            match req_handle_error(res).await {
                Ok(res) => return Ok(res),
                Err(Error::Server(err)) if err.kind == ServerErrorKind::BadNonce => {
                    bad_nonce_retries += 1;
                    if bad_nonce_retries > MAX_BAD_NONCE_RETRIES {
                        return Err(Error::Server(err));
                    }
                    log::debug!("retrying on bad nonce ({bad_nonce_retries})");
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[derive(Clone, Copy)]
enum SignWith<'a> {
    Jwk(&'a KeyPair),
    Kid { key: &'a KeyPair, kid: &'a str },
}

impl<'a> SignWith<'a> {
    fn key(&self) -> &'a KeyPair {
        match self {
            SignWith::Jwk(key) => key,
            SignWith::Kid { key, .. } => key,
        }
    }
}
