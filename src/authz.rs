use std::{
    marker::PhantomData,
    time::{Duration, SystemTime},
};

use crate::{
    api::{self, AuthorizationStatus, ChallengeStatus},
    error::{Error, Result},
    jws::key_authorization,
    login::Login,
    req::req_retry_after,
    util::{base64url, read_json, sha256, wait_before_retry},
};

/// An authorization (ownership proof) for one identifier.
///
/// Each pending authorization of an order must be moved to `valid` by
/// completing one of its challenges before the CA will sign a certificate.
/// Whether any challenge is needed at all is the CA's decision; a recently
/// proven identifier may come back already valid.
#[derive(Debug)]
pub struct Authorization {
    login: Login,
    url: String,
    api_auth: api::Authorization,
    retry_after: Option<SystemTime>,
}

impl Authorization {
    /// Fetches an authorization from its URL.
    pub async fn bind(login: &Login, url: &str) -> Result<Authorization> {
        let (api_auth, retry_after) = login.fetch_resource(url).await?;
        Ok(Authorization {
            login: login.clone(),
            url: url.to_owned(),
            api_auth,
            retry_after,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The identifier being authorized.
    ///
    /// For wildcard authorizations this is the base domain;
    /// [`is_wildcard()`](Self::is_wildcard) is set instead.
    pub fn identifier(&self) -> &api::Identifier {
        &self.api_auth.identifier
    }

    pub fn status(&self) -> AuthorizationStatus {
        self.api_auth.status
    }

    /// Expiry of the authorization, RFC 3339 format.
    pub fn expires(&self) -> Option<&str> {
        self.api_auth.expires.as_deref()
    }

    pub fn is_wildcard(&self) -> bool {
        self.api_auth.is_wildcard()
    }

    /// Whether a challenge still has to be completed.
    pub fn needs_challenge(&self) -> bool {
        !matches!(self.status(), AuthorizationStatus::Valid)
    }

    /// Returns the `http-01` challenge, if the server offers one.
    pub fn http_challenge(&self) -> Option<Challenge<Http01>> {
        self.find_typed()
    }

    /// Returns the `dns-01` challenge, if the server offers one.
    pub fn dns_challenge(&self) -> Option<Challenge<Dns01>> {
        self.find_typed()
    }

    /// Returns the `tls-alpn-01` challenge, if the server offers one.
    pub fn tls_alpn_challenge(&self) -> Option<Challenge<TlsAlpn01>> {
        self.find_typed()
    }

    fn find_typed<K: ChallengeKind>(&self) -> Option<Challenge<K>> {
        let api_challenge = self.api_auth.challenge(K::TYPE)?.clone();
        Challenge::typed(&self.login, api_challenge, self.retry_after).ok()
    }

    /// Returns the challenge of the given type string.
    ///
    /// Fails when the server did not offer that type.
    pub fn find_challenge(&self, type_: &str) -> Result<Challenge> {
        let api_challenge = self
            .api_auth
            .challenge(type_)
            .cloned()
            .ok_or_else(|| Error::Usage(format!("no {type_} challenge offered")))?;

        Ok(Challenge::untyped(&self.login, api_challenge, self.retry_after))
    }

    /// All challenges the server offered.
    pub fn challenges(&self) -> Vec<Challenge> {
        self.api_auth
            .challenges
            .iter()
            .map(|api_challenge| {
                Challenge::untyped(&self.login, api_challenge.clone(), self.retry_after)
            })
            .collect()
    }

    /// Returns a reference to the authorization's API object.
    ///
    /// Useful for debugging.
    pub fn api_auth(&self) -> &api::Authorization {
        &self.api_auth
    }

    /// Refreshes the authorization document.
    pub async fn update(&mut self) -> Result<()> {
        let (api_auth, retry_after) = self.login.fetch_resource(&self.url).await?;
        self.api_auth = api_auth;
        self.retry_after = retry_after;
        Ok(())
    }

    /// Relinquishes the authorization. The identifier has to be proven
    /// again afterwards.
    pub async fn deactivate(&mut self) -> Result<()> {
        let res = self.login.post(&self.url, &api::Deactivation).await?;
        self.api_auth = read_json(res).await?;
        Ok(())
    }

    /// Polls until the authorization leaves the `pending` state, honoring
    /// server-supplied `Retry-After` deadlines and falling back to
    /// `interval` between refreshes.
    pub async fn poll(&mut self, interval: Duration) -> Result<AuthorizationStatus> {
        loop {
            if self.status() != AuthorizationStatus::Pending {
                return Ok(self.status());
            }

            wait_before_retry(self.retry_after, interval).await;
            self.update().await?;
        }
    }
}

/// Marker for `http-01` challenges ([RFC 8555 §8.3]).
///
/// [RFC 8555 §8.3]: https://datatracker.ietf.org/doc/html/rfc8555#section-8.3
#[derive(Debug)]
pub struct Http01;

/// Marker for `dns-01` challenges ([RFC 8555 §8.4]).
///
/// [RFC 8555 §8.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-8.4
#[derive(Debug)]
pub struct Dns01;

/// Marker for `tls-alpn-01` challenges ([RFC 8737]).
///
/// [RFC 8737]: https://datatracker.ietf.org/doc/html/rfc8737
#[derive(Debug)]
pub struct TlsAlpn01;

/// Marker for challenges accessed by type string.
#[derive(Debug)]
pub struct AnyChallenge;

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Http01 {}
    impl Sealed for super::Dns01 {}
    impl Sealed for super::TlsAlpn01 {}
}

/// A challenge type with a token-based key authorization.
pub trait ChallengeKind: sealed::Sealed {
    /// The challenge type string on the wire.
    const TYPE: &'static str;
}

impl ChallengeKind for Http01 {
    const TYPE: &'static str = "http-01";
}

impl ChallengeKind for Dns01 {
    const TYPE: &'static str = "dns-01";
}

impl ChallengeKind for TlsAlpn01 {
    const TYPE: &'static str = "tls-alpn-01";
}

/// A challenge as obtained from an [`Authorization`].
///
/// The marker type selects the response-derivation method:
/// [`http_proof()`](Challenge::http_proof),
/// [`dns_proof()`](Challenge::dns_proof) or
/// [`tls_alpn_proof()`](Challenge::tls_alpn_proof). Challenges looked up
/// by type string are `Challenge<AnyChallenge>` and only expose the
/// generic operations.
#[derive(Debug)]
pub struct Challenge<K = AnyChallenge> {
    login: Login,
    api_challenge: api::Challenge,
    retry_after: Option<SystemTime>,
    _kind: PhantomData<K>,
}

impl<K: ChallengeKind> Challenge<K> {
    /// Wraps a challenge document, verifying its type string matches the
    /// expected variant.
    pub(crate) fn typed(
        login: &Login,
        api_challenge: api::Challenge,
        retry_after: Option<SystemTime>,
    ) -> Result<Challenge<K>> {
        if api_challenge.type_ != K::TYPE {
            return Err(Error::Protocol(format!(
                "expected a {} challenge, got {:?}",
                K::TYPE,
                api_challenge.type_,
            )));
        }

        Ok(Challenge {
            login: login.clone(),
            api_challenge,
            retry_after,
            _kind: PhantomData,
        })
    }
}

impl Challenge<Http01> {
    /// Returns the content the HTTP server of the domain must answer with
    /// under `http://<domain>/.well-known/acme-challenge/<token>`.
    ///
    /// Served over plain HTTP, with the token from
    /// [`token()`](Challenge::token) as the file name.
    pub fn http_proof(&self) -> Result<String> {
        self.key_authorization()
    }
}

impl Challenge<Dns01> {
    /// Returns the content of the `TXT` record to publish under
    /// `_acme-challenge.<domain>`.
    ///
    /// This is the base64url SHA-256 digest of the key authorization, not
    /// the key authorization itself.
    pub fn dns_proof(&self) -> Result<String> {
        Ok(base64url(&sha256(self.key_authorization()?)))
    }
}

impl Challenge<TlsAlpn01> {
    /// OID of the `acmeValidation` certificate extension.
    pub const ACME_VALIDATION_OID: &'static str = "1.3.6.1.5.5.7.1.31";

    /// The ALPN protocol name the validation server selects.
    pub const ACME_TLS_1_PROTOCOL: &'static str = "acme-tls/1";

    /// Returns the `acmeValidation` value for the self-signed validation
    /// certificate: the raw SHA-256 digest of the key authorization,
    /// carried in an extension with OID
    /// [`ACME_VALIDATION_OID`](Self::ACME_VALIDATION_OID) and presented
    /// under the `acme-tls/1` ALPN protocol.
    pub fn tls_alpn_proof(&self) -> Result<[u8; 32]> {
        Ok(sha256(self.key_authorization()?))
    }
}

impl<K> Challenge<K> {
    fn untyped(
        login: &Login,
        api_challenge: api::Challenge,
        retry_after: Option<SystemTime>,
    ) -> Challenge<K> {
        Challenge {
            login: login.clone(),
            api_challenge,
            retry_after,
            _kind: PhantomData,
        }
    }

    /// The challenge type string.
    pub fn type_(&self) -> &str {
        &self.api_challenge.type_
    }

    pub fn url(&self) -> &str {
        &self.api_challenge.url
    }

    pub fn status(&self) -> ChallengeStatus {
        self.api_challenge.status
    }

    /// When the server validated this challenge, RFC 3339 format.
    pub fn validated(&self) -> Option<&str> {
        self.api_challenge.validated.as_deref()
    }

    /// Why validation failed, when the challenge is invalid.
    pub fn error(&self) -> Option<&api::Problem> {
        self.api_challenge.error.as_ref()
    }

    /// The challenge token.
    pub fn token(&self) -> Result<&str> {
        self.api_challenge
            .token
            .as_deref()
            .ok_or_else(|| Error::Protocol("challenge without token".to_owned()))
    }

    /// The key authorization: `<token>.<thumbprint of the account key>`.
    pub fn key_authorization(&self) -> Result<String> {
        key_authorization(self.token()?, &self.login.key())
    }

    /// Whether this challenge still has to be validated.
    pub fn needs_validation(&self) -> bool {
        matches!(self.status(), ChallengeStatus::Pending)
    }

    /// Returns a reference to the challenge's API object.
    ///
    /// Useful for debugging.
    pub fn api_challenge(&self) -> &api::Challenge {
        &self.api_challenge
    }

    /// Signals the server that the challenge response is in place by
    /// POSTing `{}` to the challenge URL.
    ///
    /// The proof must be served before this call: as a well-known HTTP
    /// file, a DNS TXT record or an ALPN certificate. Use
    /// [`poll()`](Self::poll) afterwards to wait for the verdict.
    pub async fn trigger(&mut self) -> Result<()> {
        let res = self
            .login
            .post(&self.api_challenge.url, &api::EmptyObject)
            .await?;

        self.retry_after = req_retry_after(&res);
        self.replace(read_json(res).await?)
    }

    /// Refreshes the challenge document.
    pub async fn update(&mut self) -> Result<()> {
        let url = self.api_challenge.url.clone();
        let (api_challenge, retry_after) = self.login.fetch_resource::<api::Challenge>(&url).await?;
        self.retry_after = retry_after;
        self.replace(api_challenge)
    }

    /// Polls until the challenge leaves `pending`/`processing`, honoring
    /// server-supplied `Retry-After` deadlines and falling back to
    /// `interval` between refreshes.
    ///
    /// When the server rejects the challenge, the final status is
    /// `invalid` and [`error()`](Self::error) carries the reason.
    pub async fn poll(&mut self, interval: Duration) -> Result<ChallengeStatus> {
        loop {
            match self.status() {
                ChallengeStatus::Pending | ChallengeStatus::Processing => {}
                status => return Ok(status),
            }

            wait_before_retry(self.retry_after, interval).await;
            self.update().await?;
        }
    }

    fn replace(&mut self, api_challenge: api::Challenge) -> Result<()> {
        // a challenge URL never changes its type
        if api_challenge.type_ != self.api_challenge.type_ {
            return Err(Error::Protocol(format!(
                "challenge changed type from {:?} to {:?}",
                self.api_challenge.type_, api_challenge.type_,
            )));
        }

        self.api_challenge = api_challenge;
        Ok(())
    }
}
