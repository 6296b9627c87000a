use std::{fmt, sync::Arc, time::Duration};

use parking_lot::Mutex;

use crate::{
    account::{Account, AccountConfig},
    api,
    error::{Error, Result},
    key::KeyPair,
    login::Login,
    req::{req_expect_header, req_get, req_handle_error, req_head, req_location, req_replay_nonce},
    trans::Transport,
    util::read_json,
};

const LETSENCRYPT_URL: &str = "https://acme-v02.api.letsencrypt.org/directory";
const LETSENCRYPT_STAGING_URL: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Enumeration of known ACME API directories.
#[derive(Debug, Clone)]
pub enum DirectoryUrl<'a> {
    /// The main Let's Encrypt directory.
    ///
    /// Not appropriate for testing / development.
    LetsEncrypt,

    /// The staging Let's Encrypt directory.
    ///
    /// Use for testing and development. Doesn't issue "valid" certificates. The root signing
    /// certificate is not supposed to be in any trust chains.
    LetsEncryptStaging,

    /// Provide an arbitrary directory URL to connect to.
    Other(&'a str),
}

impl DirectoryUrl<'_> {
    fn to_url(&self) -> &str {
        match self {
            DirectoryUrl::LetsEncrypt => LETSENCRYPT_URL,
            DirectoryUrl::LetsEncryptStaging => LETSENCRYPT_STAGING_URL,
            DirectoryUrl::Other(url) => url,
        }
    }
}

/// Resource kinds listed in the ACME directory document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    NewNonce,
    NewAccount,
    NewOrder,
    NewAuthz,
    RevokeCert,
    KeyChange,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resource::NewNonce => "newNonce",
            Resource::NewAccount => "newAccount",
            Resource::NewOrder => "newOrder",
            Resource::NewAuthz => "newAuthz",
            Resource::RevokeCert => "revokeCert",
            Resource::KeyChange => "keyChange",
        })
    }
}

/// Networking configuration of a [`Session`].
#[derive(Debug, Default)]
pub struct SessionConfig {
    /// Preconfigured HTTP client, for callers that need a custom trust
    /// store, proxy or timeouts. When absent, a client with 30 second
    /// timeouts is built.
    pub client: Option<reqwest::Client>,

    /// Value for the `Accept-Language` header on all requests, so that
    /// problem documents come back localized.
    pub accept_language: Option<String>,
}

#[derive(Debug)]
struct SessionInner {
    directory_url: String,
    client: reqwest::Client,
    accept_language: Option<String>,

    /// Directory document, fetched on first use or on explicit refresh.
    directory: Mutex<Option<Arc<api::Directory>>>,

    /// Single-slot anti-replay nonce cache. Consumed when a request is
    /// signed, replaced from each response's `Replay-Nonce` header.
    nonce: Mutex<Option<String>>,
}

/// Entry point for accessing an ACME API.
///
/// A session is cheap to clone and holds the directory document and the
/// nonce cache. Signed requests within one session are strictly serial;
/// for parallel issuance, use one session per task.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Creates a session for the given directory URL.
    ///
    /// The directory itself is not fetched until first use.
    pub fn new(url: DirectoryUrl<'_>) -> Result<Session> {
        Session::with_config(url, SessionConfig::default())
    }

    /// Creates a session with explicit networking configuration.
    pub fn with_config(url: DirectoryUrl<'_>, config: SessionConfig) -> Result<Session> {
        let client = match config.client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(30))
                .timeout(Duration::from_secs(30))
                .build()?,
        };

        Ok(Session {
            inner: Arc::new(SessionInner {
                directory_url: url.to_url().to_owned(),
                client,
                accept_language: config.accept_language,
                directory: Mutex::new(None),
                nonce: Mutex::new(None),
            }),
        })
    }

    /// The directory URL this session talks to.
    pub fn directory_url(&self) -> &str {
        &self.inner.directory_url
    }

    /// The directory document, fetched on first call.
    pub async fn directory(&self) -> Result<Arc<api::Directory>> {
        if let Some(directory) = self.inner.directory.lock().clone() {
            return Ok(directory);
        }

        self.fetch_directory().await
    }

    /// Re-fetches the directory document.
    ///
    /// The directory is never refreshed implicitly after the first fetch;
    /// call this when the CA is known to have changed its endpoints.
    pub async fn refresh_directory(&self) -> Result<()> {
        self.fetch_directory().await.map(drop)
    }

    async fn fetch_directory(&self) -> Result<Arc<api::Directory>> {
        log::debug!("fetch directory: {}", self.inner.directory_url);

        let res = req_get(
            &self.inner.client,
            &self.inner.directory_url,
            self.accept_language(),
        )
        .await?;
        let res = req_handle_error(res).await?;

        let directory = Arc::new(read_json::<api::Directory>(res).await?);
        *self.inner.directory.lock() = Some(Arc::clone(&directory));

        Ok(directory)
    }

    /// URL of the given resource, from the directory document.
    pub async fn resource_url(&self, resource: Resource) -> Result<String> {
        let directory = self.directory().await?;

        let url = match resource {
            Resource::NewNonce => Some(directory.new_nonce.as_str()),
            Resource::NewAccount => Some(directory.new_account.as_str()),
            Resource::NewOrder => Some(directory.new_order.as_str()),
            Resource::NewAuthz => directory.new_authz.as_deref(),
            Resource::RevokeCert => Some(directory.revoke_cert.as_str()),
            Resource::KeyChange => Some(directory.key_change.as_str()),
        };

        url.map(str::to_owned)
            .ok_or_else(|| Error::Usage(format!("ACME provider does not offer {resource}")))
    }

    /// The directory's `meta` object. Empty when the CA sent none.
    pub async fn meta(&self) -> Result<api::DirectoryMeta> {
        Ok(self.directory().await?.meta.clone().unwrap_or_default())
    }

    /// Binds an account URL and key pair into a [`Login`] without any
    /// server round trip.
    pub fn login(&self, account_url: impl Into<String>, key: KeyPair) -> Login {
        Login::new(self, account_url, key)
    }

    /// Registers an account with the CA, or returns the existing account
    /// registered for `key`.
    pub async fn register_account(&self, config: &AccountConfig, key: KeyPair) -> Result<Account> {
        let claims = api::Account {
            contact: (!config.contacts.is_empty()).then(|| config.contacts.clone()),
            terms_of_service_agreed: config.terms_of_service_agreed.then_some(true),
            only_return_existing: config.only_return_existing.then_some(true),
            ..Default::default()
        };

        let url = self.resource_url(Resource::NewAccount).await?;
        let res = Transport::new(self).call_jwk(&url, &key, &claims).await?;

        // mandatory on newAccount responses (RFC 8555 §7.3)
        let account_url = req_location(&res)?;
        log::debug!("account URL: {account_url}");

        let api_account = read_json::<api::Account>(res).await?;

        Ok(Account::from_api(
            Login::new(self, account_url, key),
            api_account,
        ))
    }

    /// Looks up the existing account registered for `key`.
    ///
    /// Fails with [`ServerErrorKind::AccountDoesNotExist`] when the key is
    /// not bound to any account.
    ///
    /// [`ServerErrorKind::AccountDoesNotExist`]: crate::ServerErrorKind::AccountDoesNotExist
    pub async fn load_account(&self, key: KeyPair) -> Result<Account> {
        let config = AccountConfig {
            only_return_existing: true,
            ..AccountConfig::default()
        };
        self.register_account(&config, key).await
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.inner.client
    }

    pub(crate) fn accept_language(&self) -> Option<&str> {
        self.inner.accept_language.as_deref()
    }

    /// Takes the cached nonce, or fetches a fresh one from `newNonce`.
    ///
    /// The nonce counts as consumed from here on: if the signed request it
    /// goes into fails on the network, the slot stays empty.
    pub(crate) async fn take_nonce(&self) -> Result<String> {
        if let Some(nonce) = self.inner.nonce.lock().take() {
            log::trace!("use cached nonce");
            return Ok(nonce);
        }

        log::debug!("request new nonce");
        let url = self.resource_url(Resource::NewNonce).await?;
        let res = req_head(&self.inner.client, &url).await?;
        let res = req_handle_error(res).await?;

        let nonce = req_expect_header(&res, "replay-nonce")?;
        if !is_valid_nonce(&nonce) {
            return Err(Error::Protocol(
                "malformed replay-nonce from newNonce".to_owned(),
            ));
        }

        Ok(nonce)
    }

    /// Stores the response's `Replay-Nonce`, if present, as the new cached
    /// nonce.
    ///
    /// Values that are not valid base64url are rejected
    /// ([RFC 8555 §6.5.1]).
    ///
    /// [RFC 8555 §6.5.1]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.5.1
    pub(crate) fn extract_nonce(&self, res: &reqwest::Response) {
        if let Some(nonce) = req_replay_nonce(res) {
            if !is_valid_nonce(&nonce) {
                log::debug!("ignoring malformed replay-nonce");
                return;
            }

            log::trace!("store new nonce");
            *self.inner.nonce.lock() = Some(nonce);
        }
    }

    #[cfg(test)]
    pub(crate) fn cached_nonce(&self) -> Option<String> {
        self.inner.nonce.lock().clone()
    }
}

/// A nonce must be valid base64url ([RFC 8555 §6.5.1]); anything else is
/// rejected before it is used for signing.
///
/// [RFC 8555 §6.5.1]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.5.1
fn is_valid_nonce(nonce: &str) -> bool {
    crate::util::base64url_decode(nonce).is_ok()
}
