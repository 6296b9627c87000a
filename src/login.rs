use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use zeroize::Zeroizing;

use crate::{
    account::Account,
    api,
    error::Result,
    jws,
    key::KeyPair,
    req::req_retry_after,
    session::{Resource, Session},
    trans::Transport,
    util::read_json,
};

#[derive(Debug)]
struct LoginInner {
    session: Session,
    account_url: String,

    /// Only ever replaced by a successful key rollover.
    key: Mutex<Arc<KeyPair>>,
}

/// Binding of an account URL and its key pair to a [`Session`].
///
/// A login is the only authority a signed request trusts to identify an
/// account: every `kid`-signed request flows through one. Logins are
/// created by [`Session::register_account()`], [`Session::load_account()`]
/// or, when the account URL is already known, [`Session::login()`].
#[derive(Debug, Clone)]
pub struct Login {
    inner: Arc<LoginInner>,
}

impl Login {
    pub(crate) fn new(session: &Session, account_url: impl Into<String>, key: KeyPair) -> Login {
        Login {
            inner: Arc::new(LoginInner {
                session: session.clone(),
                account_url: account_url.into(),
                key: Mutex::new(Arc::new(key)),
            }),
        }
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// The account URL, used as the `kid` of every signed request.
    pub fn account_url(&self) -> &str {
        &self.inner.account_url
    }

    /// The account's private key as unencrypted PKCS#8 PEM.
    ///
    /// Persist this to bind to the same account again later.
    pub fn key_pem(&self) -> Result<Zeroizing<String>> {
        self.key().to_pkcs8_pem()
    }

    /// Fetches the account resource this login is bound to.
    pub async fn account(&self) -> Result<Account> {
        let res = self.post_as_get(self.account_url()).await?;
        let api_account = read_json::<api::Account>(res).await?;
        Ok(Account::from_api(self.clone(), api_account))
    }

    /// Rolls the account over to a new key pair ([RFC 8555 §7.3.5]).
    ///
    /// An inner JWS signed by the new key, carrying the account URL and
    /// the JWK of the current key, is wrapped as the payload of a regular
    /// `kid`-signed request to the directory's `keyChange` URL. On success
    /// this login signs with the new key.
    ///
    /// [RFC 8555 §7.3.5]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.3.5
    pub async fn key_change(&self, new_key: KeyPair) -> Result<()> {
        let url = self.session().resource_url(Resource::KeyChange).await?;

        let current_key = self.key();
        let inner_jws = jws::key_change_jws(&url, self.account_url(), &current_key, &new_key)?;

        self.post(&url, &inner_jws).await?;

        log::debug!("account key rolled over");
        *self.inner.key.lock() = Arc::new(new_key);
        Ok(())
    }

    pub(crate) fn key(&self) -> Arc<KeyPair> {
        Arc::clone(&self.inner.key.lock())
    }

    /// `kid`-signed POST with a claims payload.
    pub(crate) async fn post<T>(&self, url: &str, claims: &T) -> Result<reqwest::Response>
    where
        T: Serialize + ?Sized,
    {
        let key = self.key();
        Transport::new(self.session())
            .call_kid(url, &key, self.account_url(), claims)
            .await
    }

    /// POST-as-GET: `kid`-signed with an empty payload.
    pub(crate) async fn post_as_get(&self, url: &str) -> Result<reqwest::Response> {
        let key = self.key();
        Transport::new(self.session())
            .call_kid(url, &key, self.account_url(), &api::EmptyString)
            .await
    }

    /// POST-as-GET with an `Accept` header, for certificate downloads.
    pub(crate) async fn post_as_get_accept(
        &self,
        url: &str,
        accept: &str,
    ) -> Result<reqwest::Response> {
        let key = self.key();
        Transport::new(self.session())
            .call_kid_accept(url, &key, self.account_url(), &api::EmptyString, accept)
            .await
    }

    /// POST-as-GET returning the body and the response's `Retry-After`
    /// deadline, the common shape of a resource refresh.
    pub(crate) async fn fetch_resource<T>(
        &self,
        url: &str,
    ) -> Result<(T, Option<std::time::SystemTime>)>
    where
        T: serde::de::DeserializeOwned,
    {
        let res = self.post_as_get(url).await?;
        let retry_after = req_retry_after(&res);
        Ok((read_json(res).await?, retry_after))
    }
}
