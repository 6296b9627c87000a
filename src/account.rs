use std::time::Duration;

use serde::Serialize;

use crate::{
    api::{self, AccountStatus, OrderStatus},
    cert::RevocationReason,
    error::{Error, Result},
    key::KeyPair,
    login::Login,
    order::{Order, OrderConfig},
    req::req_location,
    session::Resource,
    util::read_json,
};

/// Settings for registering an account, see
/// [`Session::register_account()`](crate::Session::register_account).
#[derive(Debug, Clone, Default)]
pub struct AccountConfig {
    /// Contact URLs, e.g. `mailto:admin@example.org`.
    pub contacts: Vec<String>,

    /// Must be set when the CA's subscriber agreement requires it; the
    /// terms-of-service URL is available via
    /// [`Session::meta()`](crate::Session::meta).
    pub terms_of_service_agreed: bool,

    /// Only look up the account registered for the key, never create one.
    pub only_return_existing: bool,
}

/// Changes to apply to an existing account, see [`Account::modify()`].
///
/// Fields left `None` stay untouched on the server.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_of_service_agreed: Option<bool>,
}

/// Account with an ACME provider.
///
/// The account URL never changes after registration; the server-side
/// document is refreshed with [`update()`](Self::update) and mutated
/// through [`modify()`](Self::modify), [`deactivate()`](Self::deactivate)
/// and [`change_key()`](Self::change_key).
#[derive(Debug)]
pub struct Account {
    login: Login,
    api_account: api::Account,
}

impl Account {
    pub(crate) fn from_api(login: Login, api_account: api::Account) -> Account {
        Account {
            login,
            api_account,
        }
    }

    /// The login this account operates under.
    pub fn login(&self) -> &Login {
        &self.login
    }

    /// The account URL.
    pub fn url(&self) -> &str {
        self.login.account_url()
    }

    pub fn status(&self) -> AccountStatus {
        self.api_account.status()
    }

    /// Contact URLs registered with the CA.
    pub fn contacts(&self) -> &[String] {
        self.api_account.contact.as_deref().unwrap_or_default()
    }

    pub fn terms_of_service_agreed(&self) -> bool {
        self.api_account.terms_of_service_agreed()
    }

    /// URL of the account's order list, when the CA provides one.
    pub fn orders_url(&self) -> Option<&str> {
        self.api_account.orders.as_deref()
    }

    /// Whether the account carries an external account binding.
    pub fn has_external_account_binding(&self) -> bool {
        self.api_account.external_account_binding.is_some()
    }

    /// Returns a reference to the account's API object.
    ///
    /// Useful for debugging.
    pub fn api_account(&self) -> &api::Account {
        &self.api_account
    }

    /// Refreshes the account document (POST-as-GET to the account URL).
    pub async fn update(&mut self) -> Result<()> {
        let url = self.url().to_owned();
        let (api_account, _retry_after) = self.login.fetch_resource(&url).await?;
        self.api_account = api_account;
        Ok(())
    }

    /// Applies contact or terms-of-service changes.
    pub async fn modify(&mut self, update: AccountUpdate) -> Result<()> {
        let res = self.login.post(self.url(), &update).await?;
        self.api_account = read_json(res).await?;
        Ok(())
    }

    /// Deactivates the account. Permanent: the CA will refuse any further
    /// request signed under this account.
    pub async fn deactivate(&mut self) -> Result<()> {
        let res = self.login.post(self.url(), &api::Deactivation).await?;
        self.api_account = read_json(res).await?;
        Ok(())
    }

    /// Rolls the account over to a new key pair.
    pub async fn change_key(&self, new_key: KeyPair) -> Result<()> {
        self.login.key_change(new_key).await
    }

    /// Places a new certificate order.
    pub async fn new_order(&self, config: OrderConfig) -> Result<Order> {
        if config.identifiers.is_empty() {
            return Err(Error::Usage(
                "an order needs at least one identifier".to_owned(),
            ));
        }

        let url = self.login.session().resource_url(Resource::NewOrder).await?;
        let res = self.login.post(&url, &config).await?;

        let order_url = req_location(&res)?;
        let from_api = read_json::<api::Order>(res).await?;

        // keep the submitted identifier order; the first one becomes the
        // CSR's common name
        let mut api_order = api::Order {
            identifiers: config.identifiers,
            ..api::Order::default()
        };
        api_order.overwrite(from_api)?;

        Ok(Order::from_api(self.login.clone(), order_url, api_order))
    }

    /// One-shot issuance for pre-authorized identifiers: places the order,
    /// submits a CSR signed with `cert_key` and polls until the
    /// certificate is issued.
    ///
    /// Fails when the CA still wants challenges completed; use
    /// [`new_order()`](Self::new_order) and work through the
    /// authorizations in that case.
    pub async fn order_certificate(
        &self,
        config: OrderConfig,
        cert_key: &KeyPair,
        poll_interval: Duration,
    ) -> Result<Order> {
        let mut order = self.new_order(config).await?;

        match order.status() {
            OrderStatus::Ready => {}
            OrderStatus::Valid => return Ok(order),
            status => {
                return Err(Error::Usage(format!(
                    "order is {status:?}; complete the authorizations before one-shot issuance"
                )))
            }
        }

        order.execute(cert_key).await?;

        if order.poll(poll_interval).await? != OrderStatus::Valid {
            let detail = order
                .error()
                .map(ToString::to_string)
                .unwrap_or_else(|| "no error reported".to_owned());
            return Err(Error::Protocol(format!("order failed: {detail}")));
        }

        Ok(order)
    }

    /// Revokes a certificate issued to this account. `cert_der` is the
    /// DER encoding of the end-entity certificate.
    pub async fn revoke_certificate(
        &self,
        cert_der: &[u8],
        reason: Option<RevocationReason>,
    ) -> Result<()> {
        let url = self
            .login
            .session()
            .resource_url(Resource::RevokeCert)
            .await?;

        let revocation = api::Revocation::new(cert_der, RevocationReason::to_code(reason));
        self.login.post(&url, &revocation).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        key::create_p256_key,
        session::{DirectoryUrl, Session},
    };

    async fn test_account(server: &crate::test::TestServer) -> Account {
        let session = Session::new(DirectoryUrl::Other(&server.dir_url)).unwrap();
        let config = AccountConfig {
            contacts: vec!["mailto:foo@bar.com".to_owned()],
            terms_of_service_agreed: true,
            ..AccountConfig::default()
        };
        session
            .register_account(&config, create_p256_key())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_account_fields() {
        let server = crate::test::with_directory_server();
        let account = test_account(&server).await;

        assert_eq!(account.status(), AccountStatus::Valid);
        assert_eq!(account.contacts(), ["mailto:foo@bar.com"]);
        assert!(!account.has_external_account_binding());
    }

    #[tokio::test]
    async fn test_create_order() {
        let server = crate::test::with_directory_server();
        let account = test_account(&server).await;

        let order = account
            .new_order(OrderConfig::dns(&["acme-test.example.com"]).unwrap())
            .await
            .unwrap();

        assert_eq!(order.status(), OrderStatus::Pending);
        assert!(order.url().contains("/acme/order/"));
        assert!(order.certificate_url().is_none());
    }

    #[tokio::test]
    async fn test_order_without_identifiers() {
        let server = crate::test::with_directory_server();
        let account = test_account(&server).await;

        let result = account.new_order(OrderConfig::default()).await;
        assert!(matches!(result, Err(Error::Usage(_))));
    }

    #[tokio::test]
    async fn test_modify_contact() {
        let server = crate::test::with_directory_server();
        let mut account = test_account(&server).await;

        let update = AccountUpdate {
            contact: Some(vec!["mailto:new@bar.com".to_owned()]),
            ..AccountUpdate::default()
        };
        account.modify(update).await.unwrap();

        assert_eq!(account.contacts(), ["mailto:new@bar.com"]);
    }

    #[tokio::test]
    async fn test_deactivate() {
        let server = crate::test::with_directory_server();
        let mut account = test_account(&server).await;

        account.deactivate().await.unwrap();
        assert_eq!(account.status(), AccountStatus::Deactivated);
    }

    #[tokio::test]
    async fn test_revoke_certificate() {
        let server = crate::test::with_directory_server();
        let account = test_account(&server).await;

        account
            .revoke_certificate(b"fake-der", Some(RevocationReason::KeyCompromise))
            .await
            .unwrap();
    }
}
