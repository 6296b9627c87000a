//! Order life cycle.
//!
//! An order is created with a set of identifiers, authorized by completing
//! one challenge per pending [`Authorization`], finalized with a CSR and
//! finally downloaded as a [`Certificate`]:
//!
//! 1. [`Account::new_order()`](crate::Account::new_order) →
//!    [`Order`] (`pending`)
//! 2. [`Order::authorizations()`] → [`Authorization`] → challenge
//! 3. [`Order::execute()`] or [`Order::finalize()`] (`processing`)
//! 4. [`Order::poll()`] until `valid`, then [`Order::certificate()`]

use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::{
    api::{self, OrderStatus},
    authz::Authorization,
    cert::Certificate,
    csr::{create_csr, CsrConfig},
    error::{Error, Result},
    key::KeyPair,
    login::Login,
    util::{read_json, wait_before_retry},
};

/// Settings for placing an order, see
/// [`Account::new_order()`](crate::Account::new_order).
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfig {
    /// The identifiers the certificate is requested for. The first one
    /// becomes the CSR's common name.
    pub identifiers: Vec<api::Identifier>,

    /// Requested `notBefore` of the certificate, RFC 3339 format. Most
    /// CAs ignore or reject this.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,

    /// Requested `notAfter` of the certificate, RFC 3339 format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_after: Option<String>,
}

impl OrderConfig {
    /// Order for a list of DNS names. IDN names are ACE encoded.
    pub fn dns(domains: &[&str]) -> Result<OrderConfig> {
        let identifiers = domains
            .iter()
            .map(|domain| api::Identifier::dns(domain))
            .collect::<Result<Vec<_>>>()?;

        Ok(OrderConfig {
            identifiers,
            ..OrderConfig::default()
        })
    }
}

/// A certificate order.
///
/// The order URL is fixed at creation; everything else mirrors the
/// server-side document, refreshed by [`update()`](Self::update).
#[derive(Debug)]
pub struct Order {
    login: Login,
    url: String,
    api_order: api::Order,
    retry_after: Option<SystemTime>,
}

impl Order {
    pub(crate) fn from_api(login: Login, url: String, api_order: api::Order) -> Order {
        Order {
            login,
            url,
            api_order,
            retry_after: None,
        }
    }

    /// Fetches an existing order from its URL.
    pub async fn bind(login: &Login, url: &str) -> Result<Order> {
        let (api_order, retry_after) = login.fetch_resource(url).await?;
        Ok(Order {
            login: login.clone(),
            url: url.to_owned(),
            api_order,
            retry_after,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> OrderStatus {
        self.api_order.status()
    }

    pub fn identifiers(&self) -> &[api::Identifier] {
        &self.api_order.identifiers
    }

    /// Expiry of the order document, RFC 3339 format.
    pub fn expires(&self) -> Option<&str> {
        self.api_order.expires.as_deref()
    }

    pub fn not_before(&self) -> Option<&str> {
        self.api_order.not_before.as_deref()
    }

    pub fn not_after(&self) -> Option<&str> {
        self.api_order.not_after.as_deref()
    }

    /// The certificate download URL. Present iff the order is valid.
    pub fn certificate_url(&self) -> Option<&str> {
        self.api_order.certificate.as_deref()
    }

    /// The problem that moved the order to `invalid`, if the server
    /// reported one.
    pub fn error(&self) -> Option<&api::Problem> {
        self.api_order.error.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.status() == OrderStatus::Pending
    }

    /// All authorizations passed; the order accepts a CSR.
    pub fn is_ready(&self) -> bool {
        self.status() == OrderStatus::Ready
    }

    pub fn is_processing(&self) -> bool {
        self.status() == OrderStatus::Processing
    }

    pub fn is_valid(&self) -> bool {
        self.status() == OrderStatus::Valid
    }

    pub fn is_invalid(&self) -> bool {
        self.status() == OrderStatus::Invalid
    }

    /// The order cannot proceed: it is invalid, or the server attached an
    /// error to it.
    pub fn is_failed(&self) -> bool {
        self.is_invalid() || self.api_order.error.is_some()
    }

    /// Returns a reference to the order's API object.
    ///
    /// Useful for debugging.
    pub fn api_order(&self) -> &api::Order {
        &self.api_order
    }

    /// Refreshes the order document (POST-as-GET to the order URL).
    pub async fn update(&mut self) -> Result<()> {
        let (from_api, retry_after) = self.login.fetch_resource(&self.url).await?;
        self.api_order.overwrite(from_api)?;
        self.retry_after = retry_after;
        Ok(())
    }

    /// The authorizations that must be completed before this order can be
    /// finalized. Some may already be valid from earlier orders.
    pub async fn authorizations(&self) -> Result<Vec<Authorization>> {
        let mut result = Vec::new();

        if let Some(urls) = &self.api_order.authorizations {
            for url in urls {
                result.push(Authorization::bind(&self.login, url).await?);
            }
        }

        Ok(result)
    }

    /// Submits a CSR (DER encoded) to the order's finalize URL.
    ///
    /// The response is the updated order document, typically in
    /// `processing` state; use [`poll()`](Self::poll) to wait for
    /// issuance.
    pub async fn finalize(&mut self, csr_der: &[u8]) -> Result<()> {
        if self.api_order.finalize.is_empty() {
            return Err(Error::Protocol("order without finalize URL".to_owned()));
        }

        let finalize_url = self.api_order.finalize.clone();
        let res = self
            .login
            .post(&finalize_url, &api::Finalize::new(csr_der))
            .await?;

        self.retry_after = crate::req::req_retry_after(&res);
        let from_api = read_json(res).await?;
        self.api_order.overwrite(from_api)?;

        Ok(())
    }

    /// Builds a CSR for the order's identifiers, signs it with
    /// `cert_key` and finalizes the order with it.
    pub async fn execute(&mut self, cert_key: &KeyPair) -> Result<()> {
        let mut config = CsrConfig::default();

        for identifier in &self.api_order.identifiers {
            if identifier.is_type_dns() {
                config.domains.push(identifier.value.clone());
            } else if identifier.is_type_ip() {
                let addr = identifier.value.parse().map_err(|err| {
                    Error::Protocol(format!(
                        "order has malformed ip identifier {:?}: {err}",
                        identifier.value,
                    ))
                })?;
                config.ips.push(addr);
            } else {
                return Err(Error::Usage(format!(
                    "cannot build a CSR for identifier type {:?}",
                    identifier.type_,
                )));
            }
        }

        let csr_der = create_csr(&config, cert_key)?;
        self.finalize(&csr_der).await
    }

    /// Polls the order until it reaches `valid` or `invalid`, honoring
    /// server-supplied `Retry-After` deadlines and falling back to
    /// `interval` between refreshes.
    pub async fn poll(&mut self, interval: Duration) -> Result<OrderStatus> {
        loop {
            match self.status() {
                status @ (OrderStatus::Valid | OrderStatus::Invalid) => return Ok(status),
                _ => {}
            }

            wait_before_retry(self.retry_after, interval).await;
            self.update().await?;
        }
    }

    /// The issued certificate.
    ///
    /// Only available once the order is valid; call
    /// [`Certificate::download()`] on the result to fetch the chain.
    pub fn certificate(&self) -> Result<Certificate> {
        if !self.is_valid() {
            return Err(Error::Usage(format!(
                "certificate is only available once the order is valid, not {:?}",
                self.status(),
            )));
        }

        let url = self.api_order.certificate.clone().ok_or_else(|| {
            Error::Protocol("valid order without certificate URL".to_owned())
        })?;

        Ok(Certificate::new(self.login.clone(), url))
    }
}
