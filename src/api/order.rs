use serde::{Deserialize, Serialize};

use crate::{
    api,
    error::{Error, Result},
};

/// The status of an [`Order`].
///
/// See [RFC 8555 §7.1.6].
///
/// [RFC 8555 §7.1.6]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.6
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Ready,
    Processing,
    Valid,
    Invalid,

    /// Any status string this client does not know.
    #[default]
    #[serde(other)]
    Unknown,
}

/// An ACME order object.
///
/// Represents a client's request for a certificate and is used to track the progress of that order
/// through to issuance.
///
/// See [RFC 8555 §7.1.3].
///
/// [RFC 8555 §7.1.3]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.3
///
/// # Example JSON
///
/// ```json
/// {
///   "status": "pending",
///   "expires": "2019-01-09T08:26:43.570360537Z",
///   "identifiers": [
///     {
///       "type": "dns",
///       "value": "example.org"
///     }
///   ],
///   "authorizations": [
///     "https://example.com/acme/authz/PAniVnsZcis"
///   ],
///   "finalize": "https://example.com/acme/order/TOlocE8rfgo/finalize"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,

    /// The timestamp after which the server will consider this order
    /// invalid. RFC 3339 format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,

    pub identifiers: Vec<api::Identifier>,

    /// Requested `notBefore` of the certificate. RFC 3339 format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,

    /// Requested `notAfter` of the certificate. RFC 3339 format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_after: Option<String>,

    /// The error that occurred while processing the order, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<api::Problem>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorizations: Option<Vec<String>>,

    /// URL the CSR is submitted to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub finalize: String,

    /// URL the issued certificate is downloaded from.
    ///
    /// Only present once the order status is `valid`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
}

impl Order {
    pub fn status(&self) -> OrderStatus {
        self.status.unwrap_or_default()
    }

    // Some CAs were observed to return identifiers in a different order
    // than submitted, which may flip the primary name with a SAN.
    //
    // This overwrites self without changing the order of the identifiers.
    pub(crate) fn overwrite(&mut self, mut from_api: Self) -> Result<()> {
        if from_api.identifiers.len() != self.identifiers.len()
            || from_api
                .identifiers
                .iter()
                .any(|id| !self.identifiers.contains(id))
        {
            return Err(Error::Protocol(format!(
                "order identifier mismatch: had {:?} and got {:?}",
                self.identifiers, from_api.identifiers,
            )));
        }

        from_api.identifiers = std::mem::take(&mut self.identifiers);
        *self = from_api;
        Ok(())
    }
}
