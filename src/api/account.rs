use serde::{Deserialize, Serialize};

/// The status of an [`Account`].
///
/// See [RFC 8555 §7.1.2].
///
/// [RFC 8555 §7.1.2]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.2
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Valid,
    Deactivated,
    Revoked,

    /// Any status string this client does not know.
    #[default]
    #[serde(other)]
    Unknown,
}

/// An ACME account resource.
///
/// Represents a set of metadata associated with an account. Also doubles as
/// the claims object of `newAccount` and account update requests, where
/// only the populated fields are serialized.
///
/// See [RFC 8555 §7.1.2].
///
/// # Example JSON
///
/// ```json
/// {
///   "status": "valid",
///   "contact": [
///     "mailto:cert-admin@example.com",
///     "mailto:admin@example.com"
///   ],
///   "termsOfServiceAgreed": true,
///   "orders": "https://example.com/acme/acct/evOfKhNU60wg/orders"
/// }
/// ```
///
/// [RFC 8555 §7.1.2]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.2
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AccountStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<Vec<String>>,

    /// The external account binding token, an embedded JWS object.
    ///
    /// Opaque to this client; present when the account was bound to an
    /// external (CA-side) account at registration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_account_binding: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_of_service_agreed: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub only_return_existing: Option<bool>,

    /// URL of the account's order list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orders: Option<String>,
}

impl Account {
    pub fn status(&self) -> AccountStatus {
        self.status.unwrap_or_default()
    }

    pub fn terms_of_service_agreed(&self) -> bool {
        self.terms_of_service_agreed.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        for (input, expected) in [
            ("valid", AccountStatus::Valid),
            ("deactivated", AccountStatus::Deactivated),
            ("revoked", AccountStatus::Revoked),
            ("onHold", AccountStatus::Unknown),
        ] {
            let status: AccountStatus =
                serde_json::from_str(&format!("\"{input}\"")).unwrap();
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn test_claims_skip_absent_fields() {
        let claims = Account {
            terms_of_service_agreed: Some(true),
            contact: Some(vec!["mailto:a@b".to_owned()]),
            ..Default::default()
        };

        assert_eq!(
            serde_json::to_string(&claims).unwrap(),
            r#"{"contact":["mailto:a@b"],"termsOfServiceAgreed":true}"#,
        );
    }
}
