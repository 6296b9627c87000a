use serde::{Deserialize, Serialize};

use crate::api;

/// The status of an [`Authorization`].
///
/// See [RFC 8555 §7.1.6].
///
/// [RFC 8555 §7.1.6]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.6
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    Pending,
    Valid,
    Invalid,
    Deactivated,
    Expired,
    Revoked,

    /// Any status string this client does not know.
    #[default]
    #[serde(other)]
    Unknown,
}

/// An ACME authorization object.
///
/// Represents a server's authorization for an account to represent an identifier.
///
/// See [RFC 8555 §7.1.4].
///
/// [RFC 8555 §7.1.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.4
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    /// The identifier this authorization is for.
    ///
    /// For wildcard authorizations the value is the base domain, without
    /// the `*.` prefix; the `wildcard` flag is set instead.
    pub identifier: api::Identifier,

    pub status: AuthorizationStatus,

    /// The timestamp after which the server will consider this authorization invalid.
    ///
    /// RFC 3339 format. Required for objects with "valid" in the "status" field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,

    /// The challenges related to the identifier.
    ///
    /// - For pending authorizations, the challenges that the client can fulfill in order to prove
    ///   possession of the identifier.
    /// - For valid authorizations, the challenge that was validated.
    /// - For invalid authorizations, the challenge that was attempted and failed.
    ///
    /// A client should attempt to fulfill one of these challenges, and a server should consider
    /// any one of the challenges sufficient to make the authorization valid.
    pub challenges: Vec<api::Challenge>,

    /// Present and true iff the authorization was created from a newOrder request containing a
    /// wildcard DNS identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wildcard: Option<bool>,
}

impl Authorization {
    /// Returns true if authorization was created for a wildcard domain.
    pub fn is_wildcard(&self) -> bool {
        self.wildcard.unwrap_or(false)
    }

    /// Returns the challenge of the given type, if one is present.
    pub fn challenge(&self, type_: &str) -> Option<&api::Challenge> {
        self.challenges.iter().find(|c| c.type_ == type_)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        for (input, expected) in [
            ("pending", AuthorizationStatus::Pending),
            ("valid", AuthorizationStatus::Valid),
            ("invalid", AuthorizationStatus::Invalid),
            ("deactivated", AuthorizationStatus::Deactivated),
            ("expired", AuthorizationStatus::Expired),
            ("revoked", AuthorizationStatus::Revoked),
            ("paused", AuthorizationStatus::Unknown),
        ] {
            let status: AuthorizationStatus =
                serde_json::from_str(&format!("\"{input}\"")).unwrap();
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn test_challenge_lookup() {
        let auth: Authorization = serde_json::from_str(
            r#"{
                "identifier": { "type": "dns", "value": "example.org" },
                "status": "pending",
                "expires": "2019-01-09T08:26:43Z",
                "challenges": [
                    {
                        "type": "http-01",
                        "status": "pending",
                        "url": "https://ex/chall/1",
                        "token": "tok-http"
                    },
                    {
                        "type": "dns-01",
                        "status": "pending",
                        "url": "https://ex/chall/2",
                        "token": "tok-dns"
                    }
                ]
            }"#,
        )
        .unwrap();

        assert!(!auth.is_wildcard());
        assert_eq!(auth.challenge("http-01").unwrap().token.as_deref(), Some("tok-http"));
        assert!(auth.challenge("tls-alpn-01").is_none());
    }
}
