use serde::{Deserialize, Serialize};

use crate::api;

/// The status of a [`Challenge`].
///
/// See [RFC 8555 §7.1.6].
///
/// [RFC 8555 §7.1.6]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.6
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Pending,
    Processing,
    Valid,
    Invalid,

    /// Any status string this client does not know.
    #[default]
    #[serde(other)]
    Unknown,
}

/// An ACME challenge object.
///
/// Represents a server's offer to validate a client's possession of an identifier in a specific
/// way.
///
/// See [RFC 8555 §7.1.5].
///
/// # Example JSON
///
/// ```json
/// {
///   "type": "http-01",
///   "status": "pending",
///   "url": "https://example.com/acme/chall/prV_B7yEyA4",
///   "token": "DGyRejmCefe7v4NfDGDKfA"
/// }
/// ```
///
/// [RFC 8555 §7.1.5]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.5
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Type of challenge encoded in the object.
    #[serde(rename = "type")]
    pub type_: String,

    /// URL to which a response can be posted.
    pub url: String,

    pub status: ChallengeStatus,

    /// Time at which the server validated this challenge. RFC 3339 format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validated: Option<String>,

    /// Error that occurred while the server was validating the challenge, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<api::Problem>,

    /// Random token for key authorization.
    ///
    /// Present on the token-bearing challenge types (`http-01`, `dns-01`,
    /// `tls-alpn-01`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        for (input, expected) in [
            ("pending", ChallengeStatus::Pending),
            ("processing", ChallengeStatus::Processing),
            ("valid", ChallengeStatus::Valid),
            ("invalid", ChallengeStatus::Invalid),
            ("queued", ChallengeStatus::Unknown),
        ] {
            let status: ChallengeStatus = serde_json::from_str(&format!("\"{input}\"")).unwrap();
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn test_rejected_challenge_carries_error() {
        let challenge: Challenge = serde_json::from_str(
            r#"{
                "type": "dns-01",
                "status": "invalid",
                "error": {
                    "type": "urn:ietf:params:acme:error:dns",
                    "detail": "NXDOMAIN looking up TXT for _acme-challenge.example.org",
                    "status": 400
                },
                "url": "https://ex/chall/2",
                "token": "tok"
            }"#,
        )
        .unwrap();

        assert_eq!(challenge.status, ChallengeStatus::Invalid);
        let error = challenge.error.unwrap();
        assert_eq!(error.type_uri.as_deref(), Some("urn:ietf:params:acme:error:dns"));
    }
}
