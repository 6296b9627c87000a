use std::time::SystemTime;

use crate::api::Problem;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced while talking to an ACME provider.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Transport failure before a response was received.
    ///
    /// The request may not have reached the server at all, so retrying is
    /// generally safe.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server sent something this client could not make sense of: a
    /// malformed JSON document, a missing mandatory header, or an
    /// unexpected content type.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server rejected a request with a problem document.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// A precondition on the client side was violated, for example signing
    /// a CSR without any identifier.
    #[error("{0}")]
    Usage(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Protocol(format!("invalid JSON: {err}"))
    }
}

/// An error response from the ACME server, translated from an
/// [RFC 7807](https://datatracker.ietf.org/doc/html/rfc7807)
/// `application/problem+json` document.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{problem}")]
pub struct ServerError {
    /// Error class derived from the problem type URI.
    pub kind: ServerErrorKind,

    /// HTTP status code of the failed response.
    pub status: u16,

    /// The problem document as sent by the server.
    pub problem: Problem,

    /// Deadline from the `Retry-After` header, if the server sent one.
    ///
    /// Mostly seen on [`ServerErrorKind::RateLimited`] responses.
    pub retry_after: Option<SystemTime>,

    /// Documentation URLs from `Link: rel="help"` headers.
    pub documents: Vec<String>,
}

/// Classification of an ACME problem document.
///
/// Selected from the suffix of the `urn:ietf:params:acme:error:*` type
/// URI. Problem types this client has no special handling for map to
/// [`ServerErrorKind::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ServerErrorKind {
    /// The nonce in the request was stale. Recovered inside the transport
    /// by re-signing with a fresh nonce; only surfaced when the bounded
    /// retry budget is exhausted.
    BadNonce,

    /// The request hit a rate limit. [`ServerError::retry_after`] carries
    /// the earliest time a retry makes sense.
    RateLimited,

    /// The user must visit the URL in the problem's `instance` field, for
    /// example to agree to updated terms of service.
    UserActionRequired,

    /// A contact URL in the account was rejected.
    UnsupportedContact,

    /// An identifier type or value in the order was rejected.
    UnsupportedIdentifier,

    /// The CA requires the account to be bound to an external account.
    ExternalAccountRequired,

    /// `onlyReturnExisting` was set but the key is not registered.
    AccountDoesNotExist,

    /// The account lacks authorization for the requested action.
    Unauthorized,

    /// The request was syntactically invalid.
    Malformed,

    /// The CSR was rejected.
    BadCsr,

    /// Any other problem type.
    Other,
}

impl ServerErrorKind {
    /// Maps a problem type URI to its error class.
    pub(crate) fn from_type_uri(uri: &str) -> ServerErrorKind {
        let suffix = uri
            .strip_prefix("urn:ietf:params:acme:error:")
            .or_else(|| uri.strip_prefix("urn:acme:error:"))
            .unwrap_or(uri);

        match suffix {
            "badNonce" => ServerErrorKind::BadNonce,
            "rateLimited" => ServerErrorKind::RateLimited,
            "userActionRequired" => ServerErrorKind::UserActionRequired,
            "unsupportedContact" => ServerErrorKind::UnsupportedContact,
            "unsupportedIdentifier" => ServerErrorKind::UnsupportedIdentifier,
            "externalAccountRequired" => ServerErrorKind::ExternalAccountRequired,
            "accountDoesNotExist" => ServerErrorKind::AccountDoesNotExist,
            "unauthorized" => ServerErrorKind::Unauthorized,
            "malformed" => ServerErrorKind::Malformed,
            "badCSR" => ServerErrorKind::BadCsr,
            _ => ServerErrorKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_type_uri() {
        assert_eq!(
            ServerErrorKind::from_type_uri("urn:ietf:params:acme:error:badNonce"),
            ServerErrorKind::BadNonce,
        );
        assert_eq!(
            ServerErrorKind::from_type_uri("urn:ietf:params:acme:error:rateLimited"),
            ServerErrorKind::RateLimited,
        );
        // legacy draft prefix
        assert_eq!(
            ServerErrorKind::from_type_uri("urn:acme:error:malformed"),
            ServerErrorKind::Malformed,
        );
        assert_eq!(
            ServerErrorKind::from_type_uri("urn:ietf:params:acme:error:dns"),
            ServerErrorKind::Other,
        );
        assert_eq!(
            ServerErrorKind::from_type_uri("about:blank"),
            ServerErrorKind::Other,
        );
    }
}
