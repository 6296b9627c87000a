use std::{
    io,
    time::{Duration, SystemTime},
};

use base64::prelude::*;
use serde::de;
use sha2::{Digest as _, Sha256};

use crate::error::{Error, Result};

pub(crate) fn base64url<T: ?Sized + AsRef<[u8]>>(input: &T) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(input)
}

pub(crate) fn base64url_decode(input: &str) -> Result<Vec<u8>> {
    BASE64_URL_SAFE_NO_PAD
        .decode(input)
        .map_err(|err| Error::Protocol(format!("invalid base64url: {err}")))
}

pub(crate) fn sha256(input: impl AsRef<[u8]>) -> [u8; 32] {
    Sha256::digest(input).into()
}

/// Converts a domain name to its ASCII Compatible Encoding (Punycode).
///
/// A leading `*.` wildcard label is preserved. The result is lowercased.
pub(crate) fn to_ace(domain: &str) -> Result<String> {
    let (wildcard, name) = match domain.strip_prefix("*.") {
        Some(rest) => (true, rest),
        None => (false, domain),
    };

    if name.is_empty() || name.split('.').any(str::is_empty) {
        return Err(Error::Usage(format!("invalid domain name: {domain:?}")));
    }

    let ace = idna::domain_to_ascii(name)
        .map_err(|err| Error::Usage(format!("invalid domain name {domain:?}: {err}")))?;

    if ace.is_empty() || ace.split('.').any(str::is_empty) {
        return Err(Error::Usage(format!("invalid domain name: {domain:?}")));
    }

    Ok(if wildcard {
        format!("*.{}", ace.to_lowercase())
    } else {
        ace.to_lowercase()
    })
}

/// Parses a `Retry-After` header value, which is either a delta in seconds
/// or an HTTP-date.
pub(crate) fn parse_retry_after(value: &str, now: SystemTime) -> Option<SystemTime> {
    let value = value.trim();

    if let Ok(secs) = value.parse::<u64>() {
        return Some(now + Duration::from_secs(secs));
    }

    httpdate::parse_http_date(value).ok()
}

/// Writes `der` as a PEM block with the given label, 64 columns per line,
/// `\n` line endings.
pub(crate) fn write_pem(der: &[u8], label: &str, writer: &mut dyn io::Write) -> io::Result<()> {
    let block = pem::Pem::new(label, der.to_vec());
    let config = pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF);
    writer.write_all(pem::encode_config(&block, config).as_bytes())
}

pub(crate) async fn read_json<T: de::DeserializeOwned>(res: reqwest::Response) -> Result<T> {
    let body = crate::req::req_safe_read_body(res).await;
    log::debug!("{body}");
    Ok(serde_json::from_str(&body)?)
}

/// Sleeps until a server-supplied `Retry-After` deadline, or for `fallback`
/// when the server did not send one (or the deadline already passed).
pub(crate) async fn wait_before_retry(retry_after: Option<SystemTime>, fallback: Duration) {
    let delay = retry_after
        .and_then(|deadline| deadline.duration_since(SystemTime::now()).ok())
        .unwrap_or(fallback);

    tokio::time::sleep(delay).await;
}
