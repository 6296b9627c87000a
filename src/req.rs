use std::time::SystemTime;

use crate::{
    api::Problem,
    error::{Error, Result, ServerError, ServerErrorKind},
};

pub(crate) const CONTENT_TYPE_JOSE: &str = "application/jose+json";
pub(crate) const CONTENT_TYPE_PEM_CHAIN: &str = "application/pem-certificate-chain";
pub(crate) const CONTENT_TYPE_PROBLEM: &str = "application/problem+json";

pub(crate) async fn req_get(
    client: &reqwest::Client,
    url: &str,
    accept_language: Option<&str>,
) -> Result<reqwest::Response> {
    let mut req = client.get(url);
    if let Some(lang) = accept_language {
        req = req.header("accept-language", lang);
    }
    log::trace!("GET {url}");
    Ok(req.send().await?)
}

pub(crate) async fn req_head(client: &reqwest::Client, url: &str) -> Result<reqwest::Response> {
    log::trace!("HEAD {url}");
    Ok(client.head(url).send().await?)
}

pub(crate) async fn req_post(
    client: &reqwest::Client,
    url: &str,
    body: String,
    accept: Option<&str>,
    accept_language: Option<&str>,
) -> Result<reqwest::Response> {
    let mut req = client
        .post(url)
        .header("content-type", CONTENT_TYPE_JOSE);
    if let Some(accept) = accept {
        req = req.header("accept", accept);
    }
    if let Some(lang) = accept_language {
        req = req.header("accept-language", lang);
    }
    log::trace!("POST {url} {body}");
    Ok(req.body(body).send().await?)
}

/// Passes successful responses through; translates 4xx/5xx responses into
/// [`Error::Server`] (when a problem document is attached) or
/// [`Error::Protocol`].
pub(crate) async fn req_handle_error(res: reqwest::Response) -> Result<reqwest::Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let retry_after = req_retry_after(&res);
    let documents = req_links(&res, "help");
    let is_problem = res
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with(CONTENT_TYPE_PROBLEM));

    let body = req_safe_read_body(res).await;

    if !is_problem {
        let preview: String = body.chars().take(200).collect();
        return Err(Error::Protocol(format!(
            "HTTP {}: {preview}",
            status.as_u16()
        )));
    }

    let problem = serde_json::from_str::<Problem>(&body).unwrap_or_else(|err| Problem {
        detail: Some(format!(
            "failed to parse application/problem+json ({err}) body: {body}"
        )),
        ..Problem::default()
    });

    let kind = problem
        .type_uri
        .as_deref()
        .map(ServerErrorKind::from_type_uri)
        .unwrap_or(ServerErrorKind::Other);

    Err(Error::Server(ServerError {
        kind,
        status: status.as_u16(),
        problem,
        retry_after,
        documents,
    }))
}

pub(crate) fn req_header(res: &reqwest::Response, name: &str) -> Option<String> {
    res.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

pub(crate) fn req_expect_header(res: &reqwest::Response, name: &str) -> Result<String> {
    req_header(res, name).ok_or_else(|| Error::Protocol(format!("missing header: {name}")))
}

/// The `Location` header, mandatory on resource-creating responses.
pub(crate) fn req_location(res: &reqwest::Response) -> Result<String> {
    req_expect_header(res, "location")
}

pub(crate) fn req_replay_nonce(res: &reqwest::Response) -> Option<String> {
    req_header(res, "replay-nonce")
}

pub(crate) fn req_retry_after(res: &reqwest::Response) -> Option<SystemTime> {
    let value = req_header(res, "retry-after")?;
    crate::util::parse_retry_after(&value, SystemTime::now())
}

/// URLs of all `Link` header entries with the given relation type.
pub(crate) fn req_links(res: &reqwest::Response, rel: &str) -> Vec<String> {
    let mut links = Vec::new();

    for value in res.headers().get_all("link") {
        if let Ok(value) = value.to_str() {
            collect_links(value, rel, &mut links);
        }
    }

    links
}

fn collect_links(header: &str, wanted_rel: &str, out: &mut Vec<String>) {
    for entry in split_link_entries(header) {
        let Some(start) = entry.find('<') else { continue };
        let Some(end) = entry.find('>') else { continue };
        if end < start {
            continue;
        }

        let url = &entry[start + 1..end];

        let matches = entry[end + 1..].split(';').any(|param| {
            let Some((name, value)) = param.split_once('=') else {
                return false;
            };
            name.trim() == "rel"
                && value
                    .trim()
                    .trim_matches('"')
                    .split_ascii_whitespace()
                    .any(|token| token == wanted_rel)
        });

        if matches {
            out.push(url.to_owned());
        }
    }
}

/// Splits a `Link` header on commas outside `<...>` URL delimiters.
fn split_link_entries(header: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut in_url = false;
    let mut start = 0;

    for (idx, ch) in header.char_indices() {
        match ch {
            '<' => in_url = true,
            '>' => in_url = false,
            ',' if !in_url => {
                entries.push(&header[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    entries.push(&header[start..]);

    entries
}

pub(crate) async fn req_safe_read_body(res: reqwest::Response) -> String {
    // some CAs close the TLS connection abruptly even though the whole
    // body was already received
    res.text().await.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(builder: http::response::Builder, body: &str) -> reqwest::Response {
        builder.body(body.to_owned()).unwrap().into()
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let res = response(http::Response::builder().status(200), "{}");
        assert!(req_handle_error(res).await.is_ok());
    }

    #[tokio::test]
    async fn test_problem_translation() {
        let res = response(
            http::Response::builder()
                .status(429)
                .header("content-type", "application/problem+json")
                .header("retry-after", "60")
                .header("link", "<https://ex/docs/rate-limits>;rel=\"help\""),
            r#"{"type":"urn:ietf:params:acme:error:rateLimited","detail":"slow down"}"#,
        );

        let err = req_handle_error(res).await.unwrap_err();
        match err {
            Error::Server(err) => {
                assert_eq!(err.kind, ServerErrorKind::RateLimited);
                assert_eq!(err.status, 429);
                assert!(err.retry_after.is_some());
                assert_eq!(err.documents, vec!["https://ex/docs/rate-limits"]);
                assert_eq!(err.problem.detail.as_deref(), Some("slow down"));
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_problem_error_is_protocol() {
        let res = response(
            http::Response::builder()
                .status(502)
                .header("content-type", "text/html"),
            "<html>bad gateway</html>",
        );

        match req_handle_error(res).await.unwrap_err() {
            Error::Protocol(msg) => assert!(msg.starts_with("HTTP 502")),
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_header() {
        let res = response(http::Response::builder().status(201), "");
        assert!(req_location(&res).is_err());
    }

    #[test]
    fn test_link_parsing() {
        let res = response(
            http::Response::builder()
                .status(200)
                .header(
                    "link",
                    "<https://ex/cert/1>;rel=\"alternate\", <https://ex/dir>;rel=\"index\"",
                )
                .header("link", "<https://ex/cert/2>; rel=\"alternate\""),
            "",
        );

        assert_eq!(
            req_links(&res, "alternate"),
            vec!["https://ex/cert/1", "https://ex/cert/2"],
        );
        assert_eq!(req_links(&res, "index"), vec!["https://ex/dir"]);
        assert!(req_links(&res, "up").is_empty());
    }
}
