//! In-process mock ACME server for the test suite.
//!
//! Only coupled to the crate through HTTP and the problem document
//! format; requests are routed on method + path and JWS bodies are
//! decoded just enough to branch on their payloads.

use std::{
    convert::Infallible,
    net::TcpListener,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, OnceLock,
    },
};

use actix_http::{body::MessageBody, HttpService, Method, Request, Response, StatusCode};
use actix_server::{Server, ServerHandle};
use actix_web::body::BoxBody;
use base64::prelude::*;
use futures_util::StreamExt as _;
use parking_lot::Mutex;
use regex::Regex;

/// The nonce issued alongside a `badNonce` rejection; the retry must be
/// signed with it.
pub(crate) const BAD_NONCE_FRESH: &str = "LPz1IAbDnDxY61OBV0vpC7HYeSPBLZ9ZCmSfWwKtZKE";

static RE_URL: OnceLock<Regex> = OnceLock::new();

fn re_url() -> &'static Regex {
    RE_URL.get_or_init(|| Regex::new("<URL>").unwrap())
}

#[derive(Debug, Default)]
pub(crate) struct ServerState {
    nonce_counter: AtomicUsize,
    finalized: AtomicBool,
    bad_nonce_calls: AtomicUsize,
    bad_nonce_nonces: Mutex<Vec<String>>,
}

impl ServerState {
    fn next_nonce(&self) -> String {
        let n = self.nonce_counter.fetch_add(1, Ordering::SeqCst);
        format!("srv-nonce-{n}")
    }

    /// The nonces seen on the bad-nonce route, one per incoming request.
    pub(crate) fn bad_nonce_requests(&self) -> Vec<String> {
        self.bad_nonce_nonces.lock().clone()
    }
}

pub(crate) struct TestServer {
    pub url: String,
    pub dir_url: String,
    pub state: Arc<ServerState>,
    handle: ServerHandle,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        drop(self.handle.stop(false));
    }
}

/// Protected-header nonce and decoded payload of an incoming JWS.
struct JwsParts {
    nonce: Option<String>,
    payload: Option<serde_json::Value>,
}

fn parse_jws(body: &[u8]) -> Option<JwsParts> {
    let jws: serde_json::Value = serde_json::from_slice(body).ok()?;

    let protected = jws.get("protected")?.as_str()?;
    let protected: serde_json::Value =
        serde_json::from_slice(&BASE64_URL_SAFE_NO_PAD.decode(protected).ok()?).ok()?;
    let nonce = protected
        .get("nonce")
        .and_then(|v| v.as_str())
        .map(str::to_owned);

    let payload = match jws.get("payload")?.as_str()? {
        "" => None,
        encoded => serde_json::from_slice(&BASE64_URL_SAFE_NO_PAD.decode(encoded).ok()?).ok(),
    };

    Some(JwsParts { nonce, payload })
}

fn get_directory(url: &str, state: &ServerState) -> Response<impl MessageBody> {
    const BODY: &str = r#"{
    "keyChange": "<URL>/acme/key-change",
    "newAccount": "<URL>/acme/new-acct",
    "newNonce": "<URL>/acme/new-nonce",
    "newOrder": "<URL>/acme/new-order",
    "revokeCert": "<URL>/acme/revoke-cert",
    "meta": {
        "caaIdentities": [
        "testdir.org"
        ]
    }
    }"#;

    Response::build(StatusCode::OK)
        .insert_header(("Replay-Nonce", state.next_nonce()))
        .body(re_url().replace_all(BODY, url).into_owned())
}

fn head_new_nonce(state: &ServerState) -> Response<impl MessageBody> {
    Response::build(StatusCode::NO_CONTENT)
        .insert_header(("Replay-Nonce", state.next_nonce()))
        .finish()
}

fn post_new_acct(url: &str, jws: Option<&JwsParts>, state: &ServerState) -> Response<impl MessageBody> {
    let contact = jws
        .and_then(|jws| jws.payload.as_ref())
        .and_then(|payload| payload.get("contact").cloned())
        .unwrap_or_else(|| serde_json::json!(["mailto:foo@bar.com"]));

    let body = serde_json::json!({
        "status": "valid",
        "contact": contact,
        "termsOfServiceAgreed": true,
        "orders": format!("{url}/acme/acct/7728515/orders"),
    });

    Response::build(StatusCode::CREATED)
        .insert_header(("Replay-Nonce", state.next_nonce()))
        .insert_header(("Location", format!("{url}/acme/acct/7728515")))
        .body(body.to_string())
}

fn post_acct(url: &str, jws: Option<&JwsParts>, state: &ServerState) -> Response<impl MessageBody> {
    let payload = jws.and_then(|jws| jws.payload.as_ref());

    let deactivated = payload
        .and_then(|p| p.get("status"))
        .and_then(|s| s.as_str())
        == Some("deactivated");

    let contact = payload
        .and_then(|p| p.get("contact").cloned())
        .unwrap_or_else(|| serde_json::json!(["mailto:foo@bar.com"]));

    let body = serde_json::json!({
        "status": if deactivated { "deactivated" } else { "valid" },
        "contact": contact,
        "termsOfServiceAgreed": true,
        "orders": format!("{url}/acme/acct/7728515/orders"),
    });

    Response::build(StatusCode::OK)
        .insert_header(("Replay-Nonce", state.next_nonce()))
        .body(body.to_string())
}

fn post_new_order(url: &str, state: &ServerState) -> Response<impl MessageBody> {
    const BODY: &str = r#"{
    "status": "pending",
    "expires": "2019-01-09T08:26:43.570360537Z",
    "identifiers": [
        {
        "type": "dns",
        "value": "acme-test.example.com"
        }
    ],
    "authorizations": [
        "<URL>/acme/authz/YTqpYUthlVfwBncUufE8IRWLMSRqcSs"
    ],
    "finalize": "<URL>/acme/finalize/7738992/18234324"
    }"#;

    Response::build(StatusCode::CREATED)
        .insert_header(("Replay-Nonce", state.next_nonce()))
        .insert_header((
            "Location",
            re_url()
                .replace_all("<URL>/acme/order/YTqpYUthlVfwBncUufE8", url)
                .into_owned(),
        ))
        .body(re_url().replace_all(BODY, url).into_owned())
}

fn post_get_order(url: &str, state: &ServerState) -> Response<impl MessageBody> {
    let body = if state.finalized.load(Ordering::SeqCst) {
        r#"{
        "status": "valid",
        "expires": "2019-01-09T08:26:43.570360537Z",
        "identifiers": [
            {
            "type": "dns",
            "value": "acme-test.example.com"
            }
        ],
        "authorizations": [
            "<URL>/acme/authz/YTqpYUthlVfwBncUufE8IRWLMSRqcSs"
        ],
        "finalize": "<URL>/acme/finalize/7738992/18234324",
        "certificate": "<URL>/acme/cert/fae41c070f967713109028"
        }"#
    } else {
        r#"{
        "status": "ready",
        "expires": "2019-01-09T08:26:43.570360537Z",
        "identifiers": [
            {
            "type": "dns",
            "value": "acme-test.example.com"
            }
        ],
        "authorizations": [
            "<URL>/acme/authz/YTqpYUthlVfwBncUufE8IRWLMSRqcSs"
        ],
        "finalize": "<URL>/acme/finalize/7738992/18234324"
        }"#
    };

    Response::build(StatusCode::OK)
        .insert_header(("Replay-Nonce", state.next_nonce()))
        .body(re_url().replace_all(body, url).into_owned())
}

fn post_finalize(url: &str, jws: Option<&JwsParts>, state: &ServerState) -> Response<impl MessageBody> {
    let has_csr = jws
        .and_then(|jws| jws.payload.as_ref())
        .and_then(|payload| payload.get("csr"))
        .is_some();

    if !has_csr {
        return problem_response(
            StatusCode::BAD_REQUEST,
            "urn:ietf:params:acme:error:badCSR",
            "finalize without csr",
            state.next_nonce(),
        );
    }

    state.finalized.store(true, Ordering::SeqCst);

    const BODY: &str = r#"{
    "status": "processing",
    "expires": "2019-01-09T08:26:43.570360537Z",
    "identifiers": [
        {
        "type": "dns",
        "value": "acme-test.example.com"
        }
    ],
    "authorizations": [
        "<URL>/acme/authz/YTqpYUthlVfwBncUufE8IRWLMSRqcSs"
    ],
    "finalize": "<URL>/acme/finalize/7738992/18234324"
    }"#;

    Response::build(StatusCode::OK)
        .insert_header(("Replay-Nonce", state.next_nonce()))
        .insert_header(("Retry-After", "0"))
        .body(re_url().replace_all(BODY, url).into_owned())
}

fn post_authz(url: &str, jws: Option<&JwsParts>, state: &ServerState) -> Response<impl MessageBody> {
    let deactivated = jws
        .and_then(|jws| jws.payload.as_ref())
        .and_then(|p| p.get("status"))
        .and_then(|s| s.as_str())
        == Some("deactivated");

    let status = if deactivated { "deactivated" } else { "pending" };

    let body = format!(
        r#"{{
        "identifier": {{
            "type": "dns",
            "value": "acme-test.example.com"
        }},
        "status": "{status}",
        "expires": "2019-01-09T08:26:43Z",
        "challenges": [
        {{
            "type": "http-01",
            "status": "pending",
            "url": "<URL>/acme/challenge/YTqpYUthlVfwBncUufE8IRWLMSRqcSs/216789597",
            "token": "MUi-gqeOJdRkSb_YR2eaMxQBqf6al8dgt_dOttSWb0w"
        }},
        {{
            "type": "tls-alpn-01",
            "status": "pending",
            "url": "<URL>/acme/challenge/YTqpYUthlVfwBncUufE8IRWLMSRqcSs/216789598",
            "token": "WCdRWkCy4THTD_j5IH4ISAzr59lFIg5wzYmKxuOJ1lU"
        }},
        {{
            "type": "dns-01",
            "status": "pending",
            "url": "<URL>/acme/challenge/YTqpYUthlVfwBncUufE8IRWLMSRqcSs/216789599",
            "token": "RRo2ZcXAEqxKvMH8RGcATjSK1KknLEUmauwfQ5i3gG8"
        }}
        ]
    }}"#
    );

    Response::build(StatusCode::OK)
        .insert_header(("Replay-Nonce", state.next_nonce()))
        .body(re_url().replace_all(&body, url).into_owned())
}

fn post_challenge(
    url: &str,
    path: &str,
    jws: Option<&JwsParts>,
    state: &ServerState,
) -> Response<impl MessageBody> {
    // trigger (payload {}) answers processing; POST-as-GET polls valid
    let triggered = jws.is_some_and(|jws| jws.payload.is_some());
    let status = if triggered { "processing" } else { "valid" };

    let body = format!(
        r#"{{
        "type": "http-01",
        "status": "{status}",
        "url": "<URL>{path}",
        "token": "MUi-gqeOJdRkSb_YR2eaMxQBqf6al8dgt_dOttSWb0w"
    }}"#
    );

    Response::build(StatusCode::OK)
        .insert_header(("Replay-Nonce", state.next_nonce()))
        .body(re_url().replace_all(&body, url).into_owned())
}

fn post_certificate(url: &str, state: &ServerState) -> Response<impl MessageBody> {
    let mut pem = Vec::new();
    for i in 0..3u8 {
        crate::util::write_pem(&[i; 64], "CERTIFICATE", &mut pem).unwrap();
    }

    Response::build(StatusCode::OK)
        .insert_header(("Replay-Nonce", state.next_nonce()))
        .insert_header(("Content-Type", "application/pem-certificate-chain"))
        .insert_header((
            "Link",
            format!("<{url}/acme/cert-alt/1ae4347f0f96>;rel=\"alternate\""),
        ))
        .body(String::from_utf8(pem).unwrap())
}

fn post_revoke_cert(jws: Option<&JwsParts>, state: &ServerState) -> Response<impl MessageBody> {
    let has_certificate = jws
        .and_then(|jws| jws.payload.as_ref())
        .and_then(|payload| payload.get("certificate"))
        .is_some();

    if !has_certificate {
        return problem_response(
            StatusCode::BAD_REQUEST,
            "urn:ietf:params:acme:error:malformed",
            "revocation without certificate",
            state.next_nonce(),
        );
    }

    Response::build(StatusCode::OK)
        .insert_header(("Replay-Nonce", state.next_nonce()))
        .body(String::new())
}

fn post_key_change(jws: Option<&JwsParts>, state: &ServerState) -> Response<impl MessageBody> {
    // the payload must be the inner JWS, signed by the new key
    let is_inner_jws = jws
        .and_then(|jws| jws.payload.as_ref())
        .map(|payload| payload.get("protected").is_some() && payload.get("signature").is_some())
        .unwrap_or(false);

    if !is_inner_jws {
        return problem_response(
            StatusCode::BAD_REQUEST,
            "urn:ietf:params:acme:error:malformed",
            "key change without inner JWS",
            state.next_nonce(),
        );
    }

    Response::build(StatusCode::OK)
        .insert_header(("Replay-Nonce", state.next_nonce()))
        .body("{}".to_owned())
}

fn post_bad_nonce_once(jws: Option<&JwsParts>, state: &ServerState) -> Response<impl MessageBody> {
    if let Some(nonce) = jws.and_then(|jws| jws.nonce.clone()) {
        state.bad_nonce_nonces.lock().push(nonce);
    }

    if state.bad_nonce_calls.fetch_add(1, Ordering::SeqCst) == 0 {
        return problem_response(
            StatusCode::BAD_REQUEST,
            "urn:ietf:params:acme:error:badNonce",
            "JWS has an invalid anti-replay nonce",
            BAD_NONCE_FRESH.to_owned(),
        );
    }

    Response::build(StatusCode::OK)
        .insert_header(("Replay-Nonce", state.next_nonce()))
        .body("{}".to_owned())
}

fn problem_response(
    status: StatusCode,
    type_uri: &str,
    detail: &str,
    nonce: String,
) -> Response<String> {
    let body = serde_json::json!({ "type": type_uri, "detail": detail });

    Response::build(status)
        .insert_header(("Replay-Nonce", nonce))
        .insert_header(("Content-Type", "application/problem+json"))
        .body(body.to_string())
}

fn route_request(
    req: &Request,
    body: &[u8],
    url: &str,
    state: &ServerState,
) -> Response<BoxBody> {
    let jws = parse_jws(body);
    let jws = jws.as_ref();
    let path = req.path().to_owned();

    match (req.method(), path.as_str()) {
        (&Method::GET, "/directory") => get_directory(url, state).map_into_boxed_body(),
        (&Method::HEAD, "/acme/new-nonce") => head_new_nonce(state).map_into_boxed_body(),
        (&Method::POST, "/acme/new-acct") => post_new_acct(url, jws, state).map_into_boxed_body(),
        (&Method::POST, "/acme/acct/7728515") => post_acct(url, jws, state).map_into_boxed_body(),
        (&Method::POST, "/acme/new-order") => post_new_order(url, state).map_into_boxed_body(),

        (&Method::POST, "/acme/order/YTqpYUthlVfwBncUufE8") => {
            post_get_order(url, state).map_into_boxed_body()
        }

        (&Method::POST, "/acme/finalize/7738992/18234324") => {
            post_finalize(url, jws, state).map_into_boxed_body()
        }

        (&Method::POST, "/acme/authz/YTqpYUthlVfwBncUufE8IRWLMSRqcSs") => {
            post_authz(url, jws, state).map_into_boxed_body()
        }

        (&Method::POST, path) if path.starts_with("/acme/challenge/") => {
            post_challenge(url, path, jws, state).map_into_boxed_body()
        }

        (&Method::POST, "/acme/cert/fae41c070f967713109028") => {
            post_certificate(url, state).map_into_boxed_body()
        }

        (&Method::POST, "/acme/revoke-cert") => {
            post_revoke_cert(jws, state).map_into_boxed_body()
        }

        (&Method::POST, "/acme/key-change") => {
            post_key_change(jws, state).map_into_boxed_body()
        }

        (&Method::POST, "/acme/bad-nonce-once") => {
            post_bad_nonce_once(jws, state).map_into_boxed_body()
        }

        (_, _) => Response::build(StatusCode::NOT_FOUND)
            .finish()
            .map_into_boxed_body(),
    }
}

async fn read_body(req: &mut Request) -> Vec<u8> {
    let mut payload = req.take_payload();
    let mut body = Vec::new();

    while let Some(chunk) = payload.next().await {
        match chunk {
            Ok(bytes) => body.extend_from_slice(&bytes),
            Err(_) => break,
        }
    }

    body
}

pub(crate) fn with_directory_server() -> TestServer {
    let lst = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = lst.local_addr().unwrap().port();

    let url = format!("http://127.0.0.1:{port}");
    let dir_url = format!("{url}/directory");
    let state = Arc::new(ServerState::default());

    let server = {
        let url = url.clone();
        let state = Arc::clone(&state);

        Server::build()
            .listen("acme", lst, move || {
                let url = url.clone();
                let state = Arc::clone(&state);

                HttpService::build()
                    .finish(move |mut req: Request| {
                        let url = url.clone();
                        let state = Arc::clone(&state);

                        async move {
                            let body = read_body(&mut req).await;
                            Ok::<_, Infallible>(route_request(&req, &body, &url, &state))
                        }
                    })
                    .tcp()
            })
            .unwrap()
            .workers(1)
            .run()
    };

    let handle = server.handle();

    tokio::spawn(server);

    TestServer {
        url,
        dir_url,
        state,
        handle,
    }
}

#[tokio::test]
async fn test_make_directory() {
    let server = with_directory_server();
    let res = reqwest::get(&server.dir_url).await.unwrap();
    assert!(res.status().is_success());
}
