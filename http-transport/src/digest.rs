//! HTTP Digest authentication (RFC 2617, MD5 with `qop=auth`).
//!
//! [`DigestAuth`] wraps another transport and answers the server's
//! `401 Unauthorized` challenge transparently: the request is first sent as
//! is, the `WWW-Authenticate` challenge is parsed, and the request is sent
//! once more with an `Authorization` header attached.
//!
//! The layer never authenticates pre-emptively and never loops; re-trying a
//! failed exchange is the job of [`crate::Retry`].

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Method, StatusCode};

use crate::error::{Result, TransportError};
use crate::request::{Request, Response};
use crate::transport::Transport;

/// Fields of a `WWW-Authenticate: Digest ...` challenge.
///
/// Fields the server left out are empty strings; a malformed challenge is
/// still answered and left for the server to reject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub qop: String,
    pub opaque: Option<String>,
}

impl DigestChallenge {
    /// Parse the value of a `WWW-Authenticate` header
    pub fn parse(header: &str) -> Self {
        let mut challenge = DigestChallenge::default();

        let params = strip_scheme(header.trim());
        for param in split_unquoted(params, ',') {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            let value = unquote(value.trim());
            match key.trim().to_ascii_lowercase().as_str() {
                "realm" => challenge.realm = value.to_string(),
                "nonce" => challenge.nonce = value.to_string(),
                "qop" => challenge.qop = select_qop(value),
                "opaque" => challenge.opaque = Some(value.to_string()),
                _ => {}
            }
        }

        challenge
    }

    /// Extract the challenge from a response, empty if the header is absent
    pub fn from_response(response: &Response) -> Self {
        response
            .header_str(WWW_AUTHENTICATE.as_str())
            .map(Self::parse)
            .unwrap_or_default()
    }
}

fn strip_scheme(header: &str) -> &str {
    match header.get(..6) {
        Some(scheme) if scheme.eq_ignore_ascii_case("digest") => header[6..].trim_start(),
        _ => header,
    }
}

/// Split on `delim`, ignoring delimiters inside double quotes
fn split_unquoted(text: &str, delim: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (idx, ch) in text.char_indices() {
        if ch == '"' {
            in_quotes = !in_quotes;
        } else if ch == delim && !in_quotes {
            parts.push(&text[start..idx]);
            start = idx + ch.len_utf8();
        }
    }
    parts.push(&text[start..]);

    parts
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

// Servers may offer "auth,auth-int"; only "auth" is supported.
fn select_qop(value: &str) -> String {
    let mut options = value.split(',').map(str::trim).filter(|q| !q.is_empty());
    let first = options.clone().next().unwrap_or_default();
    if options.any(|q| q == "auth") {
        "auth".to_string()
    } else {
        first.to_string()
    }
}

/// Hex-encoded MD5 of `text`
pub fn md5_hex(text: &str) -> String {
    format!("{:x}", md5::compute(text.as_bytes()))
}

/// `HA1 = MD5(username:realm:password)`
pub fn compute_ha1(username: &str, realm: &str, password: &str) -> String {
    md5_hex(&format!("{username}:{realm}:{password}"))
}

/// `HA2 = MD5(method:uri)`
pub fn compute_ha2(method: &Method, uri: &str) -> String {
    md5_hex(&format!("{}:{}", method.as_str(), uri))
}

/// `response = MD5(HA1:nonce:nc:cnonce:qop:HA2)` with `nc` as 8 hex digits
pub fn compute_response(ha1: &str, nonce: &str, nc: u32, cnonce: &str, qop: &str, ha2: &str) -> String {
    md5_hex(&format!("{ha1}:{nonce}:{nc:08x}:{cnonce}:{qop}:{ha2}"))
}

/// The `Authorization` header value sent in reply to a challenge
#[derive(Debug, Clone)]
pub struct Authorization<'a> {
    pub username: &'a str,
    pub challenge: &'a DigestChallenge,
    pub uri: &'a str,
    pub cnonce: &'a str,
    pub nc: u32,
    pub response: &'a str,
}

impl fmt::Display for Authorization<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"Digest username="{}", realm="{}", nonce="{}", uri="{}", cnonce="{}", nc="{:08x}", qop="{}", response="{}""#,
            self.username,
            self.challenge.realm,
            self.challenge.nonce,
            self.uri,
            self.cnonce,
            self.nc,
            self.challenge.qop,
            self.response,
        )?;
        if let Some(opaque) = &self.challenge.opaque {
            write!(f, r#", opaque="{opaque}""#)?;
        }
        Ok(())
    }
}

/// Eight random bytes, hex encoded
fn generate_cnonce() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes)
}

/// Digest authentication session wrapping an inner transport.
///
/// One session holds the credentials, the cached `HA1` hash and the nonce
/// counter. The hash is computed from the realm of the first challenge and is
/// kept for the life of the session, even if a later challenge names a
/// different realm; recreate the session to pick up a new realm.
///
/// The session may be shared between concurrent callers. The nonce counter
/// is atomic, so every authenticated request gets a distinct `nc`.
pub struct DigestAuth<T> {
    inner: T,
    username: String,
    password: String,
    auth_hash: OnceLock<String>,
    nonce_count: AtomicU32,
}

impl<T> DigestAuth<T> {
    pub fn new(inner: T, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            inner,
            username: username.into(),
            password: password.into(),
            auth_hash: OnceLock::new(),
            nonce_count: AtomicU32::new(0),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Number of authenticated requests issued by this session so far
    pub fn nonce_count(&self) -> u32 {
        self.nonce_count.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn next_nonce_count(&self) -> u32 {
        self.nonce_count.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }

    fn auth_hash(&self, realm: &str) -> &str {
        self.auth_hash
            .get_or_init(|| compute_ha1(&self.username, realm, &self.password))
    }

    /// Build the `Authorization` header answering `challenge` for `request`
    fn authorize(&self, request: &Request, challenge: &DigestChallenge) -> String {
        let uri = request.request_uri();
        let ha1 = self.auth_hash(&challenge.realm);
        let ha2 = compute_ha2(request.method(), &uri);
        let nc = self.next_nonce_count();
        let cnonce = generate_cnonce();
        let response = compute_response(ha1, &challenge.nonce, nc, &cnonce, &challenge.qop, &ha2);

        Authorization {
            username: &self.username,
            challenge,
            uri: &uri,
            cnonce: &cnonce,
            nc,
            response: &response,
        }
        .to_string()
    }
}

impl<T> fmt::Debug for DigestAuth<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestAuth")
            .field("username", &self.username)
            .field("nonce_count", &self.nonce_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<T: Transport> Transport for DigestAuth<T> {
    async fn send(&self, request: Request) -> Result<Response> {
        let challenge_response = self.inner.send(request.clone()).await?;

        if challenge_response.status() != StatusCode::UNAUTHORIZED {
            // Dropping the response releases the connection without reading
            // what may be an unbounded stream.
            return Err(TransportError::UnexpectedStatus {
                expected: StatusCode::UNAUTHORIZED,
                actual: challenge_response.status(),
            });
        }

        let challenge = DigestChallenge::from_response(&challenge_response);
        challenge_response.drain().await;

        if challenge.nonce.is_empty() {
            tracing::debug!("Digest challenge from {} carries no nonce", request.url());
        }

        let header = self.authorize(&request, &challenge);
        let mut request = request;
        request.set_header(AUTHORIZATION, &header)?;

        self.inner.send(request).await
    }
}
