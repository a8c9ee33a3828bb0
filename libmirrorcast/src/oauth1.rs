//! OAuth 1.0a request signing (HMAC-SHA1) and the PIN-based token flow
//!
//! Twitter's v1.1 upload endpoint and v2 tweet endpoint both accept user
//! context requests signed this way.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha1::Sha1;

use crate::error::{PlatformError, Result};
use crate::sources::check_status;

type HmacSha1 = Hmac<Sha1>;

#[derive(Debug, Clone, Default)]
pub struct OAuth1Credentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub token: Option<String>,
    pub token_secret: Option<String>,
}

/// RFC 3986 percent-encoding (everything but unreserved characters)
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// `METHOD&encoded-url&encoded-sorted-params`
pub fn signature_base_string(method: &str, url: &str, params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(url),
        percent_encode(&param_string)
    )
}

/// Base64 HMAC-SHA1 of `base` keyed with `consumer_secret&token_secret`
pub fn sign(base: &str, consumer_secret: &str, token_secret: &str) -> String {
    let key = format!("{}&{}", percent_encode(consumer_secret), percent_encode(token_secret));
    let mut mac = HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(base.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

pub fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

impl OAuth1Credentials {
    pub fn new(consumer_key: &str, consumer_secret: &str) -> Self {
        Self {
            consumer_key: consumer_key.to_string(),
            consumer_secret: consumer_secret.to_string(),
            token: None,
            token_secret: None,
        }
    }

    pub fn with_token(mut self, token: &str, token_secret: &str) -> Self {
        self.token = Some(token.to_string());
        self.token_secret = Some(token_secret.to_string());
        self
    }

    /// Build the `Authorization: OAuth ...` header value
    ///
    /// `extra_params` are the query or form parameters of the request. They
    /// are signed; any whose key starts with `oauth_` is also sent in the header.
    pub fn authorization_header(
        &self,
        method: &str,
        url: &str,
        extra_params: &[(&str, &str)],
        nonce: &str,
        timestamp: i64,
    ) -> String {
        let timestamp = timestamp.to_string();
        let mut oauth: Vec<(String, String)> = vec![
            ("oauth_consumer_key".to_string(), self.consumer_key.clone()),
            ("oauth_nonce".to_string(), nonce.to_string()),
            ("oauth_signature_method".to_string(), "HMAC-SHA1".to_string()),
            ("oauth_timestamp".to_string(), timestamp),
            ("oauth_version".to_string(), "1.0".to_string()),
        ];
        if let Some(token) = &self.token {
            oauth.push(("oauth_token".to_string(), token.clone()));
        }
        oauth.extend(
            extra_params
                .iter()
                .filter(|(k, _)| k.starts_with("oauth_"))
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );

        let mut signed = oauth.clone();
        signed.extend(
            extra_params
                .iter()
                .filter(|(k, _)| !k.starts_with("oauth_"))
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );

        let base = signature_base_string(method, url, &signed);
        let signature = sign(
            &base,
            &self.consumer_secret,
            self.token_secret.as_deref().unwrap_or_default(),
        );

        oauth.push(("oauth_signature".to_string(), signature));
        oauth.sort();

        let fields = oauth
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("OAuth {}", fields)
    }

    /// Header with a fresh nonce and the current time
    pub fn authorize(&self, method: &str, url: &str, extra_params: &[(&str, &str)]) -> String {
        self.authorization_header(
            method,
            url,
            extra_params,
            &generate_nonce(),
            chrono::Utc::now().timestamp(),
        )
    }
}

/// Token pair returned by the request-token and access-token steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub token: String,
    pub secret: String,
}

fn parse_token_response(body: &str) -> Result<TokenPair> {
    let mut token = None;
    let mut secret = None;

    for pair in body.trim().split('&') {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or_default();
        let value = urlencoding::decode(parts.next().unwrap_or_default())
            .map(|v| v.into_owned())
            .unwrap_or_default();
        match key {
            "oauth_token" => token = Some(value),
            "oauth_token_secret" => secret = Some(value),
            _ => {}
        }
    }

    match (token, secret) {
        (Some(token), Some(secret)) => Ok(TokenPair { token, secret }),
        _ => Err(PlatformError::Authentication(format!(
            "Unexpected token response: {}",
            body.trim()
        ))
        .into()),
    }
}

/// Step 1: temporary credentials for an out-of-band (PIN) callback
pub async fn request_token(
    client: &reqwest::Client,
    api_base: &str,
    consumer: &OAuth1Credentials,
) -> Result<TokenPair> {
    let url = format!("{}/oauth/request_token", api_base.trim_end_matches('/'));
    let header = consumer.authorize("POST", &url, &[("oauth_callback", "oob")]);

    let response = client
        .post(&url)
        .header(reqwest::header::AUTHORIZATION, header)
        .send()
        .await
        .map_err(PlatformError::from)?;
    let response = check_status("Twitter", "request token", response).await?;
    let body = response.text().await.map_err(PlatformError::from)?;
    parse_token_response(&body)
}

/// Step 2: where the user approves the app and receives a PIN
pub fn authorize_url(api_base: &str, request_token: &str) -> String {
    format!(
        "{}/oauth/authorize?oauth_token={}",
        api_base.trim_end_matches('/'),
        percent_encode(request_token)
    )
}

/// Step 3: trade the request token and PIN for long-lived access credentials
pub async fn access_token(
    client: &reqwest::Client,
    api_base: &str,
    consumer: &OAuth1Credentials,
    request: &TokenPair,
    verifier: &str,
) -> Result<TokenPair> {
    let url = format!("{}/oauth/access_token", api_base.trim_end_matches('/'));
    let signer = consumer.clone().with_token(&request.token, &request.secret);
    let header = signer.authorize("POST", &url, &[("oauth_verifier", verifier)]);

    let response = client
        .post(&url)
        .header(reqwest::header::AUTHORIZATION, header)
        .send()
        .await
        .map_err(PlatformError::from)?;
    let response = check_status("Twitter", "access token", response).await?;
    let body = response.text().await.map_err(PlatformError::from)?;
    parse_token_response(&body)
}
