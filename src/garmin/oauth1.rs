use crate::error::{AppError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use sha1::Sha1;
use std::collections::BTreeMap;
use url::Url;

// RFC 5849 section 3.6: everything but ALPHA, DIGIT, '-', '.', '_', '~'
const ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Consumer key pair published for the Garmin Connect mobile app.
#[derive(Debug, Clone, Deserialize)]
pub(super) struct OAuthConsumer {
    pub consumer_key: String,
    pub consumer_secret: String,
}

pub(super) struct OAuth1Signer<'a> {
    consumer: &'a OAuthConsumer,
    token: Option<(&'a str, &'a str)>,
}

impl<'a> OAuth1Signer<'a> {
    pub fn new(consumer: &'a OAuthConsumer) -> Self {
        Self {
            consumer,
            token: None,
        }
    }

    pub fn with_token(mut self, token: &'a str, secret: &'a str) -> Self {
        self.token = Some((token, secret));
        self
    }

    /// Build the `Authorization` header for a request. Query parameters in
    /// `url` and form parameters in `extra_params` are both signed.
    pub fn sign(&self, method: &str, url: &str, extra_params: &[(&str, &str)]) -> Result<String> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let nonce: String = rand::random::<[u8; 16]>()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        self.sign_with(method, url, extra_params, &timestamp, &nonce)
    }

    fn sign_with(
        &self,
        method: &str,
        url: &str,
        extra_params: &[(&str, &str)],
        timestamp: &str,
        nonce: &str,
    ) -> Result<String> {
        let parsed = Url::parse(url)
            .map_err(|e| AppError::GarminAuth(format!("Invalid OAuth URL {}: {}", url, e)))?;
        let base_url = format!(
            "{}://{}{}",
            parsed.scheme(),
            parsed.host_str().unwrap_or_default(),
            match parsed.port() {
                Some(port) => format!(":{}{}", port, parsed.path()),
                None => parsed.path().to_string(),
            }
        );

        let mut oauth_params: BTreeMap<String, String> = BTreeMap::new();
        oauth_params.insert("oauth_consumer_key".into(), self.consumer.consumer_key.clone());
        oauth_params.insert("oauth_nonce".into(), nonce.to_string());
        oauth_params.insert("oauth_signature_method".into(), "HMAC-SHA1".into());
        oauth_params.insert("oauth_timestamp".into(), timestamp.to_string());
        oauth_params.insert("oauth_version".into(), "1.0".into());
        if let Some((token, _)) = self.token {
            oauth_params.insert("oauth_token".into(), token.to_string());
        }

        let mut all_params = oauth_params.clone();
        for (k, v) in parsed.query_pairs() {
            all_params.insert(k.into_owned(), v.into_owned());
        }
        for (k, v) in extra_params {
            all_params.insert(k.to_string(), v.to_string());
        }

        let param_string = all_params
            .iter()
            .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let base_string = format!(
            "{}&{}&{}",
            method.to_uppercase(),
            encode(&base_url),
            encode(&param_string)
        );

        let token_secret = self.token.map(|(_, secret)| secret).unwrap_or_default();
        let signing_key = format!(
            "{}&{}",
            encode(&self.consumer.consumer_secret),
            encode(token_secret)
        );

        let mut mac = Hmac::<Sha1>::new_from_slice(signing_key.as_bytes())
            .map_err(|e| AppError::GarminAuth(format!("Invalid signing key: {}", e)))?;
        mac.update(base_string.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());
        oauth_params.insert("oauth_signature".into(), signature);

        let header = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, encode(v)))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!("OAuth {}", header))
    }
}

fn encode(s: &str) -> String {
    utf8_percent_encode(s, ENCODE_SET).to_string()
}

/// Parse an `application/x-www-form-urlencoded` OAuth response body.
pub(super) fn parse_oauth_response(body: &str) -> BTreeMap<String, String> {
    url::form_urlencoded::parse(body.trim().as_bytes())
        .into_owned()
        .collect()
}
