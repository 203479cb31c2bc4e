//! OAuth 1.0a request signing (HMAC-SHA1).

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::Rng;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Credentials;

/// RFC 3986 unreserved characters pass through; everything else is encoded.
const RFC3986: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

type HmacSha1 = Hmac<sha1::Sha1>;

pub struct Signer {
    credentials: Credentials,
}

impl Signer {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Builds an `Authorization` header value. `params` are the query or
    /// form-urlencoded body parameters that take part in the signature;
    /// multipart bodies contribute none.
    pub fn header(&self, method: &str, url: &str, params: &BTreeMap<String, String>) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            .to_string();

        let nonce = {
            let mut bytes = [0u8; 16];
            rand::thread_rng().fill(&mut bytes);
            bytes.iter().map(|b| format!("{b:02x}")).collect::<String>()
        };

        self.header_with(method, url, params, &timestamp, &nonce)
    }

    pub(crate) fn header_with(
        &self,
        method: &str,
        url: &str,
        params: &BTreeMap<String, String>,
        timestamp: &str,
        nonce: &str,
    ) -> String {
        let mut oauth = BTreeMap::new();
        oauth.insert("oauth_consumer_key".to_string(), self.credentials.api_key.clone());
        oauth.insert("oauth_nonce".to_string(), nonce.to_string());
        oauth.insert("oauth_signature_method".to_string(), "HMAC-SHA1".to_string());
        oauth.insert("oauth_timestamp".to_string(), timestamp.to_string());
        oauth.insert("oauth_token".to_string(), self.credentials.access_token.clone());
        oauth.insert("oauth_version".to_string(), "1.0".to_string());

        let signature = self.signature(method, url, &oauth, params);
        oauth.insert("oauth_signature".to_string(), signature);

        let parts: Vec<String> = oauth
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", pct_encode(k), pct_encode(v)))
            .collect();

        format!("OAuth {}", parts.join(", "))
    }

    fn signature(
        &self,
        method: &str,
        url: &str,
        oauth: &BTreeMap<String, String>,
        params: &BTreeMap<String, String>,
    ) -> String {
        // Sort on the encoded pairs, as the signature algorithm requires.
        let mut encoded: Vec<(String, String)> = oauth
            .iter()
            .chain(params.iter())
            .map(|(k, v)| (pct_encode(k), pct_encode(v)))
            .collect();
        encoded.sort();

        let param_string = encoded
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let base_string = format!(
            "{}&{}&{}",
            method.to_uppercase(),
            pct_encode(url),
            pct_encode(&param_string)
        );
        let signing_key = format!(
            "{}&{}",
            pct_encode(&self.credentials.api_key_secret),
            pct_encode(&self.credentials.access_token_secret)
        );

        let mut mac =
            HmacSha1::new_from_slice(signing_key.as_bytes()).expect("HMAC accepts any key length");
        mac.update(base_string.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }
}

pub fn pct_encode(input: &str) -> String {
    utf8_percent_encode(input, RFC3986).to_string()
}
