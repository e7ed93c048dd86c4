use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::Mutex;

use super::DriveError;

const SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
/// Tokens are refreshed this many seconds before they expire.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: Option<String>,
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: i64,
}

/// Service-account credentials exchanged for short-lived bearer tokens.
pub struct ServiceAccountAuth {
    http: reqwest::Client,
    client_email: String,
    token_uri: String,
    key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    pub fn from_file(http: reqwest::Client, path: &Path) -> Result<Self, DriveError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DriveError::Auth(format!("cannot read {}: {}", path.display(), e)))?;
        let key: ServiceAccountKey = serde_json::from_str(&raw)
            .map_err(|e| DriveError::Auth(format!("invalid service account file: {}", e)))?;
        let encoding = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| DriveError::Auth(format!("invalid private key: {}", e)))?;

        Ok(Self {
            http,
            client_email: key.client_email,
            token_uri: key.token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            key: encoding,
            cached: Mutex::new(None),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    /// Returns a valid bearer token, exchanging a fresh assertion when the
    /// cached one is missing or about to expire.
    pub async fn access_token(&self) -> Result<String, DriveError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now().timestamp();
        if let Some(token) = cached.as_ref() {
            if token.expires_at - EXPIRY_MARGIN_SECS > now {
                return Ok(token.value.clone());
            }
        }

        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: SCOPE,
            aud: &self.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| DriveError::Auth(format!("cannot sign assertion: {}", e)))?;

        let response = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::Auth(format!("token exchange returned {}: {}", status, body)));
        }

        let token: TokenResponse = response.json().await?;
        tracing::debug!("Drive Auth | Token refreshed, valid for {}s", token.expires_in);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: now + token.expires_in,
        });
        Ok(token.access_token)
    }

    /// Whether a token is currently cached and unexpired.
    pub async fn has_valid_token(&self) -> bool {
        let now = Utc::now().timestamp();
        self.cached
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| t.expires_at > now)
    }
}
