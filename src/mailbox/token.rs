//! OAuth credential cache for the mailbox.
//!
//! The cache is the `token.json` written by the usual installed-app OAuth
//! flow. Expired tokens are refreshed with the stored refresh token and the
//! file is rewritten in place. Headless runs (CI) usually have no file; they
//! supply the same JSON base64-encoded in an environment variable.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::TokenError;

/// Tokens expiring within this window are refreshed early.
const EXPIRY_SKEW_SECS: i64 = 60;

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// Contents of the token cache file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    #[serde(alias = "access_token")]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    /// Fields we do not interpret (scopes, account, ...) survive a rewrite.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OAuthToken {
    /// Whether the access token is expired (or about to be) at `now`.
    /// Tokens without an expiry are assumed valid.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .is_some_and(|exp| exp <= now + Duration::seconds(EXPIRY_SKEW_SECS))
    }

    fn can_refresh(&self) -> bool {
        self.refresh_token.is_some() && self.client_id.is_some() && self.client_secret.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Where a loaded token came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenOrigin {
    File(PathBuf),
    Env,
}

/// Locates, loads and refreshes the mailbox OAuth token.
#[derive(Debug, Clone)]
pub struct TokenCache {
    pub path: PathBuf,
    /// Base64-encoded token JSON supplied through the environment.
    pub env_token: Option<SecretString>,
    /// Headless runs prefer the environment token over the file.
    pub headless: bool,
}

impl TokenCache {
    /// Load the token, if any source has one.
    pub async fn load(&self) -> Result<Option<(OAuthToken, TokenOrigin)>, TokenError> {
        if self.headless {
            if let Some(token) = self.load_env()? {
                return Ok(Some((token, TokenOrigin::Env)));
            }
            return Ok(self
                .load_file()
                .await?
                .map(|t| (t, TokenOrigin::File(self.path.clone()))));
        }

        if let Some(token) = self.load_file().await? {
            return Ok(Some((token, TokenOrigin::File(self.path.clone()))));
        }
        Ok(self.load_env()?.map(|t| (t, TokenOrigin::Env)))
    }

    async fn load_file(&self) -> Result<Option<OAuthToken>, TokenError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(TokenError::Read {
                    path: self.path.display().to_string(),
                    source,
                });
            }
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| TokenError::Malformed(format!("{}: {e}", self.path.display())))
    }

    fn load_env(&self) -> Result<Option<OAuthToken>, TokenError> {
        let Some(encoded) = &self.env_token else {
            return Ok(None);
        };
        let decoded = STANDARD
            .decode(encoded.expose_secret().trim())
            .map_err(|e| TokenError::Malformed(format!("base64: {e}")))?;
        serde_json::from_slice(&decoded)
            .map(Some)
            .map_err(|e| TokenError::Malformed(e.to_string()))
    }

    /// A usable access token, refreshing and persisting it if needed.
    ///
    /// `Ok(None)` means no token is configured and the caller should fall
    /// back to password login.
    pub async fn access_token(
        &self,
        client: &reqwest::Client,
        now: DateTime<Utc>,
    ) -> Result<Option<SecretString>, TokenError> {
        let Some((token, origin)) = self.load().await? else {
            debug!("No mailbox OAuth token available");
            return Ok(None);
        };

        if !token.is_expired(now) {
            return Ok(Some(SecretString::from(token.token)));
        }
        if !token.can_refresh() {
            return Err(TokenError::Expired);
        }

        info!("Mailbox token expired, refreshing");
        let refreshed = refresh(client, token, now).await?;
        if let TokenOrigin::File(path) = &origin {
            self.save(path, &refreshed).await?;
        }
        Ok(Some(SecretString::from(refreshed.token)))
    }

    async fn save(&self, path: &Path, token: &OAuthToken) -> Result<(), TokenError> {
        let json = serde_json::to_string_pretty(token)
            .map_err(|e| TokenError::Malformed(e.to_string()))?;
        tokio::fs::write(path, json)
            .await
            .map_err(|source| TokenError::Write {
                path: path.display().to_string(),
                source,
            })?;
        debug!(path = %path.display(), "Token cache updated");
        Ok(())
    }
}

/// Exchange the refresh token for a new access token.
pub async fn refresh(
    client: &reqwest::Client,
    mut token: OAuthToken,
    now: DateTime<Utc>,
) -> Result<OAuthToken, TokenError> {
    let form = [
        ("grant_type", "refresh_token"),
        ("refresh_token", token.refresh_token.as_deref().unwrap_or_default()),
        ("client_id", token.client_id.as_deref().unwrap_or_default()),
        ("client_secret", token.client_secret.as_deref().unwrap_or_default()),
    ];

    let resp = client
        .post(&token.token_uri)
        .form(&form)
        .send()
        .await
        .map_err(|e| TokenError::Refresh(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(TokenError::Refresh(format!("{status}: {body}")));
    }

    let fresh: RefreshResponse = resp
        .json()
        .await
        .map_err(|e| TokenError::Refresh(e.to_string()))?;

    token.token = fresh.access_token;
    token.expiry = fresh.expires_in.map(|secs| now + Duration::seconds(secs));
    if let Some(rotated) = fresh.refresh_token {
        token.refresh_token = Some(rotated);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 6, 0, 0).unwrap()
    }

    fn token_json(token_uri: &str, expiry: &str) -> String {
        serde_json::json!({
            "token": "old-access",
            "refresh_token": "refresh-1",
            "token_uri": token_uri,
            "client_id": "client-1",
            "client_secret": "secret-1",
            "scopes": ["https://mail.google.com/"],
            "expiry": expiry
        })
        .to_string()
    }

    fn cache(path: PathBuf, env_token: Option<&str>, headless: bool) -> TokenCache {
        TokenCache {
            path,
            env_token: env_token.map(SecretString::from),
            headless,
        }
    }

    #[test]
    fn expiry_includes_skew() {
        let mut token: OAuthToken =
            serde_json::from_str(&token_json("http://x", "2026-10-17T06:00:30Z")).unwrap();
        assert!(token.is_expired(now()));
        token.expiry = Some(now() + Duration::hours(1));
        assert!(!token.is_expired(now()));
        token.expiry = None;
        assert!(!token.is_expired(now()));
    }

    #[test]
    fn unknown_fields_survive_roundtrip() {
        let token: OAuthToken =
            serde_json::from_str(&token_json("http://x", "2026-10-17T07:00:00Z")).unwrap();
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["scopes"][0], "https://mail.google.com/");
    }

    #[tokio::test]
    async fn missing_sources_yield_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path().join("token.json"), None, false);
        let token = cache.access_token(&reqwest::Client::new(), now()).await.unwrap();
        assert!(token.is_none());
    }

    #[tokio::test]
    async fn valid_file_token_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, token_json("http://unused", "2026-10-17T08:00:00Z")).unwrap();

        let token = cache(path, None, false)
            .access_token(&reqwest::Client::new(), now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(token.expose_secret(), "old-access");
    }

    #[tokio::test]
    async fn expired_file_token_is_refreshed_in_place() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-access",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let token_uri = format!("{}/token", server.uri());
        std::fs::write(&path, token_json(&token_uri, "2026-10-17T05:00:00Z")).unwrap();

        let token = cache(path.clone(), None, false)
            .access_token(&reqwest::Client::new(), now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(token.expose_secret(), "new-access");

        let saved: OAuthToken =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.token, "new-access");
        assert_eq!(saved.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(saved.expiry, Some(now() + Duration::seconds(3599)));
    }

    #[tokio::test]
    async fn refresh_failure_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let token_uri = format!("{}/token", server.uri());
        std::fs::write(&path, token_json(&token_uri, "2026-10-17T05:00:00Z")).unwrap();

        let err = cache(path, None, false)
            .access_token(&reqwest::Client::new(), now())
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::Refresh(msg) if msg.contains("invalid_grant")));
    }

    #[tokio::test]
    async fn expired_without_refresh_token_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(
            &path,
            r#"{"token": "old", "expiry": "2026-10-17T05:00:00Z"}"#,
        )
        .unwrap();
        let err = cache(path, None, false)
            .access_token(&reqwest::Client::new(), now())
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::Expired));
    }

    #[tokio::test]
    async fn headless_prefers_env_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, token_json("http://unused", "2026-10-17T08:00:00Z")).unwrap();

        let env_json = r#"{"token": "from-env", "expiry": "2026-10-17T08:00:00Z"}"#;
        let encoded = STANDARD.encode(env_json);

        let (token, origin) = cache(path.clone(), Some(&encoded), true)
            .load()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(token.token, "from-env");
        assert_eq!(origin, TokenOrigin::Env);

        let (token, origin) = cache(path.clone(), Some(&encoded), false)
            .load()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(token.token, "old-access");
        assert_eq!(origin, TokenOrigin::File(path));
    }

    #[tokio::test]
    async fn bad_base64_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let err = cache(dir.path().join("none.json"), Some("%%%"), true)
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::Malformed(_)));
    }
}
