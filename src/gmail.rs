use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::{Url, form_urlencoded};

use super::{GmailConfig, write_atomic};

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Refresh this many seconds before the recorded expiry.
const EXPIRY_SLACK_SECS: i64 = 60;

// ── Mailbox seam ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct MessageList {
    pub(crate) ids: Vec<String>,
    pub(crate) result_size_estimate: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MessageFormat {
    Metadata,
    Full,
}

impl MessageFormat {
    fn as_str(&self) -> &'static str {
        match self {
            MessageFormat::Metadata => "metadata",
            MessageFormat::Full => "full",
        }
    }
}

/// The mailbox operations the email tools are built from. Messages and
/// labels are Gmail API resources as JSON.
pub(crate) trait Mailbox {
    fn list_messages(&self, query: &str, max_results: usize) -> Result<MessageList, String>;
    fn get_message(&self, id: &str, format: MessageFormat) -> Result<Value, String>;
    fn send_raw(&self, raw: &str, thread_id: Option<&str>) -> Result<Value, String>;
    fn modify_labels(&self, id: &str, add: &[&str], remove: &[&str]) -> Result<(), String>;
    fn trash(&self, id: &str) -> Result<(), String>;
    fn list_labels(&self) -> Result<Vec<Value>, String>;
}

// ── MIME ────────────────────────────────────────────────────────────

fn header_value(value: &str) -> String {
    let flat: String = value.chars().map(|c| if c == '\r' || c == '\n' { ' ' } else { c }).collect();
    if flat.is_ascii() {
        flat
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(flat.as_bytes()))
    }
}

/// A single-part text/plain RFC 822 message.
pub(crate) fn build_mime_message(
    to: &str,
    subject: &str,
    body: &str,
    in_reply_to: Option<&str>,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("To: {}\r\n", header_value(to)));
    out.push_str(&format!("Subject: {}\r\n", header_value(subject)));
    if let Some(reference) = in_reply_to.filter(|r| !r.trim().is_empty()) {
        let reference = header_value(reference);
        out.push_str(&format!("In-Reply-To: {reference}\r\n"));
        out.push_str(&format!("References: {reference}\r\n"));
    }
    out.push_str("MIME-Version: 1.0\r\n");
    out.push_str("Content-Type: text/plain; charset=\"UTF-8\"\r\n");
    out.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");
    out.push_str(&body.replace("\r\n", "\n").replace('\n', "\r\n"));
    out
}

pub(crate) fn encode_raw_message(mime: &str) -> String {
    URL_SAFE.encode(mime.as_bytes())
}

// ── OAuth token ─────────────────────────────────────────────────────

/// Token file contents. Also accepts the `token`/`expiry` spelling written
/// by Google's Python client libraries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct OAuthToken {
    #[serde(default, alias = "token", skip_serializing_if = "Option::is_none")]
    pub(crate) access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) expiry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) client_secret: Option<String>,
    #[serde(flatten)]
    pub(crate) extra: Map<String, Value>,
}

impl OAuthToken {
    fn expires_at_unix(&self) -> Option<i64> {
        self.expires_at.or_else(|| {
            self.expiry
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.timestamp())
        })
    }

    pub(crate) fn usable_access_token(&self, now: i64) -> Option<&str> {
        let access = self.access_token.as_deref().filter(|t| !t.trim().is_empty())?;
        match self.expires_at_unix() {
            Some(expires) if expires - EXPIRY_SLACK_SECS <= now => None,
            _ => Some(access),
        }
    }

    /// Merge a token endpoint response; Google omits refresh_token on refresh.
    pub(crate) fn apply_refresh(&mut self, response: &Value, now: i64) -> Result<(), String> {
        let access = response
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or("refresh response missing access_token")?;
        self.access_token = Some(access.to_string());
        if let Some(rt) = response.get("refresh_token").and_then(|v| v.as_str()) {
            self.refresh_token = Some(rt.to_string());
        }
        let expires_in = response.get("expires_in").and_then(|v| v.as_i64()).unwrap_or(3600);
        self.expires_at = Some(now + expires_in);
        self.expiry = None;
        Ok(())
    }
}

pub(crate) fn load_token(path: &Path) -> Result<OAuthToken, String> {
    let data = std::fs::read_to_string(path).map_err(|e| {
        format!(
            "cannot read Gmail token {}: {e}; complete the OAuth consent flow and save the token JSON there",
            path.display()
        )
    })?;
    serde_json::from_str(&data).map_err(|e| format!("invalid Gmail token {}: {e}", path.display()))
}

// ── Gmail REST client ───────────────────────────────────────────────

pub(crate) struct GmailClient {
    agent: ureq::Agent,
    api_base: String,
    token_url: String,
    token_path: PathBuf,
    client_id: Option<String>,
    client_secret: Option<String>,
    token: Mutex<OAuthToken>,
}

impl GmailClient {
    pub(crate) fn from_config(config: &GmailConfig) -> Result<Self, String> {
        let token_path = config
            .resolved_token_path()
            .ok_or("no Gmail token path configured")?;
        let token = load_token(&token_path)?;
        if token.access_token.is_none() && token.refresh_token.is_none() {
            return Err(format!(
                "Gmail token {} has neither access_token nor refresh_token",
                token_path.display()
            ));
        }
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Ok(Self {
            agent,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            token_path,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token: Mutex::new(token),
        })
    }

    fn access_token(&self, force_refresh: bool) -> Result<String, String> {
        let mut token = self.token.lock().map_err(|_| "Gmail token lock poisoned".to_string())?;
        let now = Utc::now().timestamp();
        if !force_refresh {
            if let Some(access) = token.usable_access_token(now) {
                return Ok(access.to_string());
            }
        }
        self.refresh(&mut token, now)?;
        token
            .access_token
            .clone()
            .ok_or_else(|| "missing access_token after refresh".to_string())
    }

    fn refresh(&self, token: &mut OAuthToken, now: i64) -> Result<(), String> {
        let refresh_token = token
            .refresh_token
            .clone()
            .ok_or("Gmail access token expired and no refresh_token is available")?;
        let client_id = token
            .client_id
            .clone()
            .or_else(|| self.client_id.clone())
            .ok_or("missing client_id for token refresh (set GOOGLE_CLIENT_ID)")?;
        let client_secret = token
            .client_secret
            .clone()
            .or_else(|| self.client_secret.clone())
            .ok_or("missing client_secret for token refresh (set GOOGLE_CLIENT_SECRET)")?;
        let payload = form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &client_id)
            .append_pair("client_secret", &client_secret)
            .append_pair("grant_type", "refresh_token")
            .append_pair("refresh_token", &refresh_token)
            .finish();
        let resp = self
            .agent
            .post(&self.token_url)
            .set("content-type", "application/x-www-form-urlencoded")
            .send_string(&payload);
        let refreshed: Value = match resp {
            Ok(resp) => resp.into_json().map_err(|e| format!("refresh response: {e}"))?,
            Err(ureq::Error::Status(code, resp)) => {
                let text = resp.into_string().unwrap_or_default();
                return Err(format!("token refresh error {code}: {text}"));
            }
            Err(err) => return Err(format!("token refresh failed: {err}")),
        };
        token.apply_refresh(&refreshed, now)?;
        tracing::info!(path = %self.token_path.display(), "refreshed Gmail access token");
        let bytes = serde_json::to_vec_pretty(&*token).map_err(|e| format!("encode token: {e}"))?;
        if let Err(err) = write_atomic(&self.token_path, &bytes) {
            // The in-memory token still works for this process.
            tracing::warn!(error = %err, "could not persist refreshed Gmail token");
        }
        Ok(())
    }

    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, String> {
        let mut url = Url::parse(&self.api_base).map_err(|e| format!("invalid Gmail api_base: {e}"))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| "Gmail api_base cannot be a base URL".to_string())?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    fn request(&self, method: &str, url: &Url, body: Option<&Value>) -> Result<Value, String> {
        for attempt in 0..2 {
            let token = self.access_token(attempt > 0)?;
            let req = self
                .agent
                .request(method, url.as_str())
                .set("authorization", &format!("Bearer {token}"));
            let resp = match body {
                Some(body) => req.send_json(body.clone()),
                None => req.call(),
            };
            match resp {
                Ok(resp) => {
                    let text = resp.into_string().map_err(|e| format!("Gmail response: {e}"))?;
                    if text.trim().is_empty() {
                        return Ok(Value::Null);
                    }
                    return serde_json::from_str(&text).map_err(|e| format!("Gmail response: {e}"));
                }
                Err(ureq::Error::Status(401, _)) if attempt == 0 => {
                    tracing::debug!("Gmail rejected access token; refreshing once");
                    continue;
                }
                Err(ureq::Error::Status(code, resp)) => {
                    let text = resp.into_string().unwrap_or_default();
                    return Err(format!("Gmail API error {code}: {}", api_error_message(&text)));
                }
                Err(err) => return Err(format!("Gmail request failed: {err}")),
            }
        }
        Err("Gmail authorization failed after token refresh".to_string())
    }
}

/// Pull `error.message` out of a Google error body when there is one.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

impl Mailbox for GmailClient {
    fn list_messages(&self, query: &str, max_results: usize) -> Result<MessageList, String> {
        let max = max_results.to_string();
        let mut params = vec![("maxResults", max.as_str())];
        if !query.is_empty() {
            params.push(("q", query));
        }
        let url = self.url(&["messages"], &params)?;
        let body = self.request("GET", &url, None)?;
        let ids = body
            .get("messages")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|m| m.get("id").and_then(|id| id.as_str()).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let result_size_estimate = body
            .get("resultSizeEstimate")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        Ok(MessageList {
            ids,
            result_size_estimate,
        })
    }

    fn get_message(&self, id: &str, format: MessageFormat) -> Result<Value, String> {
        let mut params = vec![("format", format.as_str())];
        if format == MessageFormat::Metadata {
            for header in ["Subject", "From", "To", "Date", "Message-ID"] {
                params.push(("metadataHeaders", header));
            }
        }
        let url = self.url(&["messages", id], &params)?;
        self.request("GET", &url, None)
    }

    fn send_raw(&self, raw: &str, thread_id: Option<&str>) -> Result<Value, String> {
        let url = self.url(&["messages", "send"], &[])?;
        let mut body = serde_json::json!({ "raw": raw });
        if let Some(thread_id) = thread_id {
            body["threadId"] = Value::String(thread_id.to_string());
        }
        self.request("POST", &url, Some(&body))
    }

    fn modify_labels(&self, id: &str, add: &[&str], remove: &[&str]) -> Result<(), String> {
        let url = self.url(&["messages", id, "modify"], &[])?;
        let body = serde_json::json!({
            "addLabelIds": add,
            "removeLabelIds": remove,
        });
        self.request("POST", &url, Some(&body)).map(|_| ())
    }

    fn trash(&self, id: &str) -> Result<(), String> {
        let url = self.url(&["messages", id, "trash"], &[])?;
        self.request("POST", &url, None).map(|_| ())
    }

    fn list_labels(&self) -> Result<Vec<Value>, String> {
        let url = self.url(&["labels"], &[])?;
        let body = self.request("GET", &url, None)?;
        Ok(body
            .get("labels")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }
}
