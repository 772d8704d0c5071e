use super::crypto;
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const COOKIE_NAME: &str = "flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Error,
    Info,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Info => "info",
        })
    }
}

/// A one-shot message for the next page the browser loads, usually the
/// target of a redirect.
///
/// This rides in a cookie, so keep messages short.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub level: Level,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: Level::Success,
            message: message.into(),
        }
    }
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            message: message.into(),
        }
    }
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: Level::Info,
            message: message.into(),
        }
    }
}

/// `<base64 json>:<base64 hmac>`, both URL-safe so the value needs no
/// quoting inside a cookie.
pub fn serialize_flash(secret: &[u8], flash: &Flash) -> String {
    let json = serde_json::to_vec(flash).unwrap_or_default();
    let b64 = general_purpose::URL_SAFE_NO_PAD.encode(json);
    let raw_digest = crypto::get_digest(secret, b64.as_bytes());
    let digest = general_purpose::URL_SAFE_NO_PAD.encode(raw_digest);

    format!("{b64}:{digest}")
}

pub fn deserialize_flash(
    secret: &[u8],
    cookie: &str,
) -> Result<Flash, &'static str> {
    let Some((b64_json, b64_digest)) = cookie.split_once(':') else {
        return Err("Invalid flash cookie");
    };
    let digest = general_purpose::URL_SAFE_NO_PAD
        .decode(b64_digest)
        .map_err(|_| "Cannot base64 decode the digest")?;
    if !crypto::is_valid(secret, b64_json.as_bytes(), &digest) {
        return Err("Failed to validate flash signature");
    }
    let json = general_purpose::URL_SAFE_NO_PAD
        .decode(b64_json)
        .map_err(|_| "Cannot base64 decode flash payload")?;

    serde_json::from_slice(&json).map_err(|_| "Cannot deserialize flash JSON")
}

pub fn set_cookie(secret: &[u8], flash: &Flash) -> String {
    format!(
        "{COOKIE_NAME}={}; Path=/; HttpOnly; SameSite=Lax",
        serialize_flash(secret, flash)
    )
}

pub fn clear_cookie() -> String {
    format!("{COOKIE_NAME}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax")
}
