//! Bearer-token verification for WebSocket handshakes and HTTP requests.
//!
//! Tokens are dot-delimited, hex-encoded fields signed with HMAC-SHA256,
//! mirroring the webhook `X-Hub-Signature-256` verification idiom used
//! elsewhere in this workspace rather than pulling in a JWT dependency this
//! corpus never reaches for.
//!
//! `user_id.display_name.avatar_url.signature`, where `signature` is
//! `HMAC-SHA256(secret, "user_id|display_name|avatar_url")`. When no signing
//! secret is configured the signature is not checked — only suitable for
//! local development, never production.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use artifactor_core::config::AuthConfig;
use artifactor_protocol::AuthenticatedUser;

use crate::error::{HubError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Reads the bearer token from the configured header and verifies it.
pub fn authenticate(config: &AuthConfig, headers: &HeaderMap) -> Result<AuthenticatedUser> {
    let raw = headers
        .get(config.bearer_header.as_str())
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| HubError::forbidden("missing bearer token header"))?;
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw);
    verify_token(config, token)
}

pub fn verify_token(config: &AuthConfig, token: &str) -> Result<AuthenticatedUser> {
    let parts: Vec<&str> = token.split('.').collect();
    let [user_id_hex, display_name_hex, avatar_hex, signature_hex] = parts[..] else {
        return Err(HubError::forbidden("malformed bearer token"));
    };

    let user_id = decode_field(user_id_hex)?;
    let display_name = decode_field(display_name_hex)?;
    let avatar_url = decode_field(avatar_hex)?;

    if let Some(secret) = &config.token_signing_secret {
        let signature = hex::decode(signature_hex)
            .map_err(|_| HubError::forbidden("bearer token signature is not valid hex"))?;
        let signed = format!("{user_id}|{display_name}|{avatar_url}");
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| HubError::forbidden("invalid token signing secret length"))?;
        mac.update(signed.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| HubError::forbidden("bearer token signature mismatch"))?;
    } else {
        tracing::warn!("ARTIFACTOR_AUTH__TOKEN_SIGNING_SECRET unset — accepting unsigned bearer tokens");
    }

    if user_id.is_empty() {
        return Err(HubError::forbidden("bearer token carries an empty user id"));
    }

    Ok(AuthenticatedUser {
        user_id,
        display_name,
        avatar_url: if avatar_url.is_empty() { None } else { Some(avatar_url) },
    })
}

fn decode_field(hex_str: &str) -> Result<String> {
    let bytes = hex::decode(hex_str).map_err(|_| HubError::forbidden("bearer token field is not valid hex"))?;
    String::from_utf8(bytes).map_err(|_| HubError::forbidden("bearer token field is not valid UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_token(user_id: &str, display_name: &str, avatar_url: &str, secret: Option<&str>) -> String {
        let user_hex = hex::encode(user_id);
        let name_hex = hex::encode(display_name);
        let avatar_hex = hex::encode(avatar_url);
        let signature_hex = match secret {
            Some(secret) => {
                let signed = format!("{user_id}|{display_name}|{avatar_url}");
                let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
                mac.update(signed.as_bytes());
                hex::encode(mac.finalize().into_bytes())
            }
            None => String::new(),
        };
        format!("{user_hex}.{name_hex}.{avatar_hex}.{signature_hex}")
    }

    #[test]
    fn verifies_a_correctly_signed_token() {
        let config = AuthConfig {
            token_signing_secret: Some("shh".to_string()),
            bearer_header: "Authorization".to_string(),
        };
        let token = encode_token("u1", "Ada", "https://example.com/a.png", Some("shh"));
        let user = verify_token(&config, &token).unwrap();
        assert_eq!(user.user_id, "u1");
        assert_eq!(user.display_name, "Ada");
        assert_eq!(user.avatar_url.as_deref(), Some("https://example.com/a.png"));
    }

    #[test]
    fn rejects_a_tampered_signature() {
        let config = AuthConfig {
            token_signing_secret: Some("shh".to_string()),
            bearer_header: "Authorization".to_string(),
        };
        let mut token = encode_token("u1", "Ada", "", Some("shh"));
        token.push('0');
        assert!(verify_token(&config, &token).is_err());
    }

    #[test]
    fn unsigned_mode_accepts_any_well_formed_token() {
        let config = AuthConfig { token_signing_secret: None, bearer_header: "Authorization".to_string() };
        let token = encode_token("u1", "Ada", "", None);
        assert!(verify_token(&config, &token).is_ok());
    }

    #[test]
    fn rejects_malformed_token() {
        let config = AuthConfig { token_signing_secret: None, bearer_header: "Authorization".to_string() };
        assert!(verify_token(&config, "not-a-token").is_err());
    }
}
