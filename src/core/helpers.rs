use spin_sdk::http::Response;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use argon2::password_hash::SaltString;
use ammonia::Builder;
use html_escape::decode_html_entities;
use rand::rngs::OsRng;
use serde::Serialize;
use uuid::Uuid;

use crate::core::errors::ApiError;

/// Fixed-width UTC timestamp, so string order is time order.
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::PasswordHash;

    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

pub fn validate_id(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}

/// Reject malformed identifiers before anything is loaded.
pub fn require_id(id: &str, what: &str) -> Result<(), ApiError> {
    if id.is_empty() || !validate_id(id) {
        return Err(ApiError::validation(format!("Invalid {} id", what)));
    }
    Ok(())
}

/// Strips all markup and returns plain text. Ammonia serializes its output as
/// HTML, so entities are decoded again before the text goes into a JSON
/// document.
pub fn sanitize_text(text: &str) -> String {
    let cleaned = Builder::default()
        .tags(std::collections::HashSet::new())
        .clean(text)
        .to_string();
    decode_html_entities(&cleaned).trim().to_string()
}

/// Sanitizes a required free-text field and checks the result, so the limit
/// applies to what is actually stored.
pub fn clean_text(text: &str, field: &str, max: usize) -> Result<String, ApiError> {
    let cleaned = sanitize_text(text);
    check_text(&cleaned, field, max)?;
    Ok(cleaned)
}

/// Checks a required free-text field against a character (not byte) limit.
pub fn check_text(text: &str, field: &str, max: usize) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::validation(format!("{} is required", field)));
    }
    if text.chars().count() > max {
        return Err(ApiError::validation(format!(
            "{} cannot exceed {} characters",
            field, max
        )));
    }
    Ok(())
}

pub fn json_response<T: Serialize>(status: u16, value: &T) -> Result<Response, ApiError> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(value)?)
        .build())
}

pub fn message_response(message: &str, extra: serde_json::Value) -> Result<Response, ApiError> {
    let mut body = serde_json::json!({ "message": message });
    if let (Some(map), serde_json::Value::Object(extra)) = (body.as_object_mut(), extra) {
        map.extend(extra);
    }
    json_response(200, &body)
}

/// Parses a JSON request body, treating an empty body as `{}`.
pub fn parse_body(body: &[u8]) -> Result<serde_json::Value, ApiError> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_slice(body).map_err(|_| ApiError::validation("Malformed JSON body"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_limit_counts_characters() {
        assert!(check_text(&"a".repeat(500), "Text", 500).is_ok());
        assert!(check_text(&"a".repeat(501), "Text", 500).is_err());
        // 500 two-byte characters still fit
        assert!(check_text(&"é".repeat(500), "Text", 500).is_ok());
        assert!(check_text("   ", "Text", 500).is_err());
    }

    #[test]
    fn password_round_trip() {
        let hash = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "not-a-hash"));
    }

    #[test]
    fn sanitize_strips_markup() {
        assert_eq!(sanitize_text("<b>hi</b><script>x()</script>"), "hi");
    }

    #[test]
    fn sanitize_keeps_plain_characters() {
        assert_eq!(sanitize_text("Tom & Jerry: 1 < 2 > 0"), "Tom & Jerry: 1 < 2 > 0");
        assert_eq!(sanitize_text("\"quoted\" it's"), "\"quoted\" it's");
    }

    #[test]
    fn clean_text_checks_the_stored_form() {
        assert_eq!(clean_text(&"&".repeat(500), "Text", 500).unwrap(), "&".repeat(500));
        assert!(clean_text(&"&".repeat(501), "Text", 500).is_err());
        assert!(clean_text("<b></b>", "Text", 500).is_err());
        // markup does not count against the limit
        let wrapped = format!("<i>{}</i>", "a".repeat(500));
        assert_eq!(clean_text(&wrapped, "Text", 500).unwrap().chars().count(), 500);
    }

    #[test]
    fn empty_body_is_empty_object() {
        assert_eq!(parse_body(b"").unwrap(), serde_json::json!({}));
        assert!(parse_body(b"{nope").is_err());
    }
}
