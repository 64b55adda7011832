use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use spin_sdk::http::{Request, Response};
use tracing::{debug, info};

use crate::AppContext;
use crate::config::{user_key, username_key};
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, parse_body, verify_password};
use crate::models::models::{Identity, TokenClaims, User};

type HmacSha256 = Hmac<Sha256>;

fn signer(secret: &str) -> anyhow::Result<HmacSha256> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid token secret: {}", e))
}

pub fn issue_token(ctx: &AppContext, user_id: &str) -> anyhow::Result<String> {
    let now = chrono::Utc::now().timestamp();
    issue_token_at(
        &ctx.config.token_secret,
        user_id,
        now,
        now + ctx.config.token_expiration_hours * 3600,
    )
}

/// Compact JWT header; plaza only issues and accepts HS256.
const JWT_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Deserialize)]
struct JwtHeader {
    alg: String,
}

fn issue_token_at(secret: &str, user_id: &str, iat: i64, exp: i64) -> anyhow::Result<String> {
    let claims = TokenClaims {
        sub: user_id.to_string(),
        iat,
        exp,
    };
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(JWT_HEADER),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
    );

    let mut mac = signer(secret)?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", signing_input, signature))
}

/// Checks an HS256 JWT's signature and expiry and returns the claims. Says
/// nothing about whether the subject still exists.
pub fn verify_token(secret: &str, token: &str, now: i64) -> Result<TokenClaims, ApiError> {
    let invalid = || ApiError::unauthenticated("Invalid token");

    let (signing_input, signature) = token.rsplit_once('.').ok_or_else(invalid)?;
    let (header, payload) = signing_input.split_once('.').ok_or_else(invalid)?;
    let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| invalid())?;

    let mut mac = signer(secret)?;
    mac.update(signing_input.as_bytes());
    mac.verify_slice(&signature).map_err(|_| invalid())?;

    let header: JwtHeader = URL_SAFE_NO_PAD
        .decode(header)
        .ok()
        .and_then(|raw| serde_json::from_slice(&raw).ok())
        .ok_or_else(invalid)?;
    if header.alg != "HS256" {
        return Err(invalid());
    }

    let raw = URL_SAFE_NO_PAD.decode(payload).map_err(|_| invalid())?;
    let claims: TokenClaims = serde_json::from_slice(&raw).map_err(|_| invalid())?;

    if claims.exp <= now {
        return Err(ApiError::unauthenticated("Token expired"));
    }
    Ok(claims)
}

pub fn bearer_token(req: &Request) -> Option<&str> {
    let header = req.header("authorization")?.as_str()?;
    header.strip_prefix("Bearer ").map(str::trim)
}

/// Resolves the bearer token, if any, to the caller's identity.
///
/// No `Authorization: Bearer` header yields `Ok(None)`; a token that is
/// present but malformed, forged, expired, or names an unknown user is an
/// error and the request must not reach its handler.
pub fn authenticate(ctx: &AppContext, req: &Request) -> Result<Option<Identity>, ApiError> {
    let token = match bearer_token(req) {
        Some(t) => t,
        None => return Ok(None),
    };

    let claims = verify_token(&ctx.config.token_secret, token, chrono::Utc::now().timestamp())?;
    match ctx.db.get_json::<User>(&user_key(&claims.sub))? {
        Some(user) => Ok(Some(Identity::from(&user))),
        None => {
            debug!("Token subject {} no longer exists", claims.sub);
            Err(ApiError::unauthenticated("Invalid token"))
        }
    }
}

/// Guard for routes that need a caller.
pub fn require_identity(identity: Option<Identity>) -> Result<Identity, ApiError> {
    identity.ok_or_else(|| ApiError::unauthenticated("Missing identity"))
}

pub async fn login_user(ctx: &AppContext, req: &Request) -> Result<Response, ApiError> {
    let creds = parse_body(req.body())?;
    let username = creds["username"].as_str().unwrap_or_default().trim();
    let password = creds["password"].as_str().unwrap_or_default();

    let bad_credentials = || ApiError::unauthenticated("Invalid username or password");

    let user_id: String = ctx
        .db
        .get_json(&username_key(username))?
        .ok_or_else(bad_credentials)?;
    let user: User = ctx
        .db
        .get_json(&user_key(&user_id))?
        .ok_or_else(bad_credentials)?;

    if !verify_password(password, &user.password) {
        return Err(bad_credentials());
    }

    let token = issue_token(ctx, &user.id)?;
    info!("User {} logged in", user.id);

    let mut body = serde_json::to_value(Identity::from(&user))?;
    body["token"] = serde_json::Value::String(token);
    json_response(200, &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn valid_token_yields_subject() {
        let token = issue_token_at(SECRET, "user-1", 100, 200).unwrap();
        let claims = verify_token(SECRET, &token, 150).unwrap();
        assert_eq!(claims.sub, "user-1");
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = issue_token_at(SECRET, "user-1", 100, 200).unwrap();
        assert!(matches!(
            verify_token(SECRET, &token, 200),
            Err(ApiError::Unauthenticated(_))
        ));
    }

    #[test]
    fn token_is_a_compact_hs256_jwt() {
        let token = issue_token_at(SECRET, "user-1", 100, 200).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);

        let header: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[0]).unwrap()).unwrap();
        assert_eq!(header["alg"], "HS256");
        assert_eq!(header["typ"], "JWT");

        let claims: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
        assert_eq!(claims["sub"], "user-1");
        assert_eq!(claims["exp"], 200);
    }

    #[test]
    fn tampered_or_foreign_tokens_are_rejected() {
        let token = issue_token_at(SECRET, "user-1", 100, 200).unwrap();
        assert!(verify_token("other-secret", &token, 150).is_err());

        let parts: Vec<&str> = token.split('.').collect();
        let forged_payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"admin","iat":100,"exp":9999}"#);
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);
        assert!(verify_token(SECRET, &forged, 150).is_err());

        // an unsigned token must not pass even with a valid-looking header
        let none_header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#);
        let unsigned = format!("{}.{}.", none_header, parts[1]);
        assert!(verify_token(SECRET, &unsigned, 150).is_err());

        assert!(verify_token(SECRET, "garbage", 150).is_err());
        assert!(verify_token(SECRET, "a.b.c", 150).is_err());
    }
}
