use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};
use spin_sdk::http::{Request, Response};
use tracing::{debug, info, warn};

use crate::AppContext;
use crate::config::*;
use crate::core::errors::ApiError;
use crate::core::helpers::{
    hash_password, json_response, new_id, now_iso, parse_body, require_id, sanitize_text,
};
use crate::core::store::Db;
use crate::models::models::{Identity, Post, PublicProfile, Sex, User};

fn email_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Regex should compile")
    })
}

fn username_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[\w.\-]+$").expect("Regex should compile"))
}

/// Stores a new user together with its unique username and email index
/// entries. Fails with `Conflict` if either is taken.
pub fn register_user(db: &Db, user: &User) -> Result<(), ApiError> {
    db.transact(|txn| -> Result<(), ApiError> {
        let name_key = username_key(&user.username);
        let mail_key = email_key(&user.email);
        if txn.exists(&name_key)? || txn.exists(&mail_key)? {
            return Err(ApiError::Conflict(
                "Username or email already registered".to_string(),
            ));
        }

        let mut users: Vec<String> = txn.get_json(USERS_LIST_KEY)?.unwrap_or_default();
        users.push(user.id.clone());

        txn.set_json(&user_key(&user.id), user)?;
        txn.set_json(&name_key, &user.id)?;
        txn.set_json(&mail_key, &user.id)?;
        txn.set_json(USERS_LIST_KEY, &users)?;
        Ok(())
    })
}

/// Copies a user's current username and picture onto every reply they wrote.
pub fn refresh_reply_snapshots(db: &Db, user: &User) -> Result<usize, ApiError> {
    let mut touched = 0;
    for key in db.keys_with_prefix("post:")? {
        let changed = db.transact(|txn| -> Result<bool, ApiError> {
            let mut post: Post = match txn.get_json(&key)? {
                Some(p) => p,
                None => return Ok(false),
            };
            let mut changed = false;
            for reply in post.replies.iter_mut().filter(|r| r.user_id == user.id) {
                if reply.user_profile_pic != user.profile_pic || reply.username != user.username {
                    reply.user_profile_pic = user.profile_pic.clone();
                    reply.username = user.username.clone();
                    changed = true;
                }
            }
            if changed {
                txn.set_json(&key, &post)?;
            }
            Ok(changed)
        })?;
        if changed {
            touched += 1;
        }
    }
    Ok(touched)
}

/// Non-frozen users whose username contains `query`, ignoring case.
pub fn search_by_username(db: &Db, query: &str) -> Result<Vec<User>, ApiError> {
    let pattern = RegexBuilder::new(&regex::escape(query))
        .case_insensitive(true)
        .build()
        .map_err(|e| anyhow::anyhow!("search pattern: {}", e))?;

    db.transact(|txn| -> Result<Vec<User>, ApiError> {
        let ids: Vec<String> = txn.get_json(USERS_LIST_KEY)?.unwrap_or_default();
        let mut found = Vec::new();
        for id in ids {
            if let Some(u) = txn.get_json::<User>(&user_key(&id))? {
                if !u.is_frozen && pattern.is_match(&u.username) {
                    found.push(u);
                }
            }
        }
        Ok(found)
    })
}

// === HTTP Handlers ===

pub async fn create_user(ctx: &AppContext, req: &Request) -> Result<Response, ApiError> {
    let new_user = parse_body(req.body())?;
    let username = new_user["username"].as_str().unwrap_or("").trim();
    let email = new_user["email"].as_str().unwrap_or("").trim();
    let password = new_user["password"].as_str().unwrap_or("");

    if username.is_empty() {
        return Err(ApiError::validation("Username is required"));
    }
    let name_len = username.chars().count();
    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&name_len) {
        return Err(ApiError::validation(format!(
            "Username must be {}-{} characters",
            MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH
        )));
    }
    if !username_regex().is_match(username) {
        return Err(ApiError::validation(
            "Username may only contain letters, digits, '.', '_' and '-'",
        ));
    }
    if email.is_empty() || !email_regex().is_match(email) {
        return Err(ApiError::validation("A valid email is required"));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    let user = User::new(
        new_id(),
        username.to_string(),
        email.to_string(),
        hash_password(password)?,
        now_iso(),
    );
    register_user(&ctx.db, &user)?;
    info!("User {} signed up as {}", user.id, user.username);

    json_response(
        201,
        &serde_json::json!({
            "message": "User created, please log in",
            "id": user.id,
        }),
    )
}

pub async fn get_own_profile(actor: &Identity) -> Result<Response, ApiError> {
    json_response(200, actor)
}

pub async fn get_user_profile(ctx: &AppContext, user_id: &str) -> Result<Response, ApiError> {
    require_id(user_id, "user")?;

    match ctx.db.get_json::<User>(&user_key(user_id))? {
        Some(user) => json_response(200, &PublicProfile::from(&user)),
        None => Err(ApiError::not_found("User not found")),
    }
}

#[derive(Default)]
struct ProfileChanges {
    age: Option<u8>,
    country: Option<String>,
    sex: Option<Sex>,
    bio: Option<String>,
    profile_pic: Option<String>,
}

fn parse_profile_changes(value: &serde_json::Value) -> Result<ProfileChanges, ApiError> {
    let mut changes = ProfileChanges::default();

    if !value["age"].is_null() {
        let age = value["age"]
            .as_u64()
            .filter(|a| *a <= MAX_AGE as u64)
            .ok_or_else(|| ApiError::validation(format!("Age must be between 0 and {}", MAX_AGE)))?;
        changes.age = Some(age as u8);
    }
    if let Some(country) = value["country"].as_str().map(sanitize_text).filter(|c| !c.is_empty()) {
        changes.country = Some(country);
    }
    if let Some(sex) = value["sex"].as_str().filter(|s| !s.is_empty()) {
        let parsed: Sex = serde_json::from_value(serde_json::Value::String(sex.to_lowercase()))
            .map_err(|_| ApiError::validation("Sex must be one of male, female, other"))?;
        changes.sex = Some(parsed);
    }
    if let Some(bio) = value["bio"].as_str().map(sanitize_text) {
        if bio.chars().count() > MAX_BIO_LENGTH {
            return Err(ApiError::validation(format!(
                "Bio cannot exceed {} characters",
                MAX_BIO_LENGTH
            )));
        }
        changes.bio = Some(bio);
    }
    changes.profile_pic = value["profilePic"]
        .as_str()
        .filter(|p| !p.is_empty())
        .map(str::to_string);

    Ok(changes)
}

pub async fn update_profile(
    ctx: &AppContext,
    req: &Request,
    actor: &Identity,
    user_id: &str,
) -> Result<Response, ApiError> {
    require_id(user_id, "user")?;
    if user_id != actor.id {
        return Err(ApiError::unauthorized("You cannot update another user"));
    }

    let value = parse_body(req.body())?;
    let changes = parse_profile_changes(&value)?;

    let new_pic = match &changes.profile_pic {
        Some(data) => Some(ctx.images.upload(data).await?),
        None => None,
    };

    let updated = ctx.db.transact(|txn| -> Result<(User, String), ApiError> {
        let mut user: User = txn
            .get_json(&user_key(user_id))?
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        let old_pic = user.profile_pic.clone();

        if let Some(age) = changes.age {
            user.age = age;
        }
        if let Some(country) = changes.country.clone() {
            user.country = country;
        }
        if let Some(sex) = changes.sex {
            user.sex = sex;
        }
        if let Some(bio) = changes.bio.clone() {
            user.bio = bio;
        }
        if let Some(pic) = new_pic.clone() {
            user.profile_pic = pic;
        }
        user.updated_at = now_iso();

        txn.set_json(&user_key(user_id), &user)?;
        Ok((user, old_pic))
    });

    let (user, old_pic) = match updated {
        Ok(done) => done,
        Err(e) => {
            if let Some(url) = &new_pic {
                ctx.images.destroy_best_effort(url).await;
            }
            return Err(e);
        }
    };
    info!("User {} updated their profile", user.id);

    if new_pic.is_some() {
        if ctx.config.image_cleanup == ImageCleanup::BestEffort && old_pic != DEFAULT_PROFILE_PIC {
            ctx.images.destroy_best_effort(&old_pic).await;
        }
        // The profile is already committed; stale snapshots do not fail the request.
        match refresh_reply_snapshots(&ctx.db, &user) {
            Ok(touched) => debug!("Refreshed reply snapshots on {} posts for {}", touched, user.id),
            Err(e) => warn!("Refreshing reply snapshots for {} failed: {}", user.id, e),
        }
    }

    json_response(200, &Identity::from(&user))
}

pub async fn search_users(ctx: &AppContext, raw_username: &str) -> Result<Response, ApiError> {
    let username = urlencoding::decode(raw_username)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw_username.to_string());
    let username = username.trim();
    if username.is_empty() {
        return Err(ApiError::validation("Username is required"));
    }

    let found = search_by_username(&ctx.db, username)?;
    if found.is_empty() {
        return Err(ApiError::not_found("No users found"));
    }

    let profiles: Vec<PublicProfile> = found.iter().map(PublicProfile::from).collect();
    json_response(200, &profiles)
}
