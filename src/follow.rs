use spin_sdk::http::Response;
use tracing::info;

use crate::AppContext;
use crate::config::user_key;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_response, message_response, now_iso, require_id};
use crate::core::store::Db;
use crate::models::models::{Followers, Followings, Identity, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Followed,
    Unfollowed,
}

/// Flips the follow edge from `actor_id` to `target_id`.
///
/// The edge lives on both user documents (`actor.following` and
/// `target.followers`); both are rewritten in the same transaction. On the
/// memory backend the two halves can never disagree; Spin KV gives no
/// isolation between concurrent requests (see [`Db::transact`]).
pub fn toggle_follow(db: &Db, actor_id: &str, target_id: &str) -> Result<FollowOutcome, ApiError> {
    require_id(target_id, "user")?;
    if actor_id == target_id {
        return Err(ApiError::validation("You cannot follow yourself"));
    }

    db.transact(|txn| -> Result<FollowOutcome, ApiError> {
        let mut target: User = txn
            .get_json(&user_key(target_id))?
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        let mut actor: User = txn
            .get_json(&user_key(actor_id))?
            .ok_or_else(|| ApiError::not_found("User not found"))?;

        let outcome = if actor.is_following(target_id) {
            actor.following.retain(|id| id != target_id);
            target.followers.retain(|id| id != actor_id);
            FollowOutcome::Unfollowed
        } else {
            actor.following.push(target_id.to_string());
            // repairs a half edge left by older data
            if !target.followers.iter().any(|id| id == actor_id) {
                target.followers.push(actor_id.to_string());
            }
            FollowOutcome::Followed
        };

        let now = now_iso();
        actor.updated_at = now.clone();
        target.updated_at = now;
        txn.set_json(&user_key(actor_id), &actor)?;
        txn.set_json(&user_key(target_id), &target)?;
        Ok(outcome)
    })
}

pub fn get_followings(db: &Db, user_id: &str) -> Result<Followings, ApiError> {
    let user: User = db
        .get_json(&user_key(user_id))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(user.following)
}

pub fn get_followers(db: &Db, user_id: &str) -> Result<Followers, ApiError> {
    let user: User = db
        .get_json(&user_key(user_id))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(user.followers)
}

// === HTTP Handlers ===

pub async fn handle_follow(
    ctx: &AppContext,
    actor: &Identity,
    target_id: &str,
) -> Result<Response, ApiError> {
    let outcome = toggle_follow(&ctx.db, &actor.id, target_id)?;
    info!("User {} {:?} {}", actor.id, outcome, target_id);

    match outcome {
        FollowOutcome::Followed => message_response(
            "User followed successfully",
            serde_json::json!({ "following": true }),
        ),
        FollowOutcome::Unfollowed => message_response(
            "User unfollowed successfully",
            serde_json::json!({ "following": false }),
        ),
    }
}

pub async fn get_followings_list(ctx: &AppContext, user_id: &str) -> Result<Response, ApiError> {
    require_id(user_id, "user")?;
    let followings = get_followings(&ctx.db, user_id)?;
    json_response(200, &followings)
}

pub async fn get_followers_list(ctx: &AppContext, user_id: &str) -> Result<Response, ApiError> {
    require_id(user_id, "user")?;
    let followers = get_followers(&ctx.db, user_id)?;
    json_response(200, &followers)
}
