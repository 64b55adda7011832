use spin_sdk::http::{Request, Response};
use tracing::{info, warn};

use crate::AppContext;
use crate::config::{post_key, ImageCleanup, ReplyDeletePolicy, MAX_REPLY_LENGTH};
use crate::core::errors::ApiError;
use crate::core::helpers::{
    clean_text, json_response, message_response, new_id, now_iso, parse_body, require_id,
};
use crate::core::store::{Db, Txn};
use crate::models::models::{Identity, Post, Reply};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOutcome {
    Liked,
    Unliked,
}

fn load_post(txn: &Txn<'_>, post_id: &str) -> Result<Post, ApiError> {
    txn.get_json(&post_key(post_id))?
        .ok_or_else(|| ApiError::not_found("Post not found"))
}

/// Adds or removes `actor_id` from the post's likes. The membership check, the
/// set change and the counter are one transaction. On the memory backend that
/// serializes racing toggles; on Spin KV two concurrent toggles can still both
/// read the same post and the last write wins (see [`Db::transact`]).
pub fn toggle_like(db: &Db, actor_id: &str, post_id: &str) -> Result<(LikeOutcome, usize), ApiError> {
    require_id(post_id, "post")?;

    db.transact(|txn| -> Result<(LikeOutcome, usize), ApiError> {
        let mut post = load_post(txn, post_id)?;

        let outcome = if post.is_liked_by(actor_id) {
            post.likes.retain(|id| id != actor_id);
            LikeOutcome::Unliked
        } else {
            post.likes.push(actor_id.to_string());
            LikeOutcome::Liked
        };
        post.sync_counters();

        txn.set_json(&post_key(post_id), &post)?;
        Ok((outcome, post.number_of_likes))
    })
}

/// Appends a reply at the end of the post's reply sequence.
pub fn add_reply(
    db: &Db,
    author: &Identity,
    post_id: &str,
    text: &str,
    img: Option<String>,
) -> Result<Reply, ApiError> {
    require_id(post_id, "post")?;
    let text = clean_text(text, "Text", MAX_REPLY_LENGTH)?;

    db.transact(|txn| -> Result<Reply, ApiError> {
        let mut post = load_post(txn, post_id)?;

        let reply = Reply {
            id: new_id(),
            user_id: author.id.clone(),
            text: text.clone(),
            img,
            username: author.username.clone(),
            user_profile_pic: author.profile_pic.clone(),
            created_at: now_iso(),
        };
        post.replies.push(reply.clone());
        post.sync_counters();

        txn.set_json(&post_key(post_id), &post)?;
        Ok(reply)
    })
}

/// Removes one reply by id and returns it.
pub fn remove_reply(
    db: &Db,
    actor_id: &str,
    post_id: &str,
    reply_id: &str,
    policy: ReplyDeletePolicy,
) -> Result<Reply, ApiError> {
    require_id(post_id, "post")?;
    require_id(reply_id, "reply")?;

    db.transact(|txn| -> Result<Reply, ApiError> {
        let mut post = load_post(txn, post_id)?;

        let idx = post
            .replies
            .iter()
            .position(|r| r.id == reply_id)
            .ok_or_else(|| ApiError::not_found("Reply not found"))?;

        let allowed = match policy {
            ReplyDeletePolicy::Author => post.replies[idx].user_id == actor_id,
            ReplyDeletePolicy::AuthorOrPostOwner => {
                post.replies[idx].user_id == actor_id || post.author == actor_id
            }
        };
        if !allowed {
            return Err(ApiError::unauthorized("Unauthorized to delete reply"));
        }

        let removed = post.replies.remove(idx);
        post.sync_counters();

        txn.set_json(&post_key(post_id), &post)?;
        Ok(removed)
    })
}

// === HTTP Handlers ===

pub async fn handle_like(ctx: &AppContext, actor: &Identity, post_id: &str) -> Result<Response, ApiError> {
    let (outcome, number_of_likes) = toggle_like(&ctx.db, &actor.id, post_id)?;
    info!("User {} {:?} post {}", actor.id, outcome, post_id);

    let (message, liked) = match outcome {
        LikeOutcome::Liked => ("Post liked successfully", true),
        LikeOutcome::Unliked => ("Post unliked successfully", false),
    };
    message_response(
        message,
        serde_json::json!({ "liked": liked, "numberOfLikes": number_of_likes }),
    )
}

pub async fn handle_add_reply(
    ctx: &AppContext,
    req: &Request,
    actor: &Identity,
    post_id: &str,
) -> Result<Response, ApiError> {
    let value = parse_body(req.body())?;
    let text = value["text"].as_str().unwrap_or_default();

    require_id(post_id, "post")?;
    clean_text(text, "Text", MAX_REPLY_LENGTH)?;
    if ctx.db.get_json::<Post>(&post_key(post_id))?.is_none() {
        return Err(ApiError::not_found("Post not found"));
    }

    let img = match value["img"].as_str().filter(|s| !s.is_empty()) {
        Some(data) => Some(ctx.images.upload(data).await?),
        None => None,
    };

    match add_reply(&ctx.db, actor, post_id, text, img.clone()) {
        Ok(reply) => {
            info!("User {} replied to post {}", actor.id, post_id);
            json_response(201, &reply)
        }
        Err(e) => {
            if let Some(url) = img {
                warn!("Reply to {} failed, discarding uploaded image", post_id);
                ctx.images.destroy_best_effort(&url).await;
            }
            Err(e)
        }
    }
}

pub async fn handle_remove_reply(
    ctx: &AppContext,
    actor: &Identity,
    post_id: &str,
    reply_id: &str,
) -> Result<Response, ApiError> {
    let removed = remove_reply(&ctx.db, &actor.id, post_id, reply_id, ctx.config.reply_delete)?;
    info!("User {} removed reply {} from post {}", actor.id, reply_id, post_id);

    if let (Some(url), ImageCleanup::BestEffort) = (&removed.img, ctx.config.image_cleanup) {
        ctx.images.destroy_best_effort(url).await;
    }

    message_response("Reply deleted successfully", serde_json::json!({}))
}
