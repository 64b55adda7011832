use spin_sdk::http::{Request, Response};
use tracing::info;

use crate::AppContext;
use crate::config::{post_key, user_key, user_posts_key, ImageCleanup, MAX_POST_LENGTH};
use crate::core::errors::ApiError;
use crate::core::helpers::{
    clean_text, json_response, message_response, new_id, now_iso, parse_body, require_id,
};
use crate::core::store::Db;
use crate::follow::get_followings;
use crate::models::models::{Identity, Post, User};

/// Persists a new post and indexes it under its author, newest first.
pub fn insert_post(db: &Db, post: &Post) -> Result<(), ApiError> {
    db.transact(|txn| -> Result<(), ApiError> {
        let index_key = user_posts_key(&post.author);
        let mut ids: Vec<String> = txn.get_json(&index_key)?.unwrap_or_default();
        ids.insert(0, post.id.clone());
        txn.set_json(&post_key(&post.id), post)?;
        txn.set_json(&index_key, &ids)?;
        Ok(())
    })
}

/// Deletes a post owned by `actor_id` and returns what was removed. A
/// non-author gets `Unauthorized` and the post is left untouched.
pub fn remove_post(db: &Db, actor_id: &str, post_id: &str) -> Result<Post, ApiError> {
    require_id(post_id, "post")?;

    db.transact(|txn| -> Result<Post, ApiError> {
        let post: Post = txn
            .get_json(&post_key(post_id))?
            .ok_or_else(|| ApiError::not_found("Post not found"))?;
        if post.author != actor_id {
            return Err(ApiError::unauthorized("Unauthorized to delete post"));
        }

        let index_key = user_posts_key(&post.author);
        let mut ids: Vec<String> = txn.get_json(&index_key)?.unwrap_or_default();
        ids.retain(|id| id != post_id);

        txn.delete(&post_key(post_id));
        txn.set_json(&index_key, &ids)?;
        Ok(post)
    })
}

/// All posts written by any of `authors`, newest first.
pub fn posts_by_authors(db: &Db, authors: &[String]) -> Result<Vec<Post>, ApiError> {
    let mut posts = db.transact(|txn| -> Result<Vec<Post>, ApiError> {
        let mut posts = Vec::new();
        for author in authors {
            let ids: Vec<String> = txn.get_json(&user_posts_key(author))?.unwrap_or_default();
            for id in ids {
                if let Some(p) = txn.get_json::<Post>(&post_key(&id))? {
                    posts.push(p);
                }
            }
        }
        Ok(posts)
    })?;

    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(posts)
}

// === HTTP Handlers ===

pub async fn create_post(ctx: &AppContext, req: &Request, actor: &Identity) -> Result<Response, ApiError> {
    let value = parse_body(req.body())?;
    let author = value["author"]
        .as_str()
        .or_else(|| value["postedBy"].as_str())
        .unwrap_or_default();
    let text = value["text"].as_str().unwrap_or_default();

    if author.is_empty() || text.is_empty() {
        return Err(ApiError::validation("Author and text are required"));
    }
    require_id(author, "user")?;

    if ctx.db.get_json::<User>(&user_key(author))?.is_none() {
        return Err(ApiError::not_found("User not found"));
    }
    if author != actor.id {
        return Err(ApiError::unauthorized("Unauthorized to create post"));
    }
    let text = clean_text(text, "Text", MAX_POST_LENGTH)?;

    // An upload failure aborts the create before anything is stored.
    let img = match value["img"].as_str().filter(|s| !s.is_empty()) {
        Some(data) => Some(ctx.images.upload(data).await?),
        None => None,
    };

    let post = Post::new(new_id(), actor.id.clone(), text, img, now_iso());
    if let Err(e) = insert_post(&ctx.db, &post) {
        if let Some(url) = &post.img {
            ctx.images.destroy_best_effort(url).await;
        }
        return Err(e);
    }

    info!("User {} created post {}", actor.id, post.id);
    json_response(201, &post)
}

pub async fn get_post(ctx: &AppContext, post_id: &str) -> Result<Response, ApiError> {
    require_id(post_id, "post")?;

    match ctx.db.get_json::<Post>(&post_key(post_id))? {
        Some(post) => json_response(200, &post),
        None => Err(ApiError::not_found("Post not found")),
    }
}

pub async fn delete_post(ctx: &AppContext, actor: &Identity, post_id: &str) -> Result<Response, ApiError> {
    let post = remove_post(&ctx.db, &actor.id, post_id)?;
    info!("User {} deleted post {}", actor.id, post_id);

    if let Some(url) = &post.img {
        match ctx.config.image_cleanup {
            ImageCleanup::BestEffort => ctx.images.destroy_best_effort(url).await,
            ImageCleanup::Disabled => info!("Image cleanup disabled, keeping {}", url),
        }
    }

    message_response("Post deleted successfully", serde_json::json!({}))
}

pub async fn get_user_posts(ctx: &AppContext, user_id: &str) -> Result<Response, ApiError> {
    require_id(user_id, "user")?;

    if ctx.db.get_json::<User>(&user_key(user_id))?.is_none() {
        return Err(ApiError::not_found("User not found"));
    }

    let posts = posts_by_authors(&ctx.db, &[user_id.to_string()])?;
    json_response(200, &posts)
}

pub async fn get_feed(ctx: &AppContext, actor: &Identity) -> Result<Response, ApiError> {
    let followings = get_followings(&ctx.db, &actor.id)?;
    let posts = posts_by_authors(&ctx.db, &followings)?;
    json_response(200, &posts)
}
