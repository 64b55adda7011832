use spin_sdk::http::{Method, Request, Response};
use tracing::debug;

pub mod auth;
pub mod config;
pub mod core;
pub mod engagement;
pub mod follow;
pub mod images;
pub mod models;
pub mod posts;
pub mod users;

use crate::auth::{authenticate, require_identity};
use crate::config::Config;
use crate::core::errors::ApiError;
use crate::core::store::Db;
use crate::images::ImageHost;

/// Everything a request handler needs.
pub struct AppContext {
    pub config: Config,
    pub db: Db,
    pub images: ImageHost,
}

impl AppContext {
    pub fn new(config: Config, db: Db, images: ImageHost) -> Self {
        Self { config, db, images }
    }
}

// === Routing ===

/// Routes reachable without a caller.
#[derive(Debug, PartialEq)]
enum PublicRoute<'a> {
    Signup,
    Login,
    Followers(&'a str),
    Following(&'a str),
    GetPost(&'a str),
    UserPosts(&'a str),
}

/// Routes whose handlers receive the caller's identity.
#[derive(Debug, PartialEq)]
enum ProtectedRoute<'a> {
    OwnProfile,
    Profile(&'a str),
    Follow(&'a str),
    UpdateProfile(&'a str),
    Search(&'a str),
    CreatePost,
    DeletePost(&'a str),
    Like(&'a str),
    AddReply(&'a str),
    RemoveReply(&'a str, &'a str),
    Feed,
}

#[derive(Debug, PartialEq)]
enum Route<'a> {
    Public(PublicRoute<'a>),
    Protected(ProtectedRoute<'a>),
}

fn resolve<'a>(method: &Method, path: &'a str) -> Option<Route<'a>> {
    use ProtectedRoute as P;
    use PublicRoute as O;

    let path = path.strip_prefix("/api").unwrap_or(path);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let route = match (method, segments.as_slice()) {
        (Method::Post, ["users", "signup"]) => Route::Public(O::Signup),
        (Method::Post, ["users", "login"]) => Route::Public(O::Login),
        (Method::Get, ["users", "followers", id]) => Route::Public(O::Followers(*id)),
        (Method::Get, ["users", "following", id]) => Route::Public(O::Following(*id)),
        (Method::Get, ["users", "perfil"]) => Route::Protected(P::OwnProfile),
        (Method::Get, ["users", "profile", id]) => Route::Protected(P::Profile(*id)),
        (Method::Post, ["users", "follow", id]) => Route::Protected(P::Follow(*id)),
        (Method::Put, ["users", "update", id]) => Route::Protected(P::UpdateProfile(*id)),
        (Method::Get, ["users", "search", name]) => Route::Protected(P::Search(*name)),

        (Method::Get, ["posts", "feed"]) => Route::Protected(P::Feed),
        (Method::Post, ["posts", "create"]) => Route::Protected(P::CreatePost),
        (Method::Post, ["posts", "create", post_id]) => Route::Protected(P::AddReply(*post_id)),
        (Method::Put, ["posts", "like", id]) => Route::Protected(P::Like(*id)),
        (Method::Get, ["posts", "user", id]) => Route::Public(O::UserPosts(*id)),
        (Method::Get, ["posts", id]) => Route::Public(O::GetPost(*id)),
        (Method::Delete, ["posts", id]) => Route::Protected(P::DeletePost(*id)),
        (Method::Delete, ["posts", post_id, reply_id]) => {
            Route::Protected(P::RemoveReply(*post_id, *reply_id))
        }
        _ => return None,
    };
    Some(route)
}

/// Routes a request and turns any error into its JSON response.
pub async fn handle_request(ctx: &AppContext, req: Request) -> Response {
    match dispatch(ctx, &req).await {
        Ok(resp) => resp,
        Err(err) => {
            debug!("{:?} {} failed: {}", req.method(), req.path(), err);
            err.into()
        }
    }
}

async fn dispatch(ctx: &AppContext, req: &Request) -> Result<Response, ApiError> {
    let route = resolve(req.method(), req.path())
        .ok_or_else(|| ApiError::not_found("No route found"))?;

    match route {
        Route::Public(route) => match route {
            PublicRoute::Signup => users::create_user(ctx, req).await,
            PublicRoute::Login => auth::login_user(ctx, req).await,
            PublicRoute::Followers(id) => follow::get_followers_list(ctx, id).await,
            PublicRoute::Following(id) => follow::get_followings_list(ctx, id).await,
            PublicRoute::GetPost(id) => posts::get_post(ctx, id).await,
            PublicRoute::UserPosts(id) => posts::get_user_posts(ctx, id).await,
        },
        Route::Protected(route) => {
            let actor = require_identity(authenticate(ctx, req)?)?;
            match route {
                ProtectedRoute::OwnProfile => users::get_own_profile(&actor).await,
                ProtectedRoute::Profile(id) => users::get_user_profile(ctx, id).await,
                ProtectedRoute::Follow(id) => follow::handle_follow(ctx, &actor, id).await,
                ProtectedRoute::UpdateProfile(id) => {
                    users::update_profile(ctx, req, &actor, id).await
                }
                ProtectedRoute::Search(name) => users::search_users(ctx, name).await,
                ProtectedRoute::CreatePost => posts::create_post(ctx, req, &actor).await,
                ProtectedRoute::DeletePost(id) => posts::delete_post(ctx, &actor, id).await,
                ProtectedRoute::Like(id) => engagement::handle_like(ctx, &actor, id).await,
                ProtectedRoute::AddReply(post_id) => {
                    engagement::handle_add_reply(ctx, req, &actor, post_id).await
                }
                ProtectedRoute::RemoveReply(post_id, reply_id) => {
                    engagement::handle_remove_reply(ctx, &actor, post_id, reply_id).await
                }
                ProtectedRoute::Feed => posts::get_feed(ctx, &actor).await,
            }
        }
    }
}

// === Component entrypoint ===
#[cfg(target_arch = "wasm32")]
#[spin_sdk::http_component]
async fn handle(req: Request) -> anyhow::Result<Response> {
    let config = Config::load();
    let images = ImageHost::from_config(&config);
    let ctx = AppContext::new(config, Db::open_default()?, images);
    Ok(handle_request(&ctx, req).await)
}
