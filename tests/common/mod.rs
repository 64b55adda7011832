#![allow(dead_code)]

use plaza::AppContext;
use plaza::config::Config;
use plaza::core::store::Db;
use plaza::images::{ImageHost, MemoryImages};
use serde_json::Value;
use spin_sdk::http::{Method, Request};

pub fn test_ctx() -> AppContext {
    AppContext::new(
        Config::for_tests("integration-secret"),
        Db::memory(),
        ImageHost::Memory(MemoryImages::new()),
    )
}

pub fn images(ctx: &AppContext) -> &MemoryImages {
    ctx.images.as_memory().expect("tests run with the memory image host")
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request {
    let mut builder = Request::builder();
    builder.method(method).uri(uri);
    if let Some(token) = token {
        builder.header("Authorization", format!("Bearer {}", token));
    }
    if let Some(body) = body {
        builder
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(&body).unwrap());
    }
    builder.build()
}

pub async fn call(ctx: &AppContext, req: Request) -> (u16, Value) {
    let resp = plaza::handle_request(ctx, req).await;
    let status = *resp.status();
    let body = serde_json::from_slice(resp.body()).unwrap_or(Value::Null);
    (status, body)
}

pub async fn get(ctx: &AppContext, uri: &str, token: Option<&str>) -> (u16, Value) {
    call(ctx, request(Method::Get, uri, token, None)).await
}

pub async fn post(ctx: &AppContext, uri: &str, token: Option<&str>, body: Value) -> (u16, Value) {
    call(ctx, request(Method::Post, uri, token, Some(body))).await
}

pub async fn put(ctx: &AppContext, uri: &str, token: Option<&str>, body: Value) -> (u16, Value) {
    call(ctx, request(Method::Put, uri, token, Some(body))).await
}

pub async fn delete(ctx: &AppContext, uri: &str, token: Option<&str>) -> (u16, Value) {
    call(ctx, request(Method::Delete, uri, token, None)).await
}

/// Signs a user up, logs in, and returns `(user_id, token)`.
pub async fn signup_and_login(ctx: &AppContext, username: &str) -> (String, String) {
    let (status, body) = post(
        ctx,
        "/users/signup",
        None,
        serde_json::json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": "secret-pass",
        }),
    )
    .await;
    assert_eq!(status, 201, "signup failed: {:?}", body);

    let (status, body) = post(
        ctx,
        "/users/login",
        None,
        serde_json::json!({ "username": username, "password": "secret-pass" }),
    )
    .await;
    assert_eq!(status, 200, "login failed: {:?}", body);

    (
        body["id"].as_str().unwrap().to_string(),
        body["token"].as_str().unwrap().to_string(),
    )
}

pub async fn create_post(ctx: &AppContext, author: &str, token: &str, text: &str) -> Value {
    let (status, body) = post(
        ctx,
        "/posts/create",
        Some(token),
        serde_json::json!({ "author": author, "text": text }),
    )
    .await;
    assert_eq!(status, 201, "create post failed: {:?}", body);
    body
}
