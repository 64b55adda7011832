mod common;

use common::*;
use serde_json::json;

#[tokio::test]
async fn test_full_user_flow() {
    let ctx = test_ctx();
    let (user_id, token) = signup_and_login(&ctx, "flow_user").await;

    let (status, me) = get(&ctx, "/users/perfil", Some(&token)).await;
    assert_eq!(status, 200);
    assert_eq!(me["id"], user_id);
    assert_eq!(me["username"], "flow_user");
    assert!(me.get("password").is_none(), "identity must not expose the hash");

    let post = create_post(&ctx, &user_id, &token, "Test post from integration test!").await;
    assert_eq!(post["text"], "Test post from integration test!");
    assert_eq!(post["author"], user_id);
    assert_eq!(post["numberOfLikes"], 0);
    assert_eq!(post["numberOfReplies"], 0);

    // fetching a post is public
    let post_id = post["id"].as_str().unwrap();
    let (status, fetched) = get(&ctx, &format!("/posts/{}", post_id), None).await;
    assert_eq!(status, 200);
    assert_eq!(fetched["id"], post_id);

    // the original mount point works too
    let (status, _) = get(&ctx, &format!("/api/posts/{}", post_id), None).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_signup_validation_and_duplicates() {
    let ctx = test_ctx();
    signup_and_login(&ctx, "taken").await;

    let (status, _) = post(
        &ctx,
        "/users/signup",
        None,
        json!({"username": "TAKEN", "email": "other@example.com", "password": "secret"}),
    )
    .await;
    assert_eq!(status, 409);

    let (status, _) = post(
        &ctx,
        "/users/signup",
        None,
        json!({"username": "fresh", "email": "taken@example.com", "password": "secret"}),
    )
    .await;
    assert_eq!(status, 409);

    let (status, body) = post(
        &ctx,
        "/users/signup",
        None,
        json!({"username": "shortpw", "email": "s@example.com", "password": "abc"}),
    )
    .await;
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("4"));

    let (status, _) = post(
        &ctx,
        "/users/signup",
        None,
        json!({"username": "noemail", "email": "not-an-email", "password": "secret"}),
    )
    .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_login_invalid_credentials() {
    let ctx = test_ctx();
    signup_and_login(&ctx, "real_user").await;

    let (status, _) = post(
        &ctx,
        "/users/login",
        None,
        json!({"username": "nonexistent_user", "password": "wrongpass"}),
    )
    .await;
    assert_eq!(status, 401);

    let (status, _) = post(
        &ctx,
        "/users/login",
        None,
        json!({"username": "real_user", "password": "wrongpass"}),
    )
    .await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn test_protected_routes_need_identity() {
    let ctx = test_ctx();
    let (user_id, _) = signup_and_login(&ctx, "gatekeeper").await;

    let (status, body) = post(
        &ctx,
        "/posts/create",
        None,
        json!({"author": user_id, "text": "Test post without auth"}),
    )
    .await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], "Missing identity");

    let (status, _) = get(&ctx, "/posts/feed", Some("not.a-token")).await;
    assert_eq!(status, 401);

    // public routes ignore the missing token
    let (status, _) = get(&ctx, &format!("/posts/user/{}", user_id), None).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_token_for_vanished_user_is_rejected() {
    let ctx = test_ctx();
    let other = test_ctx();
    let (_, token) = signup_and_login(&other, "ghost").await;

    // same secret, but the subject does not exist in this store
    let (status, body) = get(&ctx, "/users/perfil", Some(&token)).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], "Invalid token");
}

#[tokio::test]
async fn test_post_text_limit() {
    let ctx = test_ctx();
    let (user_id, token) = signup_and_login(&ctx, "limits").await;

    let (status, body) = post(
        &ctx,
        "/posts/create",
        Some(&token),
        json!({"author": user_id, "text": "a".repeat(501)}),
    )
    .await;
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("500"));

    let (status, _) = post(
        &ctx,
        "/posts/create",
        Some(&token),
        json!({"author": user_id, "text": "a".repeat(500)}),
    )
    .await;
    assert_eq!(status, 201);

    let (status, _) = post(&ctx, "/posts/create", Some(&token), json!({"author": user_id, "text": ""})).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_create_post_author_must_be_caller() {
    let ctx = test_ctx();
    let (alice, _) = signup_and_login(&ctx, "alice").await;
    let (_, bob_token) = signup_and_login(&ctx, "bob").await;

    let (status, _) = post(
        &ctx,
        "/posts/create",
        Some(&bob_token),
        json!({"postedBy": alice, "text": "pretending to be alice"}),
    )
    .await;
    assert_eq!(status, 401);

    let (status, _) = post(
        &ctx,
        "/posts/create",
        Some(&bob_token),
        json!({"author": uuid::Uuid::new_v4().to_string(), "text": "nobody"}),
    )
    .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_failed_image_upload_stores_nothing() {
    let ctx = test_ctx();
    let (user_id, token) = signup_and_login(&ctx, "uploader").await;
    images(&ctx).set_fail_uploads(true);

    let (status, _) = post(
        &ctx,
        "/posts/create",
        Some(&token),
        json!({"author": user_id, "text": "with picture", "img": "data:image/png;base64,AAAA"}),
    )
    .await;
    assert_eq!(status, 500);

    let (_, posts) = get(&ctx, &format!("/posts/user/{}", user_id), None).await;
    assert_eq!(posts.as_array().unwrap().len(), 0);

    images(&ctx).set_fail_uploads(false);
    let (status, created) = post(
        &ctx,
        "/posts/create",
        Some(&token),
        json!({"author": user_id, "text": "with picture", "img": "data:image/png;base64,AAAA"}),
    )
    .await;
    assert_eq!(status, 201);
    assert!(created["img"].as_str().unwrap().starts_with("https://images.local/"));
}

#[tokio::test]
async fn test_delete_post_ownership() {
    let ctx = test_ctx();
    let (alice, alice_token) = signup_and_login(&ctx, "alice").await;
    let (_, bob_token) = signup_and_login(&ctx, "bob").await;

    let created = create_post(&ctx, &alice, &alice_token, "mine").await;
    let post_id = created["id"].as_str().unwrap();

    let (status, _) = delete(&ctx, &format!("/posts/{}", post_id), Some(&bob_token)).await;
    assert_eq!(status, 401);

    let (status, still_there) = get(&ctx, &format!("/posts/{}", post_id), None).await;
    assert_eq!(status, 200);
    assert_eq!(still_there["text"], "mine");

    let (status, _) = delete(&ctx, &format!("/posts/{}", post_id), Some(&alice_token)).await;
    assert_eq!(status, 200);

    let (status, _) = get(&ctx, &format!("/posts/{}", post_id), None).await;
    assert_eq!(status, 404);

    let (_, posts) = get(&ctx, &format!("/posts/user/{}", alice), None).await;
    assert!(posts.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_post_survives_image_cleanup_failure() {
    let ctx = test_ctx();
    let (user_id, token) = signup_and_login(&ctx, "pictures").await;

    let (_, created) = post(
        &ctx,
        "/posts/create",
        Some(&token),
        json!({"author": user_id, "text": "pic", "img": "data:image/png;base64,AAAA"}),
    )
    .await;
    let post_id = created["id"].as_str().unwrap();
    let img = created["img"].as_str().unwrap().to_string();

    images(&ctx).set_fail_deletes(true);
    let (status, _) = delete(&ctx, &format!("/posts/{}", post_id), Some(&token)).await;
    assert_eq!(status, 200);
    assert!(images(&ctx).deleted().is_empty());

    // a second post with cleanup working removes its image
    images(&ctx).set_fail_deletes(false);
    let (_, created) = post(
        &ctx,
        "/posts/create",
        Some(&token),
        json!({"author": user_id, "text": "pic 2", "img": "data:image/png;base64,BBBB"}),
    )
    .await;
    let second_img = created["img"].as_str().unwrap().to_string();
    let (status, _) = delete(&ctx, &format!("/posts/{}", created["id"].as_str().unwrap()), Some(&token)).await;
    assert_eq!(status, 200);
    assert_eq!(images(&ctx).deleted(), vec![second_img]);
    assert_ne!(img, images(&ctx).deleted()[0]);
}

#[tokio::test]
async fn test_invalid_ids_are_client_errors() {
    let ctx = test_ctx();
    let (_, token) = signup_and_login(&ctx, "careful").await;

    let (status, _) = get(&ctx, "/posts/not-a-uuid", None).await;
    assert_eq!(status, 400);

    let (status, _) = put(&ctx, "/posts/like/not-a-uuid", Some(&token), json!({})).await;
    assert_eq!(status, 400);

    let (status, _) = get(&ctx, &format!("/posts/{}", uuid::Uuid::new_v4()), None).await;
    assert_eq!(status, 404);

    let (status, _) = get(&ctx, "/no/such/route/here", None).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_search_users() {
    let ctx = test_ctx();
    let (_, token) = signup_and_login(&ctx, "searcher").await;
    signup_and_login(&ctx, "MariaLopez").await;
    signup_and_login(&ctx, "mario_k").await;

    let (status, found) = get(&ctx, "/users/search/MARI", Some(&token)).await;
    assert_eq!(status, 200);
    let mut names: Vec<&str> = found
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, vec!["MariaLopez", "mario_k"]);
    assert!(found[0].get("email").is_none());

    // regex metacharacters are literal
    let (status, _) = get(&ctx, "/users/search/.%2A", Some(&token)).await;
    assert_eq!(status, 404);

    let (status, _) = get(&ctx, "/users/search/zzz", Some(&token)).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_profile_visibility_and_update() {
    let ctx = test_ctx();
    let (alice, alice_token) = signup_and_login(&ctx, "alice").await;
    let (bob, bob_token) = signup_and_login(&ctx, "bob").await;

    let (status, profile) = get(&ctx, &format!("/users/profile/{}", bob), Some(&alice_token)).await;
    assert_eq!(status, 200);
    assert_eq!(profile["username"], "bob");
    assert!(profile.get("email").is_none());
    assert!(profile.get("password").is_none());
    assert!(profile.get("isFrozen").is_none());

    let (status, _) = put(
        &ctx,
        &format!("/users/update/{}", alice),
        Some(&bob_token),
        json!({"bio": "hijacked"}),
    )
    .await;
    assert_eq!(status, 401);

    let (status, updated) = put(
        &ctx,
        &format!("/users/update/{}", alice),
        Some(&alice_token),
        json!({"bio": "<b>Hello</b> there", "age": 31, "sex": "Female", "country": "Chile"}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(updated["bio"], "Hello there");
    assert_eq!(updated["age"], 31);
    assert_eq!(updated["sex"], "female");
    assert_eq!(updated["country"], "Chile");

    let (status, _) = put(
        &ctx,
        &format!("/users/update/{}", alice),
        Some(&alice_token),
        json!({"age": 300}),
    )
    .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_profile_picture_change_refreshes_reply_snapshots() {
    let ctx = test_ctx();
    let (alice, alice_token) = signup_and_login(&ctx, "alice").await;
    let (bob, bob_token) = signup_and_login(&ctx, "bob").await;

    let created = create_post(&ctx, &alice, &alice_token, "talk to me").await;
    let post_id = created["id"].as_str().unwrap();
    let (status, reply) = post(
        &ctx,
        &format!("/posts/create/{}", post_id),
        Some(&bob_token),
        json!({"text": "hi alice"}),
    )
    .await;
    assert_eq!(status, 201);
    assert_eq!(reply["userProfilePic"], "default.jpg");

    let (status, updated) = put(
        &ctx,
        &format!("/users/update/{}", bob),
        Some(&bob_token),
        json!({"profilePic": "data:image/png;base64,CCCC"}),
    )
    .await;
    assert_eq!(status, 200);
    let new_pic = updated["profilePic"].as_str().unwrap().to_string();
    assert!(new_pic.starts_with("https://images.local/"));
    // the default picture is never sent for deletion
    assert!(images(&ctx).deleted().is_empty());

    let (_, fetched) = get(&ctx, &format!("/posts/{}", post_id), None).await;
    assert_eq!(fetched["replies"][0]["userProfilePic"], new_pic);

    // replacing it again cleans up the previous upload
    put(
        &ctx,
        &format!("/users/update/{}", bob),
        Some(&bob_token),
        json!({"profilePic": "data:image/png;base64,DDDD"}),
    )
    .await;
    assert_eq!(images(&ctx).deleted(), vec![new_pic]);
}

#[tokio::test]
async fn test_post_and_reply_text_is_stored_as_plain_text() {
    let ctx = test_ctx();
    let (user_id, token) = signup_and_login(&ctx, "plain").await;

    let created = create_post(&ctx, &user_id, &token, "Tom & Jerry: 1 < 2").await;
    assert_eq!(created["text"], "Tom & Jerry: 1 < 2");
    let (_, fetched) = get(&ctx, &format!("/posts/{}", created["id"].as_str().unwrap()), None).await;
    assert_eq!(fetched["text"], "Tom & Jerry: 1 < 2");

    // the limit applies to the stored text, not to its HTML-escaped form
    let ampersands = "&".repeat(500);
    let created = create_post(&ctx, &user_id, &token, &ampersands).await;
    assert_eq!(created["text"], ampersands);

    let (status, _) = post(
        &ctx,
        "/posts/create",
        Some(&token),
        json!({"author": user_id, "text": "&".repeat(501)}),
    )
    .await;
    assert_eq!(status, 400);

    let (status, body) = post(
        &ctx,
        "/posts/create",
        Some(&token),
        json!({"author": user_id, "text": "<b></b>"}),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Text is required");

    let post_id = created["id"].as_str().unwrap();
    let reply_uri = format!("/posts/create/{}", post_id);
    let (status, reply) = post(&ctx, &reply_uri, Some(&token), json!({"text": "<i>R&D</i> > rest"})).await;
    assert_eq!(status, 201);
    assert_eq!(reply["text"], "R&D > rest");

    let (status, _) = post(&ctx, &reply_uri, Some(&token), json!({"text": "<p> </p>"})).await;
    assert_eq!(status, 400);

    let (_, fetched) = get(&ctx, &format!("/posts/{}", post_id), None).await;
    assert_eq!(fetched["numberOfReplies"], 1);
}

#[tokio::test]
async fn test_profile_update_survives_snapshot_refresh_failure() {
    let ctx = test_ctx();
    let (alice, alice_token) = signup_and_login(&ctx, "alice").await;
    let (bob, bob_token) = signup_and_login(&ctx, "bob").await;

    let created = create_post(&ctx, &alice, &alice_token, "hello").await;
    let post_id = created["id"].as_str().unwrap();
    post(&ctx, &format!("/posts/create/{}", post_id), Some(&bob_token), json!({"text": "hey"})).await;

    // sorts after every uuid-keyed post, so the refresh fails part way
    ctx.db
        .transact(|txn| txn.set_json("post:~broken", &json!("not a post")))
        .unwrap();

    let (status, updated) = put(
        &ctx,
        &format!("/users/update/{}", bob),
        Some(&bob_token),
        json!({"profilePic": "data:image/png;base64,EEEE", "country": "Tom & Co"}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(updated["country"], "Tom & Co");
    let new_pic = updated["profilePic"].as_str().unwrap().to_string();

    let (_, me) = get(&ctx, "/users/perfil", Some(&bob_token)).await;
    assert_eq!(me["profilePic"], new_pic);
    let (_, fetched) = get(&ctx, &format!("/posts/{}", post_id), None).await;
    assert_eq!(fetched["replies"][0]["userProfilePic"], new_pic);
}
