use tracing::info;

use crate::config::{user_key, username_key};
use crate::core::errors::ApiError;
use crate::core::helpers::{hash_password, new_id, now_iso};
use crate::core::store::Db;
use crate::follow::toggle_follow;
use crate::models::models::{Post, User};
use crate::posts::insert_post;
use crate::users::register_user;

const DEMO_USERS: &[(&str, &str, &[&str])] = &[
    ("test", "Test user bio", &["This is my first post on Plaza!"]),
    (
        "alice",
        "Hello, I'm Alice!",
        &[
            "Welcome to my corner! Excited to share thoughts here.",
            "Just finished an amazing project. Feeling productive today!",
        ],
    ),
    (
        "bob",
        "Bob's corner of the internet",
        &["Hey everyone! Just joined, looking forward to connecting with you all."],
    ),
];

fn find_user_id(db: &Db, username: &str) -> Result<Option<String>, ApiError> {
    Ok(db.get_json(&username_key(username))?)
}

/// Creates the demo accounts (password = username) with a few posts, and has
/// `test` follow `bob`. Users that already exist are left alone.
pub fn seed_demo_data(db: &Db) -> Result<(), ApiError> {
    for (username, bio, posts) in DEMO_USERS {
        if find_user_id(db, username)?.is_some() {
            continue;
        }

        let mut user = User::new(
            new_id(),
            username.to_string(),
            format!("{}@plaza.local", username),
            hash_password(username)?,
            now_iso(),
        );
        user.bio = bio.to_string();
        register_user(db, &user)?;

        for text in posts.iter() {
            let post = Post::new(new_id(), user.id.clone(), text.to_string(), None, now_iso());
            insert_post(db, &post)?;
        }
        info!("Seeded demo user {}", username);
    }

    if let (Some(test_id), Some(bob_id)) = (find_user_id(db, "test")?, find_user_id(db, "bob")?) {
        let test: Option<User> = db.get_json(&user_key(&test_id))?;
        if test.map(|u| !u.is_following(&bob_id)).unwrap_or(false) {
            toggle_follow(db, &test_id, &bob_id)?;
        }
    }

    Ok(())
}
