use serde::{Serialize, Deserialize};

use crate::config::DEFAULT_PROFILE_PIC;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
    #[default]
    Other,
}

/// Stored user document. `followers` and `following` are the two halves of
/// the follow edge and are only ever written together.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub profile_pic: String,
    pub bio: String,
    pub followers: Vec<String>,
    pub following: Vec<String>,
    pub sex: Sex,
    pub age: u8,
    pub country: String,
    pub is_frozen: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn new(id: String, username: String, email: String, password_hash: String, now: String) -> Self {
        Self {
            id,
            username,
            email,
            password: password_hash,
            profile_pic: DEFAULT_PROFILE_PIC.to_string(),
            bio: String::new(),
            followers: Vec::new(),
            following: Vec::new(),
            sex: Sex::Other,
            age: 18,
            country: "Not set".to_string(),
            is_frozen: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn is_following(&self, user_id: &str) -> bool {
        self.following.iter().any(|id| id == user_id)
    }
}

/// A user with the credential and bookkeeping fields removed. This is the
/// identity attached to authenticated requests.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub username: String,
    pub email: String,
    pub profile_pic: String,
    pub bio: String,
    pub followers: Vec<String>,
    pub following: Vec<String>,
    pub sex: Sex,
    pub age: u8,
    pub country: String,
    pub is_frozen: bool,
}

impl From<&User> for Identity {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.clone(),
            username: u.username.clone(),
            email: u.email.clone(),
            profile_pic: u.profile_pic.clone(),
            bio: u.bio.clone(),
            followers: u.followers.clone(),
            following: u.following.clone(),
            sex: u.sex,
            age: u.age,
            country: u.country.clone(),
            is_frozen: u.is_frozen,
        }
    }
}

/// What anyone may see of another user.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: String,
    pub username: String,
    pub profile_pic: String,
    pub bio: String,
    pub followers: Vec<String>,
    pub following: Vec<String>,
    pub sex: Sex,
    pub age: u8,
    pub country: String,
}

impl From<&User> for PublicProfile {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.clone(),
            username: u.username.clone(),
            profile_pic: u.profile_pic.clone(),
            bio: u.bio.clone(),
            followers: u.followers.clone(),
            following: u.following.clone(),
            sex: u.sex,
            age: u.age,
            country: u.country.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: String,
    pub user_id: String,
    pub text: String,
    pub img: Option<String>,
    pub username: String,
    pub user_profile_pic: String,
    pub created_at: String,
}

/// `number_of_likes` and `number_of_replies` mirror `likes.len()` and
/// `replies.len()`; they are recomputed by every mutation, never set alone.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub author: String,
    pub text: String,
    pub img: Option<String>,
    pub likes: Vec<String>,
    pub number_of_likes: usize,
    pub replies: Vec<Reply>,
    pub number_of_replies: usize,
    pub created_at: String,
    pub updated_at: String,
}

impl Post {
    pub fn new(id: String, author: String, text: String, img: Option<String>, now: String) -> Self {
        Self {
            id,
            author,
            text,
            img,
            likes: Vec::new(),
            number_of_likes: 0,
            replies: Vec::new(),
            number_of_replies: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn is_liked_by(&self, user_id: &str) -> bool {
        self.likes.iter().any(|id| id == user_id)
    }

    pub fn sync_counters(&mut self) {
        self.number_of_likes = self.likes.len();
        self.number_of_replies = self.replies.len();
    }
}

/// Signed bearer token payload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TokenClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

pub type Followings = Vec<String>;
pub type Followers = Vec<String>;
