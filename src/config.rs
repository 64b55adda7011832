use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

pub const MAX_POST_LENGTH: usize = 500;
pub const MAX_REPLY_LENGTH: usize = 500;
pub const MAX_BIO_LENGTH: usize = 500;
pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MIN_PASSWORD_LENGTH: usize = 4;
pub const MAX_AGE: u8 = 120;
pub const DEFAULT_PROFILE_PIC: &str = "default.jpg";

pub const USERS_LIST_KEY: &str = "users_list";

const DEV_TOKEN_SECRET: &str = "plaza-dev-secret-change-me";

pub fn user_key(user_id: &str) -> String {
    format!("user:{}", user_id)
}

pub fn username_key(username: &str) -> String {
    format!("username:{}", username.to_lowercase())
}

pub fn email_key(email: &str) -> String {
    format!("email:{}", email.to_lowercase())
}

pub fn post_key(post_id: &str) -> String {
    format!("post:{}", post_id)
}

pub fn user_posts_key(user_id: &str) -> String {
    format!("user_posts:{}", user_id)
}

/// What happens to the hosted image when the record pointing at it goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageCleanup {
    /// Ask the image host to delete it; failures are logged, never returned.
    BestEffort,
    Disabled,
}

impl FromStr for ImageCleanup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best_effort" => Ok(ImageCleanup::BestEffort),
            "disabled" | "off" => Ok(ImageCleanup::Disabled),
            other => Err(format!("unknown image cleanup policy '{other}'")),
        }
    }
}

/// Who may remove a reply from a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyDeletePolicy {
    /// Only whoever wrote the reply.
    Author,
    /// The reply's author or the author of the post it hangs off.
    AuthorOrPostOwner,
}

impl FromStr for ReplyDeletePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "author" => Ok(ReplyDeletePolicy::Author),
            "author_or_post_owner" => Ok(ReplyDeletePolicy::AuthorOrPostOwner),
            other => Err(format!("unknown reply delete policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub token_secret: String,
    pub token_expiration_hours: i64,
    pub image_cleanup: ImageCleanup,
    pub reply_delete: ReplyDeletePolicy,
    pub seed_demo: bool,
    pub cloudinary: Option<CloudinaryConfig>,
}

impl Config {
    pub fn load() -> Self {
        let token_secret = var("PLAZA_TOKEN_SECRET").unwrap_or_else(|_| {
            warn!("PLAZA_TOKEN_SECRET not set, using the development secret");
            DEV_TOKEN_SECRET.to_string()
        });

        Self {
            port: try_load("PLAZA_PORT", 5000),
            token_secret,
            token_expiration_hours: try_load("PLAZA_TOKEN_EXPIRATION_HOURS", 24),
            image_cleanup: try_load("PLAZA_IMAGE_CLEANUP", ImageCleanup::BestEffort),
            reply_delete: try_load("PLAZA_REPLY_DELETE", ReplyDeletePolicy::AuthorOrPostOwner),
            seed_demo: try_load("PLAZA_SEED_DEMO", false),
            cloudinary: load_cloudinary(),
        }
    }

    /// Fixed settings for tests and embedding; nothing is read from the environment.
    pub fn for_tests(token_secret: &str) -> Self {
        Self {
            port: 0,
            token_secret: token_secret.to_string(),
            token_expiration_hours: 24,
            image_cleanup: ImageCleanup::BestEffort,
            reply_delete: ReplyDeletePolicy::AuthorOrPostOwner,
            seed_demo: false,
            cloudinary: None,
        }
    }
}

fn load_cloudinary() -> Option<CloudinaryConfig> {
    match (
        var("CLOUDINARY_CLOUD_NAME"),
        var("CLOUDINARY_API_KEY"),
        var("CLOUDINARY_API_SECRET"),
    ) {
        (Ok(cloud_name), Ok(api_key), Ok(api_secret)) => Some(CloudinaryConfig {
            cloud_name,
            api_key,
            api_secret,
        }),
        _ => {
            info!("Cloudinary credentials not set, image uploads are disabled");
            None
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| ())
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    T::Err: Display,
{
    match var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value '{raw}': {e}, using default {default:?}");
            default
        }),
        Err(_) => {
            info!("{key} not set, using default: {default:?}");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_policies() {
        assert_eq!("best_effort".parse::<ImageCleanup>(), Ok(ImageCleanup::BestEffort));
        assert_eq!(" Disabled ".parse::<ImageCleanup>(), Ok(ImageCleanup::Disabled));
        assert!("sometimes".parse::<ImageCleanup>().is_err());

        assert_eq!("author".parse::<ReplyDeletePolicy>(), Ok(ReplyDeletePolicy::Author));
        assert_eq!(
            "author_or_post_owner".parse::<ReplyDeletePolicy>(),
            Ok(ReplyDeletePolicy::AuthorOrPostOwner)
        );
    }

    #[test]
    fn index_keys_are_case_insensitive() {
        assert_eq!(username_key("Alice"), username_key("alice"));
        assert_eq!(email_key("A@B.io"), "email:a@b.io");
    }
}
