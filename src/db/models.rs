use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Never leaves the server.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub avatar: Option<String>,
    #[serde(rename = "posts")]
    pub post_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub title: String,
    pub category: Category,
    pub description: String,
    pub creator: String,
    pub thumbnail: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub category: Category,
    pub description: String,
    pub creator: String,
    pub thumbnail: String,
}

/// Text fields are always rewritten; the thumbnail only when a new one was uploaded.
#[derive(Debug, Clone)]
pub struct PostChanges {
    pub title: String,
    pub category: Category,
    pub description: String,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Agriculture,
    Business,
    Education,
    Entertainment,
    Art,
    Investment,
    #[default]
    Uncategorized,
    Weather,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Agriculture,
        Category::Business,
        Category::Education,
        Category::Entertainment,
        Category::Art,
        Category::Investment,
        Category::Uncategorized,
        Category::Weather,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Agriculture => "Agriculture",
            Category::Business => "Business",
            Category::Education => "Education",
            Category::Entertainment => "Entertainment",
            Category::Art => "Art",
            Category::Investment => "Investment",
            Category::Uncategorized => "Uncategorized",
            Category::Weather => "Weather",
        }
    }

    /// Unknown names fall back to `Uncategorized`.
    pub fn from_name_or_default(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown category: {}", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownCategory(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!("business".parse::<Category>(), Ok(Category::Business));
        assert_eq!(" Weather ".parse::<Category>(), Ok(Category::Weather));
    }

    #[test]
    fn unknown_category_falls_back() {
        assert!("Sports".parse::<Category>().is_err());
        assert_eq!(
            Category::from_name_or_default("Sports"),
            Category::Uncategorized
        );
    }

    #[test]
    fn user_json_hides_password_hash() {
        let user = User {
            id: "u1".into(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            password_hash: "$2b$10$secret".into(),
            avatar: None,
            post_count: 2,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["posts"], 2);
        assert_eq!(json["email"], "ada@example.com");
    }
}
