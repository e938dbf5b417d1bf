use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password: String,
}

/// A post joined with its author's username.
#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub created: String,
    pub author_id: i64,
    pub username: String,
}

/// A post with its aggregates, as produced by the feed query.
#[derive(Debug, Clone, Serialize)]
pub struct PostSummary {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub body_html: String,
    pub created: String,
    pub author_id: i64,
    pub username: String,
    pub likes: i64,
    pub comments: i64,
    pub user_liked: bool,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub id: i64,
    pub comment: String,
    pub post_id: i64,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub created: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Image {
    pub id: i64,
    pub post_id: i64,
    pub filename: String,
}

/// The identity a request is evaluated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    Anonymous,
    User(i64),
}

impl Viewer {
    pub fn user_id(self) -> Option<i64> {
        match self {
            Viewer::Anonymous => None,
            Viewer::User(id) => Some(id),
        }
    }
}
