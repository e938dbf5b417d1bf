//! The post feed: every post with its like count, comment count, tag list and
//! whether the viewer liked it, ordered newest first and cut into pages.

use std::collections::HashMap;

use rusqlite::{Connection, ToSql};

use crate::db::images::images_for_posts;
use crate::db::models::{Image, PostSummary, Viewer};
use crate::db::tags::tags_for_posts;
use crate::markdown;

pub const PAGE_SIZE: i64 = 15;

/// Which posts a feed covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedFilter {
    All,
    /// Posts carrying this exact tag name.
    Tag(String),
    /// Posts whose body contains the needle, or whose author is named by it.
    Search(String),
}

impl FeedFilter {
    fn where_clause(&self) -> &'static str {
        match self {
            FeedFilter::All => "",
            FeedFilter::Tag(_) => {
                "WHERE p.id IN (SELECT pt2.post_id FROM post_tag pt2
                                JOIN tags t2 ON t2.id = pt2.tag_id
                                WHERE t2.tag = :needle)"
            }
            FeedFilter::Search(_) => "WHERE (instr(p.body, :needle) > 0 OR u.username = :needle)",
        }
    }

    fn needle(&self) -> Option<&String> {
        match self {
            FeedFilter::All => None,
            FeedFilter::Tag(needle) | FeedFilter::Search(needle) => Some(needle),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    /// Page numbers start at 1; anything lower is treated as 1.
    pub fn new(page: i64, total: i64) -> Self {
        Self {
            page: page.max(1),
            total,
            total_pages: (total + PAGE_SIZE - 1) / PAGE_SIZE,
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(PAGE_SIZE)
    }

    pub fn prev(&self) -> Option<i64> {
        (self.page > 1).then(|| (self.page - 1).min(self.total_pages.max(1)))
    }

    pub fn next(&self) -> Option<i64> {
        (self.page < self.total_pages).then_some(self.page + 1)
    }
}

#[derive(Debug, Clone)]
pub struct FeedPage {
    pub posts: Vec<PostSummary>,
    /// Images of the visible posts. Posts without images have no entry.
    pub images: HashMap<i64, Vec<Image>>,
    pub pagination: Pagination,
}

const SUMMARY_SELECT: &str = "
    SELECT p.id, p.title, p.body, p.created, p.author_id, u.username,
           COUNT(DISTINCT l.user_id) AS likes,
           COUNT(DISTINCT c.id) AS comments,
           MAX(CASE WHEN l.user_id = :viewer THEN 1 ELSE 0 END) AS user_liked
    FROM post p
    JOIN user u ON u.id = p.author_id
    LEFT JOIN likes l ON l.post_id = p.id
    LEFT JOIN comments c ON c.post_id = p.id";

const SUMMARY_GROUP: &str =
    "GROUP BY p.id, p.title, p.body, p.created, p.author_id, u.username";

/// Build one page of the feed for `viewer`.
pub fn load_feed(
    conn: &Connection,
    viewer: Viewer,
    filter: &FeedFilter,
    page: i64,
) -> Result<FeedPage, rusqlite::Error> {
    if let FeedFilter::Search(needle) = filter {
        if needle.trim().is_empty() {
            return Ok(FeedPage {
                posts: Vec::new(),
                images: HashMap::new(),
                pagination: Pagination::new(page, 0),
            });
        }
    }

    let where_clause = filter.where_clause();

    let total: i64 = {
        let sql = format!(
            "SELECT COUNT(*) FROM post p JOIN user u ON u.id = p.author_id {where_clause}"
        );
        let mut params: Vec<(&str, &dyn ToSql)> = Vec::new();
        if let Some(needle) = filter.needle() {
            params.push((":needle", needle as &dyn ToSql));
        }
        conn.query_row(&sql, params.as_slice(), |row| row.get(0))?
    };

    let pagination = Pagination::new(page, total);
    let viewer_id = viewer.user_id();
    let limit = PAGE_SIZE;
    let offset = pagination.offset();

    let sql = format!(
        "{SUMMARY_SELECT} {where_clause} {SUMMARY_GROUP}
         ORDER BY p.created DESC, p.id DESC
         LIMIT :limit OFFSET :offset"
    );
    let mut params: Vec<(&str, &dyn ToSql)> = vec![
        (":viewer", &viewer_id as &dyn ToSql),
        (":limit", &limit as &dyn ToSql),
        (":offset", &offset as &dyn ToSql),
    ];
    if let Some(needle) = filter.needle() {
        params.push((":needle", needle as &dyn ToSql));
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut posts = stmt
        .query_map(params.as_slice(), map_summary)?
        .collect::<Result<Vec<_>, _>>()?;

    let ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
    let mut tags = tags_for_posts(conn, &ids)?;
    for post in &mut posts {
        post.tags = tags.remove(&post.id).unwrap_or_default();
    }
    let images = images_for_posts(conn, &ids)?;

    Ok(FeedPage {
        posts,
        images,
        pagination,
    })
}

/// The same aggregates as the feed, for a single post.
pub fn post_summary(
    conn: &Connection,
    viewer: Viewer,
    post_id: i64,
) -> Result<Option<PostSummary>, rusqlite::Error> {
    let sql = format!("{SUMMARY_SELECT} WHERE p.id = :post_id {SUMMARY_GROUP}");
    let viewer_id = viewer.user_id();
    let params: [(&str, &dyn ToSql); 2] = [
        (":viewer", &viewer_id as &dyn ToSql),
        (":post_id", &post_id as &dyn ToSql),
    ];

    match conn.query_row(&sql, params.as_slice(), map_summary) {
        Ok(mut summary) => {
            summary.tags = tags_for_posts(conn, &[post_id])?
                .remove(&post_id)
                .unwrap_or_default();
            Ok(Some(summary))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

fn map_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<PostSummary> {
    let body: String = row.get(2)?;

    Ok(PostSummary {
        id: row.get(0)?,
        title: row.get(1)?,
        body_html: markdown::render(&body),
        body,
        created: row.get(3)?,
        author_id: row.get(4)?,
        username: row.get(5)?,
        likes: row.get(6)?,
        comments: row.get(7)?,
        user_liked: row.get(8)?,
        tags: Vec::new(),
    })
}
