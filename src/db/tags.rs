use std::collections::HashMap;

use rusqlite::{params, params_from_iter, Connection};

use crate::error::is_unique_violation;

/// Split a `#one #two` string into distinct, trimmed tag names in first-seen
/// order. Matching is exact and case-sensitive.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for name in raw.split('#').map(str::trim).filter(|s| !s.is_empty()) {
        if !tags.iter().any(|t| t == name) {
            tags.push(name.to_string());
        }
    }
    tags
}

/// Id of the tag called `name`, inserting it first if needed. Meant to run
/// inside the caller's transaction.
pub fn get_or_create_tag(conn: &Connection, name: &str) -> Result<i64, rusqlite::Error> {
    match conn.execute("INSERT INTO tags (tag) VALUES (?1)", params![name]) {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if is_unique_violation(&e) => conn.query_row(
            "SELECT id FROM tags WHERE tag = ?1",
            params![name],
            |row| row.get(0),
        ),
        Err(e) => Err(e),
    }
}

/// Link a post to each named tag, creating tags as needed. Returns the number
/// of new associations.
pub fn attach_tags(conn: &Connection, post_id: i64, names: &[String]) -> Result<usize, rusqlite::Error> {
    let mut attached = 0;
    for name in names {
        let tag_id = get_or_create_tag(conn, name)?;
        attached += conn.execute(
            "INSERT OR IGNORE INTO post_tag (post_id, tag_id) VALUES (?1, ?2)",
            params![post_id, tag_id],
        )?;
    }
    Ok(attached)
}

/// Tag names for a set of posts, keyed by post id and sorted by name. Posts
/// without tags have no entry.
pub fn tags_for_posts(
    conn: &Connection,
    post_ids: &[i64],
) -> Result<HashMap<i64, Vec<String>>, rusqlite::Error> {
    let mut by_post: HashMap<i64, Vec<String>> = HashMap::new();
    if post_ids.is_empty() {
        return Ok(by_post);
    }

    let placeholders = vec!["?"; post_ids.len()].join(", ");
    let sql = format!(
        "SELECT pt.post_id, t.tag FROM post_tag pt
         JOIN tags t ON t.id = pt.tag_id
         WHERE pt.post_id IN ({placeholders})
         ORDER BY t.tag"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(post_ids.iter()), |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (post_id, tag) = row?;
        by_post.entry(post_id).or_default().push(tag);
    }
    Ok(by_post)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{insert_post, insert_user, test_pool};

    fn tags_for_post(conn: &Connection, post_id: i64) -> Vec<String> {
        tags_for_posts(conn, &[post_id])
            .unwrap()
            .remove(&post_id)
            .unwrap_or_default()
    }

    #[test]
    fn parse_tags_dedups_and_trims() {
        assert_eq!(parse_tags("#foo #bar #foo"), vec!["foo", "bar"]);
        assert_eq!(parse_tags("  # rust  #web dev# "), vec!["rust", "web dev"]);
    }

    #[test]
    fn parse_tags_is_case_sensitive() {
        assert_eq!(parse_tags("#Rust#rust"), vec!["Rust", "rust"]);
    }

    #[test]
    fn parse_tags_empty_input() {
        assert!(parse_tags("").is_empty());
        assert!(parse_tags("# # #").is_empty());
    }

    #[test]
    fn get_or_create_reuses_existing_tag() {
        let (_tmp, pool) = test_pool();
        let conn = pool.get().unwrap();
        let first = get_or_create_tag(&conn, "rust").unwrap();
        let second = get_or_create_tag(&conn, "rust").unwrap();
        assert_eq!(first, second);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn duplicate_tags_create_two_associations() {
        let (_tmp, pool) = test_pool();
        let conn = pool.get().unwrap();
        let uid = insert_user(&conn, "alice");
        let pid = insert_post(&conn, uid, "t", "b");

        let attached = attach_tags(&conn, pid, &parse_tags("#foo #bar #foo")).unwrap();
        assert_eq!(attached, 2);
        assert_eq!(tags_for_post(&conn, pid), vec!["bar", "foo"]);
    }

    #[test]
    fn tags_are_shared_between_posts() {
        let (_tmp, pool) = test_pool();
        let conn = pool.get().unwrap();
        let uid = insert_user(&conn, "alice");
        let a = insert_post(&conn, uid, "a", "a");
        let b = insert_post(&conn, uid, "b", "b");

        attach_tags(&conn, a, &parse_tags("#shared")).unwrap();
        attach_tags(&conn, b, &parse_tags("#shared #other")).unwrap();

        let tags: i64 = conn
            .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))
            .unwrap();
        assert_eq!(tags, 2);
    }
}
