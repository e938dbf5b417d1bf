use rusqlite::{params, Connection};

use crate::db::models::Post;
use crate::error::{AppError, AppResult};

/// Whether `get_post` should insist that the viewer wrote the post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorCheck {
    Enforce(i64),
    Skip,
}

/// Fetch a post with its author's name. Fails with `NotFound` when the post
/// is missing and with `Forbidden` when `check` names someone else.
pub fn get_post(conn: &Connection, id: i64, check: AuthorCheck) -> AppResult<Post> {
    let result = conn.query_row(
        "SELECT p.id, p.title, p.body, p.created, p.author_id, u.username
         FROM post p
         JOIN user u ON u.id = p.author_id
         WHERE p.id = ?1",
        params![id],
        |row| {
            Ok(Post {
                id: row.get(0)?,
                title: row.get(1)?,
                body: row.get(2)?,
                created: row.get(3)?,
                author_id: row.get(4)?,
                username: row.get(5)?,
            })
        },
    );

    let post = match result {
        Ok(post) => post,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Err(AppError::post_not_found(id)),
        Err(e) => return Err(e.into()),
    };

    if let AuthorCheck::Enforce(viewer_id) = check {
        if post.author_id != viewer_id {
            return Err(AppError::Forbidden);
        }
    }

    Ok(post)
}

pub fn post_exists(conn: &Connection, id: i64) -> Result<bool, rusqlite::Error> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM post WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )
}

pub fn create_post(
    conn: &Connection,
    author_id: i64,
    title: &str,
    body: &str,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO post (title, body, author_id) VALUES (?1, ?2, ?3)",
        params![title, body, author_id],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_post(
    conn: &Connection,
    id: i64,
    title: &str,
    body: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE post SET title = ?1, body = ?2 WHERE id = ?3",
        params![title, body, id],
    )?;
    Ok(())
}

/// Delete a post and everything hanging off it. Returns the image file names
/// that belonged to the post so the caller can remove them from disk.
pub fn delete_post(conn: &mut Connection, id: i64) -> Result<Vec<String>, rusqlite::Error> {
    let tx = conn.transaction()?;
    let filenames = crate::db::images::images_for_post(&tx, id)?
        .into_iter()
        .map(|image| image.filename)
        .collect();
    tx.execute("DELETE FROM post WHERE id = ?1", params![id])?;
    tx.commit()?;
    Ok(filenames)
}
