use rusqlite::{params, Connection};

use crate::db::models::Comment;
use crate::error::{AppError, AppResult};

pub fn create_comment(
    conn: &Connection,
    post_id: i64,
    user_id: i64,
    comment: &str,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO comments (comment, post_id, user_id) VALUES (?1, ?2, ?3)",
        params![comment, post_id, user_id],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Comments on a post, oldest first.
pub fn list_comments(conn: &Connection, post_id: i64) -> Result<Vec<Comment>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.comment, c.post_id, c.user_id, u.username, c.created
         FROM comments c
         LEFT JOIN user u ON u.id = c.user_id
         WHERE c.post_id = ?1
         ORDER BY c.created ASC, c.id ASC",
    )?;

    let comments = stmt
        .query_map(params![post_id], |row| {
            Ok(Comment {
                id: row.get(0)?,
                comment: row.get(1)?,
                post_id: row.get(2)?,
                user_id: row.get(3)?,
                username: row.get(4)?,
                created: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(comments)
}

/// Delete a comment on `post_id`. Only the comment's author or the post's
/// author may do so.
pub fn delete_comment(
    conn: &Connection,
    post_id: i64,
    comment_id: i64,
    viewer_id: i64,
) -> AppResult<()> {
    let owners = conn.query_row(
        "SELECT c.user_id, p.author_id
         FROM comments c
         JOIN post p ON p.id = c.post_id
         WHERE c.id = ?1 AND c.post_id = ?2",
        params![comment_id, post_id],
        |row| Ok((row.get::<_, Option<i64>>(0)?, row.get::<_, i64>(1)?)),
    );

    let (comment_author, post_author) = match owners {
        Ok(owners) => owners,
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            return Err(AppError::NotFound(format!(
                "Comment id {comment_id} doesn't exist."
            )))
        }
        Err(e) => return Err(e.into()),
    };

    if comment_author != Some(viewer_id) && post_author != viewer_id {
        return Err(AppError::Forbidden);
    }

    conn.execute("DELETE FROM comments WHERE id = ?1", params![comment_id])?;
    Ok(())
}
