use rusqlite::{params, Connection};

use crate::error::is_unique_violation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeState {
    Liked,
    Unliked,
}

/// Flip the viewer's like on a post. The insert and the fallback delete run in
/// one transaction; the (post_id, user_id) primary key is what tells us the
/// like already existed.
pub fn toggle_like(
    conn: &mut Connection,
    post_id: i64,
    user_id: i64,
) -> Result<LikeState, rusqlite::Error> {
    let tx = conn.transaction()?;

    let state = match tx.execute(
        "INSERT INTO likes (post_id, user_id) VALUES (?1, ?2)",
        params![post_id, user_id],
    ) {
        Ok(_) => LikeState::Liked,
        Err(e) if is_unique_violation(&e) => {
            tx.execute(
                "DELETE FROM likes WHERE post_id = ?1 AND user_id = ?2",
                params![post_id, user_id],
            )?;
            LikeState::Unliked
        }
        Err(e) => return Err(e),
    };

    tx.commit()?;
    Ok(state)
}
