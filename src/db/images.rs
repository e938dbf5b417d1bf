use std::collections::HashMap;

use rusqlite::{params, params_from_iter, Connection};

use crate::db::models::Image;

pub fn insert_image(conn: &Connection, post_id: i64, filename: &str) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO images (post_id, filename) VALUES (?1, ?2)",
        params![post_id, filename],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn images_for_post(conn: &Connection, post_id: i64) -> Result<Vec<Image>, rusqlite::Error> {
    let mut stmt =
        conn.prepare("SELECT id, post_id, filename FROM images WHERE post_id = ?1 ORDER BY id")?;
    let images = stmt
        .query_map(params![post_id], map_image)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(images)
}

/// Images for a set of posts, keyed by post id. Posts without images have no
/// entry.
pub fn images_for_posts(
    conn: &Connection,
    post_ids: &[i64],
) -> Result<HashMap<i64, Vec<Image>>, rusqlite::Error> {
    let mut by_post: HashMap<i64, Vec<Image>> = HashMap::new();
    if post_ids.is_empty() {
        return Ok(by_post);
    }

    let placeholders = vec!["?"; post_ids.len()].join(", ");
    let sql = format!(
        "SELECT id, post_id, filename FROM images WHERE post_id IN ({placeholders}) ORDER BY id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(post_ids.iter()), map_image)?;
    for image in rows {
        let image = image?;
        by_post.entry(image.post_id).or_default().push(image);
    }
    Ok(by_post)
}

fn map_image(row: &rusqlite::Row<'_>) -> rusqlite::Result<Image> {
    Ok(Image {
        id: row.get(0)?,
        post_id: row.get(1)?,
        filename: row.get(2)?,
    })
}
