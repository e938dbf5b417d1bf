use rusqlite::{params, Connection};

use crate::db::models::User;
use crate::error::is_unique_violation;

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("User {0} is already registered.")]
    UsernameTaken(String),

    #[error(transparent)]
    Database(#[from] rusqlite::Error),
}

/// Insert a user with an already-hashed password. The UNIQUE constraint on
/// `username` decides whether the name is free.
pub fn create_user(
    conn: &Connection,
    username: &str,
    password_hash: &str,
) -> Result<i64, RegisterError> {
    match conn.execute(
        "INSERT INTO user (username, password) VALUES (?1, ?2)",
        params![username, password_hash],
    ) {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if is_unique_violation(&e) => Err(RegisterError::UsernameTaken(username.to_string())),
        Err(e) => Err(e.into()),
    }
}

pub fn find_by_username(conn: &Connection, username: &str) -> Result<Option<User>, rusqlite::Error> {
    let result = conn.query_row(
        "SELECT id, username, password FROM user WHERE username = ?1",
        params![username],
        |row| {
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
            })
        },
    );

    match result {
        Ok(user) => Ok(Some(user)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}
