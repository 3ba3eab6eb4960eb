use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::*;

impl InsightDb {
    // =========================================================================
    // Users
    // =========================================================================

    /// Fetch a user by id.
    pub fn get_user(&self, user_id: i64) -> Result<Option<DbUser>, DbError> {
        let user = self
            .conn
            .query_row(
                "SELECT id, ticktick_user_id, access_token, refresh_token, token_expires_at,
                        created_at, updated_at,
                        gmail_access_token, gmail_refresh_token, gmail_token_expiry, gmail_email,
                        outlook_access_token, outlook_refresh_token, outlook_token_expiry,
                        outlook_email
                 FROM users WHERE id = ?1",
                params![user_id],
                Self::map_user_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Fetch a user by the opaque id the task service issued.
    pub fn find_user_by_ticktick_id(&self, ticktick_user_id: &str) -> Result<Option<DbUser>, DbError> {
        let user = self
            .conn
            .query_row(
                "SELECT id, ticktick_user_id, access_token, refresh_token, token_expires_at,
                        created_at, updated_at,
                        gmail_access_token, gmail_refresh_token, gmail_token_expiry, gmail_email,
                        outlook_access_token, outlook_refresh_token, outlook_token_expiry,
                        outlook_email
                 FROM users WHERE ticktick_user_id = ?1",
                params![ticktick_user_id],
                Self::map_user_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Find-or-create a user row, returning its id.
    ///
    /// With a TickTick user id, matches on that column. Without one, reuses
    /// the lowest existing id so a fresh single-user install converges on one
    /// row instead of accumulating blanks.
    pub fn ensure_user(&self, ticktick_user_id: Option<&str>) -> Result<i64, DbError> {
        if let Some(tid) = ticktick_user_id {
            if let Some(user) = self.find_user_by_ticktick_id(tid)? {
                return Ok(user.id);
            }
        } else if let Some(id) = self
            .conn
            .query_row("SELECT MIN(id) FROM users", [], |row| row.get::<_, Option<i64>>(0))?
        {
            return Ok(id);
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO users (ticktick_user_id, created_at, updated_at) VALUES (?1, ?2, ?2)",
            params![ticktick_user_id, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Store TickTick OAuth tokens for a user.
    pub fn update_ticktick_tokens(
        &self,
        user_id: i64,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<&str>,
    ) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE users
             SET access_token = ?1,
                 refresh_token = COALESCE(?2, refresh_token),
                 token_expires_at = ?3,
                 updated_at = ?4
             WHERE id = ?5",
            params![access_token, refresh_token, expires_at, now, user_id],
        )?;
        Ok(())
    }

    /// Store Gmail OAuth tokens + account email for a user.
    pub fn update_gmail_tokens(
        &self,
        user_id: i64,
        access_token: &str,
        refresh_token: Option<&str>,
        expiry: Option<&str>,
        email: Option<&str>,
    ) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE users
             SET gmail_access_token = ?1,
                 gmail_refresh_token = COALESCE(?2, gmail_refresh_token),
                 gmail_token_expiry = ?3,
                 gmail_email = COALESCE(?4, gmail_email),
                 updated_at = ?5
             WHERE id = ?6",
            params![access_token, refresh_token, expiry, email, now, user_id],
        )?;
        Ok(())
    }

    /// Store Outlook OAuth tokens + account email for a user.
    pub fn update_outlook_tokens(
        &self,
        user_id: i64,
        access_token: &str,
        refresh_token: Option<&str>,
        expiry: Option<&str>,
        email: Option<&str>,
    ) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE users
             SET outlook_access_token = ?1,
                 outlook_refresh_token = COALESCE(?2, outlook_refresh_token),
                 outlook_token_expiry = ?3,
                 outlook_email = COALESCE(?4, outlook_email),
                 updated_at = ?5
             WHERE id = ?6",
            params![access_token, refresh_token, expiry, email, now, user_id],
        )?;
        Ok(())
    }

    fn map_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbUser> {
        Ok(DbUser {
            id: row.get(0)?,
            ticktick_user_id: row.get(1)?,
            access_token: row.get(2)?,
            refresh_token: row.get(3)?,
            token_expires_at: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            gmail_access_token: row.get(7)?,
            gmail_refresh_token: row.get(8)?,
            gmail_token_expiry: row.get(9)?,
            gmail_email: row.get(10)?,
            outlook_access_token: row.get(11)?,
            outlook_refresh_token: row.get(12)?,
            outlook_token_expiry: row.get(13)?,
            outlook_email: row.get(14)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, InsightDb) {
        let dir = tempfile::tempdir().unwrap();
        let db = InsightDb::open_at(dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn test_ensure_user_is_idempotent() {
        let (_dir, db) = test_db();
        let a = db.ensure_user(Some("tt-123")).unwrap();
        let b = db.ensure_user(Some("tt-123")).unwrap();
        assert_eq!(a, b);

        let other = db.ensure_user(Some("tt-456")).unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn test_ensure_user_without_id_reuses_first_row() {
        let (_dir, db) = test_db();
        let a = db.ensure_user(None).unwrap();
        let b = db.ensure_user(None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_token_update_preserves_refresh_token() {
        let (_dir, db) = test_db();
        let id = db.ensure_user(Some("tt-1")).unwrap();
        db.update_ticktick_tokens(id, "access-1", Some("refresh-1"), None)
            .unwrap();
        // A refresh response without a new refresh_token keeps the old one.
        db.update_ticktick_tokens(id, "access-2", None, None).unwrap();

        let user = db.get_user(id).unwrap().unwrap();
        assert_eq!(user.access_token.as_deref(), Some("access-2"));
        assert_eq!(user.refresh_token.as_deref(), Some("refresh-1"));
    }
}
