//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `ScriptureStore` and `AuthSessionStore` ports from the `core` crate. It
//! handles all interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scripture_reader_core::domain::{
    Book, BookId, Chapter, ChapterId, Highlight, HighlightColor, User, Verse, VerseId,
};
use scripture_reader_core::ports::{AuthSessionStore, PortError, PortResult, ScriptureStore};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the store ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Chapter numbers past `i32::MAX` cannot exist in the table.
fn chapter_param(chapter_number: u32) -> Option<i32> {
    i32::try_from(chapter_number).ok()
}

fn to_u32(value: i32, column: &str) -> PortResult<u32> {
    u32::try_from(value).map_err(|_| PortError::Unexpected(format!("negative {}: {}", column, value)))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct BookRecord {
    id: i64,
    name: String,
    alternate_name: Option<String>,
}
impl BookRecord {
    fn to_domain(self) -> Book {
        Book {
            id: self.id,
            name: self.name,
            alternate_name: self.alternate_name,
        }
    }
}

#[derive(FromRow)]
struct ChapterRecord {
    id: i64,
    book_id: i64,
    chapter_number: i32,
}
impl ChapterRecord {
    fn to_domain(self) -> PortResult<Chapter> {
        Ok(Chapter {
            id: self.id,
            book_id: self.book_id,
            chapter_number: to_u32(self.chapter_number, "chapter_number")?,
        })
    }
}

#[derive(FromRow)]
struct VerseRecord {
    id: i64,
    chapter_id: i64,
    version: String,
    verse_number: i32,
    text: String,
}
impl VerseRecord {
    fn to_domain(self) -> PortResult<Verse> {
        Ok(Verse {
            id: self.id,
            chapter_id: self.chapter_id,
            version: self.version,
            verse_number: to_u32(self.verse_number, "verse_number")?,
            text: self.text,
        })
    }
}

#[derive(FromRow)]
struct HighlightRecord {
    id: i64,
    verse_id: i64,
    user_id: Uuid,
    color: String,
    created_at: DateTime<Utc>,
}
impl HighlightRecord {
    fn to_domain(self) -> PortResult<Highlight> {
        let color = self
            .color
            .parse::<HighlightColor>()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Highlight {
            id: self.id,
            verse_id: self.verse_id,
            user_id: self.user_id,
            color,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    email: Option<String>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            user_id: self.user_id,
            email: self.email,
        }
    }
}

//=========================================================================================
// `ScriptureStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ScriptureStore for DbAdapter {
    async fn list_books(&self) -> PortResult<Vec<Book>> {
        let records = sqlx::query_as::<_, BookRecord>(
            "SELECT id, name, alternate_name FROM books ORDER BY position ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_book(&self, book_id: BookId) -> PortResult<Option<Book>> {
        let record = sqlx::query_as::<_, BookRecord>(
            "SELECT id, name, alternate_name FROM books WHERE id = $1",
        )
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn get_chapter(&self, book_id: BookId, chapter_number: u32) -> PortResult<Option<Chapter>> {
        let Some(chapter) = chapter_param(chapter_number) else {
            return Ok(None);
        };
        let record = sqlx::query_as::<_, ChapterRecord>(
            "SELECT id, book_id, chapter_number FROM chapters WHERE book_id = $1 AND chapter_number = $2",
        )
        .bind(book_id)
        .bind(chapter)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        record.map(|r| r.to_domain()).transpose()
    }

    async fn get_max_chapter_number(&self, book_id: BookId) -> PortResult<Option<u32>> {
        let max: Option<i32> = sqlx::query_scalar(
            "SELECT MAX(chapter_number) FROM chapters WHERE book_id = $1",
        )
        .bind(book_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        max.map(|m| to_u32(m, "chapter_number")).transpose()
    }

    async fn count_verses(&self, chapter_id: ChapterId, version: &str) -> PortResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM verses WHERE chapter_id = $1 AND version = $2",
        )
        .bind(chapter_id)
        .bind(version)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(count.max(0) as u64)
    }

    async fn get_verses(&self, chapter_id: ChapterId, version: &str) -> PortResult<Vec<Verse>> {
        let records = sqlx::query_as::<_, VerseRecord>(
            "SELECT id, chapter_id, version, verse_number, text FROM verses \
             WHERE chapter_id = $1 AND version = $2 ORDER BY verse_number ASC",
        )
        .bind(chapter_id)
        .bind(version)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn get_highlight(&self, verse_id: VerseId, user_id: Uuid) -> PortResult<Option<Highlight>> {
        let record = sqlx::query_as::<_, HighlightRecord>(
            "SELECT id, verse_id, user_id, color, created_at FROM highlights \
             WHERE verse_id = $1 AND user_id = $2 LIMIT 1",
        )
        .bind(verse_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        record.map(|r| r.to_domain()).transpose()
    }

    async fn get_highlights(&self, verse_ids: &[VerseId], user_id: Uuid) -> PortResult<Vec<Highlight>> {
        let records = sqlx::query_as::<_, HighlightRecord>(
            "SELECT id, verse_id, user_id, color, created_at FROM highlights \
             WHERE verse_id = ANY($1) AND user_id = $2 ORDER BY created_at ASC",
        )
        .bind(verse_ids)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn insert_highlight(
        &self,
        verse_id: VerseId,
        user_id: Uuid,
        color: HighlightColor,
    ) -> PortResult<Highlight> {
        let record = sqlx::query_as::<_, HighlightRecord>(
            "INSERT INTO highlights (verse_id, user_id, color) VALUES ($1, $2, $3) \
             RETURNING id, verse_id, user_id, color, created_at",
        )
        .bind(verse_id)
        .bind(user_id)
        .bind(color.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        record.to_domain()
    }

    async fn delete_highlights(&self, verse_id: VerseId, user_id: Uuid) -> PortResult<u64> {
        let result = sqlx::query("DELETE FROM highlights WHERE verse_id = $1 AND user_id = $2")
            .bind(verse_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected())
    }
}

//=========================================================================================
// `AuthSessionStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl AuthSessionStore for DbAdapter {
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT u.user_id, u.email FROM auth_sessions s \
             JOIN users u ON u.user_id = s.user_id \
             WHERE s.id = $1 AND s.expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        record.map(|r| r.to_domain()).ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}
