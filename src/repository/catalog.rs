//! Catalog and member lookups against the `lms_books`, `lms_book_copies`
//! and `lms_members` tables

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use crate::{
    error::{AppError, AppResult, Resource},
    models::{BookCopy, CopyId, MemberId, TitleId, TitleRef},
};

use super::{schema::Tables, Catalog, Members};

#[derive(Clone)]
pub struct PgCatalog {
    pool: Pool<Postgres>,
    tables: Arc<Tables>,
}

impl PgCatalog {
    pub fn new(pool: Pool<Postgres>, tables: Arc<Tables>) -> Self {
        Self { pool, tables }
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn resolve_title(&self, title: &TitleRef) -> AppResult<TitleId> {
        let found = match title {
            TitleRef::Id(id) => {
                sqlx::query_scalar::<_, i64>(&format!(
                    "SELECT book_id::bigint FROM {} WHERE book_id = $1",
                    self.tables.books
                ))
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?
            }
            TitleRef::Isbn(isbn) => {
                sqlx::query_scalar::<_, i64>(&format!(
                    "SELECT book_id::bigint FROM {} WHERE isbn = $1",
                    self.tables.books
                ))
                .bind(isbn)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        found
            .map(TitleId)
            .ok_or_else(|| AppError::NotFound(Resource::Title(title.to_string())))
    }

    async fn copies_of_title(&self, title_id: TitleId) -> AppResult<Vec<BookCopy>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT copy_id::bigint AS copy_id, status
            FROM {}
            WHERE book_id = $1
            ORDER BY copy_id
            "#,
            self.tables.copies
        ))
        .bind(title_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> AppResult<BookCopy> {
                let status: String = row.get("status");
                Ok(BookCopy {
                    copy_id: CopyId(row.get("copy_id")),
                    title_id,
                    status: status.parse().map_err(AppError::Internal)?,
                })
            })
            .collect()
    }

    async fn count_titles(&self) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.tables.books))
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[async_trait]
impl Members for PgCatalog {
    async fn member_exists(&self, member_id: MemberId) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE member_id = $1)",
            self.tables.members
        ))
        .bind(member_id.0)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn count_members(&self) -> AppResult<u64> {
        let count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.tables.members))
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }
}
