//! Read access to previously stored announcements and analyses.
//!
//! The scraper and analyzer agents persist their results; the pipeline only
//! reads them back, to resolve the company behind an announcement and to
//! feed recent history into evaluation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, FromRow)]
pub struct AnnouncementRecord {
    pub id: String,
    pub company_id: String,
    pub asx_code: String,
    pub title: String,
}

/// One prior analysis for the same company, newest first.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct HistoricalAnalysis {
    pub announcement_id: String,
    pub announcement_date: Option<DateTime<Utc>>,
    pub announcement_title: String,
    pub summary: Option<String>,
    pub sentiment: Option<String>,
    pub key_insights: Option<String>,
    pub management_promises: Option<String>,
    pub financial_impact: Option<String>,
}

#[async_trait::async_trait]
pub trait AnalysisArchive: Send + Sync {
    async fn find_announcement(
        &self,
        announcement_id: &str,
    ) -> Result<Option<AnnouncementRecord>, StorageError>;

    /// The company's most recent analyses, newest first, at most `limit`.
    async fn recent_analyses(
        &self,
        company_id: &str,
        limit: u32,
    ) -> Result<Vec<HistoricalAnalysis>, StorageError>;
}

pub struct PgAnalysisArchive {
    db: PgPool,
}

impl PgAnalysisArchive {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl AnalysisArchive for PgAnalysisArchive {
    async fn find_announcement(
        &self,
        announcement_id: &str,
    ) -> Result<Option<AnnouncementRecord>, StorageError> {
        let record = sqlx::query_as::<_, AnnouncementRecord>(
            "SELECT id, company_id, asx_code, title FROM announcements WHERE id = $1",
        )
        .bind(announcement_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(record)
    }

    async fn recent_analyses(
        &self,
        company_id: &str,
        limit: u32,
    ) -> Result<Vec<HistoricalAnalysis>, StorageError> {
        let rows = sqlx::query_as::<_, HistoricalAnalysis>(
            r#"
            SELECT an.announcement_id,
                   a.announcement_date,
                   a.title AS announcement_title,
                   an.summary,
                   an.sentiment,
                   an.key_insights,
                   an.management_promises,
                   an.financial_impact
            FROM analysis an
            JOIN announcements a ON a.id = an.announcement_id
            WHERE a.company_id = $1
            ORDER BY a.announcement_date DESC
            LIMIT $2
            "#,
        )
        .bind(company_id)
        .bind(i64::from(limit))
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}
