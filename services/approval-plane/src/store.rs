//! Ticket store: persistent approval decisions with atomic transitions
//!
//! The only state shared between the pipeline coordinator (which writes
//! PENDING tickets) and the human approver (who writes the terminal
//! transition) lives here. `resolve` therefore performs its
//! check-and-write as one conditional update so two near-simultaneous
//! approvals cannot both fire.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::Db;
use crate::models::{
    execution_fill, generate_ticket_id, paper_trade_quantity, ApprovalTicket, NewTicket,
    TicketStatus,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Outcome of a resolve attempt. `AlreadyResolved` carries the untouched
/// record so callers can report the terminal state without re-reading.
#[derive(Debug, Clone)]
pub enum ResolveOutcome {
    Executed(ApprovalTicket),
    Rejected(ApprovalTicket),
    AlreadyResolved(ApprovalTicket),
    NotFound,
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Liveness check against the backing storage.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn create(&self, ticket: NewTicket) -> Result<ApprovalTicket, StoreError>;

    async fn resolve(
        &self,
        ticket_id: &str,
        approved: bool,
        approver: &str,
        notes: Option<String>,
    ) -> Result<ResolveOutcome, StoreError>;

    /// Pending tickets, most recent first.
    async fn list_pending(&self, limit: i64) -> Result<Vec<ApprovalTicket>, StoreError>;

    /// Recent decisions regardless of status, most recent first.
    async fn history(&self, limit: i64) -> Result<Vec<ApprovalTicket>, StoreError>;
}

/// Postgres-backed store
pub struct PgTicketStore {
    db: Db,
}

impl PgTicketStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TicketStore for PgTicketStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    async fn create(&self, ticket: NewTicket) -> Result<ApprovalTicket, StoreError> {
        let ticket_id = generate_ticket_id();

        let created = sqlx::query_as::<_, ApprovalTicket>(
            r#"
            INSERT INTO trading_decisions (
                id, ticket_id, task_id, company_id, announcement_id, asx_code,
                decision, decision_type, status, sentiment, confidence,
                reasoning, price_at_decision
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'PENDING', $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&ticket_id)
        .bind(&ticket.task_id)
        .bind(&ticket.company_id)
        .bind(&ticket.announcement_id)
        .bind(&ticket.asx_code)
        .bind(ticket.verdict.simple_decision())
        .bind(ticket.verdict.as_str())
        .bind(&ticket.sentiment)
        .bind(ticket.confidence)
        .bind(&ticket.reasoning)
        .bind(ticket.price_at_decision)
        .fetch_one(&self.db)
        .await?;

        info!(
            "Created trading decision {} for {} ({}) with status PENDING",
            created.id, created.asx_code, created.ticket_id
        );
        Ok(created)
    }

    async fn resolve(
        &self,
        ticket_id: &str,
        approved: bool,
        approver: &str,
        notes: Option<String>,
    ) -> Result<ResolveOutcome, StoreError> {
        let status = if approved {
            TicketStatus::Approved
        } else {
            TicketStatus::Rejected
        };

        // Single conditional update: the PENDING guard is the compare-and-swap.
        let updated = sqlx::query_as::<_, ApprovalTicket>(
            r#"
            UPDATE trading_decisions SET
                status = $2,
                approved_by = $3,
                human_feedback = $4,
                resolved_at = NOW(),
                executed = $5,
                executed_at = CASE WHEN $5 THEN NOW() END,
                execution_price = CASE WHEN $5 THEN price_at_decision END,
                quantity = CASE WHEN $5 THEN $6::numeric END,
                trade_amount = CASE WHEN $5 THEN price_at_decision * $6::numeric END
            WHERE ticket_id = $1 AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(ticket_id)
        .bind(status)
        .bind(approver)
        .bind(&notes)
        .bind(approved)
        .bind(paper_trade_quantity())
        .fetch_optional(&self.db)
        .await?;

        match updated {
            Some(ticket) if approved => {
                info!(
                    "Paper trade executed: {} x {} @ {:?} (ticket {})",
                    ticket.quantity.unwrap_or_default(),
                    ticket.asx_code,
                    ticket.execution_price,
                    ticket.ticket_id
                );
                Ok(ResolveOutcome::Executed(ticket))
            }
            Some(ticket) => {
                info!("Trade rejected for {} (ticket {})", ticket.asx_code, ticket.ticket_id);
                Ok(ResolveOutcome::Rejected(ticket))
            }
            None => {
                // Lost the race or never existed; re-read to tell which.
                let existing = sqlx::query_as::<_, ApprovalTicket>(
                    "SELECT * FROM trading_decisions WHERE ticket_id = $1",
                )
                .bind(ticket_id)
                .fetch_optional(&self.db)
                .await?;

                match existing {
                    Some(ticket) => {
                        warn!("Ticket {} already resolved ({:?})", ticket_id, ticket.status);
                        Ok(ResolveOutcome::AlreadyResolved(ticket))
                    }
                    None => Ok(ResolveOutcome::NotFound),
                }
            }
        }
    }

    async fn list_pending(&self, limit: i64) -> Result<Vec<ApprovalTicket>, StoreError> {
        let tickets = sqlx::query_as::<_, ApprovalTicket>(
            "SELECT * FROM trading_decisions WHERE status = 'PENDING' ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(tickets)
    }

    async fn history(&self, limit: i64) -> Result<Vec<ApprovalTicket>, StoreError> {
        let tickets = sqlx::query_as::<_, ApprovalTicket>(
            "SELECT * FROM trading_decisions ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(tickets)
    }
}

/// In-memory store with the same transition semantics. Used by the test
/// harnesses in both services and for database-less paper runs.
#[derive(Default)]
pub struct MemoryTicketStore {
    tickets: Mutex<HashMap<String, ApprovalTicket>>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create(&self, ticket: NewTicket) -> Result<ApprovalTicket, StoreError> {
        let created = ApprovalTicket {
            id: Uuid::new_v4(),
            ticket_id: generate_ticket_id(),
            task_id: ticket.task_id,
            company_id: ticket.company_id,
            announcement_id: ticket.announcement_id,
            asx_code: ticket.asx_code,
            decision: ticket.verdict.simple_decision().to_string(),
            decision_type: ticket.verdict.as_str().to_string(),
            status: TicketStatus::Pending,
            sentiment: ticket.sentiment,
            confidence: Some(ticket.confidence),
            reasoning: ticket.reasoning,
            price_at_decision: ticket.price_at_decision,
            executed: false,
            execution_price: None,
            quantity: None,
            trade_amount: None,
            approved_by: None,
            human_feedback: None,
            created_at: Utc::now(),
            resolved_at: None,
            executed_at: None,
        };

        self.tickets
            .lock()
            .unwrap()
            .insert(created.ticket_id.clone(), created.clone());
        Ok(created)
    }

    async fn resolve(
        &self,
        ticket_id: &str,
        approved: bool,
        approver: &str,
        notes: Option<String>,
    ) -> Result<ResolveOutcome, StoreError> {
        let mut tickets = self.tickets.lock().unwrap();

        let ticket = match tickets.get_mut(ticket_id) {
            Some(t) => t,
            None => return Ok(ResolveOutcome::NotFound),
        };

        if ticket.status != TicketStatus::Pending {
            return Ok(ResolveOutcome::AlreadyResolved(ticket.clone()));
        }

        let now = Utc::now();
        ticket.approved_by = Some(approver.to_string());
        ticket.human_feedback = notes;
        ticket.resolved_at = Some(now);

        if approved {
            ticket.status = TicketStatus::Approved;
            ticket.executed = true;
            ticket.executed_at = Some(now);
            if let Some(price) = ticket.price_at_decision {
                let fill = execution_fill(price);
                ticket.execution_price = Some(fill.execution_price);
                ticket.quantity = Some(fill.quantity);
                ticket.trade_amount = Some(fill.trade_amount);
            }
            Ok(ResolveOutcome::Executed(ticket.clone()))
        } else {
            ticket.status = TicketStatus::Rejected;
            Ok(ResolveOutcome::Rejected(ticket.clone()))
        }
    }

    async fn list_pending(&self, limit: i64) -> Result<Vec<ApprovalTicket>, StoreError> {
        let tickets = self.tickets.lock().unwrap();
        let mut pending: Vec<ApprovalTicket> = tickets
            .values()
            .filter(|t| t.status == TicketStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn history(&self, limit: i64) -> Result<Vec<ApprovalTicket>, StoreError> {
        let tickets = self.tickets.lock().unwrap();
        let mut all: Vec<ApprovalTicket> = tickets.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit as usize);
        Ok(all)
    }
}
