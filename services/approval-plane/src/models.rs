//! Ticket and decision models shared with the coordinator

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Fixed share count for paper fills
pub fn paper_trade_quantity() -> Decimal {
    Decimal::from(100)
}

/// Ticket lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "ticket_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TicketStatus {
    Pending,
    Approved,
    Rejected,
}

/// Investment recommendation produced by the evaluation skill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SPECULATIVE BUY")]
    SpeculativeBuy,
    #[serde(rename = "HOLD")]
    Hold,
    #[serde(rename = "SELL")]
    Sell,
    #[serde(rename = "AVOID")]
    Avoid,
}

impl Verdict {
    /// Parse a recommendation string; anything unrecognized is HOLD
    /// (malformed evaluation output must never trigger a trade).
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "BUY" => Verdict::Buy,
            "SPECULATIVE BUY" => Verdict::SpeculativeBuy,
            "HOLD" => Verdict::Hold,
            "SELL" => Verdict::Sell,
            "AVOID" => Verdict::Avoid,
            _ => Verdict::Hold,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Buy => "BUY",
            Verdict::SpeculativeBuy => "SPECULATIVE BUY",
            Verdict::Hold => "HOLD",
            Verdict::Sell => "SELL",
            Verdict::Avoid => "AVOID",
        }
    }

    /// Only these verdicts reach the trade stage.
    pub fn is_actionable(&self) -> bool {
        matches!(self, Verdict::Buy | Verdict::SpeculativeBuy)
    }

    /// Normalized BUY/SELL/HOLD used as the simple `decision` column.
    pub fn simple_decision(&self) -> &'static str {
        match self {
            Verdict::Buy | Verdict::SpeculativeBuy => "BUY",
            Verdict::Hold => "HOLD",
            Verdict::Sell | Verdict::Avoid => "SELL",
        }
    }
}

/// A trading decision awaiting or past human approval
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ApprovalTicket {
    pub id: Uuid,
    pub ticket_id: String,
    pub task_id: Option<String>,
    pub company_id: Option<String>,
    pub announcement_id: Option<String>,
    pub asx_code: String,
    pub decision: String,
    pub decision_type: String,
    pub status: TicketStatus,
    pub sentiment: Option<String>,
    pub confidence: Option<f64>,
    pub reasoning: String,
    pub price_at_decision: Option<Decimal>,
    pub executed: bool,
    pub execution_price: Option<Decimal>,
    pub quantity: Option<Decimal>,
    pub trade_amount: Option<Decimal>,
    pub approved_by: Option<String>,
    pub human_feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl ApprovalTicket {
    pub fn verdict(&self) -> Verdict {
        Verdict::parse(&self.decision_type)
    }
}

/// Input to `TicketStore::create`; everything else is filled by the store.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub company_id: Option<String>,
    pub announcement_id: Option<String>,
    pub asx_code: String,
    pub verdict: Verdict,
    pub sentiment: Option<String>,
    pub confidence: f64,
    pub reasoning: String,
    pub price_at_decision: Option<Decimal>,
    pub task_id: Option<String>,
}

/// Opaque ticket id, `trade-<12 hex>` as the original scheme.
pub fn generate_ticket_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("trade-{}", &hex[..12])
}

/// Execution fields written on approval
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionFill {
    pub execution_price: Decimal,
    pub quantity: Decimal,
    pub trade_amount: Decimal,
}

/// Fill arithmetic for an approved paper trade: the decision price at the
/// fixed quantity. Kept pure so the math is testable without a database.
pub fn execution_fill(price_at_decision: Decimal) -> ExecutionFill {
    let quantity = paper_trade_quantity();
    ExecutionFill {
        execution_price: price_at_decision,
        quantity,
        trade_amount: price_at_decision * quantity,
    }
}

// ---------------------------------------------------------------------------
// Approval API wire types
// ---------------------------------------------------------------------------

/// Entry of `GET /pending`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTicket {
    pub id: Uuid,
    pub ticket_id: String,
    pub asx_code: String,
    pub decision: String,
    pub decision_type: String,
    pub price_at_decision: Option<Decimal>,
    pub confidence: Option<f64>,
    pub reasoning: String,
    pub created_at: DateTime<Utc>,
}

impl From<ApprovalTicket> for PendingTicket {
    fn from(t: ApprovalTicket) -> Self {
        Self {
            id: t.id,
            ticket_id: t.ticket_id,
            asx_code: t.asx_code,
            decision: t.decision,
            decision_type: t.decision_type,
            price_at_decision: t.price_at_decision,
            confidence: t.confidence,
            reasoning: t.reasoning,
            created_at: t.created_at,
        }
    }
}

/// Body of `POST /approve`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub ticket_id: String,
    pub approved: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Response of `POST /approve`
#[derive(Debug, Clone, Serialize)]
pub struct ResolveResponse {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
