//! The five pipeline stages and their typed records.
//!
//! Each stage flattens one skill call (or, for the trade stage, one ticket
//! write) into a typed result. Malformed skill output degrades to safe
//! defaults here so the pipeline itself only deals in well-formed records.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use approval_plane::models::{NewTicket, Verdict};
use approval_plane::store::TicketStore;

use crate::a2a::SkillReply;
use crate::skill::{SkillError, SkillInvoker};
use crate::storage::{HistoricalAnalysis, StorageError};

pub const SCRAPER_AGENT: &str = "scraper";
pub const ANALYZER_AGENT: &str = "analyzer";
pub const STOCK_AGENT: &str = "stock";
pub const EVALUATION_AGENT: &str = "evaluation";

pub const SCRAPE_SKILL: &str = "scrape_asx_announcements";
pub const ANALYZE_SKILL: &str = "process_and_analyze_announcement";
pub const STOCK_SKILL: &str = "get_stock_data";
pub const EVALUATE_SKILL: &str = "generate_investment_recommendation";

/// Reasoning longer than this is truncated before it lands on a ticket.
const TICKET_REASONING_LIMIT: usize = 300;

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Skill(#[from] SkillError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("announcement {0} not found, the scraper should have stored it")]
    MissingRecord(String),
}

// ---------------------------------------------------------------------------
// Scrape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ScrapeRequest {
    pub asx_code: String,
    pub price_sensitive_only: bool,
    pub limit: u32,
    pub task_id: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ScrapeResult {
    #[serde(default)]
    pub announcements: Vec<ScrapedAnnouncement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrapedAnnouncement {
    #[serde(default)]
    pub announcement_id: Option<String>,
    #[serde(default)]
    pub asx_code: String,
    #[serde(default)]
    pub title: String,
}

/// Discover recent announcements for a company. A failure here is fatal to
/// the whole batch; nothing has fanned out yet.
pub async fn scrape_stage(
    skills: &dyn SkillInvoker,
    request: &ScrapeRequest,
) -> Result<ScrapeResult, StageError> {
    let input = serde_json::to_value(request).unwrap_or_default();
    let reply = skills.invoke(SCRAPER_AGENT, SCRAPE_SKILL, input).await?;

    let result = match reply {
        SkillReply::Structured(value) => match serde_json::from_value::<ScrapeResult>(value) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("Scraper returned an unexpected shape ({}), treating as empty", err);
                ScrapeResult::default()
            }
        },
        SkillReply::Text(text) => {
            warn!("Scraper replied with plain text, treating as empty: {}", text);
            ScrapeResult::default()
        }
    };

    info!(
        "Scraper found {} announcement(s) for {}",
        result.announcements.len(),
        request.asx_code
    );
    Ok(result)
}

// ---------------------------------------------------------------------------
// Analyze
// ---------------------------------------------------------------------------

/// The analyzer's structured read of one announcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    #[serde(default)]
    pub summary: String,
    #[serde(default = "neutral_sentiment")]
    pub sentiment: String,
    #[serde(default)]
    pub key_insights: Vec<String>,
    #[serde(default)]
    pub management_promises: Vec<String>,
    #[serde(default)]
    pub financial_impact: Option<String>,
    /// True when the agent produced no structured output and only the plain
    /// text fallback was available.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

fn neutral_sentiment() -> String {
    "NEUTRAL".to_string()
}

impl Default for AnalysisReport {
    fn default() -> Self {
        Self {
            summary: String::new(),
            sentiment: neutral_sentiment(),
            key_insights: Vec::new(),
            management_promises: Vec::new(),
            financial_impact: None,
            degraded: false,
        }
    }
}

impl AnalysisReport {
    fn from_reply(reply: SkillReply) -> Self {
        match reply {
            SkillReply::Structured(value) => match serde_json::from_value(value) {
                Ok(report) => report,
                Err(err) => {
                    warn!("Analyzer output did not parse ({}), using neutral defaults", err);
                    AnalysisReport::default()
                }
            },
            SkillReply::Text(text) => AnalysisReport {
                summary: text,
                degraded: true,
                ..AnalysisReport::default()
            },
        }
    }
}

pub async fn analyze_stage(
    skills: &dyn SkillInvoker,
    announcement_id: &str,
    task_id: &str,
) -> Result<AnalysisReport, StageError> {
    let reply = skills
        .invoke(
            ANALYZER_AGENT,
            ANALYZE_SKILL,
            json!({ "announcement_id": announcement_id, "task_id": task_id }),
        )
        .await?;
    Ok(AnalysisReport::from_reply(reply))
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MarketSnapshot {
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub performance_1m_pct: Option<f64>,
    #[serde(default)]
    pub performance_3m_pct: Option<f64>,
    #[serde(default)]
    pub performance_6m_pct: Option<f64>,
}

pub async fn market_data_stage(
    skills: &dyn SkillInvoker,
    asx_code: &str,
    task_id: &str,
) -> Result<MarketSnapshot, StageError> {
    let reply = skills
        .invoke(
            STOCK_AGENT,
            STOCK_SKILL,
            json!({ "asx_code": asx_code, "task_id": task_id }),
        )
        .await?;

    let snapshot = match reply {
        SkillReply::Structured(value) => match serde_json::from_value(value) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("Stock data for {} did not parse ({}), using empty snapshot", asx_code, err);
                MarketSnapshot::default()
            }
        },
        SkillReply::Text(text) => {
            warn!("Stock agent replied with plain text for {}: {}", asx_code, text);
            MarketSnapshot::default()
        }
    };
    Ok(snapshot)
}

// ---------------------------------------------------------------------------
// Evaluate
// ---------------------------------------------------------------------------

/// Everything the evaluation skill sees for one item.
#[derive(Debug, Clone)]
pub struct EvaluationContext<'a> {
    pub announcement_id: &'a str,
    pub asx_code: &'a str,
    pub task_id: &'a str,
    pub analysis: &'a AnalysisReport,
    pub market: Option<&'a MarketSnapshot>,
    pub history: &'a [HistoricalAnalysis],
}

#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub confidence: f64,
    pub reasoning: String,
}

impl Evaluation {
    fn from_reply(reply: SkillReply) -> Self {
        let value = match reply {
            SkillReply::Structured(value) => value,
            SkillReply::Text(text) => {
                warn!("Evaluation replied with plain text, holding: {}", text);
                return Evaluation {
                    verdict: Verdict::Hold,
                    confidence: 0.0,
                    reasoning: text,
                };
            }
        };

        let verdict = value
            .get("recommendation")
            .and_then(Value::as_str)
            .map(Verdict::parse)
            .unwrap_or(Verdict::Hold);
        let confidence = value
            .get("confidence_score")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let reasoning = value
            .get("recommendation_reasoning")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Evaluation { verdict, confidence, reasoning }
    }
}

pub async fn evaluate_stage(
    skills: &dyn SkillInvoker,
    ctx: &EvaluationContext<'_>,
) -> Result<Evaluation, StageError> {
    let input = json!({
        "announcement_id": ctx.announcement_id,
        "asx_code": ctx.asx_code,
        "task_id": ctx.task_id,
        "current_analysis": ctx.analysis,
        "stock_data": ctx.market,
        "historical_analyses": ctx.history,
    });

    let reply = skills.invoke(EVALUATION_AGENT, EVALUATE_SKILL, input).await?;
    let evaluation = Evaluation::from_reply(reply);
    info!(
        "Evaluation for {} ({}): {} at {:.2} confidence",
        ctx.asx_code,
        ctx.announcement_id,
        evaluation.verdict.as_str(),
        evaluation.confidence
    );
    Ok(evaluation)
}

// ---------------------------------------------------------------------------
// Trade
// ---------------------------------------------------------------------------

/// Terminal trade state for one item. Ticket-store failures land here as
/// `Failed` rather than sinking the item; the analysis work is still worth
/// reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status")]
pub enum TradeOutcome {
    #[serde(rename = "PENDING_APPROVAL")]
    PendingApproval {
        ticket_id: String,
        asx_code: String,
        recommendation: String,
        price_at_decision: Option<f64>,
    },
    #[serde(rename = "SKIPPED")]
    Skipped { reason: String },
    #[serde(rename = "ERROR")]
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct TradeContext<'a> {
    pub company_id: &'a str,
    pub announcement_id: &'a str,
    pub asx_code: &'a str,
    pub task_id: &'a str,
    pub analysis: &'a AnalysisReport,
    pub market: Option<&'a MarketSnapshot>,
    pub evaluation: &'a Evaluation,
}

/// Raise a PENDING approval ticket for an actionable verdict. Every trade
/// waits for a human; nothing executes here.
pub async fn trade_stage(tickets: &dyn TicketStore, ctx: &TradeContext<'_>) -> TradeOutcome {
    if !ctx.evaluation.verdict.is_actionable() {
        return TradeOutcome::Skipped {
            reason: ctx.evaluation.verdict.as_str().to_string(),
        };
    }

    let price = ctx.market.and_then(|m| m.price);
    let mut reasoning = ctx.evaluation.reasoning.clone();
    if reasoning.len() > TICKET_REASONING_LIMIT {
        let cut = (0..=TICKET_REASONING_LIMIT)
            .rev()
            .find(|&i| reasoning.is_char_boundary(i))
            .unwrap_or(0);
        reasoning.truncate(cut);
    }

    let new_ticket = NewTicket {
        company_id: Some(ctx.company_id.to_string()),
        announcement_id: Some(ctx.announcement_id.to_string()),
        asx_code: ctx.asx_code.to_string(),
        verdict: ctx.evaluation.verdict,
        sentiment: Some(ctx.analysis.sentiment.clone()),
        confidence: ctx.evaluation.confidence,
        reasoning,
        price_at_decision: price.and_then(Decimal::from_f64),
        task_id: Some(ctx.task_id.to_string()),
    };

    match tickets.create(new_ticket).await {
        Ok(ticket) => {
            info!(
                "Trade for {} awaiting approval as {}",
                ctx.asx_code, ticket.ticket_id
            );
            TradeOutcome::PendingApproval {
                ticket_id: ticket.ticket_id,
                asx_code: ctx.asx_code.to_string(),
                recommendation: ctx.evaluation.verdict.as_str().to_string(),
                price_at_decision: price,
            }
        }
        Err(err) => {
            warn!("Could not raise approval ticket for {}: {}", ctx.asx_code, err);
            TradeOutcome::Failed {
                error: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_parses_structured_reply() {
        let report = AnalysisReport::from_reply(SkillReply::Structured(json!({
            "summary": "Record half-year profit",
            "sentiment": "BULLISH",
            "key_insights": ["margin expansion"],
        })));
        assert_eq!(report.sentiment, "BULLISH");
        assert_eq!(report.key_insights, vec!["margin expansion"]);
        assert!(!report.degraded);
    }

    #[test]
    fn analysis_text_fallback_is_marked_degraded() {
        let report =
            AnalysisReport::from_reply(SkillReply::Text("looks broadly positive".to_string()));
        assert!(report.degraded);
        assert_eq!(report.sentiment, "NEUTRAL");
        assert_eq!(report.summary, "looks broadly positive");
    }

    #[test]
    fn malformed_analysis_degrades_to_neutral_defaults() {
        let report = AnalysisReport::from_reply(SkillReply::Structured(json!({
            "summary": 42,
            "key_insights": "not a list",
        })));
        assert_eq!(report.sentiment, "NEUTRAL");
        assert!(report.summary.is_empty());
    }

    #[test]
    fn evaluation_missing_fields_holds() {
        let eval = Evaluation::from_reply(SkillReply::Structured(json!({})));
        assert_eq!(eval.verdict, Verdict::Hold);
        assert_eq!(eval.confidence, 0.0);
    }

    #[test]
    fn evaluation_reads_recommendation_fields() {
        let eval = Evaluation::from_reply(SkillReply::Structured(json!({
            "recommendation": "SPECULATIVE BUY",
            "confidence_score": 0.65,
            "recommendation_reasoning": "early-stage but derisked",
        })));
        assert_eq!(eval.verdict, Verdict::SpeculativeBuy);
        assert_eq!(eval.confidence, 0.65);
        assert_eq!(eval.reasoning, "early-stage but derisked");
    }
}
