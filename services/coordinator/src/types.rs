//! Batch-level types for the announcement pipeline.

use serde::{Deserialize, Serialize};

use crate::stages::{AnalysisReport, Evaluation, MarketSnapshot, TradeOutcome};

/// One pipeline run over a company's recent announcements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub asx_code: String,
    #[serde(default = "default_price_sensitive")]
    pub price_sensitive_only: bool,
    #[serde(default = "default_scrape_limit")]
    pub limit: u32,
    /// Correlation id threaded through every downstream call. Generated
    /// when absent.
    #[serde(default)]
    pub task_id: Option<String>,
}

fn default_price_sensitive() -> bool {
    true
}

fn default_scrape_limit() -> u32 {
    5
}

/// A scraped announcement queued for per-item processing. `index` is the
/// submission position within the batch.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub index: usize,
    pub announcement_id: Option<String>,
    pub asx_code: String,
    pub title: String,
}

/// Everything the pipeline produced for one fully processed item.
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub index: usize,
    pub announcement_id: String,
    pub asx_code: String,
    pub title: String,
    pub analysis: AnalysisReport,
    /// `None` when market data could not be fetched; evaluation ran on
    /// partial input.
    pub market: Option<MarketSnapshot>,
    pub evaluation: Evaluation,
    pub trade: TradeOutcome,
}

/// Why one item dropped out of the batch. Other items are unaffected.
#[derive(Debug, Clone, Serialize)]
pub struct ItemError {
    pub index: usize,
    pub asx_code: String,
    pub announcement_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub task_id: String,
    pub items_discovered: usize,
    pub reports: Vec<ItemReport>,
    pub errors: Vec<ItemError>,
}

impl BatchResult {
    pub fn empty(task_id: String) -> Self {
        Self {
            task_id,
            items_discovered: 0,
            reports: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Every scraped item must end up as exactly one report or one error.
    pub fn is_conserved(&self) -> bool {
        self.reports.len() + self.errors.len() == self.items_discovered
    }

    /// Reports and errors accumulate in completion order; this restores
    /// submission order for presentation.
    pub fn sort_by_submission(&mut self) {
        self.reports.sort_by_key(|r| r.index);
        self.errors.sort_by_key(|e| e.index);
    }

    pub fn pending_trades(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.trade, TradeOutcome::PendingApproval { .. }))
            .count()
    }
}

/// Coarse progress marker logged as the batch moves through the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Started,
    Scraping,
    FanningOut,
    Aggregating,
    Done,
}

impl std::fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BatchPhase::Started => "started",
            BatchPhase::Scraping => "scraping",
            BatchPhase::FanningOut => "fanning_out",
            BatchPhase::Aggregating => "aggregating",
            BatchPhase::Done => "done",
        };
        f.write_str(name)
    }
}
