//! Batch orchestration: scrape once, fan out per announcement, aggregate.
//!
//! Failure isolation is the point of this module. After the scrape, every
//! announcement runs in its own task; one item blowing up produces one
//! `ItemError` and leaves the rest of the batch alone. Each scraped item
//! ends up as exactly one report or one error.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use approval_plane::store::TicketStore;

use crate::skill::SkillInvoker;
use crate::stages::{
    self, EvaluationContext, ScrapeRequest, StageError, TradeContext,
};
use crate::storage::AnalysisArchive;
use crate::types::{BatchPhase, BatchRequest, BatchResult, ItemError, ItemReport, WorkItem};

pub const DEFAULT_HISTORY_LIMIT: u32 = 5;

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    /// How many prior analyses feed each evaluation.
    pub history_limit: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

#[derive(Clone)]
pub struct PipelineRunner {
    skills: Arc<dyn SkillInvoker>,
    archive: Arc<dyn AnalysisArchive>,
    tickets: Arc<dyn TicketStore>,
    settings: PipelineSettings,
}

impl PipelineRunner {
    pub fn new(
        skills: Arc<dyn SkillInvoker>,
        archive: Arc<dyn AnalysisArchive>,
        tickets: Arc<dyn TicketStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            skills,
            archive,
            tickets,
            settings,
        }
    }

    /// Run one batch. `Err` means the batch never got past discovery;
    /// per-item failures are inside the `Ok` result.
    pub async fn run_batch(&self, request: BatchRequest) -> Result<BatchResult, StageError> {
        let task_id = request
            .task_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info!(
            phase = %BatchPhase::Started,
            "Starting announcement pipeline for {} (task {})",
            request.asx_code, task_id
        );

        info!(phase = %BatchPhase::Scraping, "Scraping announcements for {}", request.asx_code);
        let scraped = stages::scrape_stage(
            self.skills.as_ref(),
            &ScrapeRequest {
                asx_code: request.asx_code.clone(),
                price_sensitive_only: request.price_sensitive_only,
                limit: request.limit,
                task_id: task_id.clone(),
            },
        )
        .await?;

        let items: Vec<WorkItem> = scraped
            .announcements
            .into_iter()
            .enumerate()
            .map(|(index, a)| WorkItem {
                index,
                announcement_id: a.announcement_id,
                asx_code: if a.asx_code.is_empty() {
                    request.asx_code.clone()
                } else {
                    a.asx_code
                },
                title: a.title,
            })
            .collect();

        if items.is_empty() {
            info!(phase = %BatchPhase::Done, "No new announcements for {}", request.asx_code);
            return Ok(BatchResult::empty(task_id));
        }

        let discovered = items.len();
        info!(
            phase = %BatchPhase::FanningOut,
            "Processing {} announcement(s) concurrently", discovered
        );

        let mut join_set = JoinSet::new();
        let mut submitted: HashMap<tokio::task::Id, (usize, String)> = HashMap::new();
        for item in items {
            let runner = self.clone();
            let task = task_id.clone();
            let key = (item.index, item.asx_code.clone());
            let handle = join_set.spawn(async move { runner.process_item(item, task).await });
            submitted.insert(handle.id(), key);
        }

        info!(phase = %BatchPhase::Aggregating, "Waiting for {} item task(s)", discovered);
        let mut result = BatchResult {
            task_id,
            items_discovered: discovered,
            reports: Vec::new(),
            errors: Vec::new(),
        };

        while let Some(joined) = join_set.join_next_with_id().await {
            match joined {
                Ok((_, Ok(report))) => {
                    info!(
                        "Item {} ({}) finished: {:?} trade outcome",
                        report.index, report.announcement_id, report.trade
                    );
                    result.reports.push(report);
                }
                Ok((_, Err(item_error))) => {
                    error!(
                        "Item {} ({}) failed: {}",
                        item_error.index,
                        item_error.announcement_id.as_deref().unwrap_or("unknown"),
                        item_error.message
                    );
                    result.errors.push(item_error);
                }
                Err(join_error) => {
                    // The item task itself died; still account for the item.
                    let (index, asx_code) = submitted
                        .get(&join_error.id())
                        .cloned()
                        .unwrap_or((usize::MAX, String::new()));
                    error!("Item task {} aborted: {}", index, join_error);
                    result.errors.push(ItemError {
                        index,
                        asx_code,
                        announcement_id: None,
                        message: format!("item task aborted: {join_error}"),
                    });
                }
            }
        }

        if !result.is_conserved() {
            warn!(
                "Batch accounting mismatch: {} discovered, {} reports, {} errors",
                result.items_discovered,
                result.reports.len(),
                result.errors.len()
            );
        }
        info!(
            phase = %BatchPhase::Done,
            "Batch complete: {} processed, {} failed, {} awaiting approval",
            result.reports.len(),
            result.errors.len(),
            result.pending_trades()
        );
        Ok(result)
    }

    async fn process_item(&self, item: WorkItem, task_id: String) -> Result<ItemReport, ItemError> {
        let fail = |announcement_id: Option<String>, message: String| ItemError {
            index: item.index,
            asx_code: item.asx_code.clone(),
            announcement_id,
            message,
        };

        let announcement_id = item
            .announcement_id
            .clone()
            .ok_or_else(|| fail(None, "scraped announcement carries no announcement_id".to_string()))?;

        let record = self
            .archive
            .find_announcement(&announcement_id)
            .await
            .map_err(|e| fail(Some(announcement_id.clone()), e.to_string()))?
            .ok_or_else(|| {
                fail(
                    Some(announcement_id.clone()),
                    StageError::MissingRecord(announcement_id.clone()).to_string(),
                )
            })?;

        // Analysis and market data are independent; run them together.
        let (analysis_res, market_res) = tokio::join!(
            stages::analyze_stage(self.skills.as_ref(), &announcement_id, &task_id),
            stages::market_data_stage(self.skills.as_ref(), &item.asx_code, &task_id),
        );

        let analysis =
            analysis_res.map_err(|e| fail(Some(announcement_id.clone()), e.to_string()))?;
        let market = match market_res {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                // Degraded, not fatal: evaluation can run without a quote.
                warn!("Stock data unavailable for {}: {}", item.asx_code, e);
                None
            }
        };

        let history = self
            .archive
            .recent_analyses(&record.company_id, self.settings.history_limit)
            .await
            .map_err(|e| fail(Some(announcement_id.clone()), e.to_string()))?;

        let evaluation = stages::evaluate_stage(
            self.skills.as_ref(),
            &EvaluationContext {
                announcement_id: &announcement_id,
                asx_code: &item.asx_code,
                task_id: &task_id,
                analysis: &analysis,
                market: market.as_ref(),
                history: &history,
            },
        )
        .await
        .map_err(|e| fail(Some(announcement_id.clone()), e.to_string()))?;

        let trade = stages::trade_stage(
            self.tickets.as_ref(),
            &TradeContext {
                company_id: &record.company_id,
                announcement_id: &announcement_id,
                asx_code: &item.asx_code,
                task_id: &task_id,
                analysis: &analysis,
                market: market.as_ref(),
                evaluation: &evaluation,
            },
        )
        .await;

        Ok(ItemReport {
            index: item.index,
            announcement_id,
            asx_code: item.asx_code,
            title: item.title,
            analysis,
            market,
            evaluation,
            trade,
        })
    }
}
