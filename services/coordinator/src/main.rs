use std::sync::Arc;

use tracing::{error, info, Level};

use approval_plane::db::init_db;
use approval_plane::store::PgTicketStore;
use coordinator::config::Config;
use coordinator::pipeline::{PipelineRunner, PipelineSettings};
use coordinator::retry::RetryingInvoker;
use coordinator::skill::SkillClient;
use coordinator::storage::PgAnalysisArchive;
use coordinator::types::BatchRequest;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = Config::from_env()?;
    info!("Coordinator starting for {}", config.asx_code);

    let db = init_db(&config.database_url).await?;

    let client = SkillClient::new(
        config.agent_endpoints.clone(),
        config.send_timeout,
        config.poll_interval,
        config.poll_deadline,
    )?;
    let skills = Arc::new(RetryingInvoker::new(client, config.retry));

    let runner = PipelineRunner::new(
        skills,
        Arc::new(PgAnalysisArchive::new(db.clone())),
        Arc::new(PgTicketStore::new(db)),
        PipelineSettings {
            history_limit: config.history_limit,
        },
    );

    let mut result = runner
        .run_batch(BatchRequest {
            asx_code: config.asx_code.clone(),
            price_sensitive_only: config.price_sensitive_only,
            limit: config.scrape_limit,
            task_id: None,
        })
        .await?;
    result.sort_by_submission();

    info!(
        "Pipeline finished for {}: {} of {} announcement(s) processed",
        config.asx_code,
        result.reports.len(),
        result.items_discovered
    );
    for item_error in &result.errors {
        error!(
            "Announcement {} failed: {}",
            item_error.announcement_id.as_deref().unwrap_or("unknown"),
            item_error.message
        );
    }
    if result.pending_trades() > 0 {
        info!(
            "{} trade(s) awaiting approval, review at http://localhost:8888/pending",
            result.pending_trades()
        );
    }

    Ok(())
}
