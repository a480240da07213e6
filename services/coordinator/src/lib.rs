//! Announcement pipeline coordinator
//!
//! Drives the ASX announcement workflow end to end: discover new
//! announcements through the scraper agent, fan each one out through
//! analysis, market data and evaluation, and raise approval tickets for
//! actionable verdicts. Trades never execute without a human decision in
//! the approval plane.

pub mod a2a;
pub mod config;
pub mod pipeline;
pub mod retry;
pub mod skill;
pub mod stages;
pub mod storage;
pub mod types;

pub use a2a::SkillReply;
pub use config::Config;
pub use pipeline::{PipelineRunner, PipelineSettings};
pub use retry::{RetryPolicy, RetryingInvoker};
pub use skill::{SkillClient, SkillError, SkillInvoker};
pub use types::{BatchRequest, BatchResult, ItemError, ItemReport};
