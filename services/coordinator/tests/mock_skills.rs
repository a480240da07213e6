//! Scripted doubles for pipeline tests: a programmable skill invoker and an
//! in-memory announcement archive.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use coordinator::a2a::SkillReply;
use coordinator::skill::{SkillError, SkillInvoker};
use coordinator::storage::{
    AnalysisArchive, AnnouncementRecord, HistoricalAnalysis, StorageError,
};

type Responder = Box<dyn Fn(&Value) -> Result<SkillReply, SkillError> + Send + Sync>;

/// Skill invoker that routes by agent name to scripted responders and
/// records every call it sees.
#[derive(Default)]
pub struct ScriptedSkills {
    responders: HashMap<String, Responder>,
    calls: Mutex<Vec<(String, String, Value)>>,
}

impl ScriptedSkills {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(mut self, agent: &str, responder: F) -> Self
    where
        F: Fn(&Value) -> Result<SkillReply, SkillError> + Send + Sync + 'static,
    {
        self.responders.insert(agent.to_string(), Box::new(responder));
        self
    }

    /// Always reply with the same structured value.
    pub fn respond(self, agent: &str, reply: Value) -> Self {
        self.on(agent, move |_| Ok(SkillReply::Structured(reply.clone())))
    }

    pub fn failing(self, agent: &str, message: &str) -> Self {
        let agent_name = agent.to_string();
        let message = message.to_string();
        self.on(agent, move |_| {
            Err(SkillError::RemoteFailed {
                agent: agent_name.clone(),
                skill: "scripted".to_string(),
                message: message.clone(),
            })
        })
    }

    pub fn calls_to(&self, agent: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _, _)| a == agent)
            .map(|(_, _, input)| input.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl SkillInvoker for ScriptedSkills {
    async fn invoke(
        &self,
        agent: &str,
        skill: &str,
        input: Value,
    ) -> Result<SkillReply, SkillError> {
        self.calls
            .lock()
            .unwrap()
            .push((agent.to_string(), skill.to_string(), input.clone()));
        match self.responders.get(agent) {
            Some(responder) => responder(&input),
            None => Err(SkillError::UnknownAgent(agent.to_string())),
        }
    }
}

/// Archive double backed by maps. `fail_history` simulates the database
/// dropping out between discovery and evaluation.
#[derive(Default)]
pub struct MemoryArchive {
    announcements: HashMap<String, AnnouncementRecord>,
    analyses: HashMap<String, Vec<HistoricalAnalysis>>,
    pub fail_history: bool,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_announcement(mut self, id: &str, company_id: &str, asx_code: &str) -> Self {
        self.announcements.insert(
            id.to_string(),
            AnnouncementRecord {
                id: id.to_string(),
                company_id: company_id.to_string(),
                asx_code: asx_code.to_string(),
                title: format!("Announcement {id}"),
            },
        );
        self
    }

    pub fn with_history(mut self, company_id: &str, entries: Vec<HistoricalAnalysis>) -> Self {
        self.analyses.insert(company_id.to_string(), entries);
        self
    }
}

pub fn history_entry(announcement_id: &str, summary: &str) -> HistoricalAnalysis {
    HistoricalAnalysis {
        announcement_id: announcement_id.to_string(),
        announcement_date: Some(chrono::Utc::now()),
        announcement_title: format!("Announcement {announcement_id}"),
        summary: Some(summary.to_string()),
        sentiment: Some("NEUTRAL".to_string()),
        key_insights: None,
        management_promises: None,
        financial_impact: None,
    }
}

#[async_trait::async_trait]
impl AnalysisArchive for MemoryArchive {
    async fn find_announcement(
        &self,
        announcement_id: &str,
    ) -> Result<Option<AnnouncementRecord>, StorageError> {
        Ok(self.announcements.get(announcement_id).cloned())
    }

    async fn recent_analyses(
        &self,
        company_id: &str,
        limit: u32,
    ) -> Result<Vec<HistoricalAnalysis>, StorageError> {
        if self.fail_history {
            return Err(StorageError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut entries = self.analyses.get(company_id).cloned().unwrap_or_default();
        entries.truncate(limit as usize);
        Ok(entries)
    }
}
