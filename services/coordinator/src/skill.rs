//! Skill invocation over A2A
//!
//! `SkillClient` speaks the request/poll protocol against a fixed set of
//! agent endpoints. `SkillInvoker` is the seam the pipeline and the retry
//! wrapper work against, so tests can script replies without a server.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info};

use crate::a2a::{
    self, JsonRpcRequest, MessageSendParams, PollResponse, SendResponse, SkillReply, TaskState,
    TasksGetParams,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_POLL_DEADLINE: Duration = Duration::from_secs(300);
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    #[error("no endpoint configured for agent '{0}'")]
    UnknownAgent(String),

    #[error("transport error calling {agent}.{skill}: {source}")]
    Transport {
        agent: String,
        skill: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{agent}.{skill} accepted the message but returned no task id")]
    MissingTaskId { agent: String, skill: String },

    #[error("{agent}.{skill} failed remotely: {message}")]
    RemoteFailed {
        agent: String,
        skill: String,
        message: String,
    },

    #[error("deadline of {deadline:?} exceeded waiting on {agent}.{skill} task {task_id}")]
    DeadlineExceeded {
        agent: String,
        skill: String,
        task_id: String,
        deadline: Duration,
    },

    #[error("{agent}.{skill} still failing after {attempts} attempts, last error: {last}")]
    RetriesExhausted {
        agent: String,
        skill: String,
        attempts: u32,
        last: String,
    },
}

/// One skill call against a named agent. Implementations resolve the agent,
/// run the call to a terminal state and hand back the extracted reply.
#[async_trait::async_trait]
pub trait SkillInvoker: Send + Sync {
    async fn invoke(&self, agent: &str, skill: &str, input: Value)
        -> Result<SkillReply, SkillError>;
}

pub struct SkillClient {
    http: reqwest::Client,
    endpoints: HashMap<String, String>,
    poll_interval: Duration,
    poll_deadline: Duration,
}

impl SkillClient {
    pub fn new(
        endpoints: HashMap<String, String>,
        send_timeout: Duration,
        poll_interval: Duration,
        poll_deadline: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(send_timeout).build()?;
        Ok(Self {
            http,
            endpoints,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            poll_deadline,
        })
    }

    fn endpoint(&self, agent: &str) -> Result<&str, SkillError> {
        self.endpoints
            .get(agent)
            .map(String::as_str)
            .ok_or_else(|| SkillError::UnknownAgent(agent.to_string()))
    }

    async fn send_message(
        &self,
        agent: &str,
        skill: &str,
        input: &Value,
    ) -> Result<String, SkillError> {
        let url = self.endpoint(agent)?.to_string();
        let message = a2a::skill_message(skill, input);
        let request = JsonRpcRequest::new(a2a::METHOD_MESSAGE_SEND, MessageSendParams { message });

        let response: SendResponse = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|source| SkillError::Transport {
                agent: agent.to_string(),
                skill: skill.to_string(),
                source,
            })?
            .json()
            .await
            .map_err(|source| SkillError::Transport {
                agent: agent.to_string(),
                skill: skill.to_string(),
                source,
            })?;

        response.result.id.ok_or_else(|| SkillError::MissingTaskId {
            agent: agent.to_string(),
            skill: skill.to_string(),
        })
    }

    async fn poll_task(&self, agent: &str, skill: &str, task_id: &str) -> Result<PollResponse, SkillError> {
        let url = self.endpoint(agent)?.to_string();
        let request = JsonRpcRequest::new(
            a2a::METHOD_TASKS_GET,
            TasksGetParams {
                id: task_id.to_string(),
            },
        );

        self.http
            .post(&url)
            .json(&request)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|source| SkillError::Transport {
                agent: agent.to_string(),
                skill: skill.to_string(),
                source,
            })?
            .json()
            .await
            .map_err(|source| SkillError::Transport {
                agent: agent.to_string(),
                skill: skill.to_string(),
                source,
            })
    }
}

#[async_trait::async_trait]
impl SkillInvoker for SkillClient {
    async fn invoke(
        &self,
        agent: &str,
        skill: &str,
        input: Value,
    ) -> Result<SkillReply, SkillError> {
        let task_id = self.send_message(agent, skill, &input).await?;
        debug!("Submitted {}.{} as task {}", agent, skill, task_id);

        let deadline = tokio::time::Instant::now() + self.poll_deadline;
        loop {
            tokio::time::sleep(self.poll_interval).await;
            if tokio::time::Instant::now() >= deadline {
                return Err(SkillError::DeadlineExceeded {
                    agent: agent.to_string(),
                    skill: skill.to_string(),
                    task_id,
                    deadline: self.poll_deadline,
                });
            }

            let poll = self.poll_task(agent, skill, &task_id).await?;
            match poll.result.status.state {
                TaskState::Completed => {
                    info!("{}.{} task {} completed", agent, skill, task_id);
                    return match a2a::extract_reply(&poll.result) {
                        Some(reply) => {
                            if reply.is_degraded() {
                                error!(
                                    "{}.{} task {} produced no structured reply, using status text",
                                    agent, skill, task_id
                                );
                            }
                            Ok(reply)
                        }
                        None => {
                            error!("No data found in completed task {} from {}.{}", task_id, agent, skill);
                            Ok(SkillReply::Structured(Value::Object(Default::default())))
                        }
                    };
                }
                TaskState::Failed => {
                    let message = poll
                        .result
                        .status
                        .message
                        .as_ref()
                        .and_then(|m| m.parts.first())
                        .and_then(|p| p.text.clone())
                        .unwrap_or_else(|| "task failed with no message".to_string());
                    return Err(SkillError::RemoteFailed {
                        agent: agent.to_string(),
                        skill: skill.to_string(),
                        message,
                    });
                }
                TaskState::Pending | TaskState::InProgress | TaskState::Unknown => {
                    debug!("{}.{} task {} still {:?}", agent, skill, task_id, poll.result.status.state);
                }
            }
        }
    }
}
