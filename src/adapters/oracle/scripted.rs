//! Scripted oracle for testing.
//!
//! Replies are queued per role and handed out in order. When a role's queue
//! is empty its fallback reply is used: verifying falls back to a clean
//! reply for every sub-check, drafting to a malformed-reply error.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::domain::errors::OracleError;
use crate::domain::ports::{GenerationOracle, OracleRequest, Role};

type Reply = Result<Value, OracleError>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A verifying reply that reports no issues for any sub-check.
pub fn clean_verification() -> Value {
    json!({
        "semantic_issues": [],
        "atomicity_issues": [],
        "numerical_issues": []
    })
}

/// Oracle that replays scripted replies.
pub struct ScriptedOracle {
    queues: Mutex<HashMap<Role, VecDeque<Reply>>>,
    fallbacks: HashMap<Role, Reply>,
    latency: Option<Duration>,
    requests: Mutex<Vec<OracleRequest>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        let fallbacks = HashMap::from([
            (
                Role::Drafting,
                Err(OracleError::Malformed("no scripted drafting reply".to_string())),
            ),
            (Role::Verifying, Ok(clean_verification())),
        ]);
        Self {
            queues: Mutex::new(HashMap::new()),
            fallbacks,
            latency: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Reply used for `role` once its queue is empty.
    pub fn with_fallback(mut self, role: Role, reply: Reply) -> Self {
        self.fallbacks.insert(role, reply);
        self
    }

    /// Delay every submission by `latency`.
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue the next reply for `role`.
    pub fn push(&self, role: Role, reply: Reply) {
        lock(&self.queues).entry(role).or_default().push_back(reply);
    }

    /// Total submissions seen so far.
    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Submissions seen so far for one role.
    pub fn calls_for(&self, role: Role) -> usize {
        lock(&self.requests).iter().filter(|r| r.role == role).count()
    }

    /// Copy of every request submitted so far.
    pub fn requests(&self) -> Vec<OracleRequest> {
        lock(&self.requests).clone()
    }

    fn next_reply(&self, role: Role) -> Reply {
        lock(&self.queues)
            .get_mut(&role)
            .and_then(VecDeque::pop_front)
            .or_else(|| self.fallbacks.get(&role).cloned())
            .unwrap_or_else(|| Err(OracleError::Malformed("no scripted reply".to_string())))
    }
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationOracle for ScriptedOracle {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn submit(&self, request: &OracleRequest) -> Result<Value, OracleError> {
        lock(&self.requests).push(request.clone());
        let reply = self.next_reply(request.role);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        reply
    }
}
