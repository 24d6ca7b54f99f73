//! In-memory tool-call store for local and test deployments.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use durable_mcp_core::{etag_matches, AccessConditions, ToolCall};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::{StoreError, StoreResult, ToolCallStore};

/// How often the reaper scans for expired records.
const REAPER_INTERVAL: Duration = Duration::from_secs(60);

/// Concurrent map keyed by `tenant/name/id`, storing deep copies so callers
/// can never alias the stored record. Restart loses state; that is the point
/// of local mode.
pub struct MemoryStore {
    records: Arc<RwLock<HashMap<String, ToolCall>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn key(tenant: &str, name: &str, tool_call_id: &str) -> String {
        format!("{tenant}/{name}/{tool_call_id}")
    }

    fn check_put_conditions(
        existing: Option<&ToolCall>,
        conditions: &AccessConditions,
    ) -> StoreResult<()> {
        if let Some(if_match) = &conditions.if_match {
            match existing {
                Some(stored) if etag_matches(if_match, &stored.etag) => {}
                _ => return Err(StoreError::PreconditionFailed),
            }
        }
        if let Some(if_none_match) = &conditions.if_none_match {
            if let Some(stored) = existing {
                if etag_matches(if_none_match, &stored.etag) {
                    return Err(StoreError::PreconditionFailed);
                }
            }
        }
        Ok(())
    }

    /// Remove expired records once.
    pub async fn reap_expired(&self) -> usize {
        let now = Utc::now();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, call| !call.is_expired(now));
        before - records.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ToolCallStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "in-memory"
    }

    async fn get(
        &self,
        tenant: &str,
        name: &str,
        tool_call_id: &str,
        conditions: &AccessConditions,
    ) -> StoreResult<ToolCall> {
        let records = self.records.read().await;
        let stored = records
            .get(&Self::key(tenant, name, tool_call_id))
            .filter(|call| !call.is_expired(Utc::now()))
            .ok_or(StoreError::NotFound)?;

        if let Some(if_match) = &conditions.if_match {
            if !etag_matches(if_match, &stored.etag) {
                return Err(StoreError::PreconditionFailed);
            }
        }
        if let Some(if_none_match) = &conditions.if_none_match {
            if etag_matches(if_none_match, &stored.etag) {
                return Err(StoreError::NotModified);
            }
        }
        Ok(stored.clone())
    }

    async fn put(
        &self,
        tenant: &str,
        tool_call: &ToolCall,
        conditions: &AccessConditions,
    ) -> StoreResult<ToolCall> {
        let key = Self::key(tenant, &tool_call.name, &tool_call.tool_call_id);
        let mut records = self.records.write().await;
        Self::check_put_conditions(records.get(&key), conditions)?;

        let mut stored = tool_call.clone();
        stored.tenant = tenant.to_string();
        stored.etag = Uuid::new_v4().to_string();
        stored.modified = Utc::now();
        records.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete(
        &self,
        tenant: &str,
        name: &str,
        tool_call_id: &str,
        conditions: &AccessConditions,
    ) -> StoreResult<()> {
        let key = Self::key(tenant, name, tool_call_id);
        let mut records = self.records.write().await;
        match records.get(&key) {
            None => Ok(()),
            Some(stored) => {
                if let Some(if_match) = &conditions.if_match {
                    if !etag_matches(if_match, &stored.etag) {
                        return Err(StoreError::PreconditionFailed);
                    }
                }
                records.remove(&key);
                Ok(())
            }
        }
    }

    async fn list(&self, tenant: &str, name: &str) -> StoreResult<Vec<ToolCall>> {
        let prefix = format!("{tenant}/{name}/");
        let now = Utc::now();
        let records = self.records.read().await;
        let mut calls: Vec<ToolCall> = records
            .iter()
            .filter(|(key, call)| key.starts_with(&prefix) && !call.is_expired(now))
            .map(|(_, call)| call.clone())
            .collect();
        calls.sort_by(|a, b| a.tool_call_id.cmp(&b.tool_call_id));
        Ok(calls)
    }
}

/// Start the background task that removes expired records every minute.
pub fn start_expiration_reaper(store: Arc<MemoryStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(REAPER_INTERVAL);
        loop {
            interval.tick().await;
            let reaped = store.reap_expired().await;
            if reaped > 0 {
                debug!("reaped {} expired tool calls", reaped);
            }
        }
    });
}
