/// Connection router
///
/// Keeps named [`BackendHandle`]s, one of them active, and dispatches every
/// unqualified operation to the active handle. Each dispatched operation
/// appends a one-line summary to the journal, which is flushed to the log
/// when the router is torn down. The journal keeps only the most recent
/// `journal_capacity` lines.

use crate::batch::Reply;
use crate::command::{self, Command, SetOptions};
use crate::config::{Config, ConnectionConfig, RouterConfig};
use crate::core::backend::BackendHandle;
use crate::core::outcome::{Outcome, Ttl};
use crate::error::{GredisError, GredisResult};
use crate::utils::{format_bytes, format_duration};
use futures::future::join_all;
use redis::FromRedisValue;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

struct RouterState {
    handles: HashMap<String, Arc<BackendHandle>>,
    active: Option<String>,
}

/// Named connections with one active target
pub struct ConnectionRouter {
    state: RwLock<RouterState>,
    journal: Mutex<VecDeque<String>>,
    settings: RouterConfig,
}

impl ConnectionRouter {
    pub fn new(settings: RouterConfig) -> Self {
        Self {
            state: RwLock::new(RouterState {
                handles: HashMap::new(),
                active: None,
            }),
            journal: Mutex::new(VecDeque::new()),
            settings,
        }
    }

    /// Register every configured connection and activate the default one
    pub async fn from_config(config: &Config) -> GredisResult<Self> {
        config.validate()?;

        let router = Self::new(config.router.clone());
        for connection in &config.connections {
            router.register(connection.clone()).await?;
        }

        if let Some(name) = config.default_connection() {
            router.use_connection(name).await?;
        }

        Ok(router)
    }

    pub fn settings(&self) -> &RouterConfig {
        &self.settings
    }

    /// Add a named handle; the connection is dialled on first use
    pub async fn register(&self, config: ConnectionConfig) -> GredisResult<()> {
        config.validate()?;

        let mut state = self.state.write().await;
        if state.handles.contains_key(&config.name) {
            return Err(GredisError::config(format!(
                "connection '{}' is already registered",
                config.name
            )));
        }

        let handle = BackendHandle::new(config, &self.settings)?;
        info!("Registered connection {} ({})", handle.name(), handle.address());
        state
            .handles
            .insert(handle.name().to_string(), Arc::new(handle));

        Ok(())
    }

    /// Make `name` the target of unqualified operations
    ///
    /// An unknown name leaves the current selection untouched.
    pub async fn use_connection(&self, name: &str) -> GredisResult<()> {
        let mut state = self.state.write().await;
        if !state.handles.contains_key(name) {
            warn!("Connection {} does not exist", name);
            return Err(GredisError::no_active_connection(format!(
                "unknown connection '{}'",
                name
            )));
        }

        debug!("Active connection is now {}", name);
        state.active = Some(name.to_string());
        Ok(())
    }

    /// Handle currently receiving unqualified operations
    pub async fn active(&self) -> GredisResult<Arc<BackendHandle>> {
        let state = self.state.read().await;
        let name = state
            .active
            .as_deref()
            .ok_or_else(|| GredisError::no_active_connection("no connection selected"))?;

        state
            .handles
            .get(name)
            .cloned()
            .ok_or_else(|| GredisError::no_active_connection(format!("unknown connection '{}'", name)))
    }

    pub async fn active_name(&self) -> Option<String> {
        self.state.read().await.active.clone()
    }

    /// Handle registered under `name`, active or not
    pub async fn handle(&self, name: &str) -> Option<Arc<BackendHandle>> {
        self.state.read().await.handles.get(name).cloned()
    }

    /// Registered names, sorted
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.read().await.handles.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.handles.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.handles.is_empty()
    }

    /// Close every handle and flush the journal
    ///
    /// All handles are attempted; failures are reported together. A second
    /// call finds nothing left to close.
    pub async fn close_all(&self) -> GredisResult<()> {
        let mut handles: Vec<Arc<BackendHandle>> = {
            let mut state = self.state.write().await;
            state.active = None;
            state.handles.drain().map(|(_, handle)| handle).collect()
        };
        handles.sort_by(|a, b| a.name().cmp(b.name()));

        let results = join_all(handles.iter().map(|handle| handle.close())).await;

        let failures: Vec<(String, String)> = handles
            .iter()
            .zip(results)
            .filter_map(|(handle, result)| match result {
                Ok(()) => None,
                Err(err) => {
                    warn!("Failed to close {}: {}", handle.name(), err);
                    Some((handle.name().to_string(), err.to_string()))
                }
            })
            .collect();

        self.flush_journal().await;

        if failures.is_empty() {
            Ok(())
        } else {
            Err(GredisError::CloseFailed { failures })
        }
    }

    /// Snapshot of the operation journal, oldest line first
    pub async fn journal(&self) -> Vec<String> {
        self.journal.lock().await.iter().cloned().collect()
    }

    pub(crate) async fn record(&self, line: String) {
        debug!("{}", line);
        let mut journal = self.journal.lock().await;
        while journal.len() >= self.settings.journal_capacity.max(1) {
            journal.pop_front();
        }
        journal.push_back(line);
    }

    async fn flush_journal(&self) {
        let lines = std::mem::take(&mut *self.journal.lock().await);
        if lines.is_empty() {
            return;
        }

        info!("Redis operation journal ({} entries)", lines.len());
        for (i, line) in lines.iter().enumerate() {
            info!("  {}: {}", i + 1, line);
        }
    }

    /// Dispatch one descriptor to the active handle and journal the outcome
    async fn dispatch<T, F>(&self, command: &Command, describe: F) -> Outcome<T>
    where
        T: FromRedisValue,
        F: FnOnce(&T) -> String,
    {
        let operation = command.to_string();
        let result = match self.active().await {
            Ok(handle) => handle.query::<T>(&operation, &command.to_cmd()).await,
            Err(err) => Err(err),
        };

        let line = match &result {
            Ok(value) => format!("{}: {}", operation, describe(value)),
            Err(err) => {
                warn!("{} failed: {}", operation, err);
                format!("{}: error: {}", operation, err)
            }
        };
        self.record(line).await;

        result.into()
    }

    /// Raw dispatch of one descriptor
    pub async fn execute(&self, command: &Command) -> GredisResult<Reply> {
        self.dispatch::<redis::Value, _>(command, |_| "OK".to_string())
            .await
            .into_result()
            .map(Reply::from)
    }

    /// SET key value
    pub async fn set<V: ToString>(&self, key: &str, value: V) -> Outcome<bool> {
        self.set_with(key, value, SetOptions::default()).await
    }

    /// SET with NX / EX modifiers; `false` when NX prevented the write
    pub async fn set_with<V: ToString>(&self, key: &str, value: V, options: SetOptions) -> Outcome<bool> {
        let command = command::set_with(key, value, options);
        self.dispatch::<redis::Value, _>(&command, |reply| match reply {
            redis::Value::Nil => "not set".to_string(),
            _ => "OK".to_string(),
        })
        .await
        .map(|reply| !matches!(reply, redis::Value::Nil))
    }

    pub async fn get(&self, key: &str) -> Outcome<Option<String>> {
        self.dispatch(&command::get(key), |value: &Option<String>| match value {
            Some(value) => value.clone(),
            None => "(nil)".to_string(),
        })
        .await
    }

    /// Number of keys removed
    pub async fn del(&self, keys: &[&str]) -> Outcome<i64> {
        self.dispatch(&command::del(keys.iter().copied()), |count: &i64| {
            format!("{} keys deleted", count)
        })
        .await
    }

    /// Number of the given keys that exist
    pub async fn exists(&self, keys: &[&str]) -> Outcome<i64> {
        self.dispatch(&command::exists(keys.iter().copied()), |count: &i64| {
            format!("{} keys exist", count)
        })
        .await
    }

    /// `false` when the key does not exist
    pub async fn expire(&self, key: &str, ttl: Duration) -> Outcome<bool> {
        self.dispatch(&command::expire(key, ttl), |applied: &bool| {
            if *applied {
                format!("expires in {}", format_duration(ttl))
            } else {
                "false".to_string()
            }
        })
        .await
    }

    pub async fn ttl(&self, key: &str) -> Outcome<Ttl> {
        self.dispatch(&command::ttl(key), |seconds: &i64| {
            Ttl::from_seconds(*seconds).to_string()
        })
        .await
        .map(Ttl::from_seconds)
    }

    /// Number of fields added
    pub async fn hset<V: ToString>(&self, key: &str, field: &str, value: V) -> Outcome<i64> {
        self.dispatch(&command::hset(key, field, value), |added: &i64| added.to_string())
            .await
    }

    pub async fn hget(&self, key: &str, field: &str) -> Outcome<Option<String>> {
        self.dispatch(&command::hget(key, field), |value: &Option<String>| match value {
            Some(value) => value.clone(),
            None => "(nil)".to_string(),
        })
        .await
    }

    pub async fn hgetall(&self, key: &str) -> Outcome<HashMap<String, String>> {
        self.dispatch(&command::hgetall(key), |fields: &HashMap<String, String>| {
            format!("{} fields", fields.len())
        })
        .await
    }

    /// Length of the list after the push
    pub async fn lpush(&self, key: &str, values: &[&str]) -> Outcome<i64> {
        self.dispatch(&command::lpush(key, values.iter().copied()), |length: &i64| {
            format!("list length {}", length)
        })
        .await
    }

    pub async fn lpop(&self, key: &str) -> Outcome<Option<String>> {
        self.dispatch(&command::lpop(key), |value: &Option<String>| match value {
            Some(value) => value.clone(),
            None => "(nil)".to_string(),
        })
        .await
    }

    pub async fn lrange(&self, key: &str, start: i64, stop: i64) -> Outcome<Vec<String>> {
        self.dispatch(&command::lrange(key, start, stop), |items: &Vec<String>| {
            format!("{} items", items.len())
        })
        .await
    }

    /// Number of members added
    pub async fn sadd(&self, key: &str, members: &[&str]) -> Outcome<i64> {
        self.dispatch(&command::sadd(key, members.iter().copied()), |added: &i64| {
            format!("{} members added", added)
        })
        .await
    }

    pub async fn smembers(&self, key: &str) -> Outcome<Vec<String>> {
        self.dispatch(&command::smembers(key), |members: &Vec<String>| {
            format!("{} members", members.len())
        })
        .await
    }

    pub async fn ping(&self) -> Outcome<String> {
        self.dispatch(&command::ping(), |reply: &String| reply.clone()).await
    }

    /// INFO for the given sections (all default sections when empty)
    pub async fn info(&self, sections: &[&str]) -> Outcome<String> {
        self.dispatch(&command::info(sections.iter().copied()), |report: &String| {
            format!("executed, {}", format_bytes(report.len() as u64))
        })
        .await
    }
}

impl Default for ConnectionRouter {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}
