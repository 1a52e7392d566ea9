/// Backend handle management
///
/// A [`BackendHandle`] owns one configured Redis endpoint. The connection is
/// dialled on first use and shared by every dispatch after that. A dropped
/// socket is re-established by the client library's connection manager on
/// the next request; closing sends QUIT and moves the handle into a terminal
/// state.

use crate::config::{ConnectionConfig, RouterConfig};
use crate::error::{GredisError, GredisResult};
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{ConnectionAddr, FromRedisValue, IntoConnectionInfo, RedisConnectionInfo};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info};

/// Lifecycle of the underlying connection
enum Link {
    Idle,
    Open(ConnectionManager),
    Closed,
}

/// Observable state of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Registered, not dialled yet
    Idle,
    Open,
    Closed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Idle => write!(f, "idle"),
            LinkState::Open => write!(f, "open"),
            LinkState::Closed => write!(f, "closed"),
        }
    }
}

/// One named connection to a Redis endpoint
pub struct BackendHandle {
    config: ConnectionConfig,
    client: redis::Client,
    connect_timeout: Duration,
    command_timeout: Duration,
    link: Mutex<Link>,
}

impl BackendHandle {
    /// Build a handle without dialling
    pub fn new(config: ConnectionConfig, settings: &RouterConfig) -> GredisResult<Self> {
        config.validate()?;

        let mut redis_settings = RedisConnectionInfo::default()
            .set_db(config.database_index)
            .set_skip_set_lib_name();
        if !config.password.is_empty() {
            redis_settings = redis_settings.set_password(&config.password);
        }

        let info = ConnectionAddr::Tcp(config.host.clone(), config.port)
            .into_connection_info()?
            .set_redis_settings(redis_settings);
        let client = redis::Client::open(info)?;

        Ok(Self {
            config,
            client,
            connect_timeout: settings.connect_timeout(),
            command_timeout: settings.command_timeout(),
            link: Mutex::new(Link::Idle),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn address(&self) -> String {
        self.config.address()
    }

    /// Default bound for one round trip on this handle
    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    pub async fn state(&self) -> LinkState {
        match &*self.link.lock().await {
            Link::Idle => LinkState::Idle,
            Link::Open(_) => LinkState::Open,
            Link::Closed => LinkState::Closed,
        }
    }

    /// Managed connection, dialled on first call
    ///
    /// A failed first dial leaves the handle idle so the next call dials
    /// again. Once open, reconnecting after a dropped socket is left to the
    /// connection manager.
    pub async fn connection(&self) -> GredisResult<ConnectionManager> {
        let mut link = self.link.lock().await;
        match &*link {
            Link::Open(connection) => Ok(connection.clone()),
            Link::Closed => Err(GredisError::already_closed(self.name())),
            Link::Idle => {
                debug!("Dialling {} at {}", self.name(), self.address());

                // One reconnect attempt per failed request
                let manager_config = ConnectionManagerConfig::new()
                    .set_connection_timeout(Some(self.connect_timeout))
                    .set_response_timeout(None)
                    .set_number_of_retries(0)
                    .set_concurrency_limit(self.config.pool_size);

                let connection = timeout(
                    self.connect_timeout,
                    ConnectionManager::new_with_config(self.client.clone(), manager_config),
                )
                .await
                .map_err(|_| GredisError::timeout(format!("connect {}", self.name())))??;

                info!("Connected {} ({})", self.name(), self.address());
                *link = Link::Open(connection.clone());
                Ok(connection)
            }
        }
    }

    /// Run `request` against the connection, bounded by `limit`
    pub async fn run<T, F, Fut>(&self, operation: &str, limit: Duration, request: F) -> GredisResult<T>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let connection = self.connection().await?;
        debug!("{} -> {}", operation, self.name());

        timeout(limit, request(connection))
            .await
            .map_err(|_| GredisError::timeout(operation))?
            .map_err(GredisError::from)
    }

    /// Send one command and decode its reply
    pub async fn query<T: FromRedisValue>(&self, operation: &str, cmd: &redis::Cmd) -> GredisResult<T> {
        self.run(operation, self.command_timeout, |mut connection| async move {
            cmd.query_async::<T>(&mut connection).await
        })
        .await
    }

    /// Close the handle
    ///
    /// An open connection is sent QUIT before it is dropped. Closing twice
    /// yields `AlreadyClosed`.
    pub async fn close(&self) -> GredisResult<()> {
        let mut link = self.link.lock().await;
        match std::mem::replace(&mut *link, Link::Closed) {
            Link::Closed => Err(GredisError::already_closed(self.name())),
            Link::Idle => {
                debug!("Closed {} before it was dialled", self.name());
                Ok(())
            }
            Link::Open(mut connection) => {
                let quit = timeout(
                    self.command_timeout,
                    redis::cmd("QUIT").query_async::<()>(&mut connection),
                )
                .await;
                drop(connection);

                match quit {
                    Ok(Ok(())) => {
                        info!("Closed {}", self.name());
                        Ok(())
                    }
                    Ok(Err(err)) => Err(GredisError::from(err)),
                    Err(_) => Err(GredisError::timeout(format!("QUIT {}", self.name()))),
                }
            }
        }
    }
}

impl fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendHandle")
            .field("config", &self.config)
            .field("connect_timeout", &self.connect_timeout)
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}
