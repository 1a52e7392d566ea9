pub mod config;
pub mod error;
/// gredis - Multi-connection Redis command router
///
/// gredis keeps a set of named Redis connections, routes every operation to
/// the active one and offers:
/// 1. Typed command builders that produce immutable descriptors
/// 2. Direct dispatch returning a uniform `Outcome<T>`
/// 3. Batches executed as best-effort pipelines or MULTI/EXEC transactions
pub mod batch;
pub mod command;
pub mod core;
pub mod health;
pub mod utils;

pub use crate::batch::{Batch, PipelineOutcome, Reply};
pub use crate::command::{Command, CommandKind, SetOptions};
pub use crate::config::{Config, ConnectionConfig, RouterConfig};
pub use crate::core::{BackendHandle, ConnectionRouter, LinkState, Outcome, Ttl};
pub use crate::error::{ConfigError, ErrorSeverity, GredisError, GredisResult};
