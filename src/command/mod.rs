/// Command façade
///
/// Pure builders returning immutable [`Command`] descriptors. Nothing here
/// touches the network; descriptors are dispatched by the router directly or
/// collected into a [`crate::batch::Batch`]. Argument validation (DEL without
/// keys, for example) is left to the store at execution time.

use crate::error::{GredisError, GredisResult};
use crate::utils::format_keys;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Closed set of operations the façade can build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Set,
    Get,
    Del,
    Exists,
    Expire,
    Ttl,
    HSet,
    HGet,
    HGetAll,
    LPush,
    LPop,
    LRange,
    SAdd,
    SMembers,
    Ping,
    Info,
}

impl CommandKind {
    pub const ALL: [CommandKind; 16] = [
        CommandKind::Set,
        CommandKind::Get,
        CommandKind::Del,
        CommandKind::Exists,
        CommandKind::Expire,
        CommandKind::Ttl,
        CommandKind::HSet,
        CommandKind::HGet,
        CommandKind::HGetAll,
        CommandKind::LPush,
        CommandKind::LPop,
        CommandKind::LRange,
        CommandKind::SAdd,
        CommandKind::SMembers,
        CommandKind::Ping,
        CommandKind::Info,
    ];

    /// Wire name of the command
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Set => "SET",
            CommandKind::Get => "GET",
            CommandKind::Del => "DEL",
            CommandKind::Exists => "EXISTS",
            CommandKind::Expire => "EXPIRE",
            CommandKind::Ttl => "TTL",
            CommandKind::HSet => "HSET",
            CommandKind::HGet => "HGET",
            CommandKind::HGetAll => "HGETALL",
            CommandKind::LPush => "LPUSH",
            CommandKind::LPop => "LPOP",
            CommandKind::LRange => "LRANGE",
            CommandKind::SAdd => "SADD",
            CommandKind::SMembers => "SMEMBERS",
            CommandKind::Ping => "PING",
            CommandKind::Info => "INFO",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = GredisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| GredisError::config(format!("unsupported command kind: {}", s)))
    }
}

/// Modifiers for SET
///
/// A zero `ex` means no expiry, matching a plain SET.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Only write when the key does not exist
    pub nx: bool,
    /// Expiry applied with the write
    pub ex: Option<Duration>,
}

impl SetOptions {
    /// SET ... NX
    pub fn nx() -> Self {
        Self { nx: true, ex: None }
    }

    /// SET ... EX ttl
    pub fn ex(ttl: Duration) -> Self {
        Self {
            nx: false,
            ex: Some(ttl),
        }
    }

    /// SET ... NX EX ttl
    pub fn nx_ex(ttl: Duration) -> Self {
        Self {
            nx: true,
            ex: Some(ttl),
        }
    }

    fn expiry(&self) -> Option<Duration> {
        self.ex.filter(|ttl| !ttl.is_zero())
    }
}

/// Immutable description of one store operation
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    kind: CommandKind,
    keys: Vec<String>,
    field: Option<String>,
    values: Vec<String>,
    ttl: Option<Duration>,
    options: SetOptions,
    range: Option<(i64, i64)>,
}

impl Command {
    fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            keys: Vec::new(),
            field: None,
            values: Vec::new(),
            ttl: None,
            options: SetOptions::default(),
            range: None,
        }
    }

    fn key<K: Into<String>>(mut self, key: K) -> Self {
        self.keys.push(key.into());
        self
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// First key, when the command addresses one
    pub fn primary_key(&self) -> Option<&str> {
        self.keys.first().map(String::as_str)
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    /// Values, members or INFO sections depending on the kind
    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn options(&self) -> SetOptions {
        self.options
    }

    pub fn range(&self) -> Option<(i64, i64)> {
        self.range
    }

    /// Translate into a client library command
    pub fn to_cmd(&self) -> redis::Cmd {
        let mut cmd = match self.kind {
            CommandKind::Expire => match self.ttl {
                Some(ttl) if ttl.subsec_nanos() != 0 => redis::cmd("PEXPIRE"),
                _ => redis::cmd("EXPIRE"),
            },
            kind => redis::cmd(kind.as_str()),
        };

        match self.kind {
            CommandKind::Set => {
                cmd.arg(&self.keys).arg(&self.values);
                if self.options.nx {
                    cmd.arg("NX");
                }
                if let Some(ttl) = self.options.expiry() {
                    if ttl.subsec_nanos() == 0 {
                        cmd.arg("EX").arg(ttl.as_secs());
                    } else {
                        cmd.arg("PX").arg(whole_millis(ttl));
                    }
                }
            }
            CommandKind::Expire => {
                cmd.arg(&self.keys);
                let ttl = self.ttl.unwrap_or_default();
                if ttl.subsec_nanos() != 0 {
                    cmd.arg(whole_millis(ttl));
                } else {
                    cmd.arg(ttl.as_secs());
                }
            }
            CommandKind::HSet | CommandKind::HGet => {
                cmd.arg(&self.keys).arg(&self.field).arg(&self.values);
            }
            CommandKind::LRange => {
                let (start, stop) = self.range.unwrap_or((0, -1));
                cmd.arg(&self.keys).arg(start).arg(stop);
            }
            _ => {
                cmd.arg(&self.keys).arg(&self.values);
            }
        }

        cmd
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        match self.kind {
            CommandKind::Del | CommandKind::Exists => {
                write!(f, " {}", format_keys(&self.keys))?;
            }
            _ => {
                for key in &self.keys {
                    write!(f, " {}", key)?;
                }
            }
        }
        if let Some(field) = &self.field {
            write!(f, " {}", field)?;
        }
        Ok(())
    }
}

/// Milliseconds for PX / PEXPIRE, never rounded down to zero
fn whole_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

fn collect<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

/// SET key value
pub fn set<K: Into<String>, V: ToString>(key: K, value: V) -> Command {
    set_with(key, value, SetOptions::default())
}

/// SET key value [NX] [EX seconds]
pub fn set_with<K: Into<String>, V: ToString>(key: K, value: V, options: SetOptions) -> Command {
    let mut command = Command::new(CommandKind::Set).key(key);
    command.values.push(value.to_string());
    command.options = options;
    command
}

pub fn get<K: Into<String>>(key: K) -> Command {
    Command::new(CommandKind::Get).key(key)
}

pub fn del<I, S>(keys: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut command = Command::new(CommandKind::Del);
    command.keys = collect(keys);
    command
}

pub fn exists<I, S>(keys: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut command = Command::new(CommandKind::Exists);
    command.keys = collect(keys);
    command
}

/// EXPIRE key seconds, or PEXPIRE when the ttl has sub-second precision
pub fn expire<K: Into<String>>(key: K, ttl: Duration) -> Command {
    let mut command = Command::new(CommandKind::Expire).key(key);
    command.ttl = Some(ttl);
    command
}

pub fn ttl<K: Into<String>>(key: K) -> Command {
    Command::new(CommandKind::Ttl).key(key)
}

pub fn hset<K, F, V>(key: K, field: F, value: V) -> Command
where
    K: Into<String>,
    F: Into<String>,
    V: ToString,
{
    let mut command = Command::new(CommandKind::HSet).key(key);
    command.field = Some(field.into());
    command.values.push(value.to_string());
    command
}

pub fn hget<K: Into<String>, F: Into<String>>(key: K, field: F) -> Command {
    let mut command = Command::new(CommandKind::HGet).key(key);
    command.field = Some(field.into());
    command
}

pub fn hgetall<K: Into<String>>(key: K) -> Command {
    Command::new(CommandKind::HGetAll).key(key)
}

pub fn lpush<K, I, S>(key: K, values: I) -> Command
where
    K: Into<String>,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut command = Command::new(CommandKind::LPush).key(key);
    command.values = collect(values);
    command
}

pub fn lpop<K: Into<String>>(key: K) -> Command {
    Command::new(CommandKind::LPop).key(key)
}

/// LRANGE key start stop (inclusive, negative indexes count from the tail)
pub fn lrange<K: Into<String>>(key: K, start: i64, stop: i64) -> Command {
    let mut command = Command::new(CommandKind::LRange).key(key);
    command.range = Some((start, stop));
    command
}

pub fn sadd<K, I, S>(key: K, members: I) -> Command
where
    K: Into<String>,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut command = Command::new(CommandKind::SAdd).key(key);
    command.values = collect(members);
    command
}

pub fn smembers<K: Into<String>>(key: K) -> Command {
    Command::new(CommandKind::SMembers).key(key)
}

pub fn ping() -> Command {
    Command::new(CommandKind::Ping)
}

/// INFO [section ...]
pub fn info<I, S>(sections: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut command = Command::new(CommandKind::Info);
    command.values = collect(sections);
    command
}

/// Build a descriptor from a kind name and positional arguments
///
/// Used by tooling that reads commands as text. Argument layout follows the
/// wire form of each command; SET accepts trailing `NX` and `EX <seconds>`.
pub fn parse<S: AsRef<str>>(kind: &str, args: &[S]) -> GredisResult<Command> {
    let kind: CommandKind = kind.parse()?;
    let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();

    let arity = |min: usize| -> GredisResult<()> {
        if args.len() < min {
            Err(GredisError::config(format!(
                "{} expects at least {} argument(s), got {}",
                kind,
                min,
                args.len()
            )))
        } else {
            Ok(())
        }
    };
    let int = |raw: &str| -> GredisResult<i64> {
        raw.parse::<i64>()
            .map_err(|_| GredisError::config(format!("{}: '{}' is not an integer", kind, raw)))
    };

    let command = match kind {
        CommandKind::Set => {
            arity(2)?;
            let mut options = SetOptions::default();
            let mut rest = args[2..].iter();
            while let Some(flag) = rest.next() {
                if flag.eq_ignore_ascii_case("NX") {
                    options.nx = true;
                } else if flag.eq_ignore_ascii_case("EX") {
                    let seconds = rest
                        .next()
                        .ok_or_else(|| GredisError::config("SET: EX requires seconds"))?;
                    options.ex = Some(Duration::from_secs(int(*seconds)?.max(0) as u64));
                } else {
                    return Err(GredisError::config(format!("SET: unknown option '{}'", flag)));
                }
            }
            set_with(args[0], args[1], options)
        }
        CommandKind::Get => {
            arity(1)?;
            get(args[0])
        }
        CommandKind::Del => del(args),
        CommandKind::Exists => exists(args),
        CommandKind::Expire => {
            arity(2)?;
            expire(args[0], Duration::from_secs(int(args[1])?.max(0) as u64))
        }
        CommandKind::Ttl => {
            arity(1)?;
            ttl(args[0])
        }
        CommandKind::HSet => {
            arity(3)?;
            hset(args[0], args[1], args[2])
        }
        CommandKind::HGet => {
            arity(2)?;
            hget(args[0], args[1])
        }
        CommandKind::HGetAll => {
            arity(1)?;
            hgetall(args[0])
        }
        CommandKind::LPush => {
            arity(2)?;
            lpush(args[0], args[1..].iter().copied())
        }
        CommandKind::LPop => {
            arity(1)?;
            lpop(args[0])
        }
        CommandKind::LRange => {
            arity(3)?;
            lrange(args[0], int(args[1])?, int(args[2])?)
        }
        CommandKind::SAdd => {
            arity(2)?;
            sadd(args[0], args[1..].iter().copied())
        }
        CommandKind::SMembers => {
            arity(1)?;
            smembers(args[0])
        }
        CommandKind::Ping => ping(),
        CommandKind::Info => info(args),
    };

    Ok(command)
}
