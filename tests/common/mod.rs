#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use gredis::{Config, ConnectionConfig, ConnectionRouter, RouterConfig};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

/// In-process stand-in for a Redis server speaking RESP2
pub struct FakeRedis {
    addr: SocketAddr,
    store: Arc<Mutex<Store>>,
    received: Arc<Mutex<Vec<Vec<String>>>>,
    accepted: Arc<AtomicUsize>,
}

#[derive(Clone, Default)]
pub struct FakeOptions {
    pub password: Option<String>,
    pub reply_delay: Duration,
    /// Close the first accepted connection after answering this many data commands
    pub drop_first_after: Option<usize>,
}

#[derive(Default)]
struct Store {
    keys: HashMap<Vec<u8>, Entry>,
}

struct Entry {
    data: Data,
    expires_at: Option<Instant>,
}

enum Data {
    Str(Vec<u8>),
    Hash(BTreeMap<Vec<u8>, Vec<u8>>),
    List(VecDeque<Vec<u8>>),
    Set(BTreeSet<Vec<u8>>),
}

enum Resp {
    Simple(String),
    Error(String),
    Int(i64),
    Bulk(Option<Vec<u8>>),
    Array(Vec<Resp>),
}

impl Resp {
    fn ok() -> Self {
        Resp::Simple("OK".to_string())
    }

    fn err(message: &str) -> Self {
        Resp::Error(message.to_string())
    }

    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Resp::Simple(s) => out.extend_from_slice(format!("+{}\r\n", s).as_bytes()),
            Resp::Error(e) => out.extend_from_slice(format!("-{}\r\n", e).as_bytes()),
            Resp::Int(i) => out.extend_from_slice(format!(":{}\r\n", i).as_bytes()),
            Resp::Bulk(None) => out.extend_from_slice(b"$-1\r\n"),
            Resp::Bulk(Some(data)) => {
                out.extend_from_slice(format!("${}\r\n", data.len()).as_bytes());
                out.extend_from_slice(data);
                out.extend_from_slice(b"\r\n");
            }
            Resp::Array(items) => {
                out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
                for item in items {
                    item.encode(out);
                }
            }
        }
    }
}

impl FakeRedis {
    pub async fn start() -> Self {
        Self::start_with(FakeOptions::default()).await
    }

    pub async fn start_with(options: FakeOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let store = Arc::new(Mutex::new(Store::default()));
        let received = Arc::new(Mutex::new(Vec::new()));
        let accepted = Arc::new(AtomicUsize::new(0));

        let server_store = Arc::clone(&store);
        let server_received = Arc::clone(&received);
        let server_accepted = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let store = Arc::clone(&server_store);
                let received = Arc::clone(&server_received);
                let mut options = options.clone();
                if server_accepted.fetch_add(1, Ordering::SeqCst) > 0 {
                    options.drop_first_after = None;
                }
                tokio::spawn(async move {
                    let _ = serve(stream, store, received, options).await;
                });
            }
        });

        Self {
            addr,
            store,
            received,
            accepted,
        }
    }

    /// Number of client connections accepted so far
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn connection(&self, name: &str) -> ConnectionConfig {
        ConnectionConfig::new(name, "127.0.0.1", self.port())
    }

    /// Every command received so far, uppercased name first
    pub fn received(&self) -> Vec<Vec<String>> {
        self.received.lock().unwrap().clone()
    }

    pub fn received_named(&self, name: &str) -> Vec<Vec<String>> {
        self.received()
            .into_iter()
            .filter(|command| command.first().map(String::as_str) == Some(name))
            .collect()
    }

    /// Raw string value stored under `key`, bypassing the protocol
    pub fn raw_get(&self, key: &str) -> Option<String> {
        let store = self.store.lock().unwrap();
        match store.keys.get(key.as_bytes()).map(|entry| &entry.data) {
            Some(Data::Str(data)) => Some(String::from_utf8_lossy(data).into_owned()),
            _ => None,
        }
    }
}

/// A port with nothing listening on it
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    listener.local_addr().expect("addr").port()
}

/// Router with one connection named `primary` pointing at `server`, selected
pub async fn router_for(server: &FakeRedis) -> ConnectionRouter {
    let router = ConnectionRouter::new(test_settings());
    router.register(server.connection("primary")).await.expect("register");
    router.use_connection("primary").await.expect("use");
    router
}

pub fn test_settings() -> RouterConfig {
    RouterConfig {
        command_timeout_ms: 2000,
        connect_timeout_ms: 2000,
        ..Default::default()
    }
}

pub fn config_for(connections: Vec<ConnectionConfig>) -> Config {
    Config {
        router: test_settings(),
        connections,
        ..Default::default()
    }
}

async fn serve(
    stream: TcpStream,
    store: Arc<Mutex<Store>>,
    received: Arc<Mutex<Vec<Vec<String>>>>,
    options: FakeOptions,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut queued: Option<Vec<Vec<Vec<u8>>>> = None;
    let mut dirty = false;
    let mut answered = 0usize;

    while let Some(args) = read_command(&mut reader).await? {
        if args.is_empty() {
            continue;
        }
        let name = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
        received.lock().unwrap().push(
            std::iter::once(name.clone())
                .chain(args[1..].iter().map(|a| String::from_utf8_lossy(a).into_owned()))
                .collect(),
        );

        if !options.reply_delay.is_zero() && !matches!(name.as_str(), "AUTH" | "SELECT" | "CLIENT") {
            tokio::time::sleep(options.reply_delay).await;
        }

        let reply = match name.as_str() {
            "AUTH" => match &options.password {
                Some(password) if args.last().map(Vec::as_slice) != Some(password.as_bytes()) => {
                    Resp::err("WRONGPASS invalid username-password pair or user is disabled.")
                }
                _ => Resp::ok(),
            },
            "SELECT" | "CLIENT" | "QUIT" => Resp::ok(),
            "MULTI" => {
                queued = Some(Vec::new());
                dirty = false;
                Resp::ok()
            }
            "DISCARD" => {
                queued = None;
                Resp::ok()
            }
            "EXEC" => match queued.take() {
                None => Resp::err("ERR EXEC without MULTI"),
                Some(_) if dirty => {
                    Resp::err("EXECABORT Transaction discarded because of previous errors.")
                }
                Some(commands) => {
                    let mut store = store.lock().unwrap();
                    Resp::Array(commands.iter().map(|c| execute(&mut store, c)).collect())
                }
            },
            _ => match queued.as_mut() {
                Some(commands) => match check_arity(&name, args.len()) {
                    Ok(()) => {
                        commands.push(args.clone());
                        Resp::Simple("QUEUED".to_string())
                    }
                    Err(err) => {
                        dirty = true;
                        err
                    }
                },
                None => {
                    let mut store = store.lock().unwrap();
                    execute(&mut store, &args)
                }
            },
        };

        let mut out = Vec::new();
        reply.encode(&mut out);
        writer.write_all(&out).await?;
        writer.flush().await?;

        if name == "QUIT" {
            return Ok(());
        }

        if !matches!(name.as_str(), "AUTH" | "SELECT" | "CLIENT") {
            answered += 1;
            if options.drop_first_after == Some(answered) {
                return Ok(());
            }
        }
    }

    Ok(())
}

async fn read_command<R>(reader: &mut BufReader<R>) -> std::io::Result<Option<Vec<Vec<u8>>>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = Vec::new();
    if reader.read_until(b'\n', &mut line).await? == 0 {
        return Ok(None);
    }
    let header = trim_crlf(&line);
    if header.first() != Some(&b'*') {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "expected array"));
    }
    let count = parse_int(&header[1..])? as usize;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_until(b'\n', &mut line).await?;
        let header = trim_crlf(&line);
        if header.first() != Some(&b'$') {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "expected bulk"));
        }
        let len = parse_int(&header[1..])? as usize;
        let mut data = vec![0u8; len + 2];
        reader.read_exact(&mut data).await?;
        data.truncate(len);
        args.push(data);
    }

    Ok(Some(args))
}

fn trim_crlf(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r\n").unwrap_or(line)
}

fn parse_int(data: &[u8]) -> std::io::Result<i64> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "integer"))
}

fn check_arity(name: &str, len: usize) -> Result<(), Resp> {
    let ok = match name {
        "GET" | "TTL" | "HGETALL" | "LPOP" | "SMEMBERS" => len == 2,
        "SET" => len >= 3,
        "DEL" | "EXISTS" => len >= 2,
        "EXPIRE" | "PEXPIRE" | "HGET" => len == 3,
        "HSET" => len >= 4 && len % 2 == 0,
        "LPUSH" | "SADD" => len >= 3,
        "LRANGE" => len == 4,
        "PING" => len <= 2,
        "INFO" => true,
        _ => {
            return Err(Resp::Error(format!(
                "ERR unknown command '{}'",
                name.to_ascii_lowercase()
            )))
        }
    };

    if ok {
        Ok(())
    } else {
        Err(Resp::Error(format!(
            "ERR wrong number of arguments for '{}' command",
            name.to_ascii_lowercase()
        )))
    }
}

fn as_int(arg: &[u8]) -> Option<i64> {
    std::str::from_utf8(arg).ok()?.parse().ok()
}

impl Store {
    fn live(&mut self, key: &[u8]) -> Option<&mut Entry> {
        let expired = self
            .keys
            .get(key)
            .and_then(|entry| entry.expires_at)
            .map(|at| at <= Instant::now())
            .unwrap_or(false);
        if expired {
            self.keys.remove(key);
        }
        self.keys.get_mut(key)
    }

    fn exists(&mut self, key: &[u8]) -> bool {
        self.live(key).is_some()
    }
}

fn execute(store: &mut Store, args: &[Vec<u8>]) -> Resp {
    let name = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
    if let Err(err) = check_arity(&name, args.len()) {
        return err;
    }

    match name.as_str() {
        "PING" => match args.get(1) {
            Some(message) => Resp::Bulk(Some(message.clone())),
            None => Resp::Simple("PONG".to_string()),
        },
        "INFO" => Resp::Bulk(Some(
            b"# Server\r\nredis_version:7.2.0\r\nredis_mode:standalone\r\n".to_vec(),
        )),
        "SET" => {
            let mut nx = false;
            let mut ttl = None;
            let mut i = 3;
            while i < args.len() {
                match String::from_utf8_lossy(&args[i]).to_ascii_uppercase().as_str() {
                    "NX" => nx = true,
                    "EX" | "PX" => {
                        let millis = args[i].eq_ignore_ascii_case(b"PX");
                        let Some(n) = args.get(i + 1).and_then(|a| as_int(a)).filter(|n| *n > 0) else {
                            return Resp::err("ERR invalid expire time in 'set' command");
                        };
                        ttl = Some(if millis {
                            Duration::from_millis(n as u64)
                        } else {
                            Duration::from_secs(n as u64)
                        });
                        i += 1;
                    }
                    _ => return Resp::err("ERR syntax error"),
                }
                i += 1;
            }

            if nx && store.exists(&args[1]) {
                return Resp::Bulk(None);
            }
            store.keys.insert(
                args[1].clone(),
                Entry {
                    data: Data::Str(args[2].clone()),
                    expires_at: ttl.map(|ttl| Instant::now() + ttl),
                },
            );
            Resp::ok()
        }
        "GET" => match store.live(&args[1]).map(|entry| &entry.data) {
            None => Resp::Bulk(None),
            Some(Data::Str(data)) => Resp::Bulk(Some(data.clone())),
            Some(_) => Resp::err(WRONGTYPE),
        },
        "DEL" => {
            let removed = args[1..]
                .iter()
                .filter(|key| store.exists(key) && store.keys.remove(*key).is_some())
                .count();
            Resp::Int(removed as i64)
        }
        "EXISTS" => Resp::Int(args[1..].iter().filter(|key| store.exists(key)).count() as i64),
        "EXPIRE" | "PEXPIRE" => {
            let Some(n) = as_int(&args[2]) else {
                return Resp::err("ERR value is not an integer or out of range");
            };
            let ttl = if name == "PEXPIRE" {
                Duration::from_millis(n.max(0) as u64)
            } else {
                Duration::from_secs(n.max(0) as u64)
            };
            match store.live(&args[1]) {
                Some(entry) => {
                    entry.expires_at = Some(Instant::now() + ttl);
                    Resp::Int(1)
                }
                None => Resp::Int(0),
            }
        }
        "TTL" => match store.live(&args[1]) {
            None => Resp::Int(-2),
            Some(Entry { expires_at: None, .. }) => Resp::Int(-1),
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => {
                let remaining = at.saturating_duration_since(Instant::now());
                Resp::Int((remaining.as_millis() as i64 + 500) / 1000)
            }
        },
        "HSET" => {
            if !store.exists(&args[1]) {
                store.keys.insert(
                    args[1].clone(),
                    Entry {
                        data: Data::Hash(BTreeMap::new()),
                        expires_at: None,
                    },
                );
            }
            match store.live(&args[1]).map(|entry| &mut entry.data) {
                Some(Data::Hash(fields)) => {
                    let added = args[2..]
                        .chunks(2)
                        .filter(|pair| fields.insert(pair[0].clone(), pair[1].clone()).is_none())
                        .count();
                    Resp::Int(added as i64)
                }
                _ => Resp::err(WRONGTYPE),
            }
        }
        "HGET" => match store.live(&args[1]).map(|entry| &entry.data) {
            None => Resp::Bulk(None),
            Some(Data::Hash(fields)) => Resp::Bulk(fields.get(&args[2]).cloned()),
            Some(_) => Resp::err(WRONGTYPE),
        },
        "HGETALL" => match store.live(&args[1]).map(|entry| &entry.data) {
            None => Resp::Array(Vec::new()),
            Some(Data::Hash(fields)) => Resp::Array(
                fields
                    .iter()
                    .flat_map(|(k, v)| [Resp::Bulk(Some(k.clone())), Resp::Bulk(Some(v.clone()))])
                    .collect(),
            ),
            Some(_) => Resp::err(WRONGTYPE),
        },
        "LPUSH" => {
            if !store.exists(&args[1]) {
                store.keys.insert(
                    args[1].clone(),
                    Entry {
                        data: Data::List(VecDeque::new()),
                        expires_at: None,
                    },
                );
            }
            match store.live(&args[1]).map(|entry| &mut entry.data) {
                Some(Data::List(items)) => {
                    for value in &args[2..] {
                        items.push_front(value.clone());
                    }
                    Resp::Int(items.len() as i64)
                }
                _ => Resp::err(WRONGTYPE),
            }
        }
        "LPOP" => {
            let reply = match store.live(&args[1]).map(|entry| &mut entry.data) {
                None => return Resp::Bulk(None),
                Some(Data::List(items)) => Resp::Bulk(items.pop_front()),
                Some(_) => return Resp::err(WRONGTYPE),
            };
            if matches!(
                store.keys.get(&args[1]).map(|entry| &entry.data),
                Some(Data::List(items)) if items.is_empty()
            ) {
                store.keys.remove(&args[1]);
            }
            reply
        }
        "LRANGE" => {
            let (Some(start), Some(stop)) = (as_int(&args[2]), as_int(&args[3])) else {
                return Resp::err("ERR value is not an integer or out of range");
            };
            match store.live(&args[1]).map(|entry| &entry.data) {
                None => Resp::Array(Vec::new()),
                Some(Data::List(items)) => {
                    let len = items.len() as i64;
                    let start = if start < 0 { (len + start).max(0) } else { start };
                    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
                    if start > stop || start >= len {
                        return Resp::Array(Vec::new());
                    }
                    Resp::Array(
                        items
                            .iter()
                            .skip(start as usize)
                            .take((stop - start + 1) as usize)
                            .map(|item| Resp::Bulk(Some(item.clone())))
                            .collect(),
                    )
                }
                Some(_) => Resp::err(WRONGTYPE),
            }
        }
        "SADD" => {
            if !store.exists(&args[1]) {
                store.keys.insert(
                    args[1].clone(),
                    Entry {
                        data: Data::Set(BTreeSet::new()),
                        expires_at: None,
                    },
                );
            }
            match store.live(&args[1]).map(|entry| &mut entry.data) {
                Some(Data::Set(members)) => {
                    let added = args[2..]
                        .iter()
                        .filter(|member| members.insert((*member).clone()))
                        .count();
                    Resp::Int(added as i64)
                }
                _ => Resp::err(WRONGTYPE),
            }
        }
        "SMEMBERS" => match store.live(&args[1]).map(|entry| &entry.data) {
            None => Resp::Array(Vec::new()),
            Some(Data::Set(members)) => Resp::Array(
                members
                    .iter()
                    .map(|member| Resp::Bulk(Some(member.clone())))
                    .collect(),
            ),
            Some(_) => Resp::err(WRONGTYPE),
        },
        _ => Resp::Error(format!("ERR unknown command '{}'", name.to_ascii_lowercase())),
    }
}
