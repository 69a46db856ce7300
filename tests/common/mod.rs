//! In-process fake DB proxies for the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Value as JsonValue, json};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// What the fake proxy answers to one action.
#[derive(Debug, Clone)]
pub struct Reply {
    pub code: i64,
    pub msg: String,
    pub result: JsonValue,
    pub rows: Vec<JsonValue>,
}

impl Reply {
    pub fn ok(result: JsonValue) -> Self {
        Self {
            code: 200,
            msg: "OK".into(),
            result,
            rows: Vec::new(),
        }
    }

    pub fn fail(code: i64, msg: &str) -> Self {
        Self {
            code,
            msg: msg.into(),
            result: JsonValue::Null,
            rows: Vec::new(),
        }
    }

    fn envelope(&self) -> JsonValue {
        json!({"code": self.code, "msg": self.msg, "result": self.result})
    }
}

/// A fake database behind the proxy: fixed ids, a fixed result table for every query.
///
/// `open-db` fails for DSNs starting with `bad`, `prepare` fails for SQL containing
/// `broken`, and `exec` always reports one affected row.
#[derive(Clone)]
pub struct FakeDb {
    columns: Vec<String>,
    rows: Vec<JsonValue>,
    calls: Arc<Mutex<Vec<(String, JsonValue)>>>,
}

impl FakeDb {
    pub fn new(columns: &[&str], rows: Vec<JsonValue>) -> Self {
        Self {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            rows,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Columns `[a, b]` with rows `(1, "x")` and `(2, "y")`.
    pub fn two_rows() -> Self {
        Self::new(&["a", "b"], vec![json!([1, "x"]), json!([2, "y"])])
    }

    /// Column `n` with rows `0..count`.
    pub fn counting(count: usize) -> Self {
        Self::new(&["n"], (0..count).map(|n| json!([n])).collect())
    }

    /// Every `(action, args)` received so far, across all connections.
    pub fn calls(&self) -> Vec<(String, JsonValue)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.calls().into_iter().map(|(action, _)| action).collect()
    }

    /// Note a call that reached the proxy without being answered.
    pub fn record(&self, action: &str, args: &JsonValue) {
        self.calls
            .lock()
            .unwrap()
            .push((action.to_string(), args.clone()));
    }

    pub fn count(&self, action: &str) -> usize {
        self.actions().iter().filter(|a| *a == action).count()
    }

    pub fn handle(&self, action: &str, args: &JsonValue) -> Reply {
        self.record(action, args);
        match action {
            "open-db" => {
                let dsn = args["dsn"].as_str().unwrap_or_default();
                if dsn.starts_with("bad") {
                    Reply::fail(500, "unknown database")
                } else {
                    Reply::ok(json!({"db-id": "c1"}))
                }
            }
            "begin-tx" => Reply::ok(json!({"tx-id": "t1"})),
            "prepare" => {
                let query = args["query"].as_str().unwrap_or_default();
                if query.contains("broken") {
                    Reply::fail(1064, "syntax error")
                } else {
                    Reply::ok(json!({"stmt-id": "s1"}))
                }
            }
            "exec" => Reply::ok(json!({"lastInsertId": 7, "rowsAffected": 1})),
            "query" => Reply {
                rows: self.rows.clone(),
                ..Reply::ok(json!({"columns": self.columns}))
            },
            _ => Reply::ok(JsonValue::Null),
        }
    }
}

/// Knobs for the fake HTTP proxy.
#[derive(Debug, Clone, Copy)]
pub struct HttpOptions {
    /// HTTP status of every response.
    pub status: u16,
    /// Send this body instead of the envelope and rows.
    pub raw_body: Option<&'static str>,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            status: 200,
            raw_body: None,
        }
    }
}

/// Serve `db` over HTTP; returns the base URL.
///
/// Every response is `Connection: close` and carries the envelope followed by one JSON
/// array per row.
pub async fn spawn_http_proxy(db: FakeDb) -> String {
    spawn_http_proxy_with(db, HttpOptions::default()).await
}

pub async fn spawn_http_proxy_with(db: FakeDb, options: HttpOptions) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let db = db.clone();
            tokio::spawn(async move {
                let _ = serve_http(socket, db, options).await;
            });
        }
    });
    format!("http://{addr}/dbproxy")
}

async fn serve_http(socket: TcpStream, db: FakeDb, options: HttpOptions) -> std::io::Result<()> {
    let mut reader = BufReader::new(socket);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or_default()
        .to_string();

    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).await?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;
    let request: JsonValue = serde_json::from_slice(&body).unwrap_or(JsonValue::Null);
    let action = request["action"].as_str().unwrap_or_default().to_string();
    assert!(
        path.ends_with(&format!("/{action}")),
        "path {path} does not name action {action}"
    );

    let reply = db.handle(&action, &request["args"]);
    let mut payload = reply.envelope().to_string();
    payload.push('\n');
    if reply.code == 200 {
        for row in &reply.rows {
            payload.push_str(&row.to_string());
            payload.push('\n');
        }
    }

    if let Some(raw) = options.raw_body {
        payload = raw.to_string();
    }

    let mut socket = reader.into_inner();
    let head = format!(
        "HTTP/1.1 {} Proxy\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n",
        options.status
    );
    socket.write_all(head.as_bytes()).await?;
    socket.write_all(payload.as_bytes()).await?;
    socket.shutdown().await
}

/// Knobs for the fake JSONL-RPC proxy.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonlOptions {
    /// Close the first connection right after this many replies.
    pub drop_first_after: Option<usize>,
    /// Stop listening once this many connections were accepted.
    pub max_connections: Option<usize>,
    /// On the connection with this index (0-based), hang up as soon as this action arrives,
    /// without replying.
    pub hang_up_on: Option<(usize, &'static str)>,
}

/// A running fake JSONL-RPC proxy.
pub struct JsonlProxy {
    pub addr: String,
    connections: Arc<AtomicUsize>,
}

impl JsonlProxy {
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Serve `db` as newline-delimited JSONL-RPC over TCP.
pub async fn spawn_jsonl_proxy(db: FakeDb, options: JsonlOptions) -> JsonlProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&connections);
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let index = counter.fetch_add(1, Ordering::SeqCst);
            let limit = (index == 0).then_some(options.drop_first_after).flatten();
            let hang_up = options
                .hang_up_on
                .filter(|(conn, _)| *conn == index)
                .map(|(_, action)| action);
            let db = db.clone();
            tokio::spawn(async move {
                let _ = serve_jsonl(socket, db, limit, hang_up).await;
            });
            if options.max_connections.is_some_and(|max| index + 1 >= max) {
                break;
            }
        }
    });
    JsonlProxy { addr, connections }
}

/// Frames answering one call: the reply, then row frames and an eof marker for queries.
pub fn answer_frames(db: &FakeDb, line: &str) -> Vec<String> {
    let call: JsonValue = serde_json::from_str(line).unwrap();
    let id = call["id"].clone();
    assert_eq!(call["method"], "DBProxy.Do");
    let action = call["params"]["action"].as_str().unwrap_or_default();
    let reply = db.handle(action, &call["params"]["args"]);
    let streams = reply.code == 200 && action == "query";

    let mut frames = vec![
        json!({
            "id": id,
            "code": reply.code,
            "msg": reply.msg,
            "result": reply.result,
            "jsonl": streams,
        })
        .to_string(),
    ];
    if streams {
        for row in &reply.rows {
            frames.push(json!({"id": id, "row": row}).to_string());
        }
        frames.push(json!({"id": id, "eof": true}).to_string());
    }
    frames
}

async fn serve_jsonl(
    socket: TcpStream,
    db: FakeDb,
    limit: Option<usize>,
    hang_up: Option<&'static str>,
) -> std::io::Result<()> {
    let (read, mut write) = socket.into_split();
    let mut lines = BufReader::new(read).lines();
    let mut answered = 0usize;
    while let Some(line) = lines.next_line().await? {
        if let Some(action) = hang_up {
            let call: JsonValue = serde_json::from_str(&line).unwrap();
            if call["params"]["action"] == action {
                db.record(action, &call["params"]["args"]);
                break;
            }
        }
        for frame in answer_frames(&db, &line) {
            write.write_all(frame.as_bytes()).await?;
            write.write_all(b"\n").await?;
        }
        answered += 1;
        if limit.is_some_and(|max| answered >= max) {
            break;
        }
    }
    write.shutdown().await
}

/// Serve `db` as JSONL-RPC over WebSocket; returns `host:port`.
#[cfg(feature = "websocket")]
pub async fn spawn_websocket_proxy(db: FakeDb) -> String {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let db = db.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(socket).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    let Message::Text(text) = msg else { continue };
                    for frame in answer_frames(&db, text.as_str()) {
                        if ws.send(Message::text(frame)).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });
    addr
}
