use clap::Parser;
use sql_dbproxy::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run one statement through a remote DB proxy")]
struct Args {
    /// Transport to use; when omitted the proxy is taken from the environment.
    #[arg(long, value_enum, requires = "endpoint")]
    transport: Option<TransportKind>,
    /// Base URL (http) or host:port (jsonl, websocket).
    #[arg(long)]
    endpoint: Option<String>,
    /// DSN passed to `open-db`.
    #[arg(long)]
    dsn: String,
    /// Run the statement with `exec` and print the outcome instead of rows.
    #[arg(long)]
    exec: bool,
    /// Positional parameter as a JSON literal, repeatable.
    #[arg(long = "param")]
    params: Vec<String>,
    #[arg(long, default_value_t = sql_dbproxy::config::DEFAULT_RECONNECT_ATTEMPTS)]
    reconnect_attempts: u32,
    sql: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(err) = run(args).await {
        eprintln!("dbproxy: {err}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), DbProxyError> {
    let config = match (args.transport, args.endpoint) {
        (Some(kind), Some(location)) => ProxyConfig::new(ProxyEndpoint::new(kind, location)),
        _ => ProxyConfig::from_env()?,
    }
    .with_reconnect_attempts(args.reconnect_attempts);

    let params = args
        .params
        .iter()
        .map(|raw| {
            serde_json::from_str(raw)
                .map(RowValues::from_json)
                .map_err(|e| DbProxyError::ConfigError(format!("bad --param {raw}: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let driver = ProxyDriver::new(config)?;
    let conn = driver.open(&args.dsn).await?;
    let outcome = if args.exec {
        conn.execute(&args.sql, &params).await.map(|out| {
            println!(
                "lastInsertId={} rowsAffected={}",
                out.last_insert_id(),
                out.rows_affected()
            );
        })
    } else {
        print_rows(&conn, &args.sql, &params).await
    };
    let closed = conn.close().await;
    outcome.and(closed)
}

async fn print_rows(
    conn: &ProxyConnection,
    sql: &str,
    params: &[RowValues],
) -> Result<(), DbProxyError> {
    let stmt = conn.prepare(sql).await?;
    let listed = async {
        let mut cursor = stmt.query(params).await?;
        println!("{}", serde_json::json!(cursor.columns()));
        let mut row = vec![RowValues::Null; cursor.columns().len()];
        while cursor.next(&mut row).await? {
            let cells: Vec<_> = row.iter().map(RowValues::to_json).collect();
            println!("{}", serde_json::Value::Array(cells));
        }
        Ok::<_, DbProxyError>(())
    }
    .await;
    let closed = stmt.close().await;
    listed.and(closed)
}
