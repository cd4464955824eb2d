use clap::Parser;
use im_gateway::config::SessionConfig;
use im_gateway::logger::{self, LogTag};
use im_gateway::session::{ClientSession, HeartbeatConfig, ReconnectPolicy, WsDialer};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Notify};

/// Interactive gateway client.
///
/// Each stdin line is sent as one text frame (e.g. `login|alice|secret`).
/// Heartbeats run in the background and the connection is redialed when it
/// goes quiet or closes.
#[derive(Parser, Debug)]
#[command(name = "tool_ws_client", about = "Interactive IM gateway client")]
struct Args {
    /// Gateway WebSocket URL
    #[arg(long, default_value = "ws://localhost:8080/ws")]
    url: String,

    /// Value sent in the Authorization header
    #[arg(long)]
    token: Option<String>,

    /// Seconds between heartbeats
    #[arg(long, default_value_t = 30)]
    heartbeat_interval: u64,

    /// Seconds of silence before the connection counts as dead
    #[arg(long, default_value_t = 60)]
    heartbeat_timeout: u64,

    /// Redial attempts after a lost connection
    #[arg(long, default_value_t = 3)]
    reconnect_attempts: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::init();
    let args = Args::parse();

    let defaults = SessionConfig::default();
    let policy = ReconnectPolicy {
        attempts: args.reconnect_attempts,
        delay: Duration::from_secs(defaults.reconnect_delay_secs),
        target: args.url.clone(),
    };
    let heartbeat = HeartbeatConfig {
        interval: Duration::from_secs(args.heartbeat_interval),
        timeout: Duration::from_secs(args.heartbeat_timeout),
    };
    if heartbeat.timeout <= heartbeat.interval {
        anyhow::bail!("--heartbeat-timeout must exceed --heartbeat-interval");
    }

    let (outbound_tx, outbound_rx) = mpsc::channel::<String>(defaults.outbound_buffer);
    let (inbound_tx, mut inbound_rx) = mpsc::channel::<String>(defaults.outbound_buffer);
    let shutdown = Arc::new(Notify::new());

    let session = ClientSession::new(
        Arc::new(WsDialer::new(args.token)),
        policy,
        heartbeat,
        outbound_rx,
        inbound_tx,
    );
    let session_task = tokio::spawn(session.run(shutdown.clone()));

    let printer = tokio::spawn(async move {
        while let Some(frame) = inbound_rx.recv().await {
            println!("< {}", frame);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => {
                        if outbound_tx.send(line.trim().to_string()).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    logger::info(LogTag::Session, "Closing client");
    shutdown.notify_waiters();
    drop(outbound_tx);

    let result = session_task.await?;
    printer.abort();
    result.map_err(|e| anyhow::anyhow!("session ended with error: {}", e))
}
