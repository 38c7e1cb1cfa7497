use std::path::PathBuf;

use clap::Parser;

use taxbot::chat::connector::LoopbackConnectorConfig;
use taxbot::chat::gateway::{ChatGateway, ChatGatewayConfig};
use taxbot::chat::scheduler::REMINDER_DELAY_MS;

#[derive(Parser)]
#[command(name = "taxbot-gateway")]
#[command(version)]
#[command(about = "Tax ledger chat gateway")]
struct Cli {
    /// Bind address for the inbound connector webhook.
    #[arg(long, default_value = "127.0.0.1:8844")]
    connector_bind_addr: String,

    /// Shared secret inbound requests must present.
    #[arg(long, env = "TAXBOT_CONNECTOR_SECRET")]
    connector_secret: String,

    /// Where outbound messages are POSTed.
    #[arg(long, env = "TAXBOT_OUTBOUND_URL")]
    outbound_url: Option<String>,

    /// The single channel the ledger listens on.
    #[arg(long, env = "TAXBOT_CHANNEL_ID")]
    channel_id: String,

    /// Identity allowed to reset the totals.
    #[arg(long, env = "TAXBOT_ADMIN_ID")]
    admin_id: String,

    /// SQLite ledger path; totals are kept in memory when omitted.
    #[arg(long, env = "TAXBOT_LEDGER_DB")]
    ledger_db: Option<PathBuf>,

    #[arg(long, default_value_t = REMINDER_DELAY_MS)]
    reminder_delay_ms: i64,
}

#[tokio::main]
async fn main() {
    tracing_log::LogTracer::init().expect("log tracer");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!("[Main] Starting taxbot gateway");

    if let Err(e) = serve(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn serve(cli: Cli) -> anyhow::Result<()> {
    let connector = LoopbackConnectorConfig {
        bind_addr: cli.connector_bind_addr,
        shared_secret: cli.connector_secret,
        outbound_url: cli.outbound_url,
    };

    let config = ChatGatewayConfig {
        channel_id: cli.channel_id,
        admin_id: cli.admin_id,
        ledger_db: cli.ledger_db,
        reminder_delay_ms: cli.reminder_delay_ms,
        connector,
    };

    ChatGateway::start(config).await?;
    Ok(())
}
