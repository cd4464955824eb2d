use clap::{Parser, Subcommand};
use im_gateway::balancer::LoadReport;
use im_gateway::bus::{self, Event};
use im_gateway::config::{self, BusConfig};
use im_gateway::logger::{self, LogTag};

/// Push test traffic into a running deployment.
///
/// `event` publishes one notification on the bus topic; `load` posts one
/// load report to a gateway's `/report_load` endpoint.
#[derive(Parser, Debug)]
#[command(name = "tool_publish_event", about = "Publish bus events or load reports")]
struct Args {
    /// Config file supplying the bus section
    #[arg(long, default_value = config::CONFIG_FILE_PATH)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish a raw tagged payload, e.g. `sendMessage|alice|bob|hi`
    Event {
        payload: String,
        /// Overrides the configured brokers (comma separated)
        #[arg(long)]
        brokers: Option<String>,
    },
    /// Report a load value for one backend endpoint
    Load {
        endpoint: String,
        load: i64,
        #[arg(long, default_value = "http://127.0.0.1:8080/report_load")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::init();
    let args = Args::parse();

    match args.command {
        Command::Event { payload, brokers } => {
            let mut bus_config = load_bus_config(&args.config).await;
            if let Some(brokers) = brokers {
                bus_config.brokers = brokers
                    .split(',')
                    .map(|b| b.trim().to_string())
                    .filter(|b| !b.is_empty())
                    .collect();
            }
            publish_event(&bus_config, &payload).await
        }
        Command::Load { endpoint, load, url } => post_load(&url, endpoint, load).await,
    }
}

async fn load_bus_config(path: &str) -> BusConfig {
    match config::load_config_from_path(path).await {
        Ok(config) => config.bus,
        Err(e) => {
            logger::warning(
                LogTag::Config,
                &format!("Using default bus settings ({}): {}", path, e),
            );
            BusConfig::default()
        }
    }
}

async fn publish_event(bus_config: &BusConfig, payload: &str) -> anyhow::Result<()> {
    if bus_config.brokers.is_empty() {
        anyhow::bail!("no brokers configured; the in-process bus is not reachable from here");
    }

    // Validate before publishing so malformed payloads never reach the topic
    let event = Event::decode(payload)?;
    let endpoints = bus::connect(bus_config)?;
    endpoints.publisher.publish(&event).await?;

    logger::info(
        LogTag::Bus,
        &format!(
            "Published {} to {} via {}",
            event.tag(),
            bus_config.topic,
            endpoints.publisher.backend_name()
        ),
    );
    Ok(())
}

async fn post_load(url: &str, endpoint: String, load: i64) -> anyhow::Result<()> {
    let report = LoadReport { endpoint, load };
    let response = reqwest::Client::new().post(url).json(&report).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("gateway rejected load report ({}): {}", status, body);
    }

    logger::info(
        LogTag::Balancer,
        &format!("Reported load {} for {}", report.load, report.endpoint),
    );
    Ok(())
}
