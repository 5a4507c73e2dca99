use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "monitor-cli")]
#[command(about = "Query a running api-monitor dashboard", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Dashboard API key, sent as a bearer token
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Overall health summary
    Status,
    /// List targets with their current state
    Targets,
    /// Show one target with statistics and recent alerts
    Target { key: String },
    /// Recent probe outcomes for a target
    History {
        key: String,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Uptime ratio for a target
    Uptime {
        key: String,
        /// Only count outcomes from the last N seconds
        #[arg(short, long)]
        window_secs: Option<u64>,
    },
    /// Alert history, newest first
    Alerts {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        #[arg(short, long)]
        target: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);
    }

    let request = match cli.command {
        Commands::Status => client.get(format!("{}/api/status", base)),
        Commands::Targets => client.get(format!("{}/api/targets", base)),
        Commands::Target { key } => client.get(format!("{}/api/targets/{}", base, key)),
        Commands::History { key, limit } => client
            .get(format!("{}/api/targets/{}/history", base, key))
            .query(&[("limit", limit)]),
        Commands::Uptime { key, window_secs } => {
            let request = client.get(format!("{}/api/targets/{}/uptime", base, key));
            match window_secs {
                Some(secs) => request.query(&[("window_secs", secs)]),
                None => request,
            }
        }
        Commands::Alerts { limit, target } => {
            let request = client
                .get(format!("{}/api/alerts", base))
                .query(&[("limit", limit)]);
            match target {
                Some(target) => request.query(&[("target", target)]),
                None => request,
            }
        }
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: dashboard returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
