use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::time::Duration;

use docs_gateway::security::CallerContext;
use docs_gateway::signing::TokenSigner;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Operator CLI for the docs gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Secret app context tokens are signed with.
    #[arg(long, env = "GATEWAY_APP_SECRET", default_value = "")]
    app_secret: String,

    /// Header carrying the app context token.
    #[arg(long, default_value = "x-app-context")]
    context_header: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Liveness and circuit breaker states
    Health,
    /// Mint an app context token for a user
    Token {
        #[arg(long)]
        user: u64,
        #[arg(long)]
        tenant: u64,
    },
    /// Current document server settings of the user's tenant
    Settings {
        #[arg(long)]
        user: u64,
        #[arg(long)]
        tenant: u64,
    },
    /// Request an editor config as the given user
    Config {
        #[arg(long)]
        user: u64,
        #[arg(long)]
        tenant: u64,
        #[arg(long)]
        file_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        key: String,
        #[arg(long)]
        deal_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match &cli.command {
        Commands::Health => {
            let res = client.get(format!("{}/health", cli.url)).send().await?;
            print_response(res).await?;
        }
        Commands::Token { user, tenant } => {
            println!("{}", mint(&cli, *user, *tenant)?);
        }
        Commands::Settings { user, tenant } => {
            let res = client
                .get(format!("{}/api/settings", cli.url))
                .headers(context_headers(&cli, *user, *tenant)?)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Config {
            user,
            tenant,
            file_id,
            name,
            key,
            deal_id,
        } => {
            let res = client
                .get(format!("{}/api/config", cli.url))
                .headers(context_headers(&cli, *user, *tenant)?)
                .query(&[
                    ("id", file_id.as_str()),
                    ("name", name.as_str()),
                    ("key", key.as_str()),
                    ("deal_id", deal_id.as_str()),
                ])
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

fn mint(cli: &Cli, user_id: u64, tenant_id: u64) -> Result<String, Box<dyn std::error::Error>> {
    let caller = CallerContext { user_id, tenant_id };
    let token = TokenSigner::new().sign(&cli.app_secret, &caller, Duration::from_secs(300))?;
    Ok(token)
}

fn context_headers(cli: &Cli, user_id: u64, tenant_id: u64) -> Result<HeaderMap, Box<dyn std::error::Error>> {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::try_from(cli.context_header.as_str())?,
        HeaderValue::from_str(&mint(cli, user_id, tenant_id)?)?,
    );
    Ok(headers)
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
