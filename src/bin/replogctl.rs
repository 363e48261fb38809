//! ReplogCtl - Command line tool for talking to replog nodes
//!
//! Usage:
//!   replogctl append <data>     - Write to the master
//!   replogctl data              - Read a node's log
//!   replogctl status            - Show node status
//!   replogctl health            - Check node health

use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::Value;

/// Replog Control Tool
#[derive(Parser)]
#[command(name = "replogctl")]
#[command(about = "Write to and inspect replog nodes", long_about = None)]
struct Cli {
    /// Node API endpoint (host:port or URL)
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append data through the master
    Append {
        /// Payload to append
        data: String,
        /// Slaves that must acknowledge before the write returns
        #[arg(short, long, default_value_t = 0)]
        min_acks: i64,
    },
    /// Print log entries from a node
    Data {
        /// First sequence number to print (master only)
        #[arg(short, long)]
        from: Option<u64>,
    },
    /// Show node status
    Status,
    /// Check node health
    Health,
}

// ============ API Response Types ============

#[derive(Debug, Deserialize)]
struct AppendResponse {
    #[serde(rename = "sequenceNum")]
    sequence_num: u64,
}

#[derive(Debug, Deserialize)]
struct DataElement {
    data: String,
    #[serde(rename = "sequenceNum")]
    sequence_num: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    healthy: bool,
    role: String,
    #[serde(rename = "replicaId")]
    replica_id: String,
}

// ============ Main ============

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let endpoint = normalize_endpoint(&cli.endpoint);
    let client = reqwest::Client::new();

    let result = match &cli.command {
        Commands::Append { data, min_acks } => append(&client, &endpoint, data, *min_acks).await,
        Commands::Data { from } => show_data(&client, &endpoint, *from).await,
        Commands::Status => show_status(&client, &endpoint).await,
        Commands::Health => show_health(&client, &endpoint).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    }
}

/// Turn a non-success response into an error carrying the API's message
async fn check(response: reqwest::Response) -> Result<reqwest::Response, Box<dyn std::error::Error>> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match response.json::<ErrorResponse>().await {
        Ok(body) => Err(format!("API error {}: {} ({})", status, body.error, body.code).into()),
        Err(_) => Err(format!("API error: {}", status).into()),
    }
}

// ============ Commands ============

async fn append(
    client: &reqwest::Client,
    endpoint: &str,
    data: &str,
    min_acks: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let url = format!("{}/master/data/append_data", endpoint);
    let body = serde_json::json!({ "minAcknowledgments": min_acks, "data": data });

    let response = check(client.post(&url).json(&body).send().await?).await?;
    let appended: AppendResponse = response.json().await?;

    println!("Appended at sequence {}", appended.sequence_num);
    Ok(())
}

async fn show_data(
    client: &reqwest::Client,
    endpoint: &str,
    from: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    // The role decides which read endpoint exists
    let health = fetch_health(client, endpoint).await?;
    let url = match (health.role.as_str(), from) {
        ("master", Some(from)) => format!("{}/master/data/get_data/{}", endpoint, from),
        ("master", None) => format!("{}/master/data/get_data", endpoint),
        (_, _) => format!("{}/slave/data/get_data", endpoint),
    };

    let response = check(client.get(&url).send().await?).await?;
    let entries: Vec<DataElement> = response.json().await?;

    let entries = entries
        .iter()
        .filter(|e| from.map_or(true, |from| e.sequence_num >= from));
    println!("{:<10} DATA", "SEQ");
    println!("{}", "-".repeat(40));
    for entry in entries {
        println!("{:<10} {}", entry.sequence_num, entry.data);
    }
    Ok(())
}

async fn show_status(client: &reqwest::Client, endpoint: &str) -> Result<(), Box<dyn std::error::Error>> {
    let url = format!("{}/status", endpoint);
    let response = check(client.get(&url).send().await?).await?;
    let status: Value = response.json().await?;

    println!();
    println!("Node Status");
    println!("===========");
    println!();
    if let Value::Object(fields) = status {
        for (key, value) in fields {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            println!("{:<16} {}", format!("{}:", key), value);
        }
    }
    println!();
    Ok(())
}

async fn fetch_health(
    client: &reqwest::Client,
    endpoint: &str,
) -> Result<HealthResponse, Box<dyn std::error::Error>> {
    let url = format!("{}/health", endpoint);
    // An unhealthy node still answers with a body
    let response = client.get(&url).send().await?;
    Ok(response.json().await?)
}

async fn show_health(client: &reqwest::Client, endpoint: &str) -> Result<(), Box<dyn std::error::Error>> {
    let health = fetch_health(client, endpoint).await?;
    let marker = if health.healthy { "✓" } else { "✗" };
    println!("{} {} {} ({})", marker, health.role, health.replica_id, endpoint);

    if !health.healthy {
        return Err("node reports unhealthy".into());
    }
    Ok(())
}
