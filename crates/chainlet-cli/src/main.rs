use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "chainlet-cli")]
#[command(about = "CLI client for a running chainlet node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a transaction to the pending pool
    Submit {
        #[arg(long)]
        sender: String,
        #[arg(long)]
        recipient: String,
        #[arg(long)]
        amount: u64,
    },
    /// Mine a new block on the node
    Mine,
    /// Print the node's full chain
    Chain,
    /// Print the node's pending transactions
    Pending,
    /// Register peer nodes
    Register {
        /// Peer address, e.g. 127.0.0.1:8081 (repeatable)
        #[arg(long = "peer", required = true)]
        peers: Vec<String>,
    },
    /// Run longest-chain consensus against registered peers
    Resolve,
}

#[derive(Serialize)]
struct Tx {
    sender: String,
    recipient: String,
    amount: u64,
}

#[derive(Serialize)]
struct RegisterBody {
    nodes: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let node = cli.node;

    let res = match cli.cmd {
        Command::Submit {
            sender,
            recipient,
            amount,
        } => {
            let tx = Tx {
                sender,
                recipient,
                amount,
            };
            client
                .post(format!("{node}/transactions/new"))
                .json(&tx)
                .send()
                .await?
        }
        Command::Mine => client.get(format!("{node}/mine")).send().await?,
        Command::Chain => client.get(format!("{node}/chain")).send().await?,
        Command::Pending => {
            client
                .get(format!("{node}/transactions/pending"))
                .send()
                .await?
        }
        Command::Register { peers } => {
            client
                .post(format!("{node}/nodes/register"))
                .json(&RegisterBody { nodes: peers })
                .send()
                .await?
        }
        Command::Resolve => client.get(format!("{node}/nodes/resolve")).send().await?,
    };

    let status = res.status();
    let body = res.text().await?;
    println!("status: {status}");
    println!("{body}");
    Ok(())
}
