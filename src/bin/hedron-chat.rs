use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use hedron_session::{
    Author, ClientConfig, ClientError, DeployMode, MemoryWallet, Network, Result, SessionClient,
    SessionSnapshot, TransactionStatus, Turn, WsConnector,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;

#[derive(Parser)]
#[command(
    name = "hedron-chat",
    about = "hedron-chat - terminal client for the Hedron DeFi agent"
)]
struct Cli {
    /// Backend WebSocket endpoint (overrides --mode)
    #[arg(long)]
    endpoint: Option<String>,

    /// Deploy mode selecting the default endpoint (development | production)
    #[arg(long)]
    mode: Option<DeployMode>,

    /// Network used to resolve token ids (mainnet | testnet)
    #[arg(long)]
    network: Option<Network>,

    /// Wallet account id used to authenticate
    #[arg(long, default_value = "0.0.34567890")]
    account: String,

    /// Approve every sign request with a synthetic transaction id
    #[arg(long)]
    auto_sign: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .without_time()
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("[hedron] {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = ClientConfig::from_env()?;
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = Some(endpoint);
    }
    if let Some(network) = cli.network {
        config.network = network;
    }
    config.validate()?;

    let wallet = if cli.auto_sign {
        MemoryWallet::approving(cli.account.as_str())
    } else {
        MemoryWallet::rejecting(cli.account.as_str(), "auto-sign disabled")
    };

    println!("→ connecting to {} as {}", config.endpoint(), cli.account);
    let client = SessionClient::start(
        config,
        Arc::new(WsConnector::default()),
        Arc::new(wallet.clone()),
    )?;

    let printer = tokio::spawn(print_turns(client.subscribe()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| ClientError::Config(format!("stdin: {e}")))?
    {
        let line = line.trim();
        match line {
            "" => continue,
            "exit" | "quit" => break,
            "new" => {
                client.create_conversation().await?;
                println!("→ new conversation");
            }
            _ if line.starts_with("switch ") => {
                let account = line["switch ".len()..].trim().to_string();
                wallet.set_address(Some(account.clone()));
                client.set_identity(Some(account.clone())).await?;
                println!("→ switched to {account}");
            }
            text => match client.send_user_message(text).await {
                Ok(_) => {}
                Err(ClientError::NotAuthenticated) => {
                    println!("! not authenticated yet, try again in a moment")
                }
                Err(e) => println!("! {e}"),
            },
        }
    }

    client.shutdown().await?;
    printer.abort();
    Ok(())
}

/// Print new turns and transaction status changes from the current conversation
async fn print_turns(snapshots: tokio::sync::watch::Receiver<SessionSnapshot>) {
    let mut seen: HashMap<String, Option<TransactionStatus>> = HashMap::new();
    let mut last_connection = None;
    let mut updates = WatchStream::new(snapshots);

    while let Some(snapshot) = updates.next().await {
        if last_connection != Some(snapshot.connection) {
            last_connection = Some(snapshot.connection);
            println!("· {:?}", snapshot.connection);
        }
        let Some(conversation) = snapshot.current() else {
            continue;
        };
        for turn in &conversation.turns {
            let status = turn.transaction.as_ref().map(|t| t.status);
            match seen.insert(turn.id.clone(), status) {
                None => print_turn(turn),
                Some(previous) if previous != status => print_transaction(turn),
                Some(_) => {}
            }
        }
    }
}

fn print_turn(turn: &Turn) {
    match turn.author {
        Author::User => {}
        Author::Agent => {
            println!("agent: {}", turn.body);
            if let Some(quote) = &turn.swap_quote {
                println!(
                    "  quote: {} {} → {} {} (rate {}, fees {})",
                    quote.input.formatted,
                    quote.input.token,
                    quote.output.formatted,
                    quote.output.token,
                    quote.exchange_rate,
                    quote.fee_percentages().join(", ")
                );
            }
        }
        Author::System => {
            println!("system: {}", turn.body);
            if turn.transaction.is_some() {
                print_transaction(turn);
            }
        }
    }
}

fn print_transaction(turn: &Turn) {
    let Some(request) = &turn.transaction else {
        return;
    };
    match request.status {
        TransactionStatus::Pending => println!("  tx: awaiting signature for \"{}\"", request.original_query),
        TransactionStatus::Success => println!(
            "  tx: signed {}",
            request.transaction_id.as_deref().unwrap_or("")
        ),
        TransactionStatus::Failed => println!(
            "  tx: failed ({})",
            request.error.as_deref().unwrap_or("unknown error")
        ),
    }
}
