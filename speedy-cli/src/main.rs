use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use speedy_server::{
    AlgorithmType, CacheClient, CacheRpc, ClientConfig, HttpConnector, NodeInfo, SpeedyError,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "speedy-cli")]
#[command(about = "Speedy CLI - shard-aware client for a Speedy cache cluster", long_about = None)]
struct Args {
    /// Client configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed nodes as `host:port` or `id=host:port`, comma separated
    #[arg(short, long, value_delimiter = ',', default_value = "127.0.0.1:15600")]
    nodes: Vec<String>,

    /// Sharding algorithm (naive, rendezvous, consistent)
    #[arg(short, long)]
    algorithm: Option<AlgorithmType>,

    /// Command to execute (if not in interactive mode)
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

/// Parse `host:port` or `id=host:port`. Without an id the address is used.
fn parse_seed(seed: &str) -> Result<NodeInfo> {
    let (id, address) = match seed.split_once('=') {
        Some((id, address)) => (id.to_string(), address),
        None => (seed.to_string(), seed),
    };
    let (host, port) = address
        .rsplit_once(':')
        .with_context(|| format!("Seed {} is not host:port", seed))?;
    let port = port
        .parse::<u16>()
        .with_context(|| format!("Invalid port in seed {}", seed))?;

    Ok(NodeInfo::new(id, host, port))
}

fn load_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => ClientConfig::new(
            args.nodes
                .iter()
                .map(|s| parse_seed(s))
                .collect::<Result<Vec<_>>>()?,
        ),
    };

    if let Some(algorithm) = args.algorithm {
        config.algorithm = algorithm;
    }
    config.validate()?;
    Ok(config)
}

struct SpeedyCli {
    client: CacheClient,
}

impl SpeedyCli {
    async fn execute_command(&self, command: &str, args: &[String]) -> Result<String> {
        let start = Instant::now();

        let response = match command.to_uppercase().as_str() {
            "GET" => self.cmd_get(args).await?,
            "PUT" | "SET" => self.cmd_put(args).await?,
            "LEN" | "DBSIZE" => self.cmd_len().await,
            "NODES" => self.cmd_nodes(),
            "SHARD" => self.cmd_shard(args)?,
            "SYNC" => self.cmd_sync().await?,
            "LEADER" => self.cmd_leader().await?,
            "HELP" => self.help_text(),
            _ => return Err(anyhow::anyhow!("Unknown command: {}", command)),
        };

        let elapsed = start.elapsed();
        Ok(format!(
            "{}\n{}",
            response,
            format!("({:.2?})", elapsed).dimmed()
        ))
    }

    async fn cmd_get(&self, args: &[String]) -> Result<String> {
        let [key] = args else {
            return Err(anyhow::anyhow!("Usage: GET key"));
        };

        match self.client.get(key).await {
            Ok(value) => Ok(format!("\"{}\"", value)),
            Err(SpeedyError::KeyNotFound(_)) => Ok("(nil)".dimmed().to_string()),
            Err(e @ SpeedyError::ShardUnavailable { .. }) => {
                Ok(format!("{} {}", "(nil)".dimmed(), format!("[{}]", e).yellow()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn cmd_put(&self, args: &[String]) -> Result<String> {
        if args.len() < 2 {
            return Err(anyhow::anyhow!("Usage: PUT key value"));
        }

        // Values may contain spaces
        let value = args[1..].join(" ");
        self.client.put(&args[0], &value).await?;
        Ok("OK".green().to_string())
    }

    async fn cmd_len(&self) -> String {
        format!("(integer) {}", self.client.len_total().await)
    }

    fn cmd_nodes(&self) -> String {
        let nodes = self.client.nodes();
        if nodes.is_empty() {
            return "(empty list)".dimmed().to_string();
        }

        nodes
            .iter()
            .enumerate()
            .map(|(i, n)| format!("{}) {} {}", i + 1, n.id.bold(), n.address()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn cmd_shard(&self, args: &[String]) -> Result<String> {
        let [key] = args else {
            return Err(anyhow::anyhow!("Usage: SHARD key"));
        };

        Ok(match self.client.shard_for(key) {
            Some(shard) => format!(
                "{} -> {} {}:{} ({})",
                key,
                shard.id.bold(),
                shard.host,
                shard.port,
                self.client.algorithm()
            ),
            None => "(no shards)".dimmed().to_string(),
        })
    }

    async fn cmd_sync(&self) -> Result<String> {
        let report = self.client.sync_now().await?;
        let summary = if report.changed {
            format!("membership changed, {} nodes", report.total).green()
        } else {
            format!("unchanged, {} nodes", report.total).normal()
        };

        Ok(match report.error() {
            Some(e) => format!("{}\n{}", summary, e.to_string().yellow()),
            None => summary.to_string(),
        })
    }

    /// Ask members in order until one reports a leader
    async fn cmd_leader(&self) -> Result<String> {
        let membership = self.client.membership();
        for node in membership.nodes() {
            let Ok(rpc) = node.rpc(membership.connector()).await else {
                continue;
            };
            match rpc.get_leader().await {
                Ok(leader) => return Ok(format!("\"{}\" (via {})", leader, node.id)),
                Err(SpeedyError::LeaderNotFound) => {
                    return Ok("(no leader)".dimmed().to_string());
                }
                Err(e) => warn!("{} did not answer: {}", node.id, e),
            }
        }
        Err(anyhow::anyhow!("No reachable node"))
    }

    fn help_text(&self) -> String {
        format!(
            r#"{}

{}
  GET key                    Get the value of key from its owning node
  PUT key value              Store value on the node that owns key
  SET key value              Alias for PUT
  LEN                        Total entries across reachable nodes

{}
  NODES                      Known cluster members
  SHARD key                  Which node owns key
  SYNC                       Refresh membership from the cluster now
  LEADER                     Current cluster leader

{}
  HELP                       Show this help message
  QUIT                       Exit the CLI
"#,
            "Speedy CLI - Available Commands".bold().cyan(),
            "Cache Commands:".bold(),
            "Cluster Commands:".bold(),
            "Session Commands:".bold(),
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for CLI output
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout)
        .with_env_filter(tracing_subscriber::EnvFilter::new(log_level))
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let cli = SpeedyCli {
        client: CacheClient::new(config, Arc::new(HttpConnector)),
    };

    // Learn the full membership before routing anything
    if let Err(e) = cli.client.sync_now().await {
        warn!("Initial sync failed, routing with seed nodes only: {}", e);
    }

    if !args.command.is_empty() {
        // Command mode: execute single command and exit
        let cmd = &args.command[0];
        let cmd_args: Vec<String> = args.command[1..].to_vec();

        let result = cli.execute_command(cmd, &cmd_args).await;
        cli.client.close().await;
        match result {
            Ok(output) => {
                info!("{}", output);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "{}", format!("Error: {}", e).red());
                std::process::exit(1);
            }
        }
    } else {
        run_interactive(cli).await
    }
}

async fn run_interactive(cli: SpeedyCli) -> Result<()> {
    info!(
        "{}",
        format!("Speedy CLI v{}", env!("CARGO_PKG_VERSION"))
            .bold()
            .cyan()
    );
    info!(
        "Routing with {} sharding over {} nodes",
        cli.client.algorithm(),
        cli.client.nodes().len()
    );
    info!("Type {} for available commands\n", "HELP".bold());

    let token = CancellationToken::new();
    let (sync_handle, _sync_errors) = cli.client.start_sync(token.clone());

    let mut rl = DefaultEditor::new()?;

    loop {
        let prompt = format!("{}> ", "speedy".green());
        let readline = rl.readline(&prompt);

        match readline {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }

                rl.add_history_entry(&line)?;

                let parts: Vec<String> = line.split_whitespace().map(String::from).collect();
                let cmd = &parts[0];
                let args = &parts[1..];

                if cmd.eq_ignore_ascii_case("QUIT") || cmd.eq_ignore_ascii_case("EXIT") {
                    info!("Goodbye!");
                    break;
                }

                match cli.execute_command(cmd, args).await {
                    Ok(output) => info!("{}", output),
                    Err(e) => {
                        error!(error = %e, "{}", format!("Error: {}", e).red());
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                info!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                info!("Goodbye!");
                break;
            }
            Err(err) => {
                error!(error = ?err, "Readline error: {:?}", err);
                break;
            }
        }
    }

    token.cancel();
    let _ = sync_handle.await;
    cli.client.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seed_without_id() {
        let node = parse_seed("10.0.0.5:15600").unwrap();
        assert_eq!(node, NodeInfo::new("10.0.0.5:15600", "10.0.0.5", 15600));
    }

    #[test]
    fn test_parse_seed_with_id() {
        let node = parse_seed("cache-1=localhost:16001").unwrap();
        assert_eq!(node, NodeInfo::new("cache-1", "localhost", 16001));
    }

    #[test]
    fn test_parse_seed_rejects_bad_port() {
        assert!(parse_seed("localhost:http").is_err());
        assert!(parse_seed("localhost").is_err());
    }
}
