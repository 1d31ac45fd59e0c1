//! In-process CLI task (4.10). Reads line-oriented commands from stdin and
//! forwards them through the same channel the RPC server uses, so every
//! subsystem observes one serialized stream of events.
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::{
    actor::ActorHandle,
    config::Config,
    download,
    endpoint::{Endpoint, Epoch},
    rpc::{FileHolders, FileIndex},
};

#[derive(Debug, Clone)]
pub enum CliCommand {
    Search(String),
    ListMy,
    ListNet,
    Refresh,
    Status,
    Election,
    Quit,
}

#[derive(Debug, Clone)]
pub enum CliReply {
    Holders(FileHolders),
    Files(std::collections::BTreeSet<String>),
    Index(FileIndex),
    Status {
        is_tracker: bool,
        known_tracker_epoch: Epoch,
        known_tracker_endpoint: Option<Endpoint>,
    },
    Ack,
    Error(String),
}

fn parse(line: &str) -> Option<CliCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let mut parts = line.splitn(2, char::is_whitespace);
    let head = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default().trim();

    match (head, rest) {
        ("search", name) if !name.is_empty() => Some(CliCommand::Search(name.to_string())),
        ("list", "my") => Some(CliCommand::ListMy),
        ("list", "net") => Some(CliCommand::ListNet),
        ("refresh", _) => Some(CliCommand::Refresh),
        ("status", _) => Some(CliCommand::Status),
        ("election", _) => Some(CliCommand::Election),
        ("quit", _) => Some(CliCommand::Quit),
        _ => None,
    }
}

fn render(reply: CliReply) -> String {
    match reply {
        CliReply::Holders(holders) if holders.is_empty() => "no holders".to_string(),
        CliReply::Holders(holders) => holders
            .into_iter()
            .map(|(peer_id, endpoint)| format!("{peer_id}@{endpoint}"))
            .collect::<Vec<_>>()
            .join(", "),
        CliReply::Files(files) => files.into_iter().collect::<Vec<_>>().join(", "),
        CliReply::Index(index) => index
            .into_iter()
            .map(|(name, holders)| format!("{name}: {} holder(s)", holders.len()))
            .collect::<Vec<_>>()
            .join("\n"),
        CliReply::Status {
            is_tracker,
            known_tracker_epoch,
            known_tracker_endpoint,
        } => format!(
            "is_tracker={is_tracker} known_tracker_epoch={known_tracker_epoch} known_tracker_endpoint={known_tracker_endpoint:?}"
        ),
        CliReply::Ack => "ok".to_string(),
        CliReply::Error(e) => format!("error: {e}"),
    }
}

pub async fn run(handle: ActorHandle, config: Config) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                break;
            }
        };
        let Some(command) = parse(&line) else {
            println!("unrecognized command");
            continue;
        };
        let is_quit = matches!(command, CliCommand::Quit);
        let searched_name = match &command {
            CliCommand::Search(name) => Some(name.clone()),
            _ => None,
        };
        match handle.call_cli(command).await {
            Some(CliReply::Holders(holders)) => {
                if let Some(name) = searched_name {
                    offer_download(&handle, &config, &mut lines, &name, holders).await;
                } else {
                    println!("{}", render(CliReply::Holders(holders)));
                }
            }
            Some(reply) => println!("{}", render(reply)),
            None => {
                println!("peer is shutting down");
                break;
            }
        }
        if is_quit {
            break;
        }
    }
}

/// After a `search` resolves to a set of holders, offers to pull the file
/// from one of them, mirroring the original peer's "found it, download?"
/// flow (4.9's puller). Entirely a CLI-task concern: like chunk serving
/// (`rpc::server::dispatch`), a transfer talks directly to the remote peer's
/// RPC port and never touches the actor, except to ask it to rescan and
/// register the new file afterward.
async fn offer_download(
    handle: &ActorHandle,
    config: &Config,
    lines: &mut tokio::io::Lines<BufReader<tokio::io::Stdin>>,
    name: &str,
    holders: FileHolders,
) {
    if holders.is_empty() {
        println!("'{name}' not found on the network");
        return;
    }
    let holders: Vec<_> = holders.into_iter().collect();
    println!("'{name}' found on:");
    for (i, (peer_id, endpoint)) in holders.iter().enumerate() {
        println!("  {}. {peer_id} ({endpoint})", i + 1);
    }
    println!("download from which peer? (number, or blank to skip)");
    let Ok(Some(choice)) = lines.next_line().await else {
        return;
    };
    let choice = choice.trim();
    if choice.is_empty() {
        return;
    }
    let Ok(index) = choice.parse::<usize>() else {
        println!("not a number, skipping download");
        return;
    };
    let Some((_, source)) = index.checked_sub(1).and_then(|i| holders.get(i)) else {
        println!("no such holder");
        return;
    };

    match download::download_file(
        source,
        name,
        &config.shared_dir,
        config.download_chunk_size,
        config.download_timeout,
    )
    .await
    {
        Ok(bytes) => {
            println!("downloaded {name} ({bytes} bytes) from {source}");
            let _ = handle.call_cli(CliCommand::Refresh).await;
        }
        Err(e) => {
            download::log_failed_download(name, source, &e);
            println!("download failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_known_commands() {
        assert!(matches!(parse("search foo.txt"), Some(CliCommand::Search(n)) if n == "foo.txt"));
        assert!(matches!(parse("list my"), Some(CliCommand::ListMy)));
        assert!(matches!(parse("list net"), Some(CliCommand::ListNet)));
        assert!(matches!(parse("refresh"), Some(CliCommand::Refresh)));
        assert!(matches!(parse("status"), Some(CliCommand::Status)));
        assert!(matches!(parse("election"), Some(CliCommand::Election)));
        assert!(matches!(parse("quit"), Some(CliCommand::Quit)));
    }

    #[test]
    fn rejects_malformed_or_unknown_input() {
        assert!(parse("").is_none());
        assert!(parse("search").is_none());
        assert!(parse("list everything").is_none());
        assert!(parse("frobnicate").is_none());
    }
}
