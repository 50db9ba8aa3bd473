use chrono::Utc;
use clap::Parser;
use quorum_kv::{PeerSet, Replica, ReplicaActor, ReplicaConfig, ReplicaId, ReplicaOptions, VolatileLocalState};
use slog::Drain;
use std::error::Error;
use std::fs::OpenOptions;
use std::time::Instant;
use tokio::net::UnixStream;

/// One replica of the replicated key-value store. Launched by the cluster
/// supervisor; connects to the network substrate over the Unix socket named
/// by its own id.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Id of this replica.
    replica_id: String,
    /// Ids of the other replicas in the cluster.
    #[arg(required = true)]
    peer_ids: Vec<String>,
    /// Write logs to a timestamped file under this directory instead of
    /// stderr.
    #[arg(long)]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let logger = match &args.log_dir {
        Some(log_dir) => create_root_logger_for_file(log_dir, &args.replica_id)?,
        None => create_root_logger_for_stderr(&args.replica_id),
    };

    let peers = PeerSet::new(
        ReplicaId::new(&args.replica_id),
        args.peer_ids.iter().map(ReplicaId::new).collect(),
    )?;

    let replica = Replica::new(
        ReplicaConfig {
            logger: logger.clone(),
            peers,
            local_state: VolatileLocalState::new(),
            options: ReplicaOptions::default(),
        },
        Instant::now(),
    )?;

    let transport = UnixStream::connect(&args.replica_id).await?;
    slog::info!(logger, "Connected to substrate"; "endpoint" => %args.replica_id);

    let actor = ReplicaActor::new(logger, transport, replica);
    actor.run_event_loop().await?;

    Ok(())
}

fn create_root_logger_for_stderr(replica_id: &str) -> slog::Logger {
    let decorator = slog_term::PlainDecorator::new(std::io::stderr());
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("ReplicaId" => replica_id.to_string()))
}

fn create_root_logger_for_file(directory: &str, replica_id: &str) -> Result<slog::Logger, std::io::Error> {
    let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    let log_path = format!("{}/{}_{}.log", directory, replica_id, now);
    let file = OpenOptions::new().create(true).write(true).truncate(true).open(log_path)?;

    let decorator = slog_term::PlainDecorator::new(file);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    Ok(slog::Logger::root(drain, slog::o!("ReplicaId" => replica_id.to_string())))
}
