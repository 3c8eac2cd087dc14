//! cinemesh-ctl — command-line interface for the cinemesh coordinator.
//!
//! `cinemesh-ctl [status]` — pool and dataset overview.
//! `cinemesh-ctl neighbors <user_id>` — trigger a dispatch and print the
//! merged neighbor ranking.
//!
//! The API base defaults to http://127.0.0.1:8080 and can be overridden
//! with CINEMESH_API.

use anyhow::{Context, Result, bail};
use serde::Deserialize;

#[derive(Deserialize)]
struct StatusResponse {
    uptime_secs: u64,
    dataset_users: usize,
    workers: WorkerCounts,
}

#[derive(Deserialize)]
struct WorkerCounts {
    total: usize,
    idle: usize,
    busy: usize,
}

#[derive(Deserialize)]
struct WorkersResponse {
    workers: Vec<WorkerInfo>,
}

#[derive(Deserialize)]
struct WorkerInfo {
    worker_id: String,
    addr: String,
    state: String,
    concurrency: usize,
    last_seen_secs: u64,
}

#[derive(Deserialize)]
struct NeighborsResponse {
    user_id: u32,
    dispatched_blocks: usize,
    completed_blocks: usize,
    neighbors: Vec<NeighborInfo>,
}

#[derive(Deserialize)]
struct NeighborInfo {
    id: String,
    similarity: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let base = std::env::var("CINEMESH_API").unwrap_or_else(|_| "http://127.0.0.1:8080".into());
    let command = std::env::args().nth(1).unwrap_or_else(|| "status".into());

    match command.as_str() {
        "status" => status(&base).await,
        "neighbors" => {
            let user_id: u32 = std::env::args()
                .nth(2)
                .context("usage: cinemesh-ctl neighbors <user_id>")?
                .parse()
                .context("user_id must be a number")?;
            neighbors(&base, user_id).await
        }
        other => bail!("unknown command '{other}' (expected: status, neighbors)"),
    }
}

async fn status(base: &str) -> Result<()> {
    let status = reqwest::get(format!("{base}/api/status"))
        .await
        .context("failed to connect to cinemeshd — is it running?")?
        .json::<StatusResponse>()
        .await
        .context("failed to parse status response")?;

    let workers = reqwest::get(format!("{base}/api/workers"))
        .await?
        .json::<WorkersResponse>()
        .await
        .context("failed to parse workers response")?;

    println!("═══════════════════════════════════════");
    println!("  cinemesh Coordinator Status");
    println!("═══════════════════════════════════════");
    println!("  Uptime        : {}s", status.uptime_secs);
    println!("  Dataset users : {}", status.dataset_users);
    println!(
        "  Workers       : {} ({} idle, {} busy)",
        status.workers.total, status.workers.idle, status.workers.busy
    );

    if workers.workers.is_empty() {
        println!("\n  No workers connected.");
    } else {
        println!("\n  Workers:");
        for w in &workers.workers {
            println!("  ┌─ {}", &w.worker_id[..8.min(w.worker_id.len())]);
            println!("  │  addr        : {}", w.addr);
            println!("  │  state       : {}", w.state);
            println!("  │  concurrency : {}", w.concurrency);
            println!("  └─ last seen   : {}s ago", w.last_seen_secs);
        }
    }

    Ok(())
}

async fn neighbors(base: &str, user_id: u32) -> Result<()> {
    let resp = reqwest::get(format!("{base}/api/neighbors/{user_id}"))
        .await
        .context("failed to connect to cinemeshd — is it running?")?
        .json::<NeighborsResponse>()
        .await
        .context("failed to parse neighbors response")?;

    println!(
        "user {} — {}/{} blocks answered",
        resp.user_id, resp.completed_blocks, resp.dispatched_blocks
    );
    if resp.neighbors.is_empty() {
        println!("no neighbors (no idle workers, or every block timed out)");
        return Ok(());
    }
    for (rank, n) in resp.neighbors.iter().enumerate() {
        println!("{:>3}. user {:<8} similarity {:.4}", rank + 1, n.id, n.similarity);
    }

    Ok(())
}
