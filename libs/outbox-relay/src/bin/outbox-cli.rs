use std::env;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use event_id::EventId;
use outbox_relay::{OutboxStatus, OutboxStore, PgOutboxStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage:");
        eprintln!("  outbox-cli stats <DATABASE_URL>");
        eprintln!("  outbox-cli replay-failed <event_id> <DATABASE_URL>");
        eprintln!("  outbox-cli replay-failed-since <rfc3339_ts> <DATABASE_URL>");
        std::process::exit(1);
    }

    let cmd = args[1].as_str();

    match cmd {
        "stats" if args.len() == 3 => {
            let store = connect(&args[2]).await?;
            let total = store.count().await?;
            let (pending, oldest_age) = store.pending_stats().await?;
            let published = store.count_by_status(OutboxStatus::Published).await?;
            let failed = store.count_by_status(OutboxStatus::Failed).await?;
            println!("total:     {total}");
            println!("pending:   {pending} (oldest {oldest_age}s)");
            println!("published: {published}");
            println!("failed:    {failed}");
        }
        "replay-failed" if args.len() == 4 => {
            let event_id = EventId::new(args[2].clone())?;
            let store = connect(&args[3]).await?;
            let count = store.replay_failed(&event_id).await?;
            println!("Reset {count} failed event(s) matching {event_id}");
        }
        "replay-failed-since" if args.len() == 4 => {
            let ts: DateTime<Utc> = DateTime::parse_from_rfc3339(&args[2])?.with_timezone(&Utc);
            let store = connect(&args[3]).await?;
            let count = store.replay_failed_since(ts).await?;
            println!("Reset {count} failed event(s) since {ts}");
        }
        _ => {
            eprintln!("Invalid arguments");
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn connect(db_url: &str) -> Result<PgOutboxStore, sqlx::Error> {
    Ok(PgOutboxStore::new(PgPool::connect(db_url).await?))
}
