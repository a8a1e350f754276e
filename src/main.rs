use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use courtside::config::Config;
use courtside::engine::{Engine, InMemoryStore};
use courtside::notify::NotifyHub;
use courtside::repository::Collaborators;
use courtside::seed::Seed;

/// Print every resource's free slots for one day as JSON lines.
///
/// Usage: `courtside [YYYY-MM-DD]` (defaults to today, UTC).
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env();
    courtside::observability::init(config.metrics_port)?;

    let date = match std::env::args().nth(1) {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")?,
        None => Utc::now().date_naive(),
    };

    let seed = Seed::load(&config.seed_path)?;
    info!(
        "seed {}: {} resources, {} bookings",
        config.seed_path.display(),
        seed.resources.len(),
        seed.bookings.len()
    );

    let store = Arc::new(InMemoryStore::new());
    seed.apply(&store).await?;
    let engine = Engine::new(
        Collaborators::from_store(store.clone()),
        Arc::new(NotifyHub::with_capacity(config.event_capacity)),
    );

    for resource in store.resources() {
        let slots = engine.get_availability(resource.id, date).await?;
        let line = json!({
            "resource_id": resource.id,
            "name": resource.name,
            "date": date,
            "slots": slots,
        });
        println!("{line}");
    }

    info!("availability for {date} done");
    Ok(())
}
