//! Dashboard Page Example
//!
//! Renders a simulated dashboard page twice against a slow warehouse: the
//! first render runs every query the page needs in one parallel batch, the
//! second is served entirely from the cache.

use anyhow::Result;
use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use dash_cache::CacheConfig;
use dash_core::{ParameterSpec, ParameterType, QueryDefinition, StaticDefinitionLoader};
use dash_engine::{CannedExecutor, DataSet, EngineConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};

const REGIONS: &str = "SELECT region, SUM(revenue) FROM sales GROUP BY region";
const DAILY: &str = "SELECT revenue FROM daily WHERE day = {{day}}";
const ACTIVE_USERS: &str = "SELECT COUNT(*) FROM users WHERE active";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("dash_engine=info")
        .init();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run())
}

async fn run() -> Result<()> {
    println!("=== Dashboard Page Example ===\n");

    let definitions = StaticDefinitionLoader::new()
        .with_definition(
            QueryDefinition::new("regions", "Revenue by region", REGIONS)
                .with_description("Revenue totals per sales region"),
        )
        .with_definition(
            QueryDefinition::new("daily", "Daily revenue", DAILY)
                .with_parameter(ParameterSpec::scalar("day", ParameterType::Date)),
        )
        .with_definition(QueryDefinition::new("users", "Active users", ACTIVE_USERS));

    // Every warehouse call takes 300ms
    let warehouse = Arc::new(
        CannedExecutor::new()
            .with_latency(Duration::from_millis(300))
            .with_handler(REGIONS, |_| Ok(vec![regions_batch()?]))
            .with_handler(DAILY, |params| {
                let day = params.get("day").map(|v| v.to_string()).unwrap_or_default();
                let revenue = if day.contains("-01-01") { 1250.0 } else { 980.5 };
                Ok(vec![revenue_batch(revenue)?])
            })
            .with_ints(ACTIVE_USERS, "active", vec![4182]),
    );

    let config = EngineConfig::default()
        .with_cache(CacheConfig::lru().with_ttl(Duration::from_secs(600)));
    let dataset = DataSet::with_loader(config, Arc::new(definitions), warehouse.clone())?;

    render_page(&dataset).await?;
    println!(
        "Warehouse calls after first render: {}\n",
        warehouse.calls()
    );

    render_page(&dataset).await?;
    println!(
        "Warehouse calls after second render: {}\n",
        warehouse.calls()
    );

    println!("--- Query profiler ({} cached) ---\n", dataset.num_cached());
    for row in dataset.profile() {
        println!("{}", serde_json::to_string(&row)?);
    }

    println!("\nCache stats: {:?}", dataset.cache_stats());
    println!("Execution stats: {:?}", dataset.execution_stats());

    dataset.invalidate();
    println!("\nAfter invalidate: {} cached", dataset.list().await.len());

    println!("\n=== Example completed! ===");
    Ok(())
}

async fn render_page(dataset: &DataSet) -> Result<()> {
    let started = Instant::now();

    let first_day = dataset.identity("daily", [("day", "2024-01-01")])?;
    let second_day = dataset.identity("daily", [("day", "2024-01-02")])?;
    dataset.prefetch(["regions".into(), "users".into(), first_day.clone(), second_day.clone()]);

    let regions = dataset.fetch("regions").await?;
    let users = dataset.fetch("users").await?;
    let first = dataset.fetch(first_day).await?;
    let second = dataset.fetch(second_day).await?;

    println!("Rendered page in {:?}", started.elapsed());
    println!("  regions: {} rows", regions.num_rows());
    println!("  users:   {} rows", users.num_rows());
    println!(
        "  daily:   {} + {} rows",
        first.num_rows(),
        second.num_rows()
    );
    Ok(())
}

fn regions_batch() -> Result<RecordBatch, arrow::error::ArrowError> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("region", DataType::Utf8, false),
        Field::new("revenue", DataType::Float64, false),
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(vec!["EMEA", "APAC", "AMER"])),
        Arc::new(Float64Array::from(vec![52_000.0, 38_500.0, 61_250.0])),
    ];
    RecordBatch::try_new(schema, columns)
}

fn revenue_batch(revenue: f64) -> Result<RecordBatch, arrow::error::ArrowError> {
    let schema = Arc::new(Schema::new(vec![Field::new(
        "revenue",
        DataType::Float64,
        false,
    )]));
    RecordBatch::try_new(schema, vec![Arc::new(Float64Array::from(vec![revenue]))])
}
