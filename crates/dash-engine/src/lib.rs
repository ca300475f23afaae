//! Coalescing execution and the public cache facade.
//!
//! Page renderers talk to a [`DataSet`]: they register the queries a page
//! needs with [`DataSet::prefetch`], then read results with
//! [`DataSet::fetch`]. The first fetch that misses the cache drains every
//! pending request through a bounded [`WorkerPool`], so the page's queries
//! run in parallel and each distinct [`QueryIdentity`](dash_core::QueryIdentity)
//! executes at most once at a time.
//!
//! # Example
//!
//! ```ignore
//! use dash_engine::{DataSet, EngineConfig};
//! use std::sync::Arc;
//!
//! let dataset = DataSet::new(EngineConfig::from_file("dashengine.yml")?, Arc::new(warehouse))?;
//!
//! dataset.prefetch(["daily_sales", "top_products"]);
//! let sales = dataset.fetch("daily_sales").await?;       // runs both queries
//! let products = dataset.fetch("top_products").await?;   // served from cache
//! ```
//!
//! # Modules
//!
//! - [`config`]: engine configuration
//! - [`executor`]: the warehouse execution seam
//! - [`pool`]: long-lived bounded worker pool
//! - [`scheduler`]: request coalescing and drain cycles
//! - [`dataset`]: the facade used by page renderers
//! - [`stats`]: execution counters

pub mod config;
pub mod dataset;
pub mod executor;
pub mod pool;
pub mod scheduler;
pub mod stats;

pub use config::EngineConfig;
pub use dataset::{DataSet, QueryProfile};
pub use executor::{int_batch, CannedExecutor, CannedResponse, QueryExecutor};
pub use pool::WorkerPool;
pub use scheduler::{CoalescingScheduler, DrainReport};
pub use stats::{ExecutionStats, ExecutionStatsSnapshot};
