//! Spreadwatch - cross-venue crypto spread detection and execution.
//!
//! Watches the same trading pair on several venues, detects when one venue's
//! best ask is below another venue's best bid, sizes the trade under a risk
//! profile, and executes both legs live or against a paper ledger.
//!
//! # Architecture
//!
//! Data flows one way:
//!
//! venue client → [`app::MarketDataAggregator`] → [`app::OrderBookStore`] →
//! [`app::ArbitrageDetector`] → [`app::RiskEngine`] →
//! [`app::TradeOrchestrator`] → venue client or [`app::PaperLedger`] →
//! [`app::ResultSink`].
//!
//! # Modules
//!
//! - [`config`] - TOML configuration and the runtime-updatable config source
//! - [`domain`] - Pairs, order books, opportunities, trade results
//! - [`error`] - Error types for the crate
//! - [`exchange`] - Venue client trait, simulated venue and factory
//! - [`app`] - Aggregation, detection, risk, execution and the engine
//! - [`cli`] - Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use spreadwatch::app::{Engine, SinkRegistry};
//! use spreadwatch::config::Config;
//!
//! # async fn demo() -> spreadwatch::error::Result<()> {
//! let config = Config::load("config.toml")?;
//! let engine = Engine::from_config(&config, false, SinkRegistry::new())?;
//! let (_stop, stop_rx) = tokio::sync::watch::channel(false);
//! engine.run(stop_rx).await;
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod exchange;
