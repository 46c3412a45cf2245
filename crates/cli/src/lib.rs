//! Literature review pipeline
//!
//! Wires settings into components and runs the commands behind the
//! `litreview` binary.

pub mod app;
pub mod components;
pub mod report;

pub use app::{App, Review, RunSummary};
pub use components::{
    build_embedder, build_reranker, build_sparse_index, build_vector_index, Components,
};
pub use report::{render_review, review_file_name, save_review, QualityReport};

use litreview_config::ObservabilityConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Install the global subscriber
///
/// `RUST_LOG` wins; otherwise `litreview=<log_level>`.
pub fn init_tracing(config: &ObservabilityConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("litreview={}", config.log_level).into());

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
