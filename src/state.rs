use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use crate::config::Config;
use crate::risk::{LabelBands, RiskScorer, RiskWeights};

pub struct AppState {
    pub config: Config,
    pub pool: PgPool,
    pub scorer: RiskScorer,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let scorer = load_scorer(&config)?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .context("failed to connect to Postgres")?;

        Ok(Arc::new(Self {
            config,
            pool,
            scorer,
        }))
    }
}

/// Uses the weights file named in the config, falling back to the built-in weighting.
pub fn load_scorer(config: &Config) -> anyhow::Result<RiskScorer> {
    let weights = match &config.weights_path {
        Some(path) => {
            info!("Loading risk weights from {}", path.display());
            RiskWeights::from_json_file(path)?
        }
        None => RiskWeights::default(),
    };

    let scorer = RiskScorer::new(weights, LabelBands::default());
    info!("Risk scorer ready, weights sum to {:.2}", scorer.weights().total());
    Ok(scorer)
}
