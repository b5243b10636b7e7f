use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{MetricsError, MetricsResult, Portfolio};

const INITIAL_BALANCE_FILE: &str = "initialbalance.bal";
const HEADER: &str = "InitialBalance";
const VERSION: &str = "v1.0.0";

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    header: String,
    version: String,
    portfolio: Portfolio,
}

/// Persists the first portfolio the bot ever saw
///
/// Lifetime performance is measured against it.
#[derive(Debug, Clone)]
pub struct InitialBalanceStore {
    path: PathBuf,
}

impl InitialBalanceStore {
    pub fn new(metrics_dir: impl AsRef<Path>) -> Self {
        Self {
            path: metrics_dir.as_ref().join(INITIAL_BALANCE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> MetricsResult<Option<Portfolio>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let envelope: Envelope = serde_json::from_str(&contents)?;
        if envelope.header != HEADER {
            return Err(MetricsError::BadHeader(envelope.header));
        }
        Ok(Some(envelope.portfolio))
    }

    pub fn save(&self, portfolio: &Portfolio) -> MetricsResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let envelope = Envelope {
            header: HEADER.to_string(),
            version: VERSION.to_string(),
            portfolio: portfolio.clone(),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&envelope)?)?;
        Ok(())
    }

    /// Return the stored initial portfolio, storing `current` if none exists
    pub fn load_or_init(&self, current: &Portfolio) -> MetricsResult<Portfolio> {
        if let Some(initial) = self.load()? {
            return Ok(initial);
        }

        tracing::info!("No initial balance found, recording {}", self.path.display());
        self.save(current)?;
        Ok(current.clone())
    }
}
