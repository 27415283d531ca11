use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::errors::TokenLoadError;

#[derive(Debug, Deserialize)]
struct TokenRecord {
    #[serde(default)]
    token: String,
}

/// An immutable, never-empty set of accepted bearer tokens.
#[derive(Debug)]
pub struct TokenGeneration {
    pub number: u64,
    pub loaded_at: SystemTime,
    tokens: HashSet<String>,
}

impl TokenGeneration {
    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Result of a successful reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Unchanged,
    Replaced { generation: u64 },
}

/// Bearer tokens loaded from a YAML list of `{ token: ... }` records.
///
/// Readers clone an `Arc` to the current generation under a short read lock;
/// a reload parses the file without holding any lock and only takes the write
/// lock to swap in a different set.
#[derive(Debug)]
pub struct TokenStore {
    file: PathBuf,
    current: RwLock<Arc<TokenGeneration>>,
}

impl TokenStore {
    /// Loads the initial generation. Failure here is meant to be fatal.
    pub fn load(file: impl Into<PathBuf>) -> Result<Self, TokenLoadError> {
        let file = file.into();
        let tokens = read_token_file(&file)?;
        tracing::info!(path = %file.display(), count = tokens.len(), "loaded tokens");
        Ok(Self {
            file,
            current: RwLock::new(Arc::new(TokenGeneration {
                number: 1,
                loaded_at: SystemTime::now(),
                tokens,
            })),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    pub fn has_token(&self, token: &str) -> bool {
        !token.is_empty() && self.current.read().contains(token)
    }

    pub fn generation(&self) -> Arc<TokenGeneration> {
        Arc::clone(&self.current.read())
    }

    /// Re-reads the token file. On error the active generation stays in force.
    pub fn reload(&self) -> Result<ReloadOutcome, TokenLoadError> {
        let candidate = read_token_file(&self.file)?;

        if self.current.read().tokens == candidate {
            tracing::debug!(path = %self.file.display(), "token file unchanged");
            return Ok(ReloadOutcome::Unchanged);
        }

        let mut current = self.current.write();
        let number = current.number + 1;
        *current = Arc::new(TokenGeneration {
            number,
            loaded_at: SystemTime::now(),
            tokens: candidate,
        });
        tracing::info!(
            path = %self.file.display(),
            count = current.len(),
            generation = number,
            "updated tokens"
        );
        Ok(ReloadOutcome::Replaced { generation: number })
    }

    /// Reloads on a fixed period. Each tick is an independent attempt; failures
    /// are logged and the previous generation keeps serving.
    pub fn spawn_refresh(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let worker = Arc::clone(&store);
                match tokio::task::spawn_blocking(move || worker.reload()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "failed reloading tokens"),
                    Err(e) => tracing::error!(error = %e, "token reload task failed"),
                }
            }
        })
    }
}

fn read_token_file(path: &Path) -> Result<HashSet<String>, TokenLoadError> {
    let data = std::fs::read_to_string(path).map_err(|source| TokenLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let records: Vec<TokenRecord> =
        serde_yaml::from_str(&data).map_err(|source| TokenLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let mut tokens = HashSet::with_capacity(records.len());
    for (idx, record) in records.into_iter().enumerate() {
        if record.token.is_empty() {
            return Err(TokenLoadError::EmptyToken {
                path: path.to_path_buf(),
                index: idx + 1,
            });
        }
        tokens.insert(record.token);
    }
    if tokens.is_empty() {
        return Err(TokenLoadError::NoTokens {
            path: path.to_path_buf(),
        });
    }
    Ok(tokens)
}
