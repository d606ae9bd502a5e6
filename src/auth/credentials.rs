use std::sync::Arc;

use rocket::tokio::task;
use tokio::sync::OnceCell;
use tracing::{instrument, warn};

use crate::error::AppError;

/// Lowest and highest work factors bcrypt accepts.
pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

/// One-way hashing for passwords and privacy pins.
///
/// bcrypt is CPU bound (roughly a second at cost 14), so both operations run
/// on the blocking pool instead of stalling a request worker.
#[derive(Debug, Clone)]
pub struct Credentials {
    cost: u32,
    decoy: Arc<OnceCell<String>>,
}

impl Credentials {
    pub fn new(cost: u32) -> Self {
        let clamped = cost.clamp(MIN_BCRYPT_COST, MAX_BCRYPT_COST);
        if clamped != cost {
            warn!(requested = cost, used = clamped, "bcrypt cost out of range");
        }

        Self {
            cost: clamped,
            decoy: Arc::new(OnceCell::new()),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    #[instrument(skip_all, fields(cost = self.cost))]
    pub async fn hash(&self, plaintext: &str) -> Result<String, AppError> {
        let plaintext = plaintext.to_owned();
        let cost = self.cost;
        let digest = task::spawn_blocking(move || bcrypt::hash(plaintext, cost)).await??;
        Ok(digest)
    }

    /// Never errors: a malformed digest is reported as a mismatch.
    #[instrument(skip_all)]
    pub async fn verify(&self, plaintext: &str, digest: &str) -> bool {
        let plaintext = plaintext.to_owned();
        let digest = digest.to_owned();

        match task::spawn_blocking(move || bcrypt::verify(plaintext, &digest)).await {
            Ok(Ok(valid)) => valid,
            Ok(Err(err)) => {
                warn!(error = %err, "Stored digest could not be parsed");
                false
            }
            Err(err) => {
                warn!(error = %err, "Verification task failed");
                false
            }
        }
    }

    /// Spends the same work as a real verify when there is no account to
    /// check against. The decoy digest is hashed from random bytes on first
    /// use, at this store's cost.
    #[instrument(skip_all)]
    pub async fn verify_decoy(&self, plaintext: &str) {
        let decoy = self
            .decoy
            .get_or_try_init(|| {
                let secret: [u8; 16] = rand::random();
                let secret: String = secret.iter().map(|b| format!("{:02x}", b)).collect();
                async move { self.hash(&secret).await }
            })
            .await;

        match decoy {
            Ok(digest) => {
                self.verify(plaintext, digest).await;
            }
            Err(err) => warn!(error = %err, "Could not prepare decoy digest"),
        }
    }

    #[cfg(test)]
    pub fn decoy_ready(&self) -> bool {
        self.decoy.initialized()
    }
}
