//! Signature round-trip service
//!
//! Ties the compositing pipeline to the approval backend: fetch the source
//! document and signer artifacts, normalize, composite, then persist the
//! signed document as a new artifact.

mod round_trip;
mod signers;

#[cfg(test)]
pub(crate) mod fakes;

pub use round_trip::EmbedOutcome;
pub use signers::PaperEmbedOutcome;

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::artifacts::Backend;
use crate::compositing::{Normalizer, SignatureCompositor};
use crate::config::{AppConfig, LimitsConfig};
use crate::error::{ServiceError, ServiceResult};
use crate::retry::RetryPolicy;

/// Main service coordinator
pub struct SignoffService<B> {
    backend: Arc<B>,
    normalizer: Arc<Normalizer>,
    compositor: Arc<SignatureCompositor>,
    retry: RetryPolicy,
    limits: LimitsConfig,
}

impl<B: Backend> SignoffService<B> {
    pub fn new(backend: Arc<B>, config: &AppConfig) -> Self {
        info!(
            slots = ?config.layout.slots,
            target_page = ?config.layout.target_page,
            max_attempts = config.retry.max_attempts,
            "Initializing signoff service"
        );

        Self {
            backend,
            normalizer: Arc::new(Normalizer::new(config.normalize.clone())),
            compositor: Arc::new(SignatureCompositor::new(config.layout.clone())),
            retry: RetryPolicy::from_config(&config.retry),
            limits: config.limits.clone(),
        }
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }
}

/// Record the outcome and duration of one round trip
fn record_round_trip<T>(started: Instant, result: &ServiceResult<T>) {
    let label = match result {
        Ok(_) => "ok",
        Err(e) => e.error_code(),
    };
    metrics::counter!("signoff_round_trips_total", "result" => label).increment(1);
    metrics::histogram!("signoff_round_trip_seconds").record(started.elapsed().as_secs_f64());
}

/// Run CPU-bound pipeline work off the async executor
async fn blocking<T, F>(task: F) -> ServiceResult<T>
where
    F: FnOnce() -> ServiceResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| ServiceError::Internal {
            message: format!("Pipeline task failed: {}", e),
        })?
}
