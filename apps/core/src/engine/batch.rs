use super::analyzer::Analyzer;
use crate::error::AppError;
use crate::llm::ModelClient;
use crate::models::{
    AnalysisRequest, BatchItem, BatchOutcome, ErrorDescriptor, ErrorKind, ItemOutcome,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

const PROGRESS_EVERY: usize = 10;

/// Fans a batch out over the analyzer with at most `max_concurrency` model
/// calls in flight.
///
/// Items are independent: one item failing never affects another, and the
/// outcome lists every submitted item in submission order.
pub struct BatchOrchestrator<C: ModelClient> {
    analyzer: Arc<Analyzer<C>>,
    max_concurrency: usize,
}

impl<C: ModelClient> BatchOrchestrator<C> {
    pub fn new(analyzer: Arc<Analyzer<C>>, max_concurrency: usize) -> Self {
        Self {
            analyzer,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub async fn analyze_batch(&self, requests: Vec<AnalysisRequest>) -> BatchOutcome {
        self.analyze_batch_with_cancel(requests, CancellationToken::new())
            .await
    }

    /// Runs the batch until done or until `token` is cancelled.
    ///
    /// Cancellation stops new items from starting; items already waiting on
    /// the model finish (or time out) normally. Items that never started are
    /// reported with `ErrorKind::Cancelled`. Dropping the returned future
    /// cancels the same way.
    #[instrument(skip(self, requests, token), fields(total = requests.len(), max_concurrency = self.max_concurrency))]
    pub async fn analyze_batch_with_cancel(
        &self,
        requests: Vec<AnalysisRequest>,
        token: CancellationToken,
    ) -> BatchOutcome {
        let total = requests.len();
        info!("Starting batch of {} items", total);

        // Item tasks outlive this future if it is dropped; the guard stops
        // unstarted items in that case.
        let items_token = token.child_token();
        let _guard = items_token.clone().drop_guard();

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let completed = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::with_capacity(total);
        let mut inputs = Vec::with_capacity(total);

        for (index, request) in requests.into_iter().enumerate() {
            inputs.push(request.text.clone());

            let analyzer = self.analyzer.clone();
            let semaphore = semaphore.clone();
            let completed = completed.clone();
            let token = items_token.clone();

            tasks.push(tokio::spawn(async move {
                let outcome = run_item(&analyzer, &semaphore, &token, index, request).await;

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if done % PROGRESS_EVERY == 0 || done == total {
                    info!("Batch progress: {}/{} items", done, total);
                }
                outcome
            }));
        }

        let joined = futures::future::join_all(tasks).await;

        let items: Vec<BatchItem> = joined
            .into_iter()
            .zip(inputs)
            .enumerate()
            .map(|(index, (task_result, input))| {
                let result = task_result.unwrap_or_else(|e| {
                    error!(index, "Batch item task failed: {}", e);
                    ItemOutcome::Error(ErrorDescriptor {
                        kind: ErrorKind::Internal,
                        message: format!("Item task failed: {}", e),
                    })
                });
                BatchItem {
                    index,
                    input,
                    result,
                }
            })
            .collect();

        let outcome = BatchOutcome::from_items(items);
        info!(
            success = outcome.success_count,
            errors = outcome.error_count,
            cancelled = outcome.cancelled,
            "Batch finished"
        );
        outcome
    }
}

async fn run_item<C: ModelClient>(
    analyzer: &Analyzer<C>,
    semaphore: &Semaphore,
    token: &CancellationToken,
    index: usize,
    request: AnalysisRequest,
) -> ItemOutcome {
    let _permit = tokio::select! {
        biased;
        _ = token.cancelled() => return cancelled(),
        permit = semaphore.acquire() => match permit {
            Ok(permit) => permit,
            Err(e) => {
                return ItemOutcome::Error(ErrorDescriptor {
                    kind: ErrorKind::Internal,
                    message: format!("Failed to acquire concurrency permit: {}", e),
                })
            }
        },
    };
    // The token may have fired while this item was first in line for the permit.
    if token.is_cancelled() {
        return cancelled();
    }

    match analyzer.analyze(&request).await {
        Ok(result) => ItemOutcome::Completed(result),
        Err(e) => {
            warn!(index, "Batch item failed: {}", e);
            ItemOutcome::Error(describe(e))
        }
    }
}

fn cancelled() -> ItemOutcome {
    ItemOutcome::Error(ErrorDescriptor {
        kind: ErrorKind::Cancelled,
        message: "Batch cancelled before this item started".to_string(),
    })
}

fn describe(err: AppError) -> ErrorDescriptor {
    let kind = match &err {
        AppError::Validation(_) => ErrorKind::Validation,
        AppError::Configuration { .. } => ErrorKind::Configuration,
        _ => ErrorKind::Internal,
    };
    let message = match err {
        AppError::Validation(message) => message,
        AppError::Configuration { status, message } => {
            format!("Model server rejected the request (status {}): {}", status, message)
        }
        other => other.to_string(),
    };
    ErrorDescriptor { kind, message }
}
