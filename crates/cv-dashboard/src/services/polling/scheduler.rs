use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::services::backend::BackendError;

use super::policy::BackoffPolicy;
use super::state::{PollOutcome, PollState};

type ProbeFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, BackendError>> + Send + Sync>;
type ReadyFn<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Currently running chain. A chain only publishes state while its
/// generation is still the current one.
struct ChainSlot {
    generation: u64,
    token: Option<CancellationToken>,
}

/// Retry/backoff executor: drives `probe` until `is_ready` holds or the
/// retries in the policy run out.
///
/// At most one chain is live per scheduler. Starting a chain (`run` or
/// `restart`) cancels the previous one before anything else happens, and
/// the cancelled chain can no longer publish state.
pub struct PollingScheduler<T> {
    name: &'static str,
    policy: BackoffPolicy,
    probe: ProbeFn<T>,
    is_ready: ReadyFn<T>,
    chain: Mutex<ChainSlot>,
    state_tx: watch::Sender<PollState<T>>,
}

impl<T> PollingScheduler<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new<P, Fut, R>(name: &'static str, policy: BackoffPolicy, probe: P, is_ready: R) -> Self
    where
        P: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BackendError>> + Send + 'static,
        R: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let (state_tx, _) = watch::channel(PollState::start(&policy));
        Self {
            name,
            probe: Arc::new(move || probe().boxed()),
            is_ready: Arc::new(is_ready),
            policy,
            chain: Mutex::new(ChainSlot {
                generation: 0,
                token: None,
            }),
            state_tx,
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Snapshot of the latest published state.
    pub fn state(&self) -> PollState<T> {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState<T>> {
        self.state_tx.subscribe()
    }

    /// True while a chain is running and has not resolved yet.
    pub fn is_active(&self) -> bool {
        let chain = self.chain.lock();
        let running = chain
            .token
            .as_ref()
            .is_some_and(|token| !token.is_cancelled());
        running && !self.state_tx.borrow().is_resolved()
    }

    /// Runs a fresh chain on the current task.
    ///
    /// Returns `None` when the chain was cancelled or superseded before it
    /// resolved.
    pub async fn run(&self) -> Option<PollState<T>> {
        let (generation, token) = self.begin_chain();
        self.drive(generation, token).await
    }

    /// Cancels the running chain (if any) and spawns a new one from attempt
    /// zero with the initial delay.
    pub fn restart(self: &Arc<Self>) -> JoinHandle<Option<PollState<T>>> {
        let (generation, token) = self.begin_chain();
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.drive(generation, token).await })
    }

    /// Stops any pending timer or in-flight probe. Safe to call repeatedly
    /// and after resolution.
    pub fn cancel(&self) {
        let chain = self.chain.lock();
        if let Some(token) = &chain.token {
            if !token.is_cancelled() {
                debug!("[{}] cancelling poll chain {}", self.name, chain.generation);
            }
            token.cancel();
        }
    }

    fn begin_chain(&self) -> (u64, CancellationToken) {
        let mut chain = self.chain.lock();
        if let Some(previous) = chain.token.take() {
            previous.cancel();
        }

        let token = CancellationToken::new();
        chain.generation += 1;
        chain.token = Some(token.clone());
        self.state_tx.send_replace(PollState::start(&self.policy));

        (chain.generation, token)
    }

    fn publish(&self, generation: u64, state: &PollState<T>) {
        let chain = self.chain.lock();
        if chain.generation == generation {
            self.state_tx.send_replace(state.clone());
        }
    }

    async fn drive(&self, generation: u64, token: CancellationToken) -> Option<PollState<T>> {
        let mut state = PollState::start(&self.policy);

        loop {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("[{}] chain {} cancelled during probe", self.name, generation);
                    return None;
                }
                result = (self.probe)() => result,
            };

            let unreachable = match result {
                Ok(value) => {
                    let ready = (self.is_ready)(&value);
                    state = state.with_result(value);

                    if ready {
                        state = state.resolve(PollOutcome::Ready);
                        self.publish(generation, &state);
                        info!(
                            "[{}] ready after attempt {} (waited {:?})",
                            self.name, state.attempt, state.waited
                        );
                        return Some(state);
                    }

                    debug!("[{}] attempt {} not ready", self.name, state.attempt);
                    false
                }
                Err(e) => {
                    warn!("[{}] attempt {} failed: {}", self.name, state.attempt, e);
                    true
                }
            };

            if state.attempt >= self.policy.max_retries {
                let outcome = if unreachable {
                    PollOutcome::Down
                } else {
                    PollOutcome::Degraded
                };
                state = state.resolve(outcome);
                self.publish(generation, &state);
                warn!(
                    "[{}] retries exhausted after {} attempts, outcome {:?}",
                    self.name,
                    state.attempt + 1,
                    outcome
                );
                return Some(state);
            }

            self.publish(generation, &state);
            debug!(
                "[{}] retry {}/{} in {:?}",
                self.name,
                state.attempt + 1,
                self.policy.max_retries,
                state.delay
            );

            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("[{}] chain {} cancelled during backoff", self.name, generation);
                    return None;
                }
                _ = tokio::time::sleep(state.delay) => {}
            }

            state = state.next_attempt(&self.policy);
        }
    }
}
