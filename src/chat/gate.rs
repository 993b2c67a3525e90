//! Client-side request gate: a minimum interval between backend calls and
//! de-duplication of identical in-flight requests.
//!
//! A caller whose key matches a pending request joins that request and
//! receives the same result; no second network call is made. A new request
//! arriving inside the minimum interval is rejected at once, never queued.

use super::ChatError;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

type SharedReply = Shared<BoxFuture<'static, Result<String, ChatError>>>;

#[derive(Default)]
struct GateState {
    last_request: Option<Instant>,
    in_flight: HashMap<String, (u64, SharedReply)>,
    next_id: u64,
}

pub struct RequestGate {
    min_interval: Duration,
    state: Mutex<GateState>,
}

/// An admitted request. Await it with [`RequestGate::finish`].
pub struct Pending {
    key: String,
    id: u64,
    joined: bool,
    reply: SharedReply,
}

impl Pending {
    /// True when this caller joined a request someone else started.
    pub fn is_joined(&self) -> bool {
        self.joined
    }
}

impl RequestGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            state: Mutex::new(GateState::default()),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a request keyed by `key`. `start` runs only if no identical
    /// request is in flight and the interval has elapsed.
    pub fn submit<F, Fut>(&self, key: &str, start: F) -> Result<Pending, ChatError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, ChatError>> + Send + 'static,
    {
        let mut state = self.lock();

        if let Some((id, reply)) = state.in_flight.get(key) {
            log::debug!("[CHAT] Joining in-flight request #{}", id);
            return Ok(Pending {
                key: key.to_string(),
                id: *id,
                joined: true,
                reply: reply.clone(),
            });
        }

        let now = Instant::now();
        if let Some(last) = state.last_request {
            if now.duration_since(last) < self.min_interval {
                log::info!("[CHAT] Request rejected, minimum interval not elapsed");
                return Err(ChatError::RateLimited);
            }
        }

        state.last_request = Some(now);
        state.next_id += 1;
        let id = state.next_id;
        let reply = start().boxed().shared();
        state
            .in_flight
            .insert(key.to_string(), (id, reply.clone()));

        Ok(Pending {
            key: key.to_string(),
            id,
            joined: false,
            reply,
        })
    }

    /// Wait for an admitted request and retire it from the in-flight table.
    pub async fn finish(&self, pending: Pending) -> Result<String, ChatError> {
        let result = pending.reply.await;

        let mut state = self.lock();
        // A later request may have reused the key; only remove our own entry.
        if matches!(state.in_flight.get(&pending.key), Some((id, _)) if *id == pending.id) {
            state.in_flight.remove(&pending.key);
        }
        result
    }

    pub async fn run<F, Fut>(&self, key: &str, start: F) -> Result<String, ChatError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, ChatError>> + Send + 'static,
    {
        let pending = self.submit(key, start)?;
        self.finish(pending).await
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counted(
        calls: &Arc<AtomicUsize>,
        reply: &'static str,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<String, ChatError>> {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(reply.to_string())
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn identical_pending_requests_share_one_call() {
        let gate = RequestGate::new(Duration::from_secs(1));
        let calls = Arc::new(AtomicUsize::new(0));

        let first = gate.submit("red shoes", counted(&calls, "found")).unwrap();
        let second = gate.submit("red shoes", counted(&calls, "other")).unwrap();
        assert!(!first.is_joined());
        assert!(second.is_joined());

        let (a, b) = tokio::join!(gate.finish(first), gate.finish(second));
        assert_eq!(a, Ok("found".to_string()));
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn shared_errors_are_identical() {
        let gate = RequestGate::new(Duration::ZERO);
        let first = gate
            .submit("x", || async { Err(ChatError::Backend("boom".into())) })
            .unwrap();
        let second = gate
            .submit("x", || async { Ok::<_, ChatError>("never".to_string()) })
            .unwrap();

        let (a, b) = tokio::join!(gate.finish(first), gate.finish(second));
        assert_eq!(a, Err(ChatError::Backend("boom".into())));
        assert_eq!(a, b);
    }

    #[tokio::test(start_paused = true)]
    async fn different_request_too_soon_is_rejected() {
        let gate = RequestGate::new(Duration::from_millis(1000));
        gate.run("first", || async { Ok::<_, ChatError>("ok".to_string()) })
            .await
            .unwrap();

        let err = gate
            .run("second", || async { Ok::<_, ChatError>("ok".to_string()) })
            .await
            .unwrap_err();
        assert_eq!(err, ChatError::RateLimited);

        tokio::time::advance(Duration::from_millis(1001)).await;
        assert!(gate
            .run("second", || async { Ok::<_, ChatError>("ok".to_string()) })
            .await
            .is_ok());
    }
}
