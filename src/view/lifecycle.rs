//! Teardown bookkeeping owned by every view.
//!
//! A [`Lifecycle`] records the timers and model subscriptions a view acquires
//! and releases all of them exactly once on [`Lifecycle::close`]. Timers are
//! keyed; registering under a key that is already taken cancels the previous
//! timer before the new one starts.

use crate::core::error::DetachError;
use crate::core::store::Subscription;
use crate::view::timer::Timer;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Key used by call sites that register a single periodic callback per view.
pub const DEFAULT_TIMER_KEY: &str = "periodic";

pub type TeardownHook = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// Something a view must release when it closes.
pub trait Detach: Send {
    fn detach(&self) -> Result<(), DetachError>;
}

impl Detach for Subscription {
    fn detach(&self) -> Result<(), DetachError> {
        self.unsubscribe()
    }
}

#[derive(Default)]
struct Resources {
    timers: HashMap<String, Timer>,
    subscriptions: Vec<Box<dyn Detach>>,
    teardown: Option<TeardownHook>,
}

pub struct Lifecycle {
    name: String,
    closed: AtomicBool,
    token: CancellationToken,
    resources: Mutex<Resources>,
}

impl Lifecycle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            closed: AtomicBool::new(false),
            token: CancellationToken::new(),
            resources: Mutex::new(Resources::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Cancelled when the view closes.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn on_close(&self, hook: TeardownHook) {
        let mut resources = self.lock();
        if self.is_closed() {
            tracing::debug!(view = %self.name, "Ignoring teardown hook on closed view");
            return;
        }
        resources.teardown = Some(hook);
    }

    /// Creates or replaces the periodic timer under `key`. A `None` key shares
    /// [`DEFAULT_TIMER_KEY`]. Returns false, doing nothing, once the view is closed.
    pub fn register_periodic<C>(&self, key: Option<&str>, period: Duration, callback: C) -> bool
    where
        C: Fn() + Send + Sync + 'static,
    {
        self.register_timer(key.unwrap_or(DEFAULT_TIMER_KEY), |parent| {
            Timer::periodic(parent, period, callback)
        })
    }

    /// Like [`Lifecycle::register_periodic`] but for a self-driven task, which
    /// gets a token that is cancelled on close or replacement.
    pub fn register_task<F, Fut>(&self, key: &str, body: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.register_timer(key, |parent| Timer::spawn(parent, body))
    }

    fn register_timer(&self, key: &str, make: impl FnOnce(&CancellationToken) -> Timer) -> bool {
        let mut resources = self.lock();
        if self.is_closed() {
            tracing::debug!(view = %self.name, key, "Ignoring timer registration on closed view");
            return false;
        }

        if let Some(previous) = resources.timers.remove(key) {
            tracing::debug!(view = %self.name, key, "Replacing timer");
            previous.cancel();
        }
        resources.timers.insert(key.to_string(), make(&self.token));
        true
    }

    #[allow(dead_code)]
    pub fn cancel_timer(&self, key: &str) -> bool {
        let removed = self.lock().timers.remove(key);
        match removed {
            Some(timer) => {
                timer.cancel();
                true
            }
            None => false,
        }
    }

    #[allow(dead_code)]
    pub fn has_timer(&self, key: &str) -> bool {
        self.lock().timers.contains_key(key)
    }

    #[allow(dead_code)]
    pub fn timer_count(&self) -> usize {
        self.lock().timers.len()
    }

    /// Tracks a subscription for release on close. A subscription handed to a
    /// closed view is released immediately.
    pub fn listen(&self, subscription: impl Detach + 'static) {
        let mut resources = self.lock();
        if self.is_closed() {
            drop(resources);
            release(&self.name, &subscription);
            return;
        }
        resources.subscriptions.push(Box::new(subscription));
    }

    #[allow(dead_code)]
    pub fn subscription_count(&self) -> usize {
        self.lock().subscriptions.len()
    }

    /// Releases everything the view holds. Later calls do nothing.
    ///
    /// No lock is held while the teardown hook runs or subscriptions detach, so
    /// this may be called from a listener that the close itself removes.
    pub fn close(&self) {
        let resources = {
            let mut resources = self.lock();
            if self.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            std::mem::take(&mut *resources)
        };

        if let Some(hook) = resources.teardown {
            if let Err(e) = hook() {
                tracing::warn!(view = %self.name, error = %e, "Teardown hook failed");
            }
        }

        self.token.cancel();
        let timers = resources.timers.len();
        for (_, timer) in resources.timers {
            timer.cancel();
        }

        let subscriptions = resources.subscriptions.len();
        for subscription in &resources.subscriptions {
            release(&self.name, subscription.as_ref());
        }

        tracing::debug!(view = %self.name, timers, subscriptions, "View closed");
    }

    fn lock(&self) -> MutexGuard<'_, Resources> {
        self.resources.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.close();
    }
}

fn release(view: &str, subscription: &dyn Detach) {
    if let Err(e) = subscription.detach() {
        tracing::debug!(view, error = %e, "Listener already gone");
    }
}

/// Runs `fut` unless `token` is cancelled first, and discards its output if
/// the token was cancelled by the time it completed.
pub async fn guarded<F: Future>(token: &CancellationToken, fut: F) -> Option<F::Output> {
    let output = tokio::select! {
        _ = token.cancelled() => return None,
        output = fut => output,
    };
    if token.is_cancelled() {
        return None;
    }
    Some(output)
}
