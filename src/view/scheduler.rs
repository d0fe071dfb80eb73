//! Repeated fetching of a resource on behalf of a view.
//!
//! Each scheduled resource gets one loop: wait, fetch, report, and only then
//! arm the next wait. A slow server therefore slows the loop down instead of
//! piling up requests. Failures double the wait up to a ceiling; the first
//! success puts it back to the base period.

use crate::core::error::{FetchError, ViewError};
use crate::core::retry::{Backoff, DEFAULT_MAX_PERIOD, DEFAULT_PERIOD};
use crate::core::store::{FetchOptions, Model, Resource};
use crate::core::transport::Transport;
use crate::view::lifecycle::guarded;
use crate::view::loading::{cancel_loading, indicate_loading, Region};
use crate::view::View;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub type SuccessCallback = Arc<dyn Fn(&Value) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&FetchError) + Send + Sync>;
pub type Enablement = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub enum FadeTarget {
    #[default]
    ViewRoot,
    Region(Arc<dyn Region>),
    Disabled,
}

#[derive(Clone)]
pub struct ScheduleOptions {
    pub period: Duration,
    pub backoff_max_period: Duration,
    pub doitnow: bool,
    pub enablement: Option<Enablement>,
    pub fetch_options: FetchOptions,
    pub fade_target: FadeTarget,
    pub success: Option<SuccessCallback>,
    pub error: Option<ErrorCallback>,
    /// Timer key on the owning view. Defaults to one derived from the resource URL.
    pub key: Option<String>,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            backoff_max_period: DEFAULT_MAX_PERIOD,
            doitnow: false,
            enablement: None,
            fetch_options: FetchOptions::default(),
            fade_target: FadeTarget::ViewRoot,
            success: None,
            error: None,
            key: None,
        }
    }
}

impl ScheduleOptions {
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn with_backoff_max_period(mut self, max: Duration) -> Self {
        self.backoff_max_period = max;
        self
    }

    pub fn doitnow(mut self, doitnow: bool) -> Self {
        self.doitnow = doitnow;
        self
    }

    pub fn with_enablement(mut self, enablement: Enablement) -> Self {
        self.enablement = Some(enablement);
        self
    }

    pub fn with_fetch_options(mut self, fetch_options: FetchOptions) -> Self {
        self.fetch_options = fetch_options;
        self
    }

    pub fn with_fade_target(mut self, fade_target: FadeTarget) -> Self {
        self.fade_target = fade_target;
        self
    }

    pub fn on_success(mut self, callback: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.success = Some(Arc::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&FetchError) + Send + Sync + 'static) -> Self {
        self.error = Some(Arc::new(callback));
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    fn validate(&self) -> Result<(), ViewError> {
        if self.period.is_zero() {
            return Err(ViewError::InvalidOption {
                option: "period",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.backoff_max_period < self.period {
            return Err(ViewError::InvalidOption {
                option: "backoff_max_period",
                reason: format!(
                    "{:?} is shorter than the base period {:?}",
                    self.backoff_max_period, self.period
                ),
            });
        }
        Ok(())
    }
}

/// One polling loop against one resource.
pub struct FetchTask {
    view: String,
    resource: Arc<dyn Resource>,
    backoff: Backoff,
    enablement: Option<Enablement>,
    fetch_options: FetchOptions,
    fade_target: Option<Arc<dyn Region>>,
    success: Option<SuccessCallback>,
    error: Option<ErrorCallback>,
    has_loading_problem: bool,
}

impl FetchTask {
    fn new<V: View + ?Sized>(view: &V, resource: Arc<dyn Resource>, options: ScheduleOptions) -> Self {
        let fade_target = match options.fade_target {
            FadeTarget::ViewRoot => view.root_region(),
            FadeTarget::Region(region) => Some(region),
            FadeTarget::Disabled => None,
        };

        Self {
            view: view.lifecycle().name().to_string(),
            resource,
            backoff: Backoff::new(options.period, options.backoff_max_period),
            enablement: options.enablement,
            fetch_options: options.fetch_options,
            fade_target,
            success: options.success,
            error: options.error,
            has_loading_problem: false,
        }
    }

    fn is_enabled(&self) -> bool {
        self.enablement.as_ref().map_or(true, |enabled| enabled())
    }

    #[allow(dead_code)]
    pub fn current_period(&self) -> Duration {
        self.backoff.current_period()
    }

    #[allow(dead_code)]
    pub fn has_loading_problem(&self) -> bool {
        self.has_loading_problem
    }

    async fn run(mut self, token: CancellationToken, doitnow: bool) {
        let mut delay = if doitnow {
            Duration::ZERO
        } else {
            self.backoff.current_period()
        };

        loop {
            if guarded(&token, tokio::time::sleep(delay)).await.is_none() {
                return;
            }

            if !self.is_enabled() {
                tracing::trace!(view = %self.view, url = self.resource.url(), "Refresh paused, skipping fetch");
                delay = self.backoff.current_period();
                continue;
            }

            if !self.fetch_and_report(&token).await {
                return;
            }
            delay = self.backoff.current_period();
        }
    }

    /// Returns false if the view went away before the fetch was fully reported.
    async fn fetch_and_report(&mut self, token: &CancellationToken) -> bool {
        let resource = Arc::clone(&self.resource);
        let Some(outcome) = guarded(token, resource.fetch(&self.fetch_options)).await else {
            tracing::debug!(view = %self.view, url = resource.url(), "Discarding fetch for closed view");
            return false;
        };

        match outcome {
            Ok(data) => self.on_success(token, &data),
            Err(e) => self.on_failure(token, &e),
        }
    }

    /// Callbacks may close the view, or another thread may. Either way the
    /// fade and backoff are left untouched once the token is cancelled.
    fn still_open(&self, token: &CancellationToken) -> bool {
        if token.is_cancelled() {
            tracing::debug!(view = %self.view, url = self.resource.url(), "View closed during callback");
            return false;
        }
        true
    }

    fn on_success(&mut self, token: &CancellationToken, data: &Value) -> bool {
        if let Some(success) = &self.success {
            success(data);
        }
        if !self.still_open(token) {
            return false;
        }

        if self.has_loading_problem {
            self.has_loading_problem = false;
            tracing::info!(
                view = %self.view,
                url = self.resource.url(),
                failures = self.backoff.consecutive_failures(),
                "Refresh recovered"
            );
        }

        if let Some(region) = &self.fade_target {
            cancel_loading(region.as_ref());
        }
        self.backoff.record_success();
        true
    }

    fn on_failure(&mut self, token: &CancellationToken, error: &FetchError) -> bool {
        if let Some(on_error) = &self.error {
            on_error(error);
        }
        if !self.still_open(token) {
            return false;
        }

        self.backoff.record_failure();
        if self.has_loading_problem {
            tracing::debug!(
                view = %self.view,
                error = %error,
                consecutive_failures = self.backoff.consecutive_failures(),
                period_ms = self.backoff.current_period().as_millis() as u64,
                "Refresh still failing"
            );
        } else {
            self.has_loading_problem = true;
            tracing::warn!(
                view = %self.view,
                error = %error,
                period_ms = self.backoff.current_period().as_millis() as u64,
                "Unable to refresh, backing off"
            );
        }

        if let Some(region) = &self.fade_target {
            indicate_loading(region.as_ref());
        }
        true
    }
}

fn timer_key(prefix: &str, options: &ScheduleOptions, resource: &dyn Resource) -> String {
    options
        .key
        .clone()
        .unwrap_or_else(|| format!("{prefix}:{}", resource.url()))
}

/// Keeps `resource` refreshed for as long as `view` stays open.
///
/// Scheduling the same key again replaces the earlier loop. Returns
/// `Ok(false)` without scheduling anything if the view is already closed.
pub fn schedule_fetch<V: View + ?Sized>(
    view: &V,
    resource: Arc<dyn Resource>,
    options: ScheduleOptions,
) -> Result<bool, ViewError> {
    options.validate()?;

    let key = timer_key("fetch", &options, resource.as_ref());
    let doitnow = options.doitnow;
    let task = FetchTask::new(view, resource, options);

    Ok(view
        .lifecycle()
        .register_task(&key, move |token| task.run(token, doitnow)))
}

/// A single guarded fetch: same enablement, fade and callback handling as
/// [`schedule_fetch`], but nothing is rescheduled.
pub fn fetch_once<V: View + ?Sized>(
    view: &V,
    resource: Arc<dyn Resource>,
    options: ScheduleOptions,
) -> bool {
    let key = timer_key("once", &options, resource.as_ref());
    let mut task = FetchTask::new(view, resource, options);

    view.lifecycle().register_task(&key, move |token| async move {
        if task.is_enabled() {
            task.fetch_and_report(&token).await;
        }
    })
}

/// Polls a bare URL, handing each response to the options' success callback.
pub fn get_repeatedly<V: View + ?Sized>(
    view: &V,
    transport: Arc<dyn Transport>,
    path: &str,
    options: ScheduleOptions,
) -> Result<bool, ViewError> {
    schedule_fetch(view, Model::new(transport, path), options)
}
