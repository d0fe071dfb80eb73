use super::{format_age, rerender_on, Refreshable, ViewContext};
use crate::core::error::{FetchError, ViewError};
use crate::core::models::{ApplicationSummary, APPLICATIONS_PATH};
use crate::core::store::{EventKind, FetchOptions, Model, ModelEvent};
use crate::ui::colors::{muted_rgb, status_rgb, FAILED_RGB, NEUTRAL_RGB, RUNNING_RGB};
use crate::ui::Panel;
use crate::view::loading::indicate_loading;
use crate::view::scheduler::{fetch_once, schedule_fetch, FadeTarget, ScheduleOptions};
use crate::view::{Closeable, Lifecycle, Region, Renderable, View};
use chrono::Utc;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

pub const VIEW_NAME: &str = "status";
const AGE_TICK: Duration = Duration::from_secs(1);

/// Server liveness plus the list of deployed applications.
pub struct ServerStatusView {
    lifecycle: Lifecycle,
    panel: Arc<Panel>,
    status: Arc<Model>,
    applications: Arc<Model>,
    last_error: Mutex<Option<String>>,
}

impl ServerStatusView {
    pub fn open(ctx: &ViewContext) -> Result<Arc<Self>, ViewError> {
        let view = Arc::new(Self {
            lifecycle: Lifecycle::new(VIEW_NAME),
            panel: ctx.panel(VIEW_NAME, "status"),
            status: ctx.registry.server_status(),
            applications: ctx.registry.model(APPLICATIONS_PATH),
            last_error: Mutex::new(None),
        });
        view.panel.set_title("Brooklyn server");

        let panel = Arc::clone(&view.panel);
        let closing = ctx.clone();
        view.lifecycle.on_close(Box::new(move || {
            panel.detach();
            closing.notify_closed(VIEW_NAME);
            Ok(())
        }));

        rerender_on(&view, &view.status, &[EventKind::Sync]);
        rerender_on(&view, &view.applications, &[EventKind::Reset]);
        close_on_destroy(&view, &view.status);

        let ticking = Arc::downgrade(&view);
        view.lifecycle.register_periodic(Some("age"), AGE_TICK, move || {
            if let Some(view) = ticking.upgrade() {
                view.render();
            }
        });

        if view.status.data().is_none() {
            indicate_loading(view.panel.as_ref());
        }
        view.render();

        schedule_fetch(
            view.as_ref(),
            view.status.clone(),
            with_error_tracking(&view, ctx.schedule_options().with_key("status")),
        )?;
        schedule_fetch(
            view.as_ref(),
            view.applications.clone(),
            ctx.schedule_options()
                .with_key("applications")
                .with_fetch_options(FetchOptions::reset())
                .with_fade_target(FadeTarget::Disabled),
        )?;

        Ok(view)
    }

    pub fn panel(&self) -> &Arc<Panel> {
        &self.panel
    }

    fn set_error(&self, error: Option<String>) {
        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = error;
    }

    fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn with_error_tracking(
    view: &Arc<ServerStatusView>,
    options: ScheduleOptions,
) -> ScheduleOptions {
    let on_ok: Weak<ServerStatusView> = Arc::downgrade(view);
    let on_err = on_ok.clone();

    options
        .on_success(move |_| {
            if let Some(view) = on_ok.upgrade() {
                if view.last_error().is_some() {
                    view.set_error(None);
                    view.render();
                }
            }
        })
        .on_error(move |e: &FetchError| {
            if let Some(view) = on_err.upgrade() {
                view.set_error(Some(e.to_string()));
                view.render();
            }
        })
}

/// Closes `view` once the shared model it depends on is destroyed.
fn close_on_destroy<V>(view: &Arc<V>, model: &Arc<Model>)
where
    V: Closeable + Send + Sync + 'static,
{
    let weak = Arc::downgrade(view);
    let subscription = model.on(
        EventKind::Destroy,
        Arc::new(move |_: &ModelEvent| {
            if let Some(view) = weak.upgrade() {
                view.close();
            }
        }),
    );
    view.lifecycle().listen(subscription);
}

impl Closeable for ServerStatusView {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }
}

impl View for ServerStatusView {
    fn root_region(&self) -> Option<Arc<dyn Region>> {
        Some(self.panel.clone() as Arc<dyn Region>)
    }
}

impl Renderable for ServerStatusView {
    fn render(&self) {
        let panel = &self.panel;
        panel.clear();

        match self.status.data() {
            Some(up) if up.as_bool() == Some(true) => panel.push_colored("Server: up", RUNNING_RGB),
            Some(_) => panel.push_colored("Server: not up", FAILED_RGB),
            None => panel.push_colored("Server: connecting...", NEUTRAL_RGB),
        }

        if let Some(error) = self.last_error() {
            panel.push_colored(format!("Last refresh failed: {error}"), FAILED_RGB);
        }

        let applications: Vec<ApplicationSummary> = self
            .applications
            .data()
            .and_then(|data| serde_json::from_value(data).ok())
            .unwrap_or_default();

        panel.push_line(format!("Applications ({})", applications.len()));
        for app in &applications {
            let status = app.status.as_deref().unwrap_or("UNKNOWN");
            panel.push_colored(
                format!("  {:<30} {}", app.display_name(), status),
                status_rgb(status),
            );
        }

        panel.push_colored(
            format_age(self.status.last_synced(), Utc::now()),
            muted_rgb(NEUTRAL_RGB),
        );
        panel.request_redraw();
    }
}

impl Refreshable for ServerStatusView {
    fn refresh_now(&self) {
        fetch_once(
            self,
            self.status.clone(),
            ScheduleOptions::default().with_key("status:now"),
        );
        fetch_once(
            self,
            self.applications.clone(),
            ScheduleOptions::default()
                .with_key("applications:now")
                .with_fetch_options(FetchOptions::reset())
                .with_fade_target(FadeTarget::Disabled),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::SERVER_UP_PATH;
    use crate::core::transport::fake::ScriptedTransport;
    use crate::views::testing::{context, drain};
    use serde_json::json;

    fn transport() -> Arc<ScriptedTransport> {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply(SERVER_UP_PATH, json!(true));
        transport.reply(
            APPLICATIONS_PATH,
            json!([
                {"id": "a1", "spec": {"name": "petclinic"}, "status": "RUNNING"},
                {"id": "a2", "status": "STARTING"}
            ]),
        );
        transport
    }

    #[tokio::test(start_paused = true)]
    async fn test_renders_status_and_applications() {
        let transport = transport();
        let (ctx, mut ui_rx) = context(transport.clone());

        let view = ServerStatusView::open(&ctx).unwrap();
        assert!(view.panel().is_stale());

        tokio::time::sleep(Duration::from_millis(100)).await;
        let (panels, _) = drain(&mut ui_rx);
        let rendered = &panels["status"];

        assert!(rendered.contains("Server: up"));
        assert!(rendered.contains("Applications (2)"));
        assert!(rendered.contains("petclinic"));
        assert!(rendered.contains("a2"));
        assert!(!rendered.contains("(stale)"));
        assert!(!view.panel().is_stale());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_fades_and_recovers() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail(SERVER_UP_PATH, 503).reply(SERVER_UP_PATH, json!(true));
        transport.reply(APPLICATIONS_PATH, json!([]));
        let (ctx, mut ui_rx) = context(transport.clone());

        let view = ServerStatusView::open(&ctx).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(view.panel().render().contains("Last refresh failed"));

        // backoff doubles the 1s base period
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert_eq!(transport.requests(SERVER_UP_PATH), 2);

        let (panels, _) = drain(&mut ui_rx);
        let rendered = &panels["status"];
        assert!(rendered.contains("Server: up"));
        assert!(!rendered.contains("Last refresh failed"));
        assert!(!rendered.contains("(stale)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_stops_polling_and_notifies() {
        let transport = transport();
        let (ctx, mut ui_rx) = context(transport.clone());

        let view = ServerStatusView::open(&ctx).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        view.close();
        let polled = transport.requests(SERVER_UP_PATH);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.requests(SERVER_UP_PATH), polled);

        let (_, closed) = drain(&mut ui_rx);
        assert_eq!(closed, vec![VIEW_NAME.to_string()]);
        assert_eq!(view.status.listener_count(), 0);
        assert!(!view.status.is_destroyed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_shutdown_closes_view() {
        let transport = transport();
        let (ctx, mut ui_rx) = context(transport.clone());

        let view = ServerStatusView::open(&ctx).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        ctx.registry.shutdown();

        assert!(view.is_closed());
        assert_eq!(view.lifecycle.timer_count(), 0);
        let (_, closed) = drain(&mut ui_rx);
        assert_eq!(closed, vec![VIEW_NAME.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_now_fetches_out_of_schedule() {
        let transport = transport();
        let (mut ctx, _ui_rx) = context(transport.clone());
        ctx.polling.doitnow = false;
        ctx.polling.period_ms = 60_000;
        ctx.polling.backoff_max_period_ms = 60_000;

        let view = ServerStatusView::open(&ctx).unwrap();
        view.refresh_now();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(transport.requests(SERVER_UP_PATH), 1);
        assert_eq!(transport.requests(APPLICATIONS_PATH), 1);
        assert!(view.panel().render().contains("petclinic"));
    }
}
