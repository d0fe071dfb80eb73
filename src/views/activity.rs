use super::{format_time, rerender_on, Refreshable, ViewContext};
use crate::core::error::ViewError;
use crate::core::models::{activity_children_path, activity_path, TaskSummary};
use crate::core::store::{EventKind, FetchOptions, Model};
use crate::ui::colors::{muted_rgb, status_rgb, FAILED_RGB, NEUTRAL_RGB};
use crate::ui::Panel;
use crate::view::loading::indicate_loading;
use crate::view::scheduler::{fetch_once, schedule_fetch, FadeTarget, ScheduleOptions};
use crate::view::{Closeable, Lifecycle, Region, Renderable, View};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};

pub const VIEW_NAME: &str = "activity";

/// Which task to show. At least one of the two must be set; the id wins.
#[derive(Debug, Clone, Default)]
pub struct ActivityOptions {
    pub task_id: Option<String>,
    /// Server link to the task, e.g. `/v1/activities/{id}`.
    pub task_link: Option<String>,
}

impl ActivityOptions {
    fn task_path(&self) -> Result<String, ViewError> {
        if let Some(id) = self.task_id.as_deref().filter(|id| !id.is_empty()) {
            return Ok(activity_path(id));
        }
        self.task_link
            .as_deref()
            .filter(|link| !link.is_empty())
            .map(str::to_string)
            .ok_or(ViewError::MissingOption("task_id or task_link"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Children {
    Pending,
    Polling,
    Unavailable,
}

/// Details of one task, with its children polled into a panel of their own.
pub struct ActivityView {
    lifecycle: Lifecycle,
    ctx: ViewContext,
    details: Arc<Panel>,
    children_panel: Arc<Panel>,
    task: Arc<Model>,
    children: Mutex<Option<Arc<Model>>>,
    children_state: Mutex<Children>,
}

impl ActivityView {
    pub fn open(ctx: &ViewContext, options: ActivityOptions) -> Result<Arc<Self>, ViewError> {
        let task_path = options.task_path()?;

        let view = Arc::new(Self {
            lifecycle: Lifecycle::new(VIEW_NAME),
            ctx: ctx.clone(),
            details: ctx.panel(VIEW_NAME, "activity"),
            children_panel: ctx.panel(VIEW_NAME, "children"),
            task: ctx.registry.model(&task_path),
            children: Mutex::new(None),
            children_state: Mutex::new(Children::Pending),
        });
        view.details.set_title("Task");
        view.children_panel.set_title("Children");

        let details = Arc::clone(&view.details);
        let children_panel = Arc::clone(&view.children_panel);
        let closing = ctx.clone();
        view.lifecycle.on_close(Box::new(move || {
            details.detach();
            children_panel.detach();
            closing.notify_closed(VIEW_NAME);
            Ok(())
        }));

        rerender_on(&view, &view.task, &[EventKind::Change, EventKind::Reset]);

        if view.task.data().is_none() {
            indicate_loading(view.details.as_ref());
        }
        view.render();

        // The children link is only known once the task itself has loaded.
        let on_loaded = Arc::downgrade(&view);
        let on_failed = Arc::downgrade(&view);
        fetch_once(
            view.as_ref(),
            view.task.clone(),
            ScheduleOptions::default()
                .with_key("initial")
                .on_success(move |data| {
                    if let Some(view) = on_loaded.upgrade() {
                        if let Err(e) = view.start_polling(data) {
                            tracing::warn!(error = %e, "Could not poll task");
                        }
                    }
                })
                .on_error(move |e| {
                    if let Some(view) = on_failed.upgrade() {
                        tracing::warn!(url = e.url(), error = %e, "Task not available");
                        view.set_children_state(Children::Unavailable);
                        view.render();
                    }
                }),
        );

        Ok(view)
    }

    pub fn details(&self) -> &Arc<Panel> {
        &self.details
    }

    pub fn children_panel(&self) -> &Arc<Panel> {
        &self.children_panel
    }

    fn start_polling(self: &Arc<Self>, data: &Value) -> Result<(), ViewError> {
        schedule_fetch(
            self.as_ref(),
            self.task.clone(),
            self.ctx
                .schedule_options()
                .with_key("task")
                .doitnow(false),
        )?;

        let Some(children_path) = children_path(data) else {
            self.set_children_state(Children::Unavailable);
            self.render();
            return Ok(());
        };

        let children = self.ctx.registry.model(&children_path);
        rerender_on(self, &children, &[EventKind::Reset]);
        *self.children.lock().unwrap_or_else(PoisonError::into_inner) = Some(children.clone());
        self.set_children_state(Children::Polling);

        schedule_fetch(
            self.as_ref(),
            children,
            self.ctx
                .schedule_options()
                .with_key("children")
                .doitnow(true)
                .with_fetch_options(FetchOptions::reset())
                .with_fade_target(FadeTarget::Region(self.children_panel.clone())),
        )?;
        Ok(())
    }

    fn children_model(&self) -> Option<Arc<Model>> {
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn children_state(&self) -> Children {
        *self
            .children_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_children_state(&self, state: Children) {
        *self
            .children_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn render_details(&self) {
        let panel = &self.details;
        panel.clear();

        let Some(task) = self
            .task
            .data()
            .and_then(|data| serde_json::from_value::<TaskSummary>(data).ok())
        else {
            panel.push_colored("Loading...", NEUTRAL_RGB);
            return;
        };

        panel.set_title(format!(
            "Task {}",
            task.display_name.as_deref().unwrap_or(&task.id)
        ));
        let status = task.current_status.as_deref().unwrap_or("UNKNOWN");
        panel.push_colored(format!("Status:    {status}"), status_rgb(status));
        if task.is_error {
            panel.push_colored("Task failed", FAILED_RGB);
        }
        if let Some(entity) = &task.entity_display_name {
            panel.push_line(format!("Entity:    {entity}"));
        }
        panel.push_line(format!("Submitted: {}", format_time(task.submitted_at())));
        panel.push_line(format!("Ended:     {}", format_time(task.ended_at())));
        panel.push_colored(format!("Id:        {}", task.id), muted_rgb(NEUTRAL_RGB));
    }

    fn render_children(&self) {
        let panel = &self.children_panel;
        panel.clear();

        match self.children_state() {
            Children::Pending => panel.push_colored("Loading...", NEUTRAL_RGB),
            Children::Unavailable => panel.push_colored("(unavailable)", muted_rgb(NEUTRAL_RGB)),
            Children::Polling => {
                let children: Vec<TaskSummary> = self
                    .children_model()
                    .and_then(|model| model.data())
                    .and_then(|data| serde_json::from_value(data).ok())
                    .unwrap_or_default();

                panel.set_title(format!("Children ({})", children.len()));
                if children.is_empty() {
                    panel.push_colored("(none)", muted_rgb(NEUTRAL_RGB));
                }
                for child in &children {
                    let status = child.current_status.as_deref().unwrap_or("UNKNOWN");
                    panel.push_colored(
                        format!(
                            "{:<40} {}",
                            child.display_name.as_deref().unwrap_or(&child.id),
                            status
                        ),
                        status_rgb(status),
                    );
                }
            }
        }
    }
}

fn children_path(task: &Value) -> Option<String> {
    let task: TaskSummary = serde_json::from_value(task.clone()).ok()?;
    task.links
        .children
        .filter(|link| !link.is_empty())
        .or_else(|| Some(activity_children_path(&task.id)))
}

impl Closeable for ActivityView {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }
}

impl View for ActivityView {
    fn root_region(&self) -> Option<Arc<dyn Region>> {
        Some(self.details.clone() as Arc<dyn Region>)
    }
}

impl Renderable for ActivityView {
    fn render(&self) {
        self.render_details();
        self.render_children();
        self.details.request_redraw();
        self.children_panel.request_redraw();
    }
}

impl Refreshable for ActivityView {
    fn refresh_now(&self) {
        fetch_once(
            self,
            self.task.clone(),
            ScheduleOptions::default().with_key("task:now"),
        );
        if let Some(children) = self.children_model() {
            fetch_once(
                self,
                children,
                ScheduleOptions::default()
                    .with_key("children:now")
                    .with_fetch_options(FetchOptions::reset())
                    .with_fade_target(FadeTarget::Region(self.children_panel.clone())),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::fake::ScriptedTransport;
    use crate::views::testing::{context, drain};
    use serde_json::json;
    use std::time::Duration;

    fn task(status: &str, children_link: Option<&str>) -> Value {
        let mut links = json!({"self": "/v1/activities/t1"});
        if let Some(link) = children_link {
            links["children"] = json!(link);
        }
        json!({
            "id": "t1",
            "displayName": "start petclinic",
            "entityDisplayName": "petclinic",
            "currentStatus": status,
            "submitTimeUtc": 1_700_000_000_000_i64,
            "endTimeUtc": -1,
            "isError": false,
            "links": links
        })
    }

    #[test]
    fn test_missing_task_is_rejected() {
        let (ctx, _ui_rx) = context(Arc::new(ScriptedTransport::new()));

        let err = ActivityView::open(&ctx, ActivityOptions::default())
            .err()
            .expect("open without a task fails");
        assert!(matches!(err, ViewError::MissingOption(_)));

        let blank = ActivityOptions {
            task_id: Some(String::new()),
            task_link: None,
        };
        assert!(ActivityView::open(&ctx, blank).is_err());
        assert_eq!(ctx.registry.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loads_task_then_polls_children() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply("v1/activities/t1", task("In progress", Some("v1/activities/t1/children")));
        transport.reply(
            "v1/activities/t1/children",
            json!([{"id": "c1", "displayName": "provision", "currentStatus": "Completed"}]),
        );
        let (ctx, mut ui_rx) = context(transport.clone());

        let view = ActivityView::open(
            &ctx,
            ActivityOptions {
                task_id: Some("t1".to_string()),
                task_link: None,
            },
        )
        .unwrap();
        assert!(view.details().is_stale());

        tokio::time::sleep(Duration::from_millis(100)).await;
        let (panels, _) = drain(&mut ui_rx);
        assert!(panels["activity"].contains("Task start petclinic"));
        assert!(panels["activity"].contains("In progress"));
        assert!(panels["children"].contains("Children (1)"));
        assert!(panels["children"].contains("provision"));
        assert!(!view.details().is_stale());

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(transport.requests("v1/activities/t1"), 2);
        assert_eq!(transport.requests("v1/activities/t1/children"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_children_failure_fades_only_children() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply("/v1/activities/t1", task("In progress", None));
        transport.fail("v1/activities/t1/children", 500);
        let (ctx, _ui_rx) = context(transport.clone());

        let view = ActivityView::open(
            &ctx,
            ActivityOptions {
                task_id: None,
                task_link: Some("/v1/activities/t1".to_string()),
            },
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.requests("v1/activities/t1/children"), 1);
        assert!(view.children_panel().is_stale());
        assert!(!view.details().is_stale());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_task_shows_no_children() {
        let transport = Arc::new(ScriptedTransport::new());
        let (ctx, _ui_rx) = context(transport.clone());

        let view = ActivityView::open(
            &ctx,
            ActivityOptions {
                task_id: Some("gone".to_string()),
                task_link: None,
            },
        )
        .unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.requests("v1/activities/gone"), 1);
        assert!(view.children_panel().render().contains("(unavailable)"));
        assert!(view.details().is_stale());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_detaches_both_panels() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply("v1/activities/t1", task("In progress", Some("v1/activities/t1/children")));
        transport.reply("v1/activities/t1/children", json!([]));
        let (ctx, mut ui_rx) = context(transport.clone());

        let view = ActivityView::open(
            &ctx,
            ActivityOptions {
                task_id: Some("t1".to_string()),
                task_link: None,
            },
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        view.close();
        assert_eq!(view.lifecycle.timer_count(), 0);
        assert!(view.children_panel().opacity().is_err());
        assert!(view.details().opacity().is_err());

        let (_, closed) = drain(&mut ui_rx);
        assert_eq!(closed, vec![VIEW_NAME.to_string()]);
    }
}
