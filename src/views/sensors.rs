use super::{format_age, Refreshable, ViewContext};
use crate::core::error::ViewError;
use crate::core::models::sensors_current_state_path;
use crate::core::store::Model;
use crate::core::transport::Transport;
use crate::ui::colors::{muted_rgb, NEUTRAL_RGB};
use crate::ui::Panel;
use crate::view::refresh::AutoRefresh;
use crate::view::scheduler::{fetch_once, get_repeatedly, ScheduleOptions};
use crate::view::{Closeable, Lifecycle, Region, Renderable, View};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

pub const VIEW_NAME: &str = "sensors";

#[derive(Default)]
struct Snapshot {
    sensors: Option<Value>,
    received: Option<DateTime<Utc>>,
}

/// Current sensor values of one entity, polled while auto-refresh is on.
pub struct SensorsView {
    this: Weak<Self>,
    lifecycle: Lifecycle,
    panel: Arc<Panel>,
    transport: Arc<dyn Transport>,
    path: String,
    auto_refresh: AutoRefresh,
    filter_empty: AtomicBool,
    snapshot: Mutex<Snapshot>,
}

impl SensorsView {
    pub fn open(ctx: &ViewContext, application: &str, entity: &str) -> Result<Arc<Self>, ViewError> {
        let view = Arc::new_cyclic(|this| Self {
            this: this.clone(),
            lifecycle: Lifecycle::new(VIEW_NAME),
            panel: ctx.panel(VIEW_NAME, "sensors"),
            transport: ctx.registry.transport(),
            path: sensors_current_state_path(application, entity),
            auto_refresh: AutoRefresh::default(),
            filter_empty: AtomicBool::new(true),
            snapshot: Mutex::new(Snapshot::default()),
        });

        let panel = Arc::clone(&view.panel);
        let closing = ctx.clone();
        view.lifecycle.on_close(Box::new(move || {
            panel.detach();
            closing.notify_closed(VIEW_NAME);
            Ok(())
        }));
        view.render();

        let options = view.receive_into(
            ctx.schedule_options()
                .with_key("sensors")
                .with_enablement(view.auto_refresh.enablement()),
        );
        get_repeatedly(view.as_ref(), Arc::clone(&view.transport), &view.path, options)?;

        Ok(view)
    }

    pub fn panel(&self) -> &Arc<Panel> {
        &self.panel
    }

    #[allow(dead_code)]
    pub fn is_auto_refresh_active(&self) -> bool {
        self.auto_refresh.is_active()
    }

    /// Pauses or resumes polling. Returns the new state.
    pub fn toggle_auto_refresh(&self) -> bool {
        let active = self.auto_refresh.toggle();
        self.render();
        active
    }

    /// Shows or hides sensors without a value. Returns the new state.
    pub fn toggle_filter_empty(&self) -> bool {
        let filtering = !self.filter_empty.fetch_xor(true, Ordering::SeqCst);
        self.render();
        filtering
    }

    fn receive_into(&self, options: ScheduleOptions) -> ScheduleOptions {
        let weak = self.this.clone();
        options.on_success(move |data| {
            if let Some(view) = weak.upgrade() {
                view.update_with(data.clone());
            }
        })
    }

    fn update_with(&self, sensors: Value) {
        {
            let mut snapshot = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
            snapshot.sensors = Some(sensors);
            snapshot.received = Some(Utc::now());
        }
        if !self.is_closed() {
            self.render();
        }
    }

    fn rows(&self) -> Vec<(String, String)> {
        let snapshot = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(Value::Object(sensors)) = &snapshot.sensors else {
            return Vec::new();
        };

        let filter_empty = self.filter_empty.load(Ordering::SeqCst);
        let mut rows: Vec<(String, String)> = sensors
            .iter()
            .map(|(name, value)| (name.clone(), display_value(value)))
            .filter(|(_, value)| !(filter_empty && value.is_empty()))
            .collect();
        rows.sort();
        rows
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Closeable for SensorsView {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }
}

impl View for SensorsView {
    fn root_region(&self) -> Option<Arc<dyn Region>> {
        Some(self.panel.clone() as Arc<dyn Region>)
    }
}

impl Renderable for SensorsView {
    fn render(&self) {
        let panel = &self.panel;
        let rows = self.rows();
        let received = self
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .received;

        let mut title = format!("Sensors ({})", rows.len());
        if !self.auto_refresh.is_active() {
            title.push_str(" [paused]");
        }
        panel.set_title(title);
        panel.clear();

        let width = rows.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
        for (name, value) in &rows {
            panel.push_line(format!("{name:<width$}  {value}"));
        }
        panel.push_colored(format_age(received, Utc::now()), muted_rgb(NEUTRAL_RGB));
        panel.request_redraw();
    }
}

impl Refreshable for SensorsView {
    fn refresh_now(&self) {
        fetch_once(
            self,
            Model::new(Arc::clone(&self.transport), self.path.as_str()),
            self.receive_into(ScheduleOptions::default().with_key("sensors:now")),
        );
    }
}
