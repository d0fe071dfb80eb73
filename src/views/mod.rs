mod activity;
mod sensors;
mod status;

use crate::core::settings::PollingSettings;
use crate::core::store::{EventKind, Model, ModelEvent, ModelRegistry};
use crate::ui::{Panel, PanelStyle};
use crate::view::scheduler::ScheduleOptions;
use crate::view::{Closeable, Renderable};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;

pub use activity::{ActivityOptions, ActivityView};
pub use sensors::SensorsView;
pub use status::ServerStatusView;

#[derive(Clone)]
pub enum UiCommand {
    Render { view: String, panel: Arc<Panel> },
    Closed { view: String },
}

/// Everything a view needs from the application, injected at construction.
#[derive(Clone)]
pub struct ViewContext {
    pub registry: Arc<ModelRegistry>,
    pub ui_tx: mpsc::UnboundedSender<UiCommand>,
    pub style: PanelStyle,
    pub polling: PollingSettings,
}

impl ViewContext {
    pub fn schedule_options(&self) -> ScheduleOptions {
        ScheduleOptions::default()
            .with_period(self.polling.period())
            .with_backoff_max_period(self.polling.backoff_max_period())
            .doitnow(self.polling.doitnow)
    }

    /// A panel whose redraws are forwarded to the screen under `view`.
    pub fn panel(&self, view: &str, name: &str) -> Arc<Panel> {
        let panel = Panel::new(name, self.style);
        let weak = Arc::downgrade(&panel);
        let ui_tx = self.ui_tx.clone();
        let view = view.to_string();

        panel.on_redraw(Box::new(move || {
            if let Some(panel) = weak.upgrade() {
                let _ = ui_tx.send(UiCommand::Render {
                    view: view.clone(),
                    panel,
                });
            }
        }));
        panel
    }

    pub fn notify_closed(&self, view: &str) {
        let _ = self.ui_tx.send(UiCommand::Closed {
            view: view.to_string(),
        });
    }
}

/// Manual refresh, outside the polling schedule.
pub trait Refreshable {
    fn refresh_now(&self);
}

/// Re-renders `view` whenever `model` emits one of `kinds`, until the view closes.
pub(crate) fn rerender_on<V>(view: &Arc<V>, model: &Arc<Model>, kinds: &[EventKind])
where
    V: Renderable + Closeable + Send + Sync + 'static,
{
    for kind in kinds {
        let weak = Arc::downgrade(view);
        let subscription = model.on(
            *kind,
            Arc::new(move |_: &ModelEvent| {
                if let Some(view) = weak.upgrade() {
                    if !view.is_closed() {
                        view.render();
                    }
                }
            }),
        );
        view.lifecycle().listen(subscription);
    }
}

pub(crate) fn format_age(synced: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(synced) = synced else {
        return "never updated".to_string();
    };

    let seconds = (now - synced).num_seconds();
    if seconds < 1 {
        return "updated just now".to_string();
    }

    let minutes = seconds / 60;
    let hours = minutes / 60;
    if hours > 0 {
        format!("updated {}h {:02}m ago", hours, minutes % 60)
    } else if minutes > 0 {
        format!("updated {}m {:02}s ago", minutes, seconds % 60)
    } else {
        format!("updated {}s ago", seconds)
    }
}

pub(crate) fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.format("%-d %b %Y %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::core::transport::fake::ScriptedTransport;
    use std::collections::HashMap;

    pub fn context(transport: Arc<ScriptedTransport>) -> (ViewContext, mpsc::UnboundedReceiver<UiCommand>) {
        let (ui_tx, ui_rx) = mpsc::unbounded_channel();
        let ctx = ViewContext {
            registry: Arc::new(ModelRegistry::new(transport)),
            ui_tx,
            style: PanelStyle {
                color: false,
                ..PanelStyle::default()
            },
            polling: PollingSettings {
                period_ms: 1_000,
                backoff_max_period_ms: 8_000,
                doitnow: true,
            },
        };
        (ctx, ui_rx)
    }

    /// Latest rendering of every panel, keyed by panel name, plus closed views.
    pub fn drain(ui_rx: &mut mpsc::UnboundedReceiver<UiCommand>) -> (HashMap<String, String>, Vec<String>) {
        let mut panels = HashMap::new();
        let mut closed = Vec::new();
        while let Ok(command) = ui_rx.try_recv() {
            match command {
                UiCommand::Render { panel, .. } => {
                    use crate::view::Region;
                    panels.insert(panel.name().to_string(), panel.render());
                }
                UiCommand::Closed { view } => closed.push(view),
            }
        }
        (panels, closed)
    }
}
