use crate::console::input::{ConsoleCommand, HELP};
use crate::console::screen::{run_screen_loop, Screen};
use crate::core::settings::{parse_entity_ref, Settings, WatchSettings};
use crate::core::store::ModelRegistry;
use crate::core::transport::RestClient;
use crate::ui::PanelStyle;
use crate::view::Closeable;
use crate::views::{
    ActivityOptions, ActivityView, Refreshable, SensorsView, ServerStatusView, ViewContext,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

enum OpenView {
    Status(Arc<ServerStatusView>),
    Activity(Arc<ActivityView>),
    Sensors(Arc<SensorsView>),
}

impl OpenView {
    fn refresh_now(&self) {
        match self {
            OpenView::Status(view) => view.refresh_now(),
            OpenView::Activity(view) => view.refresh_now(),
            OpenView::Sensors(view) => view.refresh_now(),
        }
    }

    fn close(&self) {
        match self {
            OpenView::Status(view) => view.close(),
            OpenView::Activity(view) => view.close(),
            OpenView::Sensors(view) => view.close(),
        }
    }

    fn is_closed(&self) -> bool {
        match self {
            OpenView::Status(view) => view.is_closed(),
            OpenView::Activity(view) => view.is_closed(),
            OpenView::Sensors(view) => view.is_closed(),
        }
    }
}

pub async fn run(settings: Settings) -> Result<()> {
    tracing::info!(server = %settings.server.url, "Starting console");

    let transport = Arc::new(RestClient::new(
        &settings.server.url,
        settings.server.request_timeout(),
    )?);
    let registry = Arc::new(ModelRegistry::new(transport));
    let (ui_tx, ui_rx) = mpsc::unbounded_channel();

    let ctx = ViewContext {
        registry: Arc::clone(&registry),
        ui_tx,
        style: PanelStyle::from(&settings.display),
        polling: settings.polling.clone(),
    };

    let views = open_views(&ctx, &settings.watch)?;
    if views.is_empty() {
        anyhow::bail!("Nothing to watch. Enable watch.status or pass --activity / --sensors.");
    }
    drop(ctx);

    let shutdown = CancellationToken::new();
    let screen = tokio::spawn(run_screen_loop(ui_rx, Screen::new(HELP), shutdown.clone()));

    run_input_loop(&views).await;

    tracing::info!("Closing views");
    for view in &views {
        view.close();
    }
    registry.shutdown();
    shutdown.cancel();

    screen.await.context("Screen task failed")?;
    Ok(())
}

fn open_views(ctx: &ViewContext, watch: &WatchSettings) -> Result<Vec<OpenView>> {
    let mut views = Vec::new();

    if watch.status {
        views.push(OpenView::Status(ServerStatusView::open(ctx)?));
    }

    if let Some(task) = &watch.activity {
        let view = ActivityView::open(ctx, activity_options(task))
            .with_context(|| format!("Failed to open activity {task}"))?;
        views.push(OpenView::Activity(view));
    }

    if let Some(sensors) = &watch.sensors {
        let (application, entity) = parse_entity_ref(sensors)?;
        views.push(OpenView::Sensors(SensorsView::open(ctx, &application, &entity)?));
    }

    Ok(views)
}

/// A task given as a path or URL is followed as a link; anything else is an id.
fn activity_options(task: &str) -> ActivityOptions {
    if task.contains('/') {
        ActivityOptions {
            task_id: None,
            task_link: Some(task.to_string()),
        }
    } else {
        ActivityOptions {
            task_id: Some(task.to_string()),
            task_link: None,
        }
    }
}

async fn run_input_loop(views: &[OpenView]) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                return;
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        // stdin closed; keep watching until interrupted
                        let _ = tokio::signal::ctrl_c().await;
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read input");
                        let _ = tokio::signal::ctrl_c().await;
                        return;
                    }
                };

                match ConsoleCommand::parse(&line) {
                    Some(ConsoleCommand::Quit) => return,
                    Some(command) => handle_command(views, command),
                    None if line.trim().is_empty() => {}
                    None => tracing::info!(input = %line.trim(), "Unknown command. {}", HELP),
                }

                if views.iter().all(OpenView::is_closed) {
                    tracing::info!("All views closed");
                    return;
                }
            }
        }
    }
}

fn handle_command(views: &[OpenView], command: ConsoleCommand) {
    match command {
        ConsoleCommand::Refresh => {
            tracing::debug!("Manual refresh");
            for view in views {
                view.refresh_now();
            }
        }
        ConsoleCommand::ToggleAutoRefresh => {
            for view in views {
                if let OpenView::Sensors(sensors) = view {
                    sensors.toggle_auto_refresh();
                }
            }
        }
        ConsoleCommand::ToggleFilterEmpty => {
            for view in views {
                if let OpenView::Sensors(sensors) = view {
                    sensors.toggle_filter_empty();
                }
            }
        }
        ConsoleCommand::Quit => {}
    }
}
