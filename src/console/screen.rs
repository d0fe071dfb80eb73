use crate::ui::Panel;
use crate::view::Region;
use crate::views::UiCommand;
use std::collections::BTreeMap;
use std::io::{IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const DEBOUNCE: Duration = Duration::from_millis(200);
const ANIMATION_FRAME: Duration = Duration::from_millis(100);
const CLEAR: &str = "\x1b[2J\x1b[H";

/// Panels currently on screen, grouped by the view that owns them.
#[derive(Default)]
pub struct Screen {
    views: BTreeMap<String, BTreeMap<String, Arc<Panel>>>,
    footer: String,
}

impl Screen {
    pub fn new(footer: impl Into<String>) -> Self {
        Self {
            views: BTreeMap::new(),
            footer: footer.into(),
        }
    }

    pub fn apply(&mut self, command: UiCommand) {
        match command {
            UiCommand::Render { view, panel } => {
                self.views
                    .entry(view)
                    .or_default()
                    .insert(panel.name().to_string(), panel);
            }
            UiCommand::Closed { view } => {
                self.views.remove(&view);
            }
        }
    }

    pub fn is_animating(&self) -> bool {
        self.panels()
            .any(|panel| panel.is_animating().unwrap_or(false))
    }

    pub fn draw(&self) -> String {
        let mut out = String::new();
        for panel in self.panels() {
            out.push_str(&panel.render());
            out.push('\n');
        }
        out.push_str(&self.footer);
        out.push('\n');
        out
    }

    fn panels(&self) -> impl Iterator<Item = &Arc<Panel>> {
        self.views.values().flat_map(|panels| panels.values())
    }
}

/// Redraws the screen from `ui_rx` until `shutdown` fires or every sender is gone.
pub async fn run_screen_loop(
    mut ui_rx: mpsc::UnboundedReceiver<UiCommand>,
    mut screen: Screen,
    shutdown: CancellationToken,
) {
    let interactive = std::io::stdout().is_terminal();
    let mut frames = tokio::time::interval(ANIMATION_FRAME);
    frames.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            command = ui_rx.recv() => {
                let Some(first) = command else { break };
                tokio::time::sleep(DEBOUNCE).await;

                screen.apply(first);
                while let Ok(command) = ui_rx.try_recv() {
                    screen.apply(command);
                }
                paint(&screen, interactive);
            }
            _ = frames.tick(), if screen.is_animating() => {
                paint(&screen, interactive);
            }
        }
    }

    while let Ok(command) = ui_rx.try_recv() {
        screen.apply(command);
    }
    tracing::debug!("Screen loop stopped");
}

fn paint(screen: &Screen, interactive: bool) {
    let mut stdout = std::io::stdout().lock();
    let frame = screen.draw();
    let result = if interactive {
        write!(stdout, "{CLEAR}{frame}")
    } else {
        writeln!(stdout, "{frame}")
    };
    if let Err(e) = result.and_then(|_| stdout.flush()) {
        tracing::debug!(error = %e, "Failed to write to terminal");
    }
}
