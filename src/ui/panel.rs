use crate::core::error::RegionError;
use crate::core::settings::DisplaySettings;
use crate::ui::colors::{faded_rgb, paint, HEADER_RGB, NEUTRAL_RGB};
use crate::view::loading::Region;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct PanelStyle {
    pub color: bool,
    pub stale_opacity: f32,
    pub fade: Duration,
}

impl Default for PanelStyle {
    fn default() -> Self {
        Self::from(&DisplaySettings::default())
    }
}

impl From<&DisplaySettings> for PanelStyle {
    fn from(display: &DisplaySettings) -> Self {
        Self {
            color: display.color,
            stale_opacity: display.stale_opacity,
            fade: Duration::from_millis(display.fade_ms),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Fade {
    from: f32,
    to: f32,
    started: Instant,
    duration: Duration,
}

impl Fade {
    fn opacity_at(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return self.to;
        }
        let progress = (now.saturating_duration_since(self.started).as_secs_f32()
            / self.duration.as_secs_f32())
        .min(1.0);
        self.from + (self.to - self.from) * progress
    }

    fn is_done(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) >= self.duration
    }
}

#[derive(Debug)]
struct PanelState {
    title: String,
    lines: Vec<(String, Option<(u8, u8, u8)>)>,
    opacity: f32,
    fade: Option<Fade>,
    detached: bool,
}

pub type RedrawHook = Box<dyn Fn() + Send + Sync>;

/// A titled block of terminal lines that can be faded while its data is stale.
pub struct Panel {
    name: String,
    style: PanelStyle,
    state: Mutex<PanelState>,
    redraw: Mutex<Option<RedrawHook>>,
}

impl Panel {
    pub fn new(name: impl Into<String>, style: PanelStyle) -> Arc<Self> {
        let name = name.into();
        Arc::new(Self {
            state: Mutex::new(PanelState {
                title: name.clone(),
                lines: Vec::new(),
                opacity: 1.0,
                fade: None,
                detached: false,
            }),
            name,
            style,
            redraw: Mutex::new(None),
        })
    }

    /// Installs the hook called whenever the panel's content or opacity changes.
    pub fn on_redraw(&self, hook: RedrawHook) {
        *self.redraw.lock().unwrap_or_else(PoisonError::into_inner) = Some(hook);
    }

    pub fn request_redraw(&self) {
        if let Some(hook) = self
            .redraw
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            hook();
        }
    }

    pub fn set_title(&self, title: impl Into<String>) {
        self.lock().title = title.into();
    }

    pub fn clear(&self) {
        self.lock().lines.clear();
    }

    pub fn push_line(&self, text: impl Into<String>) {
        self.lock().lines.push((text.into(), None));
    }

    pub fn push_colored(&self, text: impl Into<String>, color: (u8, u8, u8)) {
        self.lock().lines.push((text.into(), Some(color)));
    }

    /// Marks the panel as removed from the screen. Later region calls fail.
    pub fn detach(&self) {
        self.lock().detached = true;
        self.redraw
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    #[allow(dead_code)]
    pub fn is_stale(&self) -> bool {
        let state = self.lock();
        state.fade.is_some() || state.opacity < 1.0
    }

    pub fn render(&self) -> String {
        let now = Instant::now();
        let state = self.lock();
        let opacity = current_opacity(&state, now);
        let stale = state.fade.is_some() || opacity < 1.0;

        let mut title = format!("== {} ==", state.title);
        if stale {
            title.push_str(" (stale)");
        }

        let mut out = String::new();
        out.push_str(&self.paint(&title, HEADER_RGB, opacity));
        out.push('\n');
        for (line, color) in &state.lines {
            out.push_str("  ");
            out.push_str(&self.paint(line, color.unwrap_or(NEUTRAL_RGB), opacity));
            out.push('\n');
        }
        out
    }

    fn paint(&self, text: &str, color: (u8, u8, u8), opacity: f32) -> String {
        if self.style.color {
            paint(text, faded_rgb(color, opacity))
        } else {
            text.to_string()
        }
    }

    fn lock(&self) -> MutexGuard<'_, PanelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn attached(&self) -> Result<MutexGuard<'_, PanelState>, RegionError> {
        let state = self.lock();
        if state.detached {
            return Err(RegionError::Detached(self.name.clone()));
        }
        Ok(state)
    }
}

fn current_opacity(state: &PanelState, now: Instant) -> f32 {
    state
        .fade
        .map_or(state.opacity, |fade| fade.opacity_at(now))
}

impl Region for Panel {
    fn name(&self) -> &str {
        &self.name
    }

    fn opacity(&self) -> Result<f32, RegionError> {
        let state = self.attached()?;
        Ok(current_opacity(&state, Instant::now()))
    }

    fn is_animating(&self) -> Result<bool, RegionError> {
        let state = self.attached()?;
        Ok(state.fade.is_some_and(|fade| !fade.is_done(Instant::now())))
    }

    fn fade_to(&self, target: f32, duration: Duration) -> Result<(), RegionError> {
        {
            let mut state = self.attached()?;
            let now = Instant::now();
            let from = current_opacity(&state, now);
            state.fade = Some(Fade {
                from,
                to: target.clamp(0.0, 1.0),
                started: now,
                duration,
            });
        }
        self.request_redraw();
        Ok(())
    }

    fn stop_animation(&self) -> Result<(), RegionError> {
        let mut state = self.attached()?;
        state.opacity = current_opacity(&state, Instant::now());
        state.fade = None;
        Ok(())
    }

    fn set_opacity(&self, opacity: f32) -> Result<(), RegionError> {
        {
            let mut state = self.attached()?;
            state.fade = None;
            state.opacity = opacity.clamp(0.0, 1.0);
        }
        self.request_redraw();
        Ok(())
    }

    fn stale_style(&self) -> (f32, Duration) {
        (self.style.stale_opacity, self.style.fade)
    }
}
