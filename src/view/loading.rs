use crate::core::error::RegionError;
use std::time::Duration;

pub const STALE_OPACITY: f32 = 0.3;
pub const FADE_OUT: Duration = Duration::from_millis(1_000);

/// A fadeable area of the screen.
pub trait Region: Send + Sync {
    fn name(&self) -> &str;

    fn opacity(&self) -> Result<f32, RegionError>;

    fn is_animating(&self) -> Result<bool, RegionError>;

    /// Starts animating towards `target` over `duration`.
    fn fade_to(&self, target: f32, duration: Duration) -> Result<(), RegionError>;

    /// Freezes any running animation where it currently is.
    fn stop_animation(&self) -> Result<(), RegionError>;

    fn set_opacity(&self, opacity: f32) -> Result<(), RegionError>;

    /// Opacity and fade duration used to mark the region stale.
    fn stale_style(&self) -> (f32, Duration) {
        (STALE_OPACITY, FADE_OUT)
    }
}

/// Marks `region` as showing stale data. Does nothing if it is already faded
/// or fading.
pub fn indicate_loading(region: &dyn Region) {
    if let Err(e) = try_indicate(region) {
        tracing::debug!(region = region.name(), error = %e, "Could not fade region");
    }
}

/// Restores full opacity at once, cutting short any running fade.
pub fn cancel_loading(region: &dyn Region) {
    if let Err(e) = try_cancel(region) {
        tracing::debug!(region = region.name(), error = %e, "Could not restore region");
    }
}

fn try_indicate(region: &dyn Region) -> Result<(), RegionError> {
    if region.is_animating()? || region.opacity()? < 1.0 {
        return Ok(());
    }
    let (opacity, duration) = region.stale_style();
    region.fade_to(opacity, duration)
}

fn try_cancel(region: &dyn Region) -> Result<(), RegionError> {
    region.stop_animation()?;
    region.set_opacity(1.0)
}
