pub const HEADER_RGB: (u8, u8, u8) = (245, 166, 35);
pub const RUNNING_RGB: (u8, u8, u8) = (16, 163, 127);
pub const TRANSITION_RGB: (u8, u8, u8) = (230, 190, 60);
pub const FAILED_RGB: (u8, u8, u8) = (220, 60, 50);
pub const NEUTRAL_RGB: (u8, u8, u8) = (170, 170, 170);

/// Color for an entity or task status as reported by the server.
pub fn status_rgb(status: &str) -> (u8, u8, u8) {
    match status.to_ascii_uppercase().as_str() {
        "RUNNING" | "COMPLETED" | "UP" => RUNNING_RGB,
        "STARTING" | "STOPPING" | "CREATED" | "IN PROGRESS" => TRANSITION_RGB,
        "ON_FIRE" | "ERROR" | "FAILED" | "DOWN" => FAILED_RGB,
        _ => NEUTRAL_RGB,
    }
}

/// Darkens `color` to the given opacity against a black background.
pub fn faded_rgb(color: (u8, u8, u8), opacity: f32) -> (u8, u8, u8) {
    let opacity = opacity.clamp(0.0, 1.0);
    let (r, g, b) = color;
    (
        (r as f32 * opacity) as u8,
        (g as f32 * opacity) as u8,
        (b as f32 * opacity) as u8,
    )
}

pub fn muted_rgb(color: (u8, u8, u8)) -> (u8, u8, u8) {
    faded_rgb(color, 0.35)
}

pub fn paint(text: &str, color: (u8, u8, u8)) -> String {
    let (r, g, b) = color;
    format!("\x1b[38;2;{r};{g};{b}m{text}\x1b[0m")
}
