pub mod colors;
pub mod panel;

pub use panel::{Panel, PanelStyle};
