pub mod lifecycle;
pub mod loading;
pub mod refresh;
pub mod scheduler;
pub mod timer;

use std::sync::Arc;

pub use lifecycle::Lifecycle;
pub use loading::Region;

/// A component with an explicit teardown contract.
pub trait Closeable {
    fn lifecycle(&self) -> &Lifecycle;

    fn is_closed(&self) -> bool {
        self.lifecycle().is_closed()
    }

    fn close(&self) {
        self.lifecycle().close();
    }
}

/// A closeable component that owns a region of the screen.
pub trait View: Closeable + Send + Sync {
    /// Region faded by default when this view's data goes stale.
    fn root_region(&self) -> Option<Arc<dyn Region>>;
}

pub trait Renderable {
    fn render(&self);
}
