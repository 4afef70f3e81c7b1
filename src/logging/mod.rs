pub mod event_log;
pub mod sink;
pub mod visualize;

pub use event_log::{EventLogWriter, ImageRecord, ScalarRecord};
pub use sink::{MemorySink, MetricSink};
pub use visualize::{OverlayVisualizer, Visualizer};
