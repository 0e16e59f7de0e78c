pub mod image_ops;
pub mod metrics;

// Re-export commonly used items
pub use image_ops::{decode_rgba, encode_png, spawn_image_task};
pub use metrics::{Metrics, MetricsSnapshot};
