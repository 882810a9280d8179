pub mod metrics;

pub use metrics::{GarminMetrics, HEADERS};
