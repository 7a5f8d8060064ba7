//! Sliding-window statistics primitives.

mod leap_array;
mod metric;

pub use leap_array::{LeapArray, MetricBucket, MetricEvent, WindowWrap};
pub use metric::SlidingMetric;
