//! Value records returned inside tool envelopes

pub mod kubernetes;
pub mod metrics;

pub use kubernetes::*;
pub use metrics::*;
