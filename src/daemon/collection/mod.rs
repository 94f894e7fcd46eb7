//! Capture side of the service. Input hooks write into a [capture::CaptureBuffer] and the
//! [collector::CaptureModule] hands the accumulated deltas over to the reconciler.

pub mod capture;
pub mod collector;
pub mod feed;
pub mod words;
