//! Integration tests for crashline-reporter
//!
//! Drive `CrashReporter` end to end against a temporary crash root and
//! in-process fakes of the capture backend, formatter and outbound channel.

mod common;

mod test_confirmation;
mod test_delivery_events;
mod test_detection;
mod test_disable;
mod test_processing;
