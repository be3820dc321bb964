//! Per-user integer counters for the `SEND` and `GET` commands.

pub mod store;

pub use store::{AccumulateError, CounterStore};
