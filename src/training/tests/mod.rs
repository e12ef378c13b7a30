//! Trainer test suite
//!
//! Lifecycle, counter and construction tests sharing the fixtures in
//! [`fixtures`]: a recording callback, a no-op optimizer and identity batches.

pub mod trainer_tests;
