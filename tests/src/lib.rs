//! Integration test crate; all tests live under `tests/`.
