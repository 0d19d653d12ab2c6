//! Logging for tests.
//!
//! Run the tests with `RUST_LOG=trace` to watch the queue decisions.

pub fn setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}
