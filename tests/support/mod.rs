pub mod mock_remote_store;

#[allow(unused_imports)]
pub use mock_remote_store::MockRemoteStore;

/// Initialize tracing for tests with proper test output handling
pub fn tracing_init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
