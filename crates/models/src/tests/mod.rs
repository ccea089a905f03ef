
/// Conditional-update and concurrency tests
pub mod transaction_tests;
