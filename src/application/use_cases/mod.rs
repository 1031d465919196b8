pub mod access_guard;
pub mod aggregation;
pub mod identity;
pub mod test_session;
