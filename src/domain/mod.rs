pub mod error;
pub mod test_case;
pub mod test_session;
pub mod user;
