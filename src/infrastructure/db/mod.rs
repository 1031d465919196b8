pub mod connection;
pub mod sessions;
pub mod users;
