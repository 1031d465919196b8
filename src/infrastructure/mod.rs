pub mod backend;
pub mod bootstrap;
pub mod config;
pub mod csv;
pub mod db;
pub mod live_query;
pub mod security;
pub mod storage;
