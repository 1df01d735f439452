pub mod config;
pub mod data_access;
pub mod dispatcher;
pub mod error;
pub mod focus;
pub mod keys;
pub mod session;
pub mod sql_generator;
pub mod widgets;
