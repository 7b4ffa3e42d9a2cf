pub mod alert;
pub mod classify;
pub mod config;
pub mod fetch;
pub mod monitor;
pub mod output;
pub mod poll;
pub mod server;
pub mod settings;
pub mod variables;
pub mod version;
