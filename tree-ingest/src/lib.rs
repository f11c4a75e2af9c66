pub mod cli;
pub mod hacker_news;
pub mod json_store;
pub mod load_config;

pub use cli::{run, Cli, Commands};
