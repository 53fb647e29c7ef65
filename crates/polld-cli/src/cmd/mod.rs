pub mod accounts;
pub mod config;
pub mod plugins;
pub mod poll;
pub mod serve;
