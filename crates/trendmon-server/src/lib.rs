//! Command-line driver for trendmon: configuration loading and the
//! commands that feed samples in and read tendencies out.

pub mod commands;
pub mod config;
pub mod state;
