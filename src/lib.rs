pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod exit;
pub mod freeze;
pub mod logs;
pub mod platform;
pub mod render;
pub mod template;
pub mod ui;
pub mod version;
