pub mod config;
pub mod error;
pub mod oracle;
pub mod platform;
pub mod process;
pub mod workflow;
pub mod workspace;
