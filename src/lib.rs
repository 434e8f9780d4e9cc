pub mod aggregate;
pub mod colormap;
pub mod config;
pub mod data;
pub mod error;
pub mod join;
pub mod pipeline;
pub mod processing;
pub mod render;
pub mod server;
pub mod types;
