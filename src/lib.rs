pub mod annotate;
pub mod cache;
pub mod config;
pub mod detect;
pub mod error;
pub mod export;
pub mod pdf;
pub mod pipeline;
#[cfg(feature = "render")]
pub mod render;
