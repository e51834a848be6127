pub mod config;
pub mod error;
pub mod identity;
pub mod index;
pub mod media;
pub mod models;
pub mod normalize;
pub mod parser;
pub mod pipeline;
pub mod raw;
pub mod store;
