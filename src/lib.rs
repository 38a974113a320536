pub mod analyzers;
pub mod concat;
pub mod config;
pub mod error;
pub mod filter;
pub mod loader;
pub mod normalize;
pub mod output;
pub mod table;
