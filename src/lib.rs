pub mod args;
pub mod cache;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod sheet;
pub mod sources;
