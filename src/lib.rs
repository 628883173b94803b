pub mod app;
pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod loader;
pub mod message;
pub mod model;
pub mod tools;
pub mod utils;
pub mod viewport;
pub mod views;
