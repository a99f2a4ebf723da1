pub mod config;
pub mod error;
pub mod generation;
pub mod handlers;
pub mod hub;
pub mod language;
pub mod model;
pub mod processor;
pub mod routes;
pub mod service;
pub mod state;
pub mod tokenizer;
pub mod translate;

pub use config::Config;
pub use error::TranslateError;
pub use state::AppState;
