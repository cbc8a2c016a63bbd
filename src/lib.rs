pub mod api_connection;
pub mod cli;
pub mod config;
pub mod error;
pub mod meal_regenerator;
pub mod menu;
pub mod menu_generator;
pub mod pattern;
pub mod pattern_analyzer;
pub mod pipeline;
pub mod response_parser;
pub mod shopping_list;
pub mod storage;
pub mod text_extractor;
pub mod wire;

pub use error::{PipelineError, Result};
