pub mod core;
pub mod exchange;
pub mod llm;
pub mod market_data;
pub mod persistence;
pub mod search;
pub mod simulation;
