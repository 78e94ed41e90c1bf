pub mod calibration;
pub mod config;
pub mod diagnostics;
pub mod ensemble;
pub mod error;
pub mod forecast;
pub mod http_client;
pub mod ledger;
pub mod llm_provider;
pub mod markets;
pub mod match_context;
pub mod odds;
pub mod outcome;
pub mod performance;
pub mod pipeline;
pub mod provider;
pub mod score_grid;
pub mod settlement;
pub mod sport;
pub mod stat_model;
pub mod synthetic;
pub mod value;
