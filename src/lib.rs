pub mod config;
pub mod controller;
pub mod dashboard;
pub mod error;
pub mod filter;
pub mod history;
pub mod monitor;
pub mod normalize;
pub mod preview;
pub mod source;
pub mod store;
pub mod widgets;
