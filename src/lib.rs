pub mod ai;
pub mod approval;
pub mod config;
pub mod context;
pub mod controller;
pub mod errors;
pub mod generate;
pub mod images;
pub mod logging;
pub mod operator;
pub mod phase;
pub mod phases;
pub mod session;
pub mod shopify;
pub mod ui;
pub mod util;
