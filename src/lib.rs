pub mod calendar;
pub mod config;
pub mod env;
pub mod error;
pub mod inventory;
pub mod scheduler;
pub mod service;
pub mod sim;
