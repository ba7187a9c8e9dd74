pub mod audit;
pub mod batch;
pub mod brevo;
pub mod config;
pub mod error;
pub mod input;
pub mod model;
pub mod sync;
