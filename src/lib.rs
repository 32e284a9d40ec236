pub mod config;
pub mod error;
pub mod gate;
pub mod jobs;
pub mod shutdown;
pub mod web;
