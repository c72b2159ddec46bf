#![deny(clippy::all, clippy::pedantic, clippy::nursery, dead_code)]

pub mod consumer;
pub mod handler;
pub mod health;
pub mod types;
pub mod worker;
