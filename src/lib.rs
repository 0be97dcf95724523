#[macro_use]
extern crate diesel;

pub mod actions;
pub mod capacity;
pub mod clock;
pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod models;
pub mod queue;
pub mod routes;
pub mod schema;
pub mod service;
pub mod store;
pub mod sweeper;
pub mod window;
