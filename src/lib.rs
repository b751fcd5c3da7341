#[macro_use]
extern crate diesel;

pub mod actions;
pub mod analytics;
pub mod auth;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod display;
pub mod error;
pub mod gateway;
pub mod models;
pub mod routes;
#[rustfmt::skip]
pub mod schema;
pub mod signing;
pub mod storage;
