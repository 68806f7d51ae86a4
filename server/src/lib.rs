pub extern crate actix_web;

mod admin;
pub mod connection;
mod connection_tx_storage;
pub mod handlers;
pub mod server;
mod server_state;
mod session;
mod tick_scheduler;
