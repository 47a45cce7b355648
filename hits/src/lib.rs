pub use crate::{
    handler::CounterHandler,
    server::CounterServer,
};

pub mod config;
pub mod driver;
pub mod error;
pub mod handler;
pub mod http;
pub mod metrics;
pub mod server;
pub mod sql;
