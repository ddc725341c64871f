// Crate root library declaration and module exports.
pub mod backup;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod platform;
pub mod ports;
pub mod receiver;
pub mod reliability;
pub mod reminder;
pub mod resolver;
pub mod ringing;
pub mod scheduler;
pub mod sequencer;
pub mod service;
pub mod storage;
pub mod store;
pub mod system;
