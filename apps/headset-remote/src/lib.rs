pub mod cli;
pub mod client;
pub mod config;
pub mod controller;
pub mod device;
pub mod media;
pub mod restriction;
pub mod session;
pub mod supervisor;
pub mod telemetry;
pub mod transport;
