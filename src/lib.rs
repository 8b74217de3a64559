pub mod config;
pub mod monitor;
pub mod protocol;
pub mod rcon;
pub mod system;
