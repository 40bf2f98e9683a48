pub mod bus;
pub mod config;
pub mod logging;
pub mod messages;
pub mod motor;
pub mod protocol;
pub mod robot;
pub mod runtime;
pub mod sensors;
pub mod vision;
