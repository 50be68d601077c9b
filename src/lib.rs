//! Supervise an rtl_tcp + rtlamr receiver chain and export the latest
//! consumption of selected utility meters in the Prometheus text format.

pub mod config;
pub mod exposition;
pub mod externals;
pub mod models;
pub mod os_signals;
pub mod sensor_cache;
pub mod system;
pub mod tasks;
