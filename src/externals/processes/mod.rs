pub mod services;
pub mod supervisor;
