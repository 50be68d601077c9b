pub mod run_outcome;
pub mod sensor_record;
pub mod target_set;
