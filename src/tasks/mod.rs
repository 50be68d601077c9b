pub mod cache_updater;
pub mod event_reader;
pub mod poll_loop;
