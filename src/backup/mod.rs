pub mod backup_config;
pub mod console;
pub mod locate;
pub mod pattern;
pub mod platform;
pub mod result_error;
pub mod retention;
pub mod runner;
pub mod tree_copy;
pub mod validate;
