pub mod environment;
pub mod files;
