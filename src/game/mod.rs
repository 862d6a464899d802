pub mod constants;
pub mod room;
pub mod store;
pub mod types;
