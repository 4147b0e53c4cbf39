pub mod artifacts;
pub mod handlers;
pub mod lifecycle;
pub mod store;
