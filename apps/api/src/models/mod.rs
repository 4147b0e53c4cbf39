pub mod session;
pub mod template;
pub mod tenant;
