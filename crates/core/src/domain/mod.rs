pub mod menu;
pub mod message;
pub mod order;
pub mod session;
pub mod tenant;
