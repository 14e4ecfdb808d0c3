pub mod control_handler;
pub mod controller;
pub mod janitor;
