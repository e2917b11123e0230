pub mod files;
pub mod register;
pub mod service;
pub mod state;
pub mod verify;
