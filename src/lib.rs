pub mod admin;
pub mod core;
pub mod email;
pub mod main_module;
pub mod pages;
pub mod profile;
pub mod security;
pub mod tickets;

pub use crate::core::shared;
