pub mod audit;
pub mod config;
pub mod oauth;
pub mod rate_limit;
pub mod session;
pub mod shared;
pub mod urls;
