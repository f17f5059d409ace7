pub mod allocator;
pub mod api;
pub mod config;
pub mod fingerprint;
pub mod http;
pub mod link_repo;
pub mod link_service;
pub mod memory_repo;
mod orm;
