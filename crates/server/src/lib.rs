//! HTTP tool server over the observer library

pub mod api;
pub mod config;
