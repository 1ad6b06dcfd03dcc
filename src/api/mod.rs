//! HTTP surface: upload form, conversion endpoints, health check.

pub mod handlers;
