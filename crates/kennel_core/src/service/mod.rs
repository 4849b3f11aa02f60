//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into transactional use cases.
//! - Keep callers decoupled from scope management.

pub mod dog_service;
