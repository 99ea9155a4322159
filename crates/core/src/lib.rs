//! Companion Core
//!
//! Domain logic for AI tutoring companions: the companion catalogue and its
//! query service, and the controller that drives a live voice call through an
//! external voice SDK. Every external system (hosted store, auth provider,
//! voice SDK, session history) is reached through a trait defined here.

pub mod assistant;
pub mod auth;
pub mod call;
pub mod companion;
pub mod listing;
pub mod service;
pub mod store;
pub mod voice;
