//! Adapters Layer
//!
//! Inbound adapters feed events into the application; outbound adapters
//! implement the domain ports.

pub mod inbound;
pub mod outbound;
