//! Core types for Shopgate.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod shop;
pub mod status;
pub mod token;

pub use email::{Email, EmailError};
pub use id::*;
pub use shop::{ShopDomain, ShopDomainError};
pub use status::SubscriptionStatus;
pub use token::{AccessToken, AccessTokenError};
