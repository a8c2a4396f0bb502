//! Admission-control core for multi-tenant proxy nodes.
//!
//! The proxy data plane calls [`Limiter::get_user_bucket`] once per new
//! connection to learn whether the connection is admitted and which rate
//! bucket it has to respect. Once per reporting cycle the reporting side calls
//! [`Limiter::get_online_devices`] to obtain the online-user snapshot.
//!
//! Config sync drives [`Limiter::add_inbound`], [`Limiter::update_inbound`]
//! and [`Limiter::delete_inbound`]; none of them stops connection handling on
//! other inbounds.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod limiter;
pub mod prelude;

pub use limiter::{Admission, Limiter, RateBucket};

// vim: ts=4
