//! Redirect-following and trust-boundary policy engine for the ewe-platform
//! http client.
//!
//! WHY: Following a redirect is more than re-issuing a request to a new
//! `Location`. The follow-up must pick the right method, must not leak
//! credentials or cookies across trust boundaries, must re-decide proxy
//! routing for the new host and must stay bounded in length.
//!
//! WHAT: Pure policy pieces (`url`, `method`, `proxies`) plus the stateful
//! [`client::RedirectResolver`] that consults them on every hop.
//!
//! HOW: The resolver is an explicit state machine advanced one hop at a
//! time, either handing each follow-up request back to the caller or driving
//! a [`client::Transport`] itself.

pub mod client;
pub mod config;
pub mod method;
pub mod proxies;
pub mod url;
