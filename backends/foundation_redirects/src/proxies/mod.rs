//! Proxy routing decisions for each hop.
//!
//! WHY: A redirect may move a request to a host that must not go through the
//! configured proxy (or must go through a different one).
//!
//! WHAT: No-proxy matching (`bypass`), the environment-backed bypass facility
//! (`system`), proxy selection and per-hop proxy rebuilding (`select`), and
//! the environment collaborator with its scoped mutation guard (`env`).

mod bypass;
mod env;
mod errors;
mod select;
mod system;
mod types;

pub use bypass::*;
pub use env::*;
pub use errors::*;
pub use select::*;
pub use system::*;
pub use types::*;
