// Redirect-aware HTTP client pieces
//
// The request/response model the redirect engine rewrites, the collaborators
// it consumes (transport, cookie jar, authenticators) and the redirect
// resolver itself.

mod auth;
mod cookies;
mod errors;
mod netrc;
mod redirects;
mod request;
mod response;
mod session;
mod transport;

pub use auth::*;
pub use cookies::*;
pub use errors::*;
pub use netrc::*;
pub use redirects::*;
pub use request::*;
pub use response::*;
pub use session::*;
pub use transport::*;
