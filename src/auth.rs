//! Auth-domain models: scope sets, token secrets, claims, sessions, identity.

pub mod claims;
pub mod identity;
pub mod scope;
pub mod secret;
pub mod session;

pub use claims::*;
pub use identity::*;
pub use scope::*;
pub use secret::*;
pub use session::*;
