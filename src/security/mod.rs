//! Credential hashing, session tokens, input validation, CORS and object
//! path sanitization.

pub mod cors;
pub mod password;
pub mod path_guard;
pub mod session;
pub mod validation;

pub use cors::CorsConfig;
pub use password::CredentialHasher;
pub use validation::{ValidationError, Validator};
