//! Request guards: producer API-key resolution and operator bearer auth

pub mod api_key;
pub mod bearer;

pub use api_key::{build_envelope, extract_api_key, resolve_api_key, API_KEY_HEADER};
pub use bearer::{require_member, require_role, CurrentUser};
