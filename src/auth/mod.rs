//! API key checks, bearer tokens and logging in.

mod api_key;
mod log_in;
mod middleware;
mod token;

pub use api_key::{API_KEY_HEADER, ApiKey, api_key_guard};
pub use log_in::{get_me, post_log_in};
pub use middleware::auth_guard;
pub use token::TokenKeys;

#[cfg(test)]
pub use log_in::LogInResponse;
