/*
 * Responsibility
 * - Server-side services behind the simulated authorization and resource servers
 */
pub mod authorization_codes;
pub mod token_issuer;

pub use authorization_codes::AuthorizationCodes;
pub use token_issuer::AuthService;
