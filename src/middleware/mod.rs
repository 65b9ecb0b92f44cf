/*
 * Responsibility
 * - Public surface of the middleware (apply functions)
 */
pub mod auth;
pub mod http;
pub mod security_headers;
