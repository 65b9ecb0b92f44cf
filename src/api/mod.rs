/*
 * Responsibility
 * - Routers of the two simulated servers
 *   - oauth: authorization server (metadata, authorize, token, jwks)
 *   - resource: protected API (/profile)
 */
pub mod extractors;
pub mod oauth;
pub mod resource;
