/*
 * Responsibility
 * - tokio runtime startup
 * - Calls app::run() (no logic here)
 */
use anyhow::Result;

mod api;
mod app;
mod config;
mod error;
mod middleware;
mod services;
mod state;
mod walkthrough;

#[tokio::main]
async fn main() -> Result<()> {
    app::run().await
}
