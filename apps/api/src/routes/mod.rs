//! # HTTP Routes
//!
//! ```text
//! public         GET  /health
//!                POST /auth/login
//!                GET  /repairs/track/status
//!                POST /auth/register   (first user only)
//!
//! bearer token   /stores  /customers  /products  /inventory  /sales  /repairs
//! admin token    POST /auth/register   (staff accounts)
//! ```
//!
//! Each module exposes `router()`; [`crate::build_router`] merges them.

pub mod auth;
pub mod customers;
pub mod health;
pub mod products;
pub mod repairs;
pub mod sales;
pub mod stores;

use std::sync::Arc;

use axum::Router;

use crate::AppState;

/// Every route, without middleware.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(stores::router())
        .merge(customers::router())
        .merge(products::router())
        .merge(sales::router())
        .merge(repairs::router())
}
