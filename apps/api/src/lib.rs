//! # Nexus API
//!
//! REST server for the Nexus laptop retail CRM.
//!
//! ## Request Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  HTTP ──► TraceLayer ──► CORS ──► Router                                │
//! │                                     │                                   │
//! │                                     ├── AuthUser (Bearer JWT)           │
//! │                                     ├── ApiJson / ApiQuery              │
//! │                                     ▼                                   │
//! │                                 handler ──► service ──► nexus-db        │
//! │                                     │            │                      │
//! │                                     │            └──► DispatcherHandle  │
//! │                                     ▼                                   │
//! │                      ApiResponse / ApiError envelope                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod response;
pub mod routes;
pub mod services;
pub mod sweeper;

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::middleware;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use nexus_db::Database;
use nexus_notify::DispatcherHandle;

use crate::auth::JwtManager;
use crate::config::ApiConfig;
use crate::services::{CustomerService, ProductService, RepairService, SaleCoordinator};

/// Shared state handed to every handler.
pub struct AppState {
    pub db: Database,
    pub config: ApiConfig,
    pub jwt: JwtManager,
    pub notifier: DispatcherHandle,
    pub customers: CustomerService,
    pub products: ProductService,
    pub sales: SaleCoordinator,
    pub repairs: RepairService,
}

impl AppState {
    pub fn new(db: Database, config: ApiConfig, notifier: DispatcherHandle) -> Arc<Self> {
        Arc::new(AppState {
            jwt: JwtManager::new(&config.auth.jwt_secret, config.auth.access_token_lifetime_secs),
            customers: CustomerService::new(db.clone()),
            products: ProductService::new(db.clone()),
            sales: SaleCoordinator::new(db.clone(), config.sales.tax_rate(), notifier.clone()),
            repairs: RepairService::new(db.clone(), notifier.clone()),
            db,
            config,
            notifier,
        })
    }
}

/// Builds the application router with its middleware stack.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = routes::api_routes();

    if state.config.server.environment.is_development() {
        router = router.layer(middleware::map_response(error::expose_error_detail));
    }

    router
        .layer(cors_layer(&state.config.server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Any origin when none are configured.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    cors.allow_origin(AllowOrigin::list(allowed))
}

// =============================================================================
// API Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use nexus_db::DbConfig;
    use nexus_notify::{ChannelSet, Dispatcher};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
    }

    impl TestApp {
        async fn new() -> Self {
            let db = Database::new(DbConfig::in_memory()).await.unwrap();
            let notifier = Dispatcher::new(db.clone(), ChannelSet::logging()).start();
            let state = AppState::new(db, ApiConfig::default(), notifier);
            TestApp {
                router: build_router(state),
            }
        }

        async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            let body = match body {
                Some(json) => {
                    request = request.header(header::CONTENT_TYPE, "application/json");
                    Body::from(json.to_string())
                }
                None => Body::empty(),
            };

            let response = self
                .router
                .clone()
                .oneshot(request.body(body).unwrap())
                .await
                .unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, value)
        }

        /// Registers the first user, who becomes admin, and returns its token.
        async fn register(&self, email: &str, store_id: Option<&str>) -> String {
            let (status, body) = self
                .call(
                    "POST",
                    "/auth/register",
                    None,
                    Some(json!({
                        "name": "Asha Rao",
                        "email": email,
                        "password": "hunter22!",
                        "store_id": store_id,
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{}", body);
            body["data"]["token"].as_str().unwrap().to_string()
        }

        /// Admin creates a staff account; the staff member then logs in.
        async fn add_staff(&self, admin: &str, email: &str, store_id: &str) -> String {
            let (status, body) = self
                .call(
                    "POST",
                    "/auth/register",
                    Some(admin),
                    Some(json!({
                        "name": "Kiran",
                        "email": email,
                        "password": "hunter22!",
                        "store_id": store_id,
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{}", body);
            assert_eq!(body["data"]["user"]["role"], "staff");

            let (status, body) = self
                .call(
                    "POST",
                    "/auth/login",
                    None,
                    Some(json!({ "identifier": email, "password": "hunter22!" })),
                )
                .await;
            assert_eq!(status, StatusCode::OK, "{}", body);
            body["data"]["token"].as_str().unwrap().to_string()
        }

        async fn create_store(&self, token: &str, code: &str) -> String {
            let (status, body) = self
                .call(
                    "POST",
                    "/stores",
                    Some(token),
                    Some(json!({ "code": code, "name": format!("Store {}", code) })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{}", body);
            body["data"]["id"].as_str().unwrap().to_string()
        }
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = TestApp::new().await;
        let (status, body) = app.call("GET", "/health", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["database"], true);
    }

    #[tokio::test]
    async fn test_protected_route_needs_token() {
        let app = TestApp::new().await;
        let (status, body) = app.call("GET", "/customers", None, None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_first_user_is_admin_then_staff() {
        let app = TestApp::new().await;
        let admin = app.register("owner@example.com", None).await;
        let store = app.create_store(&admin, "BLR01").await;

        let (status, body) = app
            .call(
                "POST",
                "/auth/register",
                Some(&admin),
                Some(json!({
                    "name": "Kiran",
                    "email": "kiran@example.com",
                    "password": "hunter22!",
                    "store_id": store,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["user"]["role"], "staff");
        assert!(body["data"]["token"].is_null());

        let (status, body) = app
            .call(
                "POST",
                "/auth/login",
                None,
                Some(json!({ "identifier": "OWNER@example.com", "password": "hunter22!" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["user"]["role"], "admin");

        let (status, _) = app
            .call(
                "POST",
                "/auth/login",
                None,
                Some(json!({ "identifier": "owner@example.com", "password": "wrong-pass" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_registration_after_bootstrap_needs_admin() {
        let app = TestApp::new().await;
        let admin = app.register("owner@example.com", None).await;
        let store = app.create_store(&admin, "BLR01").await;
        let staff = app.add_staff(&admin, "kiran@example.com", &store).await;
        let newcomer = json!({
            "name": "Meera",
            "email": "meera@example.com",
            "password": "hunter22!",
            "store_id": store,
        });

        let (status, body) = app
            .call("POST", "/auth/register", None, Some(newcomer.clone()))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");

        let (status, body) = app
            .call("POST", "/auth/register", Some(&staff), Some(newcomer))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "FORBIDDEN");

        let (status, _) = app
            .call(
                "POST",
                "/auth/login",
                None,
                Some(json!({ "identifier": "meera@example.com", "password": "hunter22!" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_duplicate_customer_email_conflicts() {
        let app = TestApp::new().await;
        let token = app.register("owner@example.com", None).await;
        let customer = json!({ "name": "Ravi Kumar", "email": "ravi@example.com" });

        let (status, _) = app.call("POST", "/customers", Some(&token), Some(customer.clone())).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = app.call("POST", "/customers", Some(&token), Some(customer)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_staff_cannot_reach_other_store() {
        let app = TestApp::new().await;
        let admin = app.register("owner@example.com", None).await;
        let home = app.create_store(&admin, "BLR01").await;
        let other = app.create_store(&admin, "PUN01").await;
        let staff = app.add_staff(&admin, "kiran@example.com", &home).await;

        let (status, _) = app
            .call("GET", &format!("/sales?store_id={}", home), Some(&staff), None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app
            .call("GET", &format!("/sales?store_id={}", other), Some(&staff), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "FORBIDDEN");

        let (status, _) = app
            .call(
                "POST",
                "/auth/login",
                None,
                Some(json!({
                    "identifier": "kiran@example.com",
                    "password": "hunter22!",
                    "store_id": other,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .call("POST", "/stores", Some(&staff), Some(json!({ "code": "HYD01", "name": "Hyd" })))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_malformed_body_uses_error_envelope() {
        let app = TestApp::new().await;
        let token = app.register("owner@example.com", None).await;

        let (status, body) = app
            .call("POST", "/sales", Some(&token), Some(json!({ "store_id": 42 })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_sale_and_repair_flow() {
        let app = TestApp::new().await;
        let token = app.register("owner@example.com", None).await;
        let store = app.create_store(&token, "BLR01").await;

        let (status, body) = app
            .call(
                "POST",
                "/products",
                Some(&token),
                Some(json!({
                    "name": "Dell XPS 13",
                    "brand": "Dell",
                    "model": "XPS 13",
                    "barcode": "5397184712345",
                    "price_cents": 99_990_00,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        let product = body["data"]["id"].as_str().unwrap().to_string();

        let (status, _) = app
            .call(
                "PUT",
                &format!("/products/{}/stock", product),
                Some(&token),
                Some(json!({ "store_id": store, "stock": 2 })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let sale_body = json!({
            "customer": { "name": "Ravi Kumar", "phone": "98765 43210" },
            "store_id": store,
            "items": [{ "product_id": product, "quantity": 2 }],
            "payment_method": "card",
        });
        let (status, body) = app.call("POST", "/sales", Some(&token), Some(sale_body.clone())).await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        assert_eq!(body["data"]["status"], "completed");
        assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);

        let (status, body) = app.call("POST", "/sales", Some(&token), Some(sale_body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INSUFFICIENT_STOCK");

        let (_, body) = app
            .call("GET", "/products/barcode/5397184712345", Some(&token), None)
            .await;
        assert_eq!(body["data"]["inventory"][0]["stock"], 0);

        let (_, body) = app
            .call("GET", &format!("/inventory/low-stock?store_id={}", store), Some(&token), None)
            .await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, body) = app
            .call(
                "POST",
                "/repairs",
                Some(&token),
                Some(json!({
                    "customer": { "name": "Ravi Kumar", "phone": "9876543210" },
                    "store_id": store,
                    "device": { "device_type": "laptop", "brand": "Dell", "model": "XPS 13" },
                    "issue_description": "Battery swelling",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        let repair = body["data"]["id"].as_str().unwrap().to_string();
        let ticket = body["data"]["ticket_number"].as_str().unwrap().to_string();

        let (status, body) = app
            .call(
                "PUT",
                &format!("/repairs/{}/status", repair),
                Some(&token),
                Some(json!({ "status": "ready_for_pickup", "note": "Battery replaced" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"]["status"], "ready_for_pickup");

        let (status, body) = app
            .call("GET", &format!("/repairs/track/status?ticket={}", ticket), None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["status"], "ready_for_pickup");
        assert!(body["data"][0].get("customer_id").is_none());

        let (status, _) = app.call("GET", "/repairs/track/status", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .call(
                "PUT",
                &format!("/repairs/{}/status", repair),
                Some(&token),
                Some(json!({ "status": "fixed" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_STATUS");
    }
}
