//! FunFood API Gateway
//!
//! The REST surface over the resource services.
//! Handles:
//! - Request routing for every resource
//! - Rate limiting
//! - Observability (logging, metrics, tracing)

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, patch, post, put},
    Extension, Router,
};
use funfood_common::{
    config::{AppConfig, ObservabilityConfig},
    metrics,
    query::QueryEngine,
    services::{food_delivery_relations, COLLECTIONS},
    JsonRepository, ServiceRegistry,
};
use handlers::{account, addresses, cart, catalog, favorites, resources, shipper, transfer, Resource};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<ServiceRegistry>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration, from an explicit file when APP_CONFIG_FILE is set
    let config = match std::env::var("APP_CONFIG_FILE") {
        Ok(path) => AppConfig::from_file(&path),
        Err(_) => AppConfig::load(),
    };
    let config = Arc::new(config.context("Failed to load configuration")?);

    // Initialize tracing
    init_tracing(&config.observability);

    info!("Starting FunFood API Gateway v{}", funfood_common::VERSION);

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        metrics::register_metrics();
        info!(port = config.observability.metrics_port, "Prometheus exporter listening");
    }

    // Open the document store
    let repo = Arc::new(JsonRepository::open(&config.store, &COLLECTIONS).await?);
    info!(
        data_file = ?repo.path(),
        collections = ?repo.counts().await,
        "Document store opened"
    );

    // Create app state
    let engine = QueryEngine::new(repo.clone(), food_delivery_relations())
        .with_search_fields(config.query.search_fields.clone());
    let state = AppState {
        config: config.clone(),
        services: Arc::new(ServiceRegistry::food_delivery(engine)),
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if !config.store.persist_on_write {
        repo.flush().await?;
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// CRUD, search and transfer routes for one collection, plus its extras
fn resource_routes(name: &'static str) -> Router<AppState> {
    let routes = Router::new()
        .route("/", get(resources::list).post(resources::create))
        .route("/search", get(resources::search))
        .route("/import", post(transfer::import))
        .route("/export", get(transfer::export))
        .route("/template", get(transfer::template))
        .route(
            "/{id}",
            get(resources::get_one)
                .put(resources::update)
                .patch(resources::update)
                .delete(resources::remove),
        );

    let routes = match name {
        "restaurants" => routes
            .route("/nearby", get(catalog::nearby))
            .route("/{id}/products", get(catalog::menu)),
        "products" => routes
            .route("/discounted", get(catalog::discounted))
            .route("/price-range", get(catalog::price_range))
            .route("/bulk-availability", patch(catalog::bulk_availability)),
        "promotions" => routes.route("/validate", post(catalog::validate_promotion)),
        "orders" => routes.route("/{id}/status", patch(catalog::order_status)),
        "users" => routes
            .route("/{id}/password", put(account::password))
            .route("/{id}/cart", get(cart::show).post(cart::add).delete(cart::clear))
            .route("/{id}/cart/sync", post(cart::sync))
            .route("/{id}/cart/restaurant/{restaurant_id}", delete(cart::clear_restaurant))
            .route("/{id}/cart/{item_id}", put(cart::update_item).delete(cart::remove_item))
            .route("/{id}/favorites", get(favorites::list).delete(favorites::clear_all))
            .route("/{id}/favorites/stats", get(favorites::stats))
            .route("/{id}/favorites/{kind}", get(favorites::by_type).delete(favorites::clear_by_type))
            .route("/{id}/favorites/{kind}/ids", get(favorites::ids))
            .route(
                "/{id}/favorites/{kind}/{reference_id}",
                get(favorites::check).post(favorites::add).delete(favorites::remove),
            )
            .route("/{id}/favorites/{kind}/{reference_id}/toggle", post(favorites::toggle))
            .route("/{id}/addresses", get(addresses::list).delete(addresses::clear_others))
            .route("/{id}/addresses/default", get(addresses::default))
            .route("/{id}/addresses/{address_id}", delete(addresses::remove))
            .route("/{id}/addresses/{address_id}/default", patch(addresses::set_default)),
        "favorites" => routes.route("/trending/{kind}", get(favorites::trending)),
        _ => routes,
    };

    routes.layer(Extension(Resource(name)))
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let mut api_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/auth/register", post(account::sign_up))
        .route("/auth/login", post(account::sign_in))
        .route("/shippers/{id}/orders/available", get(shipper::available))
        .route("/shippers/{id}/orders/my-deliveries", get(shipper::deliveries))
        .route("/shippers/{id}/orders/history", get(shipper::history))
        .route("/shippers/{id}/orders/{order_id}/accept", post(shipper::accept))
        .route("/shippers/{id}/orders/{order_id}/status", patch(shipper::status))
        .route("/shippers/{id}/stats", get(shipper::stats));
    for name in COLLECTIONS {
        api_routes = api_routes.nest(&format!("/{name}"), resource_routes(name));
    }

    let mut app = Router::new()
        .nest("/api", api_routes)
        .route_layer(from_fn(middleware::track_metrics));

    let limits = &state.config.rate_limit;
    if limits.enabled {
        let limiter = middleware::rate_limit::RateLimitState::new(limits.requests_per_second, limits.burst);
        app = app.layer(from_fn_with_state(limiter, middleware::rate_limit::rate_limit));
    }

    // Compose the app
    app.layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn seed() -> Value {
        json!({
            "categories": [
                { "id": 1, "name": "Vietnamese" },
                { "id": 2, "name": "Drinks" }
            ],
            "restaurants": [
                { "id": 1, "name": "Pho 24", "description": "Beef noodle soup", "categoryId": 1,
                  "latitude": 10.7769, "longitude": 106.7009, "deliveryFee": 15000, "isOpen": true },
                { "id": 2, "name": "Cafe Sua", "description": "Iced coffee", "categoryId": 2,
                  "latitude": 10.7800, "longitude": 106.7000, "deliveryFee": 10000, "isOpen": true },
                { "id": 3, "name": "Hanoi Corner", "categoryId": 1,
                  "latitude": 21.0285, "longitude": 105.8542, "isOpen": true }
            ],
            "products": [
                { "id": 1, "name": "Pho Bo", "price": 50000, "discount": 10, "restaurantId": 1, "available": true },
                { "id": 2, "name": "Pho Ga", "price": 45000, "discount": 0, "restaurantId": 1, "available": true },
                { "id": 3, "name": "Bac Xiu", "price": 30000, "discount": 20, "restaurantId": 2, "available": true }
            ],
            "users": [
                { "id": 1, "name": "An", "email": "an@example.com", "password": "secret", "role": "customer" },
                { "id": 2, "name": "Binh", "email": "binh@example.com", "password": "secret", "role": "shipper" }
            ],
            "orders": [
                { "id": 1, "userId": 1, "restaurantId": 1, "status": "pending", "paymentStatus": "pending",
                  "shipperId": null, "createdAt": "2024-03-01T10:00:00.000Z" }
            ],
            "notifications": [],
            "promotions": [
                { "id": 1, "code": "SALE10", "discountType": "percentage", "discountValue": 10,
                  "minOrderValue": 0, "validFrom": "2020-01-01", "validTo": "2099-12-31", "isActive": true }
            ],
            "reviews": []
        })
    }

    fn app() -> Router {
        let repo = JsonRepository::from_value(seed(), &COLLECTIONS).unwrap();
        let engine = QueryEngine::new(Arc::new(repo), food_delivery_relations());
        create_router(AppState {
            config: Arc::new(AppConfig::default()),
            services: Arc::new(ServiceRegistry::food_delivery(engine)),
        })
    }

    async fn call(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(app(), Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = call(app(), Method::GET, "/api/ready", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["store"]["status"], "up");
    }

    #[tokio::test]
    async fn test_list_filters_sorts_and_paginates() {
        let (status, body) = call(
            app(),
            Method::GET,
            "/api/products?price_gte=40000&_sort=price&_order=desc&_limit=1",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["id"], 1);
        assert_eq!(body["pagination"]["total"], 2);
        assert_eq!(body["pagination"]["totalPages"], 2);
        assert_eq!(body["pagination"]["hasNext"], true);
    }

    #[tokio::test]
    async fn test_get_expands_relations_and_hides_password() {
        let (_, body) = call(app(), Method::GET, "/api/products/1?_expand=restaurant", None).await;
        assert_eq!(body["data"]["restaurant"]["name"], "Pho 24");

        let (_, body) = call(app(), Method::GET, "/api/users/1?_embed=orders", None).await;
        assert!(body["data"].get("password").is_none());
        assert_eq!(body["data"]["orders"].as_array().unwrap().len(), 1);

        let (status, body) = call(app(), Method::GET, "/api/products/99", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_create_and_validation_errors() {
        let (status, body) = call(app(), Method::POST, "/api/categories", Some(json!({ "name": "Desserts" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Category created successfully");
        assert_eq!(body["data"]["id"], 3);

        let (status, body) = call(app(), Method::POST, "/api/products", Some(json!({ "price": -1 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_FIELDS");

        let (status, _) = call(app(), Method::POST, "/api/categories", Some(json!([1, 2]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_search_requires_query() {
        let (status, _) = call(app(), Method::GET, "/api/restaurants/search", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(app(), Method::GET, "/api/restaurants/search?q=coffee", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["name"], "Cafe Sua");
    }

    #[tokio::test]
    async fn test_nearby_and_menu() {
        let (status, body) = call(app(), Method::GET, "/api/restaurants/nearby?lat=10.7769&lng=106.7009", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert_eq!(body["data"][0]["id"], 1);
        assert_eq!(body["data"][0]["distance"], 0.0);

        let (status, _) = call(app(), Method::GET, "/api/restaurants/nearby?lat=100&lng=0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = call(app(), Method::GET, "/api/restaurants/1/products", None).await;
        assert_eq!(body["count"], 2);

        let (status, _) = call(app(), Method::GET, "/api/restaurants/9/products", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_product_extras() {
        let (_, body) = call(app(), Method::GET, "/api/products/discounted", None).await;
        assert_eq!(body["count"], 2);

        let (_, body) = call(app(), Method::GET, "/api/products/price-range?min=40000&max=48000", None).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["name"], "Pho Ga");

        let (status, body) = call(
            app(),
            Method::PATCH,
            "/api/products/bulk-availability",
            Some(json!({ "ids": [1, 2, 42], "available": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_promotion_validate() {
        let (status, body) = call(
            app(),
            Method::POST,
            "/api/promotions/validate",
            Some(json!({ "code": "sale10", "orderValue": 100000 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["discount"], 10000.0);

        let (status, _) = call(
            app(),
            Method::POST,
            "/api/promotions/validate",
            Some(json!({ "code": "NOPE", "orderValue": 100000 })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_order_status_transitions() {
        let (status, body) = call(
            app(),
            Method::PATCH,
            "/api/orders/1/status",
            Some(json!({ "status": "delivered" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_TRANSITION");
        assert_eq!(body["error"]["details"]["allowedStatus"], json!(["confirmed", "cancelled"]));

        let (status, body) = call(
            app(),
            Method::PATCH,
            "/api/orders/1/status",
            Some(json!({ "status": "confirmed" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "confirmed");

        let (status, _) = call(app(), Method::PATCH, "/api/orders/1/status", Some(json!({ "status": "lost" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_import_export_template() {
        let (status, body) = call(
            app(),
            Method::POST,
            "/api/categories/import",
            Some(json!({ "rows": [{ "name": "Snacks" }, { "name": "Drinks" }] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["success"], 1);
        assert_eq!(body["data"]["failed"], 1);
        assert_eq!(body["data"]["errors"][0]["row"], 3);

        let (_, body) = call(
            app(),
            Method::GET,
            "/api/products/export?restaurantId=1&columns=name,restaurantId&includeRelations=true",
            None,
        )
        .await;
        assert_eq!(body["count"], 2);
        assert_eq!(body["data"][0]["restaurantId_name"], "Pho 24");

        let (_, body) = call(app(), Method::GET, "/api/users/template", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
        assert!(body["data"][0]["email"].as_str().unwrap().contains("required"));
    }

    #[tokio::test]
    async fn test_register_login_and_change_password() {
        let app = app();
        let (status, body) = call(
            app.clone(),
            Method::POST,
            "/api/auth/register",
            Some(json!({ "name": "Chi", "email": "chi@example.com", "password": "Hunter22" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["data"].get("password").is_none());
        let id = body["data"]["id"].as_i64().unwrap();

        let login = |password: &'static str| {
            call(
                app.clone(),
                Method::POST,
                "/api/auth/login",
                Some(json!({ "email": "chi@example.com", "password": password })),
            )
        };
        let (status, body) = login("Hunter22").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Login successful");
        assert!(body["data"].get("password").is_none());

        let (status, body) = login("nope").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let (status, _) = call(
            app.clone(),
            Method::PUT,
            &format!("/api/users/{id}/password"),
            Some(json!({ "currentPassword": "Hunter22", "newPassword": "Better99" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(login("Better99").await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cart_routes() {
        let app = app();
        let (status, body) = call(
            app.clone(),
            Method::POST,
            "/api/users/1/cart",
            Some(json!({ "productId": 1, "quantity": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Item added to cart");
        let item = body["data"]["id"].as_i64().unwrap();

        let (_, body) = call(app.clone(), Method::GET, "/api/users/1/cart", None).await;
        assert_eq!(body["data"]["summary"]["totalItems"], 2);
        assert_eq!(body["data"]["summary"]["total"], 105000.0);

        let (status, body) = call(
            app.clone(),
            Method::PUT,
            &format!("/api/users/2/cart/{item}"),
            Some(json!({ "quantity": 5 })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");

        let (_, body) = call(app.clone(), Method::DELETE, "/api/users/1/cart", None).await;
        assert_eq!(body["data"]["cleared"], 1);
    }

    #[tokio::test]
    async fn test_favorite_routes() {
        let app = app();
        let (status, _) = call(app.clone(), Method::POST, "/api/users/1/favorites/restaurant/2", None).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = call(app.clone(), Method::POST, "/api/users/1/favorites/restaurant/2", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = call(app.clone(), Method::GET, "/api/users/1/favorites/restaurant/ids", None).await;
        assert_eq!(body["data"], json!([2]));

        let (_, body) = call(app.clone(), Method::GET, "/api/favorites/trending/restaurant", None).await;
        assert_eq!(body["data"][0]["item"]["name"], "Cafe Sua");
        assert_eq!(body["data"][0]["favoriteCount"], 1);

        let (_, body) = call(app.clone(), Method::POST, "/api/users/1/favorites/restaurant/2/toggle", None).await;
        assert_eq!(body["data"]["isFavorite"], false);

        let (status, _) = call(app.clone(), Method::GET, "/api/users/1/favorites/menu", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_address_routes() {
        let app = app();
        let (status, _) = call(app.clone(), Method::GET, "/api/users/1/addresses/default", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(
            app.clone(),
            Method::POST,
            "/api/addresses",
            Some(json!({ "userId": 1, "address": "12 Nguyen Trai, District 1", "isDefault": true })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["label"], "Home");

        let (_, body) = call(app.clone(), Method::GET, "/api/users/1/addresses/default", None).await;
        assert_eq!(body["data"]["address"], "12 Nguyen Trai, District 1");
    }

    #[tokio::test]
    async fn test_shipper_routes() {
        let app = app();
        for status in ["confirmed", "preparing"] {
            let (code, _) = call(app.clone(), Method::PATCH, "/api/orders/1/status", Some(json!({ "status": status }))).await;
            assert_eq!(code, StatusCode::OK);
        }

        let (_, body) = call(app.clone(), Method::GET, "/api/shippers/2/orders/available", None).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["restaurant"]["name"], "Pho 24");

        let (status, body) = call(app.clone(), Method::POST, "/api/shippers/2/orders/1/accept", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["shipperId"], 2);

        let (status, _) = call(
            app.clone(),
            Method::PATCH,
            "/api/shippers/1/orders/1/status",
            Some(json!({ "status": "delivering" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(
            app.clone(),
            Method::PATCH,
            "/api/shippers/2/orders/1/status",
            Some(json!({ "status": "delivering" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "delivering");

        let (_, body) = call(app.clone(), Method::GET, "/api/shippers/2/stats", None).await;
        assert_eq!(body["data"]["delivering"], 1);
    }
}
