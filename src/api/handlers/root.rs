use axum::response::IntoResponse;

/// Undocumented landing route; handy for load balancers and curl checks.
pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}
