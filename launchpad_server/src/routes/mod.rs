use axum::routing::{get, post};
use axum::Router;

pub mod evaluate;
pub mod health;
pub mod ppt;
pub mod recommend;
pub mod research;

#[tracing::instrument(level = "debug", skip_all)]
pub fn router() -> Router {
    Router::new()
        .route("/health", get(health::get_health))
        .route("/research", post(research::post_research))
        .route("/evaluate", post(evaluate::post_evaluate))
        .route("/recommend", post(recommend::post_recommend))
        .merge(ppt::router())
}
