use std::sync::Arc;

use crate::{app_state::AppState, openapi::ApiDoc};
use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub fn openapi_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/openapi/parley.json", ApiDoc::openapi()))
}
