//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{borrows, health};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Borrowdesk API",
        version = "0.3.0",
        description = "University library borrowing REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Borrows
        borrows::create_request,
        borrows::decide,
        borrows::direct_borrow,
        borrows::return_book,
        borrows::settle_fine,
        borrows::delete_record,
        borrows::list_borrows,
        borrows::my_borrow,
        borrows::my_requests,
        borrows::fine_policy,
    ),
    components(
        schemas(
            // Borrows
            borrows::BorrowRequestBody,
            borrows::DecisionBody,
            borrows::DecisionResponse,
            borrows::ReturnBody,
            borrows::SettleFineBody,
            crate::models::borrow::BorrowRecord,
            crate::models::borrow::BorrowStatus,
            crate::models::borrow::BorrowSort,
            crate::models::borrow::DecisionAction,
            crate::models::borrow::BorrowView,
            crate::models::borrow::BorrowPage,
            crate::models::user::UserRole,
            crate::services::requests::CreatedRequest,
            crate::services::returns::ReturnReceipt,
            crate::services::reconciliation::DeletionOutcome,
            crate::services::fines::FinePolicyInfo,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "borrows", description = "Borrowing lifecycle")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
