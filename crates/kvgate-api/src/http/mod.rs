//! HTTP API endpoints.
//!
//! | Endpoint | Method | Auth | Description |
//! |----------|--------|------|-------------|
//! | `/api/login` | POST | - | Exchange credentials for a bearer token |
//! | `/api/write` | POST | Bearer | Store a batch of key/value pairs |
//! | `/api/read` | POST | Bearer | Fetch a batch of keys |
//! | `/health` | GET | - | Liveness probe |
//! | `/ready` | GET | - | Storage readiness probe |
//! | `/metrics` | GET | - | Prometheus metrics (observability router only) |

mod auth;
pub mod routes;
pub mod state;

pub use auth::{require_bearer, AuthenticatedUser};
pub use routes::{
    create_router, create_router_with_body_limit, create_router_with_observability, error_codes,
    ApiError, LoginRequest, LoginResponse, ReadRequest, ReadResponse, WriteRequest,
    WriteResponse, DEFAULT_BODY_LIMIT,
};
pub use state::AppState;
