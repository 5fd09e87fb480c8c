pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod middleware;
pub mod request;
pub mod session;
pub mod testing;

pub use app::{Helios, Lifecycle};
pub use config::HeliosConfig;
pub use error::{ApiError, FieldError, FormError, ParamError, ResponseError};
pub use middleware::{chain, cors, request_logger, Endpoint, Handler, Middleware};
pub use request::{HttpRequest, Request, RequestExt};
