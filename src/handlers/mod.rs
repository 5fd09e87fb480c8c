// Demo routes for the helios binary
//
// /health      GET  - database ping
// /notes       POST - create a note
// /notes/:id   GET  - fetch a note

pub mod health;
pub mod notes;

use axum::routing::{get_service, post_service};
use axum::Router;

use helios::database::DatabaseError;
use helios::{cors, request_logger, Helios, Middleware};

pub fn register_models(app: &mut Helios) {
    app.register_model::<notes::Note>();
}

/// Middleware every API route runs through, outermost first
pub fn api_middleware(app: &Helios) -> Vec<Middleware> {
    let mut middlewares = Vec::new();
    if app.config().api.enable_request_logging {
        middlewares.push(request_logger());
    }
    middlewares.push(cors(app.config().security.cors_origins.clone()));
    middlewares
}

pub fn routes(app: &Helios) -> Result<Router, DatabaseError> {
    let pool = app.db()?.clone();
    let middlewares = api_middleware(app);

    Ok(Router::new()
        .route("/health", get_service(app.handle(health::check(pool.clone()))))
        .route(
            "/notes",
            post_service(app.with_middleware(notes::create(pool.clone()), &middlewares)),
        )
        .route(
            "/notes/:id",
            get_service(app.with_middleware(notes::show(pool), &middlewares)),
        ))
}
