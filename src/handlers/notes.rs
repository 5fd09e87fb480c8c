use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;

use helios::database::{ColumnType, DatabaseError, Model, ModelDescriptor};
use helios::{ApiError, FormError, Handler, RequestExt};

const TITLE_MAX_CHARS: usize = 200;
const BODY_MAX_CHARS: usize = 10_000;

/// Session key counting notes created by this client
pub const NOTES_CREATED_KEY: &str = "notes_created";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Note {
    pub id: i64,
    pub title: String,
    pub body: String,
}

impl Model for Note {
    fn descriptor() -> ModelDescriptor {
        ModelDescriptor::for_type::<Note>()
            .column("title", ColumnType::Text)
            .column("body", ColumnType::Text)
    }
}

#[derive(Debug, Deserialize)]
pub struct NewNote {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

impl NewNote {
    fn validate(&self) -> FormError {
        let mut form = FormError::new();
        form.declare_field("title");
        form.declare_field("body");

        if self.title.trim().is_empty() {
            form.add_field_error("title", "This field is required");
        }
        if self.title.chars().count() > TITLE_MAX_CHARS {
            form.add_field_error(
                "title",
                format!("Ensure this field has no more than {} characters", TITLE_MAX_CHARS),
            );
        }
        if self.body.chars().count() > BODY_MAX_CHARS {
            form.add_field_error(
                "body",
                format!("Ensure this field has no more than {} characters", BODY_MAX_CHARS),
            );
        }
        form
    }
}

/// POST /notes
pub fn create(pool: SqlitePool) -> Handler {
    Handler::new(move |req| {
        let pool = pool.clone();
        Box::pin(async move {
            let input: NewNote = match req.deserialize_request_data() {
                Ok(input) => input,
                Err(err) => return req.send_error(&err),
            };

            let form = input.validate();
            if form.is_error() {
                return req.send_error(&form);
            }

            let inserted = sqlx::query_as::<_, Note>(
                "INSERT INTO notes (title, body) VALUES (?1, ?2) RETURNING id, title, body",
            )
            .bind(input.title.trim())
            .bind(&input.body)
            .fetch_one(&pool)
            .await;

            match inserted {
                Ok(note) => {
                    let created = req.session::<u64>(NOTES_CREATED_KEY).unwrap_or(0) + 1;
                    req.set_session_data(NOTES_CREATED_KEY, json!(created));
                    req.save_session();
                    req.send_json(&note, StatusCode::CREATED);
                }
                Err(e) => req.send_error(&ApiError::from(DatabaseError::from(e))),
            }
        })
    })
}

/// GET /notes/:id
pub fn show(pool: SqlitePool) -> Handler {
    Handler::new(move |req| {
        let pool = pool.clone();
        Box::pin(async move {
            let id = match req.url_param_uint("id") {
                Ok(id) => id,
                Err(err) => return req.send_error(&ApiError::from(err)),
            };

            let found = sqlx::query_as::<_, Note>("SELECT id, title, body FROM notes WHERE id = ?1")
                .bind(i64::from(id))
                .fetch_optional(&pool)
                .await;

            match found {
                Ok(Some(note)) => req.send_json(&note, StatusCode::OK),
                Ok(None) => req.send_error(&ApiError::not_found(format!("Note {} not found", id))),
                Err(e) => req.send_error(&ApiError::from(DatabaseError::from(e))),
            }
        })
    })
}
