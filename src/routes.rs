use super::{controllers, middleware, models::AppState};
use axum::{
    middleware::from_fn,
    routing::{get, post, Router},
};
use std::fmt;
use tower_http::trace::TraceLayer;

/// Links to our own pages. Kinds and ids are user data, so they are
/// percent-encoded into their path segment.
pub enum Route<'a> {
    Root,
    Kind(&'a str),
    KindPage {
        kind: &'a str,
        page: u32,
        per_page: u32,
    },
    Entity {
        kind: &'a str,
        id: &'a str,
    },
    EditEntity {
        kind: &'a str,
        id: &'a str,
    },
    DeleteEntity {
        kind: &'a str,
        id: &'a str,
    },
    NewEntity(&'a str),
    SelectProject,
    ApiKinds,
}

impl fmt::Display for Route<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use urlencoding::encode;
        match self {
            Self::Root => write!(f, "/"),
            Self::Kind(kind) => write!(f, "/kind/{}", encode(kind)),
            Self::KindPage {
                kind,
                page,
                per_page,
            } => write!(
                f,
                "/kind/{}?page={page}&per_page={per_page}",
                encode(kind)
            ),
            Self::Entity { kind, id } => {
                write!(f, "/kind/{}/entity/{}", encode(kind), encode(id))
            }
            Self::EditEntity { kind, id } => {
                write!(f, "/kind/{}/entity/{}/edit", encode(kind), encode(id))
            }
            Self::DeleteEntity { kind, id } => {
                write!(f, "/kind/{}/entity/{}/delete", encode(kind), encode(id))
            }
            Self::NewEntity(kind) => write!(f, "/kind/{}/new", encode(kind)),
            Self::SelectProject => write!(f, "/project"),
            Self::ApiKinds => write!(f, "/api/kinds"),
        }
    }
}

#[rustfmt::skip]
pub fn get_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(controllers::root))
        .route("/kind/:kind", get(controllers::browse_kind))
        .route("/kind/:kind/new", get(controllers::new_entity_form))
        .route("/kind/:kind/new", post(controllers::create_entity))
        .route("/kind/:kind/entity/:id", get(controllers::view_entity))
        .route("/kind/:kind/entity/:id/edit", get(controllers::edit_entity_form))
        .route("/kind/:kind/entity/:id/edit", post(controllers::update_entity))
        .route("/kind/:kind/entity/:id/delete", post(controllers::delete_entity))
        .route("/project", post(controllers::select_project))
        .route("/api/kinds", get(controllers::api_kinds))
}

pub fn build_app(state: AppState) -> Router {
    get_routes()
        .layer(from_fn(middleware::html_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_are_encoded() {
        assert_eq!(Route::Kind("User").to_string(), "/kind/User");
        assert_eq!(
            Route::Entity {
                kind: "Product",
                id: "laptop pro/15"
            }
            .to_string(),
            "/kind/Product/entity/laptop%20pro%2F15"
        );
        assert_eq!(
            Route::KindPage {
                kind: "User",
                page: 2,
                per_page: 50
            }
            .to_string(),
            "/kind/User?page=2&per_page=50"
        );
        assert_eq!(Route::NewEntity("A&B").to_string(), "/kind/A%26B/new");
    }
}
