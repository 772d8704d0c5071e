use super::{
    components::{self, Component},
    errors::ServerError,
    extractors::{IncomingFlash, PROJECT_COOKIE},
    flash::{self, Flash},
    form::{reconstruct, Submission},
    models::{
        AppState, Entity, EntityId, EntityKey, Pagination, ProjectContext,
    },
    routes::Route,
};
use axum::{
    extract::{Path, Query, State},
    http::{header::SET_COOKIE, StatusCode},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    Form, Json,
};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Wraps `children` in the page chrome, and clears the flash cookie when we
/// just showed its message.
fn page(
    state: &AppState,
    ctx: &ProjectContext,
    flash: Option<&Flash>,
    clear_flash: bool,
    title: String,
    children: Box<dyn Component + '_>,
) -> Response {
    let html = components::Page {
        title,
        ctx,
        projects: &state.config.projects,
        flash,
        children,
    }
    .render();
    if clear_flash {
        (AppendHeaders([(SET_COOKIE, flash::clear_cookie())]), html)
            .into_response()
    } else {
        html.into_response()
    }
}

fn redirect_with_flash(state: &AppState, to: Route, flash: Flash) -> Response {
    let cookie = flash::set_cookie(&state.config.flash_secret, &flash);
    (
        AppendHeaders([(SET_COOKIE, cookie)]),
        Redirect::to(&to.to_string()),
    )
        .into_response()
}

fn key_for(kind: &str, id: &str) -> EntityKey {
    EntityKey::new(kind, EntityId::parse(id))
}

pub async fn root(
    State(state): State<AppState>,
    ctx: ProjectContext,
    IncomingFlash(incoming): IncomingFlash,
) -> Response {
    let had_flash = incoming.is_some();
    let (kinds, flash) = match state.store.list_kinds(&ctx).await {
        Ok(kinds) => (kinds, incoming),
        Err(e) => {
            tracing::warn!(project = %ctx.project_id, "listing kinds failed: {e:#}");
            (
                vec![],
                Some(Flash::error(format!("Error connecting to datastore: {e}"))),
            )
        }
    };
    page(
        &state,
        &ctx,
        flash.as_ref(),
        had_flash,
        "Kinds".to_string(),
        Box::new(components::KindList { kinds: &kinds }),
    )
}

#[derive(Deserialize)]
pub struct PageParams {
    page: Option<u32>,
    per_page: Option<u32>,
}
pub async fn browse_kind(
    State(state): State<AppState>,
    ctx: ProjectContext,
    IncomingFlash(flash): IncomingFlash,
    Path(kind): Path<String>,
    Query(PageParams { page, per_page }): Query<PageParams>,
) -> Response {
    let mut pagination = Pagination::new(page, per_page);
    let result = state
        .store
        .list_entities(
            &ctx,
            &kind,
            pagination.per_page as usize,
            pagination.offset(),
        )
        .await;
    match result {
        Ok(entities) => {
            pagination.total_count = entities.total_count;
            page_response(
                &state,
                &ctx,
                flash,
                kind.clone(),
                Box::new(components::EntityTable {
                    kind: &kind,
                    page: &entities,
                    pagination,
                }),
            )
        }
        Err(e) => {
            tracing::warn!(%kind, "listing entities failed: {e:#}");
            redirect_with_flash(
                &state,
                Route::Root,
                Flash::error(format!("Error browsing {kind}: {e}")),
            )
        }
    }
}

fn page_response(
    state: &AppState,
    ctx: &ProjectContext,
    flash: Option<Flash>,
    title: String,
    children: Box<dyn Component + '_>,
) -> Response {
    page(state, ctx, flash.as_ref(), flash.is_some(), title, children)
}

pub async fn view_entity(
    State(state): State<AppState>,
    ctx: ProjectContext,
    IncomingFlash(flash): IncomingFlash,
    Path((kind, id)): Path<(String, String)>,
) -> Response {
    match state.store.get_entity(&ctx, &key_for(&kind, &id)).await {
        Ok(Some(entity)) => page_response(
            &state,
            &ctx,
            flash,
            format!("{kind} {id}"),
            Box::new(components::EntityDetail { entity: &entity }),
        ),
        Ok(None) => redirect_with_flash(
            &state,
            Route::Kind(&kind),
            Flash::error(format!("Entity not found: {id}")),
        ),
        Err(e) => redirect_with_flash(
            &state,
            Route::Kind(&kind),
            Flash::error(format!("Error viewing entity: {e}")),
        ),
    }
}

pub async fn edit_entity_form(
    State(state): State<AppState>,
    ctx: ProjectContext,
    IncomingFlash(flash): IncomingFlash,
    Path((kind, id)): Path<(String, String)>,
) -> Response {
    match state.store.get_entity(&ctx, &key_for(&kind, &id)).await {
        Ok(Some(entity)) => page_response(
            &state,
            &ctx,
            flash,
            format!("Edit {kind} {id}"),
            Box::new(components::EntityForm {
                kind: &kind,
                entity: Some(&entity),
                error: None,
            }),
        ),
        Ok(None) => redirect_with_flash(
            &state,
            Route::Kind(&kind),
            Flash::error(format!("Entity not found: {id}")),
        ),
        Err(e) => redirect_with_flash(
            &state,
            Route::Kind(&kind),
            Flash::error(format!("Error editing entity: {e}")),
        ),
    }
}

/// Nothing is written unless every submitted field decodes; otherwise the
/// form comes back with the error.
pub async fn update_entity(
    State(state): State<AppState>,
    ctx: ProjectContext,
    Path((kind, id)): Path<(String, String)>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Response {
    let key = key_for(&kind, &id);
    let entity = match state.store.get_entity(&ctx, &key).await {
        Ok(Some(entity)) => entity,
        Ok(None) => {
            return redirect_with_flash(
                &state,
                Route::Kind(&kind),
                Flash::error(format!("Entity not found: {id}")),
            )
        }
        Err(e) => {
            return redirect_with_flash(
                &state,
                Route::Kind(&kind),
                Flash::error(format!("Error editing entity: {e}")),
            )
        }
    };
    let submission = Submission::from_fields(fields);
    let properties = match reconstruct(&entity.properties, &submission) {
        Ok(properties) => properties,
        Err(e) => {
            let message = e.to_string();
            let html = page(
                &state,
                &ctx,
                None,
                false,
                format!("Edit {kind} {id}"),
                Box::new(components::EntityForm {
                    kind: &kind,
                    entity: Some(&entity),
                    error: Some(&message),
                }),
            );
            return (StatusCode::UNPROCESSABLE_ENTITY, html).into_response();
        }
    };
    let updated = Entity {
        key: entity.key.clone(),
        properties,
    };
    match state.store.put_entity(&ctx, updated).await {
        Ok(_) => {
            tracing::info!(%key, "updated entity");
            redirect_with_flash(
                &state,
                Route::Entity { kind: &kind, id: &id },
                Flash::success(format!("Entity {id} updated successfully!")),
            )
        }
        Err(e) => redirect_with_flash(
            &state,
            Route::Kind(&kind),
            Flash::error(format!("Error editing entity: {e}")),
        ),
    }
}

pub async fn new_entity_form(
    State(state): State<AppState>,
    ctx: ProjectContext,
    IncomingFlash(flash): IncomingFlash,
    Path(kind): Path<String>,
) -> Response {
    page_response(
        &state,
        &ctx,
        flash,
        format!("New {kind}"),
        Box::new(components::EntityForm {
            kind: &kind,
            entity: None,
            error: None,
        }),
    )
}

/// A blank `entity_id` lets the store allocate one.
pub async fn create_entity(
    State(state): State<AppState>,
    ctx: ProjectContext,
    Path(kind): Path<String>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Response {
    let submission = Submission::from_fields(fields);
    let properties = match reconstruct(&BTreeMap::new(), &submission) {
        Ok(properties) => properties,
        Err(e) => {
            let message = e.to_string();
            let html = page(
                &state,
                &ctx,
                None,
                false,
                format!("New {kind}"),
                Box::new(components::EntityForm {
                    kind: &kind,
                    entity: None,
                    error: Some(&message),
                }),
            );
            return (StatusCode::UNPROCESSABLE_ENTITY, html).into_response();
        }
    };
    let key = match &submission.entity_id {
        Some(id) => key_for(&kind, id),
        None => EntityKey::incomplete(&kind),
    };
    match state.store.put_entity(&ctx, Entity { key, properties }).await {
        Ok(key) => {
            tracing::info!(%key, "created entity");
            let id = key.id.map(|id| id.to_string()).unwrap_or_default();
            redirect_with_flash(
                &state,
                Route::Entity { kind: &kind, id: &id },
                Flash::success(format!(
                    "Entity created successfully with ID: {id}"
                )),
            )
        }
        Err(e) => redirect_with_flash(
            &state,
            Route::Kind(&kind),
            Flash::error(format!("Error creating entity: {e}")),
        ),
    }
}

pub async fn delete_entity(
    State(state): State<AppState>,
    ctx: ProjectContext,
    Path((kind, id)): Path<(String, String)>,
) -> Response {
    let key = key_for(&kind, &id);
    let flash = match state.store.delete_entity(&ctx, &key).await {
        Ok(true) => {
            tracing::info!(%key, "deleted entity");
            Flash::success(format!("Entity {id} deleted successfully!"))
        }
        Ok(false) => Flash::error(format!("Entity not found: {id}")),
        Err(e) => Flash::error(format!("Error deleting entity: {e}")),
    };
    redirect_with_flash(&state, Route::Kind(&kind), flash)
}

#[derive(Deserialize)]
pub struct ProjectForm {
    project: String,
}
pub async fn select_project(
    State(state): State<AppState>,
    Form(ProjectForm { project }): Form<ProjectForm>,
) -> Response {
    if !state.config.projects.iter().any(|p| *p == project) {
        return redirect_with_flash(
            &state,
            Route::Root,
            Flash::error(format!("Unknown project: {project}")),
        );
    }
    let project_cookie = format!(
        "{PROJECT_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax",
        urlencoding::encode(&project)
    );
    let flash_cookie = flash::set_cookie(
        &state.config.flash_secret,
        &Flash::info(format!("Switched to project {project}")),
    );
    (
        AppendHeaders([(SET_COOKIE, project_cookie), (SET_COOKIE, flash_cookie)]),
        Redirect::to(&Route::Root.to_string()),
    )
        .into_response()
}

pub async fn api_kinds(
    State(state): State<AppState>,
    ctx: ProjectContext,
) -> Result<Json<Vec<String>>, ServerError> {
    Ok(Json(state.store.list_kinds(&ctx).await?))
}
