use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    api::models::{
        personas::{GeneratePersonasRequest, ListPersonasQuery, PersonaCreate, PersonaResponse, PersonaUpdate},
        users::CurrentUser,
    },
    db::{
        handlers::{personas::PersonaFilter, Personas, Repository},
        models::personas::{PersonaCreateDBRequest, PersonaUpdateDBRequest},
    },
    errors::{Error, Result},
    types::PersonaId,
    AppState,
};

const MAX_GENERATED_PERSONAS: u32 = 10;

/// Create a persona
#[utoipa::path(
    post,
    path = "/personas",
    tag = "personas",
    request_body = PersonaCreate,
    responses(
        (status = 201, description = "Persona created", body = PersonaResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_persona(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(data): Json<PersonaCreate>,
) -> Result<(StatusCode, Json<PersonaResponse>)> {
    if data.name.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "Persona name must not be empty".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let persona = Personas::new(&mut conn).create(&data.into_db_request(current_user.id)).await?;

    Ok((StatusCode::CREATED, Json(PersonaResponse::from(persona))))
}

/// List the caller's personas
#[utoipa::path(
    get,
    path = "/personas",
    tag = "personas",
    params(ListPersonasQuery),
    responses(
        (status = 200, description = "List of personas", body = [PersonaResponse]),
        (status = 401, description = "Unauthorized"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_personas(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListPersonasQuery>,
) -> Result<Json<Vec<PersonaResponse>>> {
    let skip = query.skip.unwrap_or(0);
    let limit = query.limit.unwrap_or(100).min(1000);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let personas = Personas::new(&mut conn)
        .list(&PersonaFilter::new(current_user.id, skip, limit))
        .await?;

    Ok(Json(personas.into_iter().map(PersonaResponse::from).collect()))
}

/// Get one persona
#[utoipa::path(
    get,
    path = "/personas/{id}",
    tag = "personas",
    params(("id" = String, Path, description = "Persona ID (UUID)")),
    responses(
        (status = 200, description = "The persona", body = PersonaResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Persona not found"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_persona(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<PersonaId>,
) -> Result<Json<PersonaResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let persona = Personas::new(&mut conn)
        .get_owned(id, current_user.id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Persona".to_string(),
            id: id.to_string(),
        })?;

    Ok(Json(PersonaResponse::from(persona)))
}

/// Update a persona
#[utoipa::path(
    patch,
    path = "/personas/{id}",
    tag = "personas",
    params(("id" = String, Path, description = "Persona ID (UUID)")),
    request_body = PersonaUpdate,
    responses(
        (status = 200, description = "Updated persona", body = PersonaResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Persona not found"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_persona(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<PersonaId>,
    Json(data): Json<PersonaUpdate>,
) -> Result<Json<PersonaResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    // Ownership check before the write
    Personas::new(&mut conn)
        .get_owned(id, current_user.id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Persona".to_string(),
            id: id.to_string(),
        })?;

    let persona = Personas::new(&mut conn).update(id, &PersonaUpdateDBRequest::from(data)).await?;

    Ok(Json(PersonaResponse::from(persona)))
}

/// Delete a persona
#[utoipa::path(
    delete,
    path = "/personas/{id}",
    tag = "personas",
    params(("id" = String, Path, description = "Persona ID (UUID)")),
    responses(
        (status = 204, description = "Persona deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Persona not found"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_persona(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<PersonaId>,
) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    Personas::new(&mut conn)
        .get_owned(id, current_user.id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Persona".to_string(),
            id: id.to_string(),
        })?;

    Personas::new(&mut conn).delete(id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Generate personas with the feedback model and save them for the caller.
///
/// Unlike feedback generation there is no partial-success concept here: a
/// provider failure fails the whole request.
#[utoipa::path(
    post,
    path = "/personas/generate",
    tag = "personas",
    request_body = GeneratePersonasRequest,
    responses(
        (status = 201, description = "Generated personas", body = [PersonaResponse]),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized"),
        (status = 502, description = "Feedback model failure"),
    ),
    security(("CookieAuth" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn generate_personas(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<GeneratePersonasRequest>,
) -> Result<(StatusCode, Json<Vec<PersonaResponse>>)> {
    if request.age_groups.is_empty() {
        return Err(Error::BadRequest {
            message: "At least one age group is required".to_string(),
        });
    }
    if request.count == 0 || request.count > MAX_GENERATED_PERSONAS {
        return Err(Error::BadRequest {
            message: format!("count must be between 1 and {MAX_GENERATED_PERSONAS}"),
        });
    }

    let generated = state
        .model
        .generate_personas(&request.age_groups, request.count)
        .await
        .map_err(|e| {
            tracing::error!("Persona generation failed: {e}");
            Error::Provider {
                operation: "generate personas".to_string(),
            }
        })?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut saved = Vec::with_capacity(generated.len());
    for persona in generated {
        let created = Personas::new(&mut tx)
            .create(&PersonaCreateDBRequest {
                user_id: current_user.id,
                name: persona.name,
                age_group: persona.age_group,
                occupation: persona.occupation,
                description: persona.description,
                traits: persona.traits,
            })
            .await?;
        saved.push(PersonaResponse::from(created));
    }
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok((StatusCode::CREATED, Json(saved)))
}
