//! Database repository for customer personas.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::personas::{PersonaCreateDBRequest, PersonaDBResponse, PersonaUpdateDBRequest},
};
use crate::types::{abbrev_uuid, PersonaId, UserId};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use tracing::instrument;

/// Filter for listing personas, scoped to an owner
#[derive(Debug, Clone)]
pub struct PersonaFilter {
    pub user_id: UserId,
    pub skip: i64,
    pub limit: i64,
}

impl PersonaFilter {
    pub fn new(user_id: UserId, skip: i64, limit: i64) -> Self {
        Self { user_id, skip, limit }
    }
}

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct Persona {
    pub id: PersonaId,
    pub user_id: UserId,
    pub name: String,
    pub age_group: Option<String>,
    pub occupation: Option<String>,
    pub description: Option<String>,
    pub traits: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Persona> for PersonaDBResponse {
    fn from(p: Persona) -> Self {
        Self {
            id: p.id,
            user_id: p.user_id,
            name: p.name,
            age_group: p.age_group,
            occupation: p.occupation,
            description: p.description,
            traits: p.traits,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

pub struct Personas<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Personas<'c> {
    type CreateRequest = PersonaCreateDBRequest;
    type UpdateRequest = PersonaUpdateDBRequest;
    type Response = PersonaDBResponse;
    type Id = PersonaId;
    type Filter = PersonaFilter;

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id), name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let persona = sqlx::query_as::<_, Persona>(
            r#"
            INSERT INTO personas (user_id, name, age_group, occupation, description, traits)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(request.user_id)
        .bind(&request.name)
        .bind(&request.age_group)
        .bind(&request.occupation)
        .bind(&request.description)
        .bind(&request.traits)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(PersonaDBResponse::from(persona))
    }

    #[instrument(skip(self), fields(persona_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let persona = sqlx::query_as::<_, Persona>("SELECT * FROM personas WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(persona.map(PersonaDBResponse::from))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<PersonaId>) -> Result<std::collections::HashMap<Self::Id, PersonaDBResponse>> {
        if ids.is_empty() {
            return Ok(std::collections::HashMap::new());
        }

        let personas = sqlx::query_as::<_, Persona>("SELECT * FROM personas WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(personas.into_iter().map(|p| (p.id, PersonaDBResponse::from(p))).collect())
    }

    #[instrument(skip(self, filter), fields(user_id = %abbrev_uuid(&filter.user_id)), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let personas = sqlx::query_as::<_, Persona>(
            "SELECT * FROM personas WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(filter.user_id)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(personas.into_iter().map(PersonaDBResponse::from).collect())
    }

    #[instrument(skip(self), fields(persona_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM personas WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(persona_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let persona = sqlx::query_as::<_, Persona>(
            r#"
            UPDATE personas SET
                name = COALESCE($2, name),
                age_group = COALESCE($3, age_group),
                occupation = COALESCE($4, occupation),
                description = COALESCE($5, description),
                traits = COALESCE($6, traits),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .bind(&request.age_group)
        .bind(&request.occupation)
        .bind(&request.description)
        .bind(&request.traits)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(PersonaDBResponse::from(persona))
    }
}

impl<'c> Personas<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Fetch a persona only if it belongs to the given owner. Used by every
    /// API path so one user can never read another user's personas.
    #[instrument(skip(self), fields(persona_id = %abbrev_uuid(&id), user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn get_owned(&mut self, id: PersonaId, user_id: UserId) -> Result<Option<PersonaDBResponse>> {
        let persona = sqlx::query_as::<_, Persona>("SELECT * FROM personas WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(persona.map(PersonaDBResponse::from))
    }
}

#[cfg(test)]
mod tests {
    use super::super::repository::Repository;
    use super::*;
    use crate::test_utils::{create_test_persona, create_test_user};
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_and_get_owned(pool: PgPool) {
        let owner = create_test_user(&pool, 0).await;
        let other = create_test_user(&pool, 0).await;
        let persona = create_test_persona(&pool, owner.id, "Budget-conscious parent").await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Personas::new(&mut conn);

        let found = repo.get_owned(persona.id, owner.id).await.unwrap();
        assert!(found.is_some());

        // Someone else's persona is invisible
        let not_found = repo.get_owned(persona.id, other.id).await.unwrap();
        assert!(not_found.is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_keeps_unset_fields(pool: PgPool) {
        let owner = create_test_user(&pool, 0).await;
        let persona = create_test_persona(&pool, owner.id, "Early adopter").await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Personas::new(&mut conn);

        let updated = repo
            .update(
                persona.id,
                &PersonaUpdateDBRequest {
                    occupation: Some("Product manager".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Early adopter");
        assert_eq!(updated.occupation, Some("Product manager".to_string()));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_is_owner_scoped(pool: PgPool) {
        let owner = create_test_user(&pool, 0).await;
        let other = create_test_user(&pool, 0).await;
        create_test_persona(&pool, owner.id, "A").await;
        create_test_persona(&pool, owner.id, "B").await;
        create_test_persona(&pool, other.id, "C").await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Personas::new(&mut conn);

        let listed = repo.list(&PersonaFilter::new(owner.id, 0, 100)).await.unwrap();
        assert_eq!(listed.len(), 2);
    }
}
