//! User service.

use parley_common::{AppError, AppResult, IdGenerator};
use parley_db::{entities::user, repositories::UserRepository};
use sea_orm::Set;
use serde::Deserialize;
use validator::{Validate, ValidationError};

/// Input for creating a new user.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserInput {
    #[validate(length(min = 1, max = 128), custom(function = "validate_username"))]
    pub username: String,

    #[validate(length(min = 1, max = 256))]
    pub name: String,

    #[validate(email, length(max = 256))]
    pub email: String,
}

/// Input for updating the current user.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUserInput {
    #[validate(length(min = 1, max = 256))]
    pub name: Option<String>,

    #[validate(email, length(max = 256))]
    pub email: Option<String>,
}

/// Usernames must be reachable by an `@username` mention.
fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        Ok(())
    } else {
        Err(ValidationError::new("username_charset"))
    }
}

/// User service for business logic.
#[derive(Clone)]
pub struct UserService {
    user_repo: UserRepository,
    id_gen: IdGenerator,
}

impl UserService {
    /// Create a new user service.
    #[must_use]
    pub const fn new(user_repo: UserRepository) -> Self {
        Self {
            user_repo,
            id_gen: IdGenerator::new(),
        }
    }

    /// Register a user and issue their first token.
    pub async fn create(&self, input: CreateUserInput) -> AppResult<user::Model> {
        input.validate()?;

        if self
            .user_repo
            .find_by_username(&input.username)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict("Username already taken".to_string()));
        }

        if self.user_repo.find_by_email(&input.email).await?.is_some() {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let model = user::ActiveModel {
            id: Set(self.id_gen.generate()),
            username: Set(input.username),
            name: Set(input.name),
            email: Set(input.email),
            token: Set(Some(self.id_gen.generate_token())),
            created_at: Set(chrono::Utc::now().into()),
            updated_at: Set(None),
        };

        let user = self.user_repo.create(model).await?;
        tracing::info!(user_id = %user.id, username = %user.username, "User registered");
        Ok(user)
    }

    /// Get a user by ID.
    pub async fn get(&self, id: &str) -> AppResult<user::Model> {
        self.user_repo.get_by_id(id).await
    }

    /// Get a user by exact username.
    pub async fn get_by_username(&self, username: &str) -> AppResult<user::Model> {
        self.user_repo
            .find_by_username(username)
            .await?
            .ok_or_else(|| AppError::UserNotFound(username.to_string()))
    }

    /// Authenticate a user by token.
    pub async fn authenticate_by_token(&self, token: &str) -> AppResult<user::Model> {
        self.user_repo
            .find_by_token(token)
            .await?
            .ok_or(AppError::Unauthorized)
    }

    /// Update the user's profile.
    pub async fn update_profile(&self, id: &str, input: UpdateUserInput) -> AppResult<user::Model> {
        input.validate()?;

        let user = self.user_repo.get_by_id(id).await?;

        if let Some(ref email) = input.email
            && *email != user.email
            && self.user_repo.find_by_email(email).await?.is_some()
        {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let mut active: user::ActiveModel = user.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(email) = input.email {
            active.email = Set(email);
        }
        active.updated_at = Set(Some(chrono::Utc::now().into()));

        self.user_repo.update(active).await
    }

    /// Replace the user's token, invalidating the old one.
    pub async fn regenerate_token(&self, user_id: &str) -> AppResult<String> {
        let user = self.user_repo.get_by_id(user_id).await?;
        let new_token = self.id_gen.generate_token();

        let mut active: user::ActiveModel = user.into();
        active.token = Set(Some(new_token.clone()));
        active.updated_at = Set(Some(chrono::Utc::now().into()));

        self.user_repo.update(active).await?;

        Ok(new_token)
    }

    /// Sign out: the current token stops working and no new one is issued.
    pub async fn revoke_token(&self, user_id: &str) -> AppResult<()> {
        let user = self.user_repo.get_by_id(user_id).await?;

        let mut active: user::ActiveModel = user.into();
        active.token = Set(None);
        active.updated_at = Set(Some(chrono::Utc::now().into()));

        self.user_repo.update(active).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::sync::Arc;

    fn create_test_user(id: &str, username: &str) -> user::Model {
        user::Model {
            id: id.to_string(),
            username: username.to_string(),
            name: "Test User".to_string(),
            email: format!("{username}@example.com"),
            token: Some("test_token".to_string()),
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn input(username: &str) -> CreateUserInput {
        CreateUserInput {
            username: username.to_string(),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
        }
    }

    #[test]
    fn test_username_validation() {
        assert!(input("alice_01-x").validate().is_ok());
        assert!(input("alice smith").validate().is_err());
        assert!(input("alice.smith").validate().is_err());
        assert!(input("").validate().is_err());
    }

    #[tokio::test]
    async fn test_create_user() {
        let created = create_test_user("user1", "alice");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<user::Model>::new()])
                .append_query_results([Vec::<user::Model>::new()])
                .append_query_results([[created]])
                .into_connection(),
        );

        let service = UserService::new(UserRepository::new(db));
        let user = service.create(input("alice")).await.unwrap();

        assert_eq!(user.username, "alice");
        assert!(user.token.is_some());
    }

    #[tokio::test]
    async fn test_create_user_username_taken() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_user("user1", "alice")]])
                .into_connection(),
        );

        let service = UserService::new(UserRepository::new(db));
        let result = service.create(input("alice")).await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_create_user_invalid_input_skips_queries() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());

        let service = UserService::new(UserRepository::new(db));
        let result = service
            .create(CreateUserInput {
                username: "alice".to_string(),
                name: "Alice".to_string(),
                email: "not-an-email".to_string(),
            })
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_authenticate_by_token_unknown() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<user::Model>::new()])
                .into_connection(),
        );

        let service = UserService::new(UserRepository::new(db));
        let result = service.authenticate_by_token("bogus").await;

        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_get_by_username_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<user::Model>::new()])
                .into_connection(),
        );

        let service = UserService::new(UserRepository::new(db));
        let result = service.get_by_username("ghost").await;

        assert!(matches!(result, Err(AppError::UserNotFound(name)) if name == "ghost"));
    }

    #[tokio::test]
    async fn test_regenerate_token() {
        let user = create_test_user("user1", "alice");
        let mut updated = user.clone();
        updated.token = Some("fresh".to_string());

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[user]])
                .append_query_results([[updated]])
                .into_connection(),
        );

        let service = UserService::new(UserRepository::new(db));
        let token = service.regenerate_token("user1").await.unwrap();

        assert_eq!(token.len(), 32);
        assert_ne!(token, "test_token");
    }
}
