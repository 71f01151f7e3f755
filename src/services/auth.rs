//! Authentication and user management service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::{RegisterUser, Role, User, UserClaims},
    repository::Repository,
};

#[derive(Clone)]
pub struct AuthService {
    repository: Repository,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Create a reader account and sign it in
    pub async fn register(&self, request: RegisterUser) -> AppResult<(String, User)> {
        request.validate()?;

        let hash = hash_password(&request.password)?;
        let user = self
            .repository
            .users
            .create(&request.email, &request.name, Role::User, &hash)
            .await?;

        tracing::info!(user_id = %user.id, "Registered new user");

        let token = self.create_token(&user)?;
        Ok((token, user))
    }

    /// Authenticate by email and password
    pub async fn login(&self, email: &str, password: &str) -> AppResult<(String, User)> {
        let invalid = || AppError::Authentication("Invalid email or password".to_string());

        let user = self.repository.users.get_by_email(email).await?;

        let user = match user {
            Some(user) if verify_password(&user.password_hash, password)? => user,
            Some(_) => return Err(invalid()),
            None => {
                // Same argon2 cost as a real check so timing does not reveal unknown emails
                burn_password_check(password)?;
                return Err(invalid());
            }
        };

        let token = self.create_token(&user)?;
        Ok((token, user))
    }

    pub async fn get_user(&self, id: Uuid) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    pub async fn list_users(&self) -> AppResult<Vec<User>> {
        self.repository.users.list().await
    }

    /// Change a user's role. Admins cannot demote themselves.
    pub async fn set_role(&self, acting: &UserClaims, id: Uuid, role: Role) -> AppResult<User> {
        if acting.user_id == id && role != Role::Admin {
            return Err(AppError::BusinessRule(
                "Administrators cannot remove their own admin role".to_string(),
            ));
        }

        let user = self.repository.users.set_role(id, role).await?;
        tracing::info!(user_id = %id, role = %role, by = %acting.user_id, "Changed user role");
        Ok(user)
    }

    /// Create the configured admin account if it does not exist yet
    pub async fn ensure_bootstrap_admin(&self) -> AppResult<()> {
        let (Some(email), Some(password)) = (
            self.config.bootstrap_admin_email.as_deref(),
            self.config.bootstrap_admin_password.as_deref(),
        ) else {
            return Ok(());
        };

        if self.repository.users.get_by_email(email).await?.is_some() {
            return Ok(());
        }

        let hash = hash_password(password)?;
        let user = self
            .repository
            .users
            .create(email, "Administrator", Role::Admin, &hash)
            .await?;

        tracing::info!(user_id = %user.id, "Created bootstrap admin account");
        Ok(())
    }

    fn create_token(&self, user: &User) -> AppResult<String> {
        UserClaims::new(user, self.config.jwt_expiration_hours)
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }
}

/// Hash a password with argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Check a password against a stored argon2 hash
pub fn verify_password(stored_hash: &str, password: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Spend one argon2 derivation on `password` without checking anything
fn burn_password_check(password: &str) -> AppResult<()> {
    hash_password(password).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    use crate::config::DatabaseConfig;

    async fn service(bootstrap_email: &str) -> AuthService {
        let url = std::env::var("DATABASE_URL").unwrap_or_else(|_| DatabaseConfig::default().url);
        let pool = PgPoolOptions::new().connect(&url).await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        let config = AuthConfig {
            bootstrap_admin_email: Some(bootstrap_email.to_string()),
            bootstrap_admin_password: Some("bootstrap-pass".to_string()),
            ..AuthConfig::default()
        };
        AuthService::new(Repository::new(pool), config)
    }

    #[tokio::test]
    #[ignore] // needs a database: DATABASE_URL=... cargo test -- --ignored
    async fn test_bootstrap_admin_is_created_once() {
        let email = format!("boot-{}@example.org", Uuid::new_v4());
        let auth = service(&email).await;

        auth.ensure_bootstrap_admin().await.unwrap();
        let (_, first) = auth.login(&email, "bootstrap-pass").await.unwrap();
        assert_eq!(first.role, Role::Admin);

        // Existing account is left alone, including a changed role
        auth.repository.users.set_role(first.id, Role::User).await.unwrap();
        auth.ensure_bootstrap_admin().await.unwrap();
        let (_, second) = auth.login(&email.to_uppercase(), "bootstrap-pass").await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.role, Role::User);
    }

    #[tokio::test]
    #[ignore]
    async fn test_set_role_round_trip() {
        let auth = service(&format!("unused-{}@example.org", Uuid::new_v4())).await;
        let (_, admin) = auth
            .register(RegisterUser {
                email: format!("acting-{}@example.org", Uuid::new_v4()),
                password: "acting-pass".to_string(),
                name: "Acting Admin".to_string(),
            })
            .await
            .unwrap();
        let (_, reader) = auth
            .register(RegisterUser {
                email: format!("promoted-{}@example.org", Uuid::new_v4()),
                password: "reader-pass".to_string(),
                name: "Promoted Reader".to_string(),
            })
            .await
            .unwrap();
        let acting = UserClaims::new(&User { role: Role::Admin, ..admin }, 1);

        let promoted = auth.set_role(&acting, reader.id, Role::Admin).await.unwrap();
        assert_eq!(promoted.role, Role::Admin);
        let demoted = auth.set_role(&acting, reader.id, Role::User).await.unwrap();
        assert_eq!(demoted.role, Role::User);

        let missing = auth.set_role(&acting, Uuid::new_v4(), Role::Admin).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    #[ignore]
    async fn test_login_unknown_email_is_generic() {
        let auth = service(&format!("unused-{}@example.org", Uuid::new_v4())).await;
        let result = auth
            .login(&format!("nobody-{}@example.org", Uuid::new_v4()), "whatever")
            .await;
        match result {
            Err(AppError::Authentication(msg)) => assert_eq!(msg, "Invalid email or password"),
            other => panic!("expected authentication error, got {:?}", other.map(|(_, u)| u.id)),
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&hash, "correct horse").unwrap());
        assert!(!verify_password(&hash, "battery staple").unwrap());
    }

    #[test]
    fn test_unknown_email_still_derives_a_hash() {
        let start = std::time::Instant::now();
        burn_password_check("whatever").unwrap();
        let burned = start.elapsed();

        let hash = hash_password("whatever").unwrap();
        let start = std::time::Instant::now();
        verify_password(&hash, "whatever").unwrap();
        let verified = start.elapsed();

        // Same algorithm and parameters: within an order of magnitude
        assert!(burned * 10 > verified);
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(verify_password("not-a-hash", "anything").is_err());
    }
}
