use crate::{
    auth::{hash_password, user, verify_password, PasswordPolicy},
    entities::order,
    errors::{FieldErrors, ServiceError},
    events::{Event, EventSender},
};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.@+-]+$").expect("username pattern compiles"));

const INVALID_LOGIN: &str = "Please enter a correct username and password";
const USERNAME_TAKEN: &str = "A user with that username already exists";
const EMAIL_TAKEN: &str = "A user with that email already exists";
const PASSWORD_MISMATCH: &str = "The two password fields didn't match";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterInput {
    #[validate(
        length(min = 1, max = 150, message = "Username must be 1 to 150 characters"),
        regex(
            path = "USERNAME_RE",
            message = "Enter a valid username: letters, digits and @/./+/-/_ only"
        )
    )]
    pub username: String,
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    pub password1: String,
    pub password2: String,
    #[serde(default)]
    #[validate(length(max = 150))]
    pub first_name: Option<String>,
    #[serde(default)]
    #[validate(length(max = 150))]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    /// Username or email address
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProfileInput {
    #[serde(default)]
    #[validate(length(max = 150))]
    pub first_name: String,
    #[serde(default)]
    #[validate(length(max = 150))]
    pub last_name: String,
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChangePasswordInput {
    pub old_password: String,
    pub new_password1: String,
    pub new_password2: String,
}

/// Profile page model
#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub user: user::Model,
    pub full_name: String,
    pub order_count: u64,
}

/// Registration, login and self-service profile management.
#[derive(Clone)]
pub struct AccountService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    password_policy: PasswordPolicy,
}

impl AccountService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db,
            event_sender,
            password_policy: PasswordPolicy::default(),
        }
    }

    /// Creates an active, non-staff account.
    ///
    /// All problems with the form are reported together as field errors,
    /// including taken usernames and emails.
    #[instrument(skip(self, input), fields(username = %input.username))]
    pub async fn register(&self, input: RegisterInput) -> Result<user::Model, ServiceError> {
        let username = input.username.trim().to_string();
        let email = normalize_email(&input.email);

        let mut errors = input
            .validate()
            .err()
            .map(FieldErrors::from)
            .unwrap_or_default();

        if input.password1 != input.password2 {
            errors.add("password2", PASSWORD_MISMATCH);
        }
        if let Err(err) = self.password_policy.validate(&input.password1, Some(&username)) {
            errors.add("password1", err.to_string());
        }
        if !username.is_empty() && self.find_by_username(&username).await?.is_some() {
            errors.add("username", USERNAME_TAKEN);
        }
        if !email.is_empty() && self.email_taken(&email, None).await? {
            errors.add("email", EMAIL_TAKEN);
        }
        errors.into_result()?;

        let password_hash =
            hash_password(&input.password1).map_err(|e| ServiceError::HashError(e.to_string()))?;
        let now = Utc::now();
        let account = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(username.clone()),
            email: Set(email),
            password_hash: Set(password_hash),
            first_name: Set(input.first_name.unwrap_or_default().trim().to_string()),
            last_name: Set(input.last_name.unwrap_or_default().trim().to_string()),
            is_staff: Set(false),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let account = match account.insert(&*self.db).await {
            Ok(account) => account,
            Err(err) if crate::errors::is_unique_violation(&err) => {
                warn!(%username, "Concurrent registration with the same identity");
                let mut errors = FieldErrors::new();
                errors.add("username", USERNAME_TAKEN);
                return Err(ServiceError::InvalidForm(errors));
            }
            Err(err) => return Err(err.into()),
        };

        metrics::counter!("terko_accounts.registered", 1);
        self.event_sender
            .send_or_log(Event::UserRegistered {
                user_id: account.id,
                username: account.username.clone(),
            })
            .await;

        info!(user_id = %account.id, "Registered account");
        Ok(account)
    }

    /// Checks credentials given a username or an email address.
    ///
    /// Unknown users, wrong passwords and inactive accounts all fail the same way.
    #[instrument(skip(self, input), fields(login = %input.username))]
    pub async fn authenticate(&self, input: &LoginInput) -> Result<user::Model, ServiceError> {
        let login = input.username.trim();
        let account = match self.find_by_username(login).await? {
            Some(account) => Some(account),
            None if login.contains('@') => {
                user::Entity::find()
                    .filter(user::Column::Email.eq(normalize_email(login)))
                    .one(&*self.db)
                    .await?
            }
            None => None,
        };

        match account {
            Some(account)
                if account.is_active && verify_password(&input.password, &account.password_hash) =>
            {
                metrics::counter!("terko_accounts.logins", 1, "outcome" => "success");
                Ok(account)
            }
            _ => {
                metrics::counter!("terko_accounts.logins", 1, "outcome" => "failure");
                warn!("Failed login attempt");
                Err(ServiceError::Unauthorized(INVALID_LOGIN.to_string()))
            }
        }
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))
    }

    /// The user with their order count.
    pub async fn profile(&self, user_id: Uuid) -> Result<ProfileView, ServiceError> {
        let user = self.get_user(user_id).await?;
        let order_count = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .count(&*self.db)
            .await?;

        Ok(ProfileView {
            full_name: user.full_name(),
            user,
            order_count,
        })
    }

    /// Updates names and email; the email must not belong to another account.
    #[instrument(skip(self, input))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        input: ProfileInput,
    ) -> Result<ProfileView, ServiceError> {
        let user = self.get_user(user_id).await?;
        let email = normalize_email(&input.email);

        let mut errors = input
            .validate()
            .err()
            .map(FieldErrors::from)
            .unwrap_or_default();
        if !email.is_empty() && self.email_taken(&email, Some(user_id)).await? {
            errors.add("email", EMAIL_TAKEN);
        }
        errors.into_result()?;

        let mut active: user::ActiveModel = user.into();
        active.first_name = Set(input.first_name.trim().to_string());
        active.last_name = Set(input.last_name.trim().to_string());
        active.email = Set(email);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await.map_err(|err| {
            if crate::errors::is_unique_violation(&err) {
                let mut errors = FieldErrors::new();
                errors.add("email", EMAIL_TAKEN);
                ServiceError::InvalidForm(errors)
            } else {
                err.into()
            }
        })?;

        info!(%user_id, "Profile updated");
        self.profile(user_id).await
    }

    /// Replaces the password after verifying the current one.
    #[instrument(skip(self, input))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        input: ChangePasswordInput,
    ) -> Result<(), ServiceError> {
        let user = self.get_user(user_id).await?;

        let mut errors = input
            .validate()
            .err()
            .map(FieldErrors::from)
            .unwrap_or_default();
        if !verify_password(&input.old_password, &user.password_hash) {
            errors.add(
                "old_password",
                "Your old password was entered incorrectly. Please enter it again.",
            );
        }
        if input.new_password1 != input.new_password2 {
            errors.add("new_password2", PASSWORD_MISMATCH);
        }
        if let Err(err) = self
            .password_policy
            .validate(&input.new_password1, Some(&user.username))
        {
            errors.add("new_password1", err.to_string());
        }
        errors.into_result()?;

        let password_hash = hash_password(&input.new_password1)
            .map_err(|e| ServiceError::HashError(e.to_string()))?;
        let mut active: user::ActiveModel = user.into();
        active.password_hash = Set(password_hash);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        info!(%user_id, "Password changed");
        Ok(())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<user::Model>, ServiceError> {
        Ok(user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(&*self.db)
            .await?)
    }

    async fn email_taken(&self, email: &str, except: Option<Uuid>) -> Result<bool, ServiceError> {
        let mut condition = Condition::all().add(
            Expr::expr(Func::lower(Expr::col((user::Entity, user::Column::Email)))).eq(email),
        );
        if let Some(id) = except {
            condition = condition.add(user::Column::Id.ne(id));
        }
        Ok(user::Entity::find().filter(condition).count(&*self.db).await? > 0)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration() -> RegisterInput {
        RegisterInput {
            username: "ana.h".into(),
            email: "Ana@Example.com".into(),
            password1: "harbour-lights-42".into(),
            password2: "harbour-lights-42".into(),
            first_name: None,
            last_name: None,
        }
    }

    #[test]
    fn registration_form_rules() {
        assert!(registration().validate().is_ok());

        let bad_email = RegisterInput {
            email: "not-an-email".into(),
            ..registration()
        };
        let errors = FieldErrors::from(bad_email.validate().unwrap_err());
        assert!(errors.get("email").is_some());

        let bad_username = RegisterInput {
            username: "has space".into(),
            ..registration()
        };
        assert!(bad_username.validate().is_err());
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Ana@Example.COM "), "ana@example.com");
    }
}
