use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::UserProfile;

/// Minimum password length accepted at registration
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Payload returned by `/api/auth/login` and `/api/auth/register`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: UserProfile,
}

/// Payload returned by `/api/auth/refresh`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub token: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Email is required")]
    MissingEmail,
    #[error("Invalid email")]
    InvalidEmail,
    #[error("Password is required")]
    MissingPassword,
    #[error("Password must be at least 8 characters")]
    PasswordTooShort,
    #[error("First and last name are required")]
    MissingName,
}

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.trim().to_string(),
            password: password.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.email.is_empty() {
            return Err(ValidationError::MissingEmail);
        }
        if !is_valid_email(&self.email) {
            return Err(ValidationError::InvalidEmail);
        }
        if self.password.is_empty() {
            return Err(ValidationError::MissingPassword);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub firstname: String,
    pub lastname: String,
}

impl Registration {
    pub fn validate(&self) -> Result<(), ValidationError> {
        Credentials::new(&self.email, &self.password).validate()?;
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ValidationError::PasswordTooShort);
        }
        if self.firstname.trim().is_empty() || self.lastname.trim().is_empty() {
            return Err(ValidationError::MissingName);
        }
        Ok(())
    }
}

/// Accepts `local@domain.tld`: no whitespace, exactly one `@`, and a dot
/// inside the domain with characters on both sides.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("jane@example.com"));
        assert!(is_valid_email("a.b@shop.co.uk"));

        assert!(!is_valid_email(""));
        assert!(!is_valid_email("jane"));
        assert!(!is_valid_email("jane@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("jane@.com"));
        assert!(!is_valid_email("jane@example."));
        assert!(!is_valid_email("ja ne@example.com"));
        assert!(!is_valid_email("jane@@example.com"));
    }

    #[test]
    fn test_credentials_validate() {
        assert_eq!(Credentials::new("jane@example.com", "pw").validate(), Ok(()));
        assert_eq!(
            Credentials::new("  ", "pw").validate(),
            Err(ValidationError::MissingEmail)
        );
        assert_eq!(
            Credentials::new("jane", "pw").validate(),
            Err(ValidationError::InvalidEmail)
        );
        assert_eq!(
            Credentials::new("jane@example.com", "").validate(),
            Err(ValidationError::MissingPassword)
        );
    }

    #[test]
    fn test_registration_validate() {
        let mut reg = Registration {
            email: "jane@example.com".to_string(),
            password: "short".to_string(),
            firstname: "Jane".to_string(),
            lastname: "Doe".to_string(),
        };
        assert_eq!(reg.validate(), Err(ValidationError::PasswordTooShort));

        reg.password = "long enough".to_string();
        assert_eq!(reg.validate(), Ok(()));

        reg.lastname = " ".to_string();
        assert_eq!(reg.validate(), Err(ValidationError::MissingName));
    }

    #[test]
    fn test_login_response_without_refresh_token() {
        let json = r#"{"message": "ok", "token": "a.b.c", "user": {"id": 1, "email": "x@y.z"}}"#;
        let resp: LoginResponse = serde_json::from_str(json).expect("parse");
        assert_eq!(resp.token, "a.b.c");
        assert!(resp.refresh_token.is_none());
        assert_eq!(resp.user.id, Some(1));
    }
}
