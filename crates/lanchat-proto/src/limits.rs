//! Field limits shared by the relay and the client.

pub const MAX_USERNAME_CHARS: usize = 30;
pub const MAX_CONTENT_CHARS: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("username must not be empty")]
    EmptyUsername,

    #[error("username must be at most {} characters", MAX_USERNAME_CHARS)]
    UsernameTooLong,

    #[error("username must not contain whitespace")]
    UsernameWhitespace,

    #[error("password must not be empty")]
    EmptyPassword,

    #[error("message content must not be empty")]
    EmptyContent,

    #[error("message content must be at most {} characters", MAX_CONTENT_CHARS)]
    ContentTooLong,
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.is_empty() {
        return Err(ValidationError::EmptyUsername);
    }
    if username.chars().count() > MAX_USERNAME_CHARS {
        return Err(ValidationError::UsernameTooLong);
    }
    if username.chars().any(char::is_whitespace) {
        return Err(ValidationError::UsernameWhitespace);
    }
    Ok(())
}

pub const fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::EmptyPassword);
    }
    Ok(())
}

pub fn validate_content(content: &str) -> Result<(), ValidationError> {
    if content.is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ValidationError::ContentTooLong);
    }
    Ok(())
}
