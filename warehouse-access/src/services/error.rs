use service_core::error::AppError;
use thiserror::Error;

/// Outcomes of an access check other than "allowed".
#[derive(Error, Debug)]
pub enum AccessError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Not authorized")]
    Forbidden,

    /// The store could not answer; this is not a denial.
    #[error("Access check failed: {0}")]
    AccessCheckFailed(#[source] anyhow::Error),

    #[error("Resource identifier is required")]
    MissingResourceId,
}

impl AccessError {
    pub fn check_failed(err: impl Into<anyhow::Error>) -> Self {
        AccessError::AccessCheckFailed(err.into())
    }
}

impl From<AccessError> for AppError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Unauthenticated => {
                AppError::Unauthorized(anyhow::anyhow!("Authentication required"))
            }
            // Same message whether or not the resource exists.
            AccessError::Forbidden => AppError::Forbidden(anyhow::anyhow!("Not authorized")),
            AccessError::MissingResourceId => {
                AppError::BadRequest(anyhow::anyhow!("Resource identifier is required"))
            }
            AccessError::AccessCheckFailed(e) => {
                AppError::InternalError(e.context("Access check failed"))
            }
        }
    }
}

/// Secret vault failures.
///
/// Messages never include key material, ciphertext or plaintext fragments.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("Encryption key misconfigured: {0}")]
    KeyConfigError(String),

    #[error("Invalid encrypted payload format")]
    MalformedEnvelope,

    #[error("Decryption error")]
    AuthenticationFailed,

    #[error("Encryption error")]
    EncryptionFailed,

    #[error("Encrypted payload could not be (de)serialized")]
    Serialization,
}

impl From<VaultError> for AppError {
    fn from(err: VaultError) -> Self {
        match err {
            // Reason stays in the logs: it names the key length.
            VaultError::KeyConfigError(reason) => {
                tracing::error!(reason = %reason, "Encryption key misconfigured");
                AppError::InternalError(anyhow::anyhow!("Encryption key misconfigured"))
            }
            VaultError::EncryptionFailed => {
                AppError::InternalError(anyhow::anyhow!("Encryption error"))
            }
            VaultError::MalformedEnvelope
            | VaultError::AuthenticationFailed
            | VaultError::Serialization => {
                AppError::InternalError(anyhow::anyhow!("Decryption error"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_core::axum::http::StatusCode;

    #[test]
    fn test_access_error_status_mapping() {
        let cases = [
            (AccessError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (AccessError::Forbidden, StatusCode::FORBIDDEN),
            (AccessError::MissingResourceId, StatusCode::BAD_REQUEST),
            (
                AccessError::check_failed(anyhow::anyhow!("pool timed out")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_vault_errors_are_generic() {
        assert_eq!(VaultError::AuthenticationFailed.to_string(), "Decryption error");
        let app: AppError = VaultError::AuthenticationFailed.into();
        assert_eq!(app.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let app: AppError = VaultError::KeyConfigError("missing".into()).into();
        assert_eq!(app.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_encryption_failure_names_encryption() {
        assert_eq!(VaultError::EncryptionFailed.to_string(), "Encryption error");
        let app: AppError = VaultError::EncryptionFailed.into();
        assert_eq!(app.to_string(), "Internal server error: Encryption error");
    }

    #[tokio::test]
    async fn test_key_config_error_body_hides_reason() {
        let app: AppError = VaultError::KeyConfigError(
            "ENCRYPTION_KEY must be at least 32 characters (got 16)".into(),
        )
        .into();
        let response = service_core::axum::response::IntoResponse::into_response(app);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = service_core::axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Internal server error");
        assert!(body.get("details").is_none());
        assert!(!String::from_utf8_lossy(&bytes).contains("got 16"));
    }
}
