//! Salesforce OAuth authentication.
//!
//! Token acquisition is an external collaborator to the upload pipeline:
//! one call, one capability - `get_access_token(environment) -> token +
//! instance url`. Credentials come from environment variables prefixed by
//! the selected org (`SANDBOX_` / `PRODUCTION_`).

use serde::Deserialize;

use crate::api::logs::{log_info, log_warning};
use crate::config::Environment;
use crate::error::{AuthError, AuthResult};

/// Credential set for one Salesforce org.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    /// Appended to the password in the grant request; may be empty when
    /// the org trusts the caller's IP range.
    pub security_token: String,
    pub instance_url: String,
}

impl Credentials {
    /// Load the credential set for `environment` from its prefixed
    /// environment variables.
    pub fn from_env(environment: Environment) -> AuthResult<Self> {
        let _ = dotenvy::dotenv();
        let prefix = environment.credential_prefix();

        let required = [
            "CLIENT_ID",
            "CLIENT_SECRET",
            "USERNAME",
            "PASSWORD",
            "INSTANCE_URL",
        ];
        let missing: Vec<String> = required
            .iter()
            .filter(|name| std::env::var(format!("{}{}", prefix, name)).is_err())
            .map(|name| format!("{}{}", prefix, name))
            .collect();
        if !missing.is_empty() {
            return Err(AuthError::MissingCredentials(missing.join(", ")));
        }

        let var = |name: &str| std::env::var(format!("{}{}", prefix, name)).unwrap_or_default();

        Ok(Self {
            client_id: var("CLIENT_ID"),
            client_secret: var("CLIENT_SECRET"),
            username: var("USERNAME"),
            password: var("PASSWORD"),
            security_token: var("SECURITY_TOKEN"),
            instance_url: var("INSTANCE_URL"),
        })
    }
}

/// An authenticated Salesforce session.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub access_token: String,
    pub instance_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    instance_url: String,
}

/// Request an access token via the OAuth password grant.
pub async fn get_access_token(
    http: &reqwest::Client,
    environment: Environment,
    credentials: &Credentials,
) -> AuthResult<AuthSession> {
    log_info(format!(
        "Requesting Salesforce access token ({} environment)",
        environment
    ));

    let params = [
        ("grant_type", "password".to_string()),
        ("client_id", credentials.client_id.clone()),
        ("client_secret", credentials.client_secret.clone()),
        ("username", credentials.username.clone()),
        (
            "password",
            format!("{}{}", credentials.password, credentials.security_token),
        ),
    ];

    let response = http
        .post(environment.login_url())
        .form(&params)
        .send()
        .await
        .map_err(|e| AuthError::RequestFailed(e.to_string()))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| AuthError::RequestFailed(e.to_string()))?;

    if !status.is_success() {
        return Err(AuthError::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    let token: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| AuthError::RequestFailed(format!("invalid token response: {}", e)))?;

    if !token.instance_url.is_empty() && token.instance_url != credentials.instance_url {
        log_warning(format!(
            "Instance URL in token response ({}) differs from configured ({}); using configured",
            token.instance_url, credentials.instance_url
        ));
    }

    Ok(AuthSession {
        access_token: token.access_token,
        instance_url: credentials.instance_url.clone(),
    })
}
