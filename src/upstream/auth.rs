use reqwest::Method;
use tracing::info;

use crate::error::AppError;
use crate::models::driver::Driver;
use crate::models::user::{AuthResponse, LoginRequest, RegisterRequest, User};
use crate::upstream::ApiClient;

impl ApiClient {
    /// Signs in and stores the returned token and profile in the session.
    pub async fn login(&self, request: &LoginRequest) -> Result<User, AppError> {
        request.validate()?;
        let auth: AuthResponse = self
            .send("auth", Method::POST, &["auth", "login"], request, None)
            .await?;
        self.establish(auth)
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<User, AppError> {
        request.validate()?;
        let auth: AuthResponse = self
            .send("auth", Method::POST, &["auth", "register"], request, None)
            .await?;
        self.establish(auth)
    }

    pub async fn profile(&self) -> Result<User, AppError> {
        self.get("auth", &["auth", "profile"], Some("user")).await
    }

    pub async fn list_drivers(&self) -> Result<Vec<Driver>, AppError> {
        self.get("drivers", &["auth", "drivers"], Some("drivers")).await
    }

    fn establish(&self, auth: AuthResponse) -> Result<User, AppError> {
        if auth.token.trim().is_empty() {
            return Err(AppError::Contract("auth response carried an empty token".to_string()));
        }

        info!(user_id = %auth.user.id, role = %auth.user.role, "signed in");
        self.session().sign_in(auth.token, auth.user.clone())?;
        Ok(auth.user)
    }
}
