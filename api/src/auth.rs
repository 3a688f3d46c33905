//! API-key authentication. Clients send `X-API-Key` / `X-API-Secret`
//! headers on every private request; the pair is resolved against the users
//! table and the account must be active. Admin endpoints additionally
//! require the `admin` role.

use actix_web::dev::Payload;
use actix_web::error::{ErrorForbidden, ErrorInternalServerError, ErrorUnauthorized};
use actix_web::{web, Error, FromRequest, HttpRequest};
use database::{User, UserStatus};
use futures_util::future::LocalBoxFuture;
use tracing::warn;

use crate::state::AppState;

/// Extractor for authenticated requests.
pub struct AuthedUser(pub User);

/// Extractor for admin-only requests.
pub struct AdminUser(pub User);

fn header_value(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

impl FromRequest for AuthedUser {
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let state = req.app_data::<web::Data<AppState>>().cloned();
        let api_key = header_value(req, "X-API-Key");
        let api_secret = header_value(req, "X-API-Secret");

        Box::pin(async move {
            let state = state.ok_or_else(|| ErrorInternalServerError("app state missing"))?;
            let api_key = api_key.ok_or_else(|| ErrorUnauthorized("API key required"))?;
            let api_secret = api_secret.ok_or_else(|| ErrorUnauthorized("API secret required"))?;

            let users = state.users.clone();
            let user = web::block(move || users.get_user_by_api_key(&api_key))
                .await
                .map_err(|_| ErrorInternalServerError("authentication failed"))?
                .map_err(|_| ErrorUnauthorized("Invalid API credentials"))?;

            // Plain comparison, matching how the credentials are issued.
            if user.api_secret != api_secret {
                return Err(ErrorUnauthorized("Invalid API credentials"));
            }
            if user.status_enum() != Some(UserStatus::Active) {
                return Err(ErrorForbidden("User account is inactive"));
            }

            // Best effort; a failed stamp must not fail the request.
            let users = state.users.clone();
            let user_id = user.id;
            actix_web::rt::spawn(async move {
                if let Err(err) = web::block(move || users.touch_last_login(user_id)).await {
                    warn!(user_id, %err, "failed to update last_login");
                }
            });

            Ok(AuthedUser(user))
        })
    }
}

impl FromRequest for AdminUser {
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let authed = AuthedUser::from_request(req, payload);
        Box::pin(async move {
            let AuthedUser(user) = authed.await?;
            if !user.is_admin() {
                return Err(ErrorForbidden("Admin privileges required"));
            }
            Ok(AdminUser(user))
        })
    }
}
