use actix_web::{get, web, HttpResponse};

use crate::auth::AuthedUser;
use crate::ccxt;
use crate::error::ApiError;
use crate::state::AppState;

// GET /balance - all balances of the authenticated user, CCXT fetchBalance shape
#[get("/balance")]
pub async fn get_balances(
    state: web::Data<AppState>,
    user: AuthedUser,
) -> Result<HttpResponse, ApiError> {
    let ledger = state.ledger.clone();
    let user_id = user.0.id;
    let rows = web::block(move || ledger.get_all_balances(user_id)).await??;
    Ok(HttpResponse::Ok().json(ccxt::balances(&rows)))
}
