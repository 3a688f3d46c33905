use actix_web::{get, web, HttpResponse};
use serde_json::Value;

use crate::auth::AuthedUser;
use crate::ccxt;
use crate::error::ApiError;
use crate::state::AppState;

const MY_TRADES_LIMIT: i64 = 100;

// GET /myTrades - the authenticated user's fills
#[get("/myTrades")]
pub async fn get_my_trades(
    state: web::Data<AppState>,
    user: AuthedUser,
) -> Result<HttpResponse, ApiError> {
    let orders = state.orders.clone();
    let user_id = user.0.id;
    let rows = web::block(move || orders.list_user_trades(user_id, MY_TRADES_LIMIT)).await??;
    let body: Vec<Value> = rows.iter().map(ccxt::trade).collect();
    Ok(HttpResponse::Ok().json(body))
}
