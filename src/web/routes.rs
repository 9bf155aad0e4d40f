use std::str::FromStr;
use std::sync::Arc;

use ethers::types::Address;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{get, post, routes, Route, State};

use crate::bootstrap::AppState;
use crate::engine::router::{parse_amount, RouteOutcome};
use crate::error::EngineError;
use crate::math::liquidity::{allocate_for_ticks, check_deposit, DepositInput, PairOrientation};
use crate::math::tick_math::check_price;
use crate::models::{RouteKind, RouteRequest, TickRange, Token};
use crate::web::dto::{
    DepositQuery, DepositResponse, ErrorResponse, PoolEntry, PoolsResponse, QuoteQuery, QuoteResponse, QuoteStatus,
    RefreshAccepted, TicksQuery, TicksResponse,
};

type ApiError = (Status, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(status: Status, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: message.into() }))
}

impl From<EngineError> for (Status, Json<ErrorResponse>) {
    fn from(e: EngineError) -> Self {
        let status = match &e {
            EngineError::InvalidRange(_) | EngineError::InvalidPath(_) => Status::BadRequest,
            EngineError::OperationInProgress(_) => Status::Conflict,
            EngineError::NoLiquidity => Status::NotFound,
            EngineError::TransientTransport(_) | EngineError::MalformedResponse(_) => Status::BadGateway,
            EngineError::Storage(_) => Status::InternalServerError,
        };
        api_error(status, e.to_string())
    }
}

fn parse_address(raw: &str, field: &str) -> Result<Address, ApiError> {
    Address::from_str(raw.trim()).map_err(|_| api_error(Status::BadRequest, format!("{} is not an address", field)))
}

fn check_spacing(tick_spacing: i32) -> Result<(), ApiError> {
    if tick_spacing <= 0 {
        return Err(api_error(Status::BadRequest, format!("tick_spacing {} must be positive", tick_spacing)));
    }
    Ok(())
}

/// Given bounds must be positive and finite; missing ones mean full range.
fn check_bounds(price_lower: Option<f64>, price_upper: Option<f64>) -> Result<(), ApiError> {
    for price in [price_lower, price_upper].into_iter().flatten() {
        check_price(price)?;
    }
    Ok(())
}

async fn resolve(app_state: &AppState, address: Address) -> Result<Token, ApiError> {
    app_state
        .aggregator
        .resolve_token(address)
        .await
        .ok_or_else(|| api_error(Status::BadRequest, format!("token {:?} metadata unavailable", address)))
}

/// Validate both token fields, then resolve metadata. Network access only after validation.
async fn resolve_pair(app_state: &AppState, token_a: &str, token_b: &str) -> Result<PairOrientation, ApiError> {
    let a = parse_address(token_a, "token_a")?;
    let b = parse_address(token_b, "token_b")?;
    if a == b {
        return Err(api_error(Status::BadRequest, "token_a and token_b must differ"));
    }
    let pair = PairOrientation::new(resolve(app_state, a).await?, resolve(app_state, b).await?)?;
    Ok(pair)
}

/// Realised B-per-A bounds of a tick range; open sides are `None`.
fn user_bounds(pair: &PairOrientation, range: &TickRange) -> (Option<f64>, Option<f64>) {
    if range.is_full_range() {
        return (None, None);
    }
    let canonical = pair.tick_bounds(range);
    let (lo, hi) = (pair.user_price(canonical.lower), pair.user_price(canonical.upper));
    if lo <= hi { (Some(lo), Some(hi)) } else { (Some(hi), Some(lo)) }
}

#[get("/api/v1/quote?<query..>")]
pub async fn quote(query: QuoteQuery, app_state: &State<Arc<AppState>>) -> ApiResult<QuoteResponse> {
    let token_in = parse_address(&query.token_in, "token_in")?;
    let token_out = parse_address(&query.token_out, "token_out")?;
    let amount_in = parse_amount(&query.amount_in)?;

    let request = RouteRequest {
        token_in,
        token_out,
        amount_in,
        tick_spacings: app_state.tick_spacings.clone(),
        intermediates: app_state.intermediates.clone(),
    };
    let outcome = app_state.router.best_route(&request).await.map_err(|e| {
        log::error!("quote {:?} -> {:?} failed: {}", token_in, token_out, e);
        ApiError::from(e)
    })?;

    let mut response = QuoteResponse {
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        status: QuoteStatus::NoRoute,
        amount_in: amount_in.to_string(),
        amount_out: None,
        route_kind: None,
        path: Vec::new(),
        tick_spacings: Vec::new(),
        gas_estimate: None,
    };
    match outcome {
        RouteOutcome::NoRoute => {}
        RouteOutcome::ZeroOutput => {
            response.status = QuoteStatus::ZeroOutput;
            response.amount_out = Some("0".to_string());
        }
        RouteOutcome::Found(q) => {
            response.status = QuoteStatus::Found;
            response.amount_out = Some(q.amount_out.to_string());
            response.route_kind = Some(match q.kind {
                RouteKind::Direct => "direct".to_string(),
                RouteKind::MultiHop => "multi_hop".to_string(),
            });
            response.path = q.path.iter().map(|a| format!("{:?}", a)).collect();
            response.tick_spacings = q.tick_spacings;
            response.gas_estimate = q.gas_estimate.map(|g| g.to_string());
        }
    }
    Ok(Json(response))
}

#[get("/api/v1/liquidity/ticks?<query..>")]
pub async fn liquidity_ticks(query: TicksQuery, app_state: &State<Arc<AppState>>) -> ApiResult<TicksResponse> {
    check_spacing(query.tick_spacing)?;
    check_bounds(query.price_lower, query.price_upper)?;
    let pair = resolve_pair(app_state, &query.token_a, &query.token_b).await?;
    let range = pair.range_to_ticks(query.price_lower, query.price_upper, query.tick_spacing)?;
    let (price_lower, price_upper) = user_bounds(&pair, &range);

    Ok(Json(TicksResponse {
        token0: pair.token0().symbol.clone(),
        token1: pair.token1().symbol.clone(),
        tick_lower: range.tick_lower,
        tick_upper: range.tick_upper,
        tick_spacing: range.tick_spacing,
        full_range: range.is_full_range(),
        price_lower,
        price_upper,
    }))
}

#[get("/api/v1/liquidity/deposit?<query..>")]
pub async fn liquidity_deposit(query: DepositQuery, app_state: &State<Arc<AppState>>) -> ApiResult<DepositResponse> {
    check_spacing(query.tick_spacing)?;
    let input = match (query.amount_a, query.amount_b) {
        (Some(a), None) => DepositInput::A(a),
        (None, Some(b)) => DepositInput::B(b),
        _ => return Err(api_error(Status::BadRequest, "exactly one of amount_a or amount_b is required")),
    };
    check_bounds(query.price_lower, query.price_upper)?;
    check_deposit(query.current_price, input)?;
    let pair = resolve_pair(app_state, &query.token_a, &query.token_b).await?;
    let range = pair.range_to_ticks(query.price_lower, query.price_upper, query.tick_spacing)?;
    let amounts = allocate_for_ticks(&pair, &range, query.current_price, input)?;

    Ok(Json(DepositResponse {
        position: amounts.position,
        token_a_symbol: pair.token_a().symbol.clone(),
        token_b_symbol: pair.token_b().symbol.clone(),
        amount_a: amounts.amount_a,
        amount_b: amounts.amount_b,
        amount_a_raw: pair.token_a().to_raw(amounts.amount_a).to_string(),
        amount_b_raw: pair.token_b().to_raw(amounts.amount_b).to_string(),
        tick_lower: range.tick_lower,
        tick_upper: range.tick_upper,
    }))
}

#[get("/api/v1/pools")]
pub async fn pools(app_state: &State<Arc<AppState>>) -> Json<PoolsResponse> {
    let listing = app_state.pools.pools().await;
    let cache_age_secs = app_state
        .pools
        .last_persisted_ms()
        .await
        .map(|ts| (chrono::Utc::now().timestamp_millis() - ts) / 1000);

    let pools: Vec<PoolEntry> = listing
        .iter()
        .map(|p| {
            let known = !p.needs_reserves();
            PoolEntry {
                address: format!("{:?}", p.address),
                kind: p.kind,
                token0_symbol: p.token0.symbol.clone(),
                token1_symbol: p.token1.symbol.clone(),
                // zero on both sides means "not fetched yet", shown as unknown
                reserve0: known.then(|| p.token0.to_human(p.reserve0).map(|d| d.to_string()).unwrap_or_else(|| p.reserve0.to_string())),
                reserve1: known.then(|| p.token1.to_human(p.reserve1).map(|d| d.to_string()).unwrap_or_else(|| p.reserve1.to_string())),
                spot_price: p.spot_price(),
                tick: p.tick,
            }
        })
        .collect();

    Json(PoolsResponse { count: pools.len(), refreshing: app_state.aggregator.is_refreshing(), cache_age_secs, pools })
}

#[post("/api/v1/pools/refresh")]
pub async fn refresh_pools(app_state: &State<Arc<AppState>>) -> Result<(Status, Json<RefreshAccepted>), ApiError> {
    app_state.aggregator.spawn_refresh()?;
    Ok((Status::Accepted, Json(RefreshAccepted { status: "accepted".to_string() })))
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

pub fn api_routes() -> Vec<Route> {
    routes![health, quote, liquidity_ticks, liquidity_deposit, pools, refresh_pools]
}
