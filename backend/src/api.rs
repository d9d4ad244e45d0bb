use std::collections::{BTreeMap, BTreeSet};
use std::io;

use actix_cors::Cors;
use actix_web::{
    error, get,
    http::header,
    middleware::Logger,
    post, put,
    web::{self, Data},
    App, HttpRequest, HttpResponse, HttpServer, Responder,
};
use common::req::ScreenMode;
use log::{error, info};

use crate::db::models::LocationUpdate;
use crate::state::AppState;
use crate::status::{self, Co2Series, Status};
use crate::store::StoreError;
use crate::{sensor, utils};

const MIN_ACQ_PERIOD: i64 = 5 * 1000; // ms
const MAX_ACQ_PERIOD: i64 = 10 * 60 * 1000; // ms
const DEFAULT_SERIES_LIMIT: i64 = 5000;

fn internal(err: StoreError) -> actix_web::Error {
    error!("{err}");
    error::ErrorInternalServerError("database error")
}

#[derive(serde::Serialize, Debug)]
struct Updated {
    updated: usize,
}

#[get("/")]
async fn index() -> impl Responder {
    HttpResponse::Found()
        .insert_header((header::LOCATION, "/api/summary"))
        .finish()
}

#[get("/api/devices")]
async fn api_devices(req: HttpRequest, state: Data<AppState>) -> actix_web::Result<impl Responder> {
    state.authorize_admin(&req)?;
    let res = state.db()?.devices().map_err(internal)?;
    Ok(web::Json(res))
}

#[derive(serde::Deserialize, Debug)]
struct RecordsQuery {
    serial_number: i64,
    min_ts: Option<i64>,
    limit: Option<i64>,
}

#[get("/api/records")]
async fn api_records(
    req: HttpRequest,
    query: web::Query<RecordsQuery>,
    state: Data<AppState>,
) -> actix_web::Result<impl Responder> {
    state.authorize_admin(&req)?;
    let now = utils::unix_now();
    let min_ts = status::window_start(query.min_ts.unwrap_or(-state.settings.display_len_sec), now);
    let limit = query.limit.unwrap_or(DEFAULT_SERIES_LIMIT);

    let rows = state
        .db()?
        .co2_since(query.serial_number, min_ts, limit)
        .map_err(internal)?;
    Ok(web::Json(Co2Series::from_newest_first(query.serial_number, rows)))
}

#[derive(serde::Deserialize, Debug)]
struct ExportQuery {
    serial_number: i64,
}

/// Every record of a device, oldest first.
#[get("/api/records/export")]
async fn api_records_export(
    req: HttpRequest,
    query: web::Query<ExportQuery>,
    state: Data<AppState>,
) -> actix_web::Result<impl Responder> {
    state.authorize_admin(&req)?;
    let res = state.db()?.records(query.serial_number).map_err(internal)?;
    Ok(web::Json(res))
}

#[derive(serde::Serialize, Debug)]
struct StatusGroup {
    color: &'static str,
    devices: BTreeSet<i64>,
}

#[get("/api/status")]
async fn api_status(req: HttpRequest, state: Data<AppState>) -> actix_web::Result<impl Responder> {
    state.authorize_admin(&req)?;
    let devices = state.db()?.devices().map_err(internal)?;
    let settings = &state.settings;

    let res: BTreeMap<Status, StatusGroup> = status::by_status(
        &devices,
        utils::unix_now(),
        settings.consider_offline_sec,
        &settings.thresholds,
    )
    .into_iter()
    .map(|(status, devices)| {
        (
            status,
            StatusGroup {
                color: status.color(),
                devices,
            },
        )
    })
    .collect();
    Ok(web::Json(res))
}

#[derive(serde::Serialize, Debug)]
struct SummaryResponse {
    #[serde(flatten)]
    summary: status::Summary,
    latest_firmware_version: Option<i64>,
}

#[get("/api/summary")]
async fn api_summary(req: HttpRequest, state: Data<AppState>) -> actix_web::Result<impl Responder> {
    state.authorize_admin(&req)?;
    let devices = state.db()?.devices().map_err(internal)?;
    let settings = &state.settings;

    Ok(web::Json(SummaryResponse {
        summary: status::summarize(
            &devices,
            utils::unix_now(),
            settings.consider_offline_sec,
            &settings.thresholds,
        ),
        latest_firmware_version: state.firmware.latest_version(),
    }))
}

#[derive(serde::Deserialize, Debug)]
struct SetAcqPeriodParams {
    ids: Vec<i32>,
    acq_period: i64,
}

#[put("/api/devices/acq_period")]
async fn api_set_acq_period(
    req: HttpRequest,
    params: web::Json<SetAcqPeriodParams>,
    state: Data<AppState>,
) -> actix_web::Result<impl Responder> {
    state.authorize_admin(&req)?;
    if !(MIN_ACQ_PERIOD..=MAX_ACQ_PERIOD).contains(&params.acq_period) {
        return Err(error::ErrorBadRequest(format!(
            "acq_period must be between {MIN_ACQ_PERIOD} ms and {MAX_ACQ_PERIOD} ms"
        )));
    }

    let updated = state
        .db()?
        .set_acq_period(&params.ids, params.acq_period)
        .map_err(internal)?;
    info!("Set acq_period for {updated} devices to {}", params.acq_period);
    Ok(web::Json(Updated { updated }))
}

#[derive(serde::Deserialize, Debug)]
struct SetScreenModeParams {
    ids: Vec<i32>,
    screen_mode: i64,
}

#[put("/api/devices/screen_mode")]
async fn api_set_screen_mode(
    req: HttpRequest,
    params: web::Json<SetScreenModeParams>,
    state: Data<AppState>,
) -> actix_web::Result<impl Responder> {
    state.authorize_admin(&req)?;
    let mode = ScreenMode::try_from(params.screen_mode)
        .map_err(|v| error::ErrorBadRequest(format!("unknown screen mode {v}, use 0 (full), 1 (minimal) or 2 (off)")))?;

    let updated = state
        .db()?
        .set_screen_mode(&params.ids, mode as i64)
        .map_err(internal)?;
    info!("Set screen_mode for {updated} devices to {mode:?}");
    Ok(web::Json(Updated { updated }))
}

#[derive(serde::Deserialize, Debug)]
struct SetFirmwareParams {
    ids: Vec<i32>,
    firmware_version: i64,
}

#[put("/api/devices/firmware")]
async fn api_set_firmware(
    req: HttpRequest,
    params: web::Json<SetFirmwareParams>,
    state: Data<AppState>,
) -> actix_web::Result<impl Responder> {
    state.authorize_admin(&req)?;
    if !state.firmware.version_exists(params.firmware_version) {
        return Err(error::ErrorBadRequest(format!(
            "firmware {} is not available on the server",
            params.firmware_version
        )));
    }

    let updated = state
        .db()?
        .set_firmware_version(&params.ids, params.firmware_version)
        .map_err(internal)?;
    info!("Set firmware_version for {updated} devices to {}", params.firmware_version);
    Ok(web::Json(Updated { updated }))
}

#[derive(serde::Deserialize, Debug)]
struct SetLocationParams {
    ids: Vec<i32>,
    #[serde(flatten)]
    location: LocationUpdate,
}

#[put("/api/devices/location")]
async fn api_set_location(
    req: HttpRequest,
    params: web::Json<SetLocationParams>,
    state: Data<AppState>,
) -> actix_web::Result<impl Responder> {
    state.authorize_admin(&req)?;
    if params.location.is_empty() {
        return Err(error::ErrorBadRequest("nothing to update"));
    }

    let updated = state
        .db()?
        .set_location(&params.ids, &params.location)
        .map_err(internal)?;
    Ok(web::Json(Updated { updated }))
}

#[derive(serde::Deserialize, Debug)]
struct RecalibrateParams {
    ids: Vec<i32>,
}

#[post("/api/devices/recalibrate")]
async fn api_recalibrate(
    req: HttpRequest,
    params: web::Json<RecalibrateParams>,
    state: Data<AppState>,
) -> actix_web::Result<impl Responder> {
    state.authorize_admin(&req)?;
    let updated = state.db()?.request_recalibration(&params.ids).map_err(internal)?;
    info!("Recalibration requested for {updated} devices");
    Ok(web::Json(Updated { updated }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(index)
        .service(api_devices)
        .service(api_records)
        .service(api_records_export)
        .service(api_status)
        .service(api_summary)
        .service(api_set_acq_period)
        .service(api_set_screen_mode)
        .service(api_set_firmware)
        .service(api_set_location)
        .service(api_recalibrate);
}

pub async fn new_http_server(state: AppState) -> io::Result<()> {
    let addr = (state.settings.bind_addr.clone(), state.settings.port);
    info!("Listening on {}:{}", addr.0, addr.1);

    HttpServer::new(move || {
        let cors_origin = state.settings.cors_origin.as_str();
        App::new()
            .app_data(Data::new(state.clone()))
            .configure(sensor::configure)
            .configure(configure)
            .wrap(
                Cors::default()
                    .allowed_origin(cors_origin) // dashboard
                    .allowed_methods(vec!["GET", "POST", "PUT"])
                    .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT])
                    .allowed_header(header::CONTENT_TYPE)
                    .supports_credentials()
                    .max_age(3600),
            )
            .wrap(Logger::default())
    })
    .bind(addr)?
    .run()
    .await
}
