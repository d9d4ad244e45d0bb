//! Endpoints the sensors talk to.
//!
//! Apart from auth and missing firmware files, every answer is a 200 with a JSON
//! body: a device that gets `{}` just keeps polling.

use actix_files::NamedFile;
use actix_web::{
    error, get, post,
    web::{self, Bytes},
    HttpRequest, HttpResponse, Responder,
};
use common::req::ServerPayload;
use log::error;
use serde_json::Value;

use crate::header::SensorHeader;
use crate::state::AppState;
use crate::{reconcile, register, utils};

fn acknowledge() -> HttpResponse {
    HttpResponse::Ok().json(ServerPayload::default())
}

/// Server clock, for devices without NTP.
#[get("/now")]
async fn now() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/plain")
        .body(utils::unix_now().to_string())
}

#[post("/register")]
async fn register_device(req: HttpRequest, body: Bytes, state: web::Data<AppState>) -> actix_web::Result<HttpResponse> {
    state.authorize_device(&req)?;

    let content: Value = match serde_json::from_slice(&body) {
        Ok(content) => content,
        Err(err) => {
            error!("Cannot parse registration body: {err}");
            return Ok(acknowledge());
        }
    };

    let header = match SensorHeader::from_headers(req.headers()) {
        Ok(header) => header,
        Err(err) => {
            error!("Cannot parse headers: {err}");
            return Ok(acknowledge());
        }
    };

    let mut db = state.db()?;
    let firmware_version = register::register(&mut *db, &state.firmware, &header, &content);

    Ok(HttpResponse::Ok().json(ServerPayload::with_firmware(firmware_version)))
}

#[post("/store")]
async fn store_record(req: HttpRequest, body: Bytes, state: web::Data<AppState>) -> actix_web::Result<HttpResponse> {
    state.authorize_device(&req)?;

    let header = match SensorHeader::from_headers(req.headers()) {
        Ok(header) => header,
        Err(err) => {
            error!("Cannot parse headers: {err}");
            return Ok(acknowledge());
        }
    };

    let content: Option<Value> = if body.is_empty() {
        None
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| error!("Cannot parse body from {}: {err}", header.serial_number))
            .ok()
    };

    let mut db = state.db()?;
    let payload = reconcile::store(&mut *db, &header, content.as_ref());

    Ok(HttpResponse::Ok().json(payload))
}

#[get("/updates/{version}")]
async fn updates(version: web::Path<i64>, state: web::Data<AppState>) -> actix_web::Result<NamedFile> {
    let version = version.into_inner();
    let path = state
        .firmware
        .resolve(version)
        .ok_or_else(|| error::ErrorNotFound(format!("no firmware for {version}")))?;

    Ok(NamedFile::open_async(path).await?)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(now)
        .service(register_device)
        .service(store_record)
        .service(updates);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::db::Db;
    use crate::store::DeviceStore;
    use actix_web::{http::StatusCode, test, App};
    use common::req::header;
    use serde_json::json;
    use tempfile::TempDir;

    fn state(api_key: Option<&str>) -> (TempDir, AppState) {
        let dir = TempDir::new().unwrap();
        for f in ["first.ino.bin", "2021071801.ino.bin", "2022010101.ino.bin"] {
            std::fs::write(dir.path().join(f), f.as_bytes()).unwrap();
        }
        let settings = Settings {
            firmware_dir: dir.path().to_path_buf(),
            api_key: api_key.map(str::to_owned),
            ..Default::default()
        };
        (dir, AppState::new(Db::in_memory(), settings))
    }

    fn device_request(uri: &str, serial_number: &str) -> test::TestRequest {
        test::TestRequest::post()
            .uri(uri)
            .insert_header((header::SERIAL_NUMBER, serial_number))
            .insert_header((header::ACQ_PERIOD, "5000"))
            .insert_header((header::LAST_CALIBRATION, "16263000001"))
            .insert_header((header::FIRMWARE_VERSION, "2022010101"))
            .insert_header((header::SCREEN_MODE, "0"))
    }

    fn registration() -> Value {
        json!({"userRecord": {"hardwareInfo": {"chip": "esp8266"}}})
    }

    fn measurement() -> Value {
        json!({
            "timestamp": 1626300000,
            "uptime": 120,
            "ntpEpoch": 1626299880,
            "bootID": 3,
            "userRecord": {"co2": 812, "temperature": 23}
        })
    }

    #[actix_web::test]
    async fn register_then_store() {
        let (_dir, state) = state(None);
        let app = test::init_service(App::new().app_data(web::Data::new(state.clone())).configure(configure)).await;

        let req = device_request("/register", "1234").set_json(registration()).to_request();
        let resp: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp, json!({"userServerPayload": {"firmwareVersion": 2022010101}}));

        let req = device_request("/register", "1234").set_json(registration()).to_request();
        let resp: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp, json!({"userServerPayload": {"firmwareVersion": 2022010101}}));
        assert_eq!(state.db().unwrap().devices_by_serial(1234).unwrap().len(), 1);

        let req = device_request("/store", "1234")
            .insert_header((header::METHOD, "0"))
            .set_json(measurement())
            .to_request();
        let resp: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp, json!({}));

        let records = state.db().unwrap().records(1234).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].co2, 812);
        assert_eq!(records[0].temperature, 23);
        assert_eq!(records[0].timestamp, 1626300000);
    }

    #[actix_web::test]
    async fn store_from_unknown_device() {
        let (_dir, state) = state(None);
        let app = test::init_service(App::new().app_data(web::Data::new(state.clone())).configure(configure)).await;

        let req = device_request("/store", "999").set_json(measurement()).to_request();
        let resp: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp, json!({"userServerPayload": {"firmwareVersion": 1}}));
        assert!(state.db().unwrap().records(999).unwrap().is_empty());
    }

    #[actix_web::test]
    async fn missing_serial_number_gets_empty_answer() {
        let (_dir, state) = state(None);
        let app = test::init_service(App::new().app_data(web::Data::new(state.clone())).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/register")
            .set_json(registration())
            .to_request();
        let resp: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp, json!({}));
        assert!(state.db().unwrap().devices().unwrap().is_empty());

        let req = test::TestRequest::post().uri("/store").set_json(measurement()).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn api_key_is_enforced_when_configured() {
        let (_dir, state) = state(Some("s3cret"));
        let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(configure)).await;

        let req = device_request("/register", "1234").set_json(registration()).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = device_request("/store", "1234")
            .insert_header((header::API_KEY, "wrong"))
            .set_json(measurement())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = device_request("/register", "1234")
            .insert_header((header::API_KEY, "s3cret"))
            .set_json(registration())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/now").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn now_is_plain_timestamp() {
        let app = test::init_service(App::new().configure(configure)).await;
        let req = test::TestRequest::get().uri("/now").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let ts: i64 = std::str::from_utf8(&body).unwrap().parse().unwrap();
        assert!((ts - utils::unix_now()).abs() < 5);
    }

    #[actix_web::test]
    async fn updates_resolve_aliases() {
        let (_dir, state) = state(None);
        let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(configure)).await;

        let req = test::TestRequest::get().uri("/updates/1").to_request();
        assert_eq!(test::call_and_read_body(&app, req).await, Bytes::from_static(b"first.ino.bin"));

        let req = test::TestRequest::get().uri("/updates/10").to_request();
        assert_eq!(
            test::call_and_read_body(&app, req).await,
            Bytes::from_static(b"2022010101.ino.bin")
        );

        let req = test::TestRequest::get().uri("/updates/2021071801").to_request();
        assert_eq!(
            test::call_and_read_body(&app, req).await,
            Bytes::from_static(b"2021071801.ino.bin")
        );

        let req = test::TestRequest::get().uri("/updates/2019010101").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
