use std::sync::{Arc, Mutex, MutexGuard};

use actix_web::{error, http::header, HttpRequest};
use common::req::header::API_KEY;
use log::warn;

use crate::config::Settings;
use crate::db::Db;
use crate::firmware::FirmwareRepository;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Db>>,
    pub firmware: FirmwareRepository,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(db: Db, settings: Settings) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            firmware: FirmwareRepository::new(settings.firmware_dir.clone()),
            settings: Arc::new(settings),
        }
    }

    pub fn db(&self) -> actix_web::Result<MutexGuard<'_, Db>> {
        self.db
            .lock()
            .map_err(|_| error::ErrorInternalServerError("database lock poisoned"))
    }

    /// Checks `SNO-API-KEY` when the server has a device key configured.
    pub fn authorize_device(&self, req: &HttpRequest) -> actix_web::Result<()> {
        let Some(expected) = &self.settings.api_key else {
            return Ok(());
        };
        let sent = req.headers().get(API_KEY).and_then(|v| v.to_str().ok());
        if sent == Some(expected.as_str()) {
            Ok(())
        } else {
            warn!("Rejected device request to {} from {:?}", req.path(), req.peer_addr());
            Err(error::ErrorUnauthorized("invalid api key"))
        }
    }

    /// Checks `Authorization: Bearer <key>` when the server has an admin key configured.
    pub fn authorize_admin(&self, req: &HttpRequest) -> actix_web::Result<()> {
        let Some(expected) = &self.settings.admin_key else {
            return Ok(());
        };
        let sent = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if sent == Some(expected.as_str()) {
            Ok(())
        } else {
            warn!("Rejected admin request to {}", req.path());
            Err(error::ErrorUnauthorized("invalid admin key"))
        }
    }
}
