use anyhow::Result;
use env_logger::Env;
use log::info;

mod api;
mod calibration;
mod config;
mod db;
mod firmware;
mod header;
mod reconcile;
mod register;
mod schema;
mod sensor;
mod state;
mod status;
mod store;
mod utils;

#[actix_web::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let settings = config::Settings::from_env()?;
    let db = db::Db::connect(&settings.database_url)?;
    info!(
        "Database {}, firmware in {}",
        settings.database_url,
        settings.firmware_dir.display()
    );
    if settings.api_key.is_none() {
        info!("No SNO_API_KEY set, device auth disabled");
    }

    api::new_http_server(state::AppState::new(db, settings)).await?;
    Ok(())
}
