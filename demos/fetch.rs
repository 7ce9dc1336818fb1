use netatmo_ledger::{Credentials, CsvLedger, Netatmo, NetatmoOptions};
use std::env;
use std::error::Error;

fn var(name: &str) -> Result<String, Box<dyn Error>> {
    env::var(name).map_err(|_| format!("{} is not set", name).into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let credentials = Credentials::builder()
        .client_id(var("NETATMO_CLIENT_ID")?)
        .client_secret(var("NETATMO_CLIENT_SECRET")?)
        .username(var("NETATMO_USERNAME")?)
        .password(var("NETATMO_PASSWORD")?)
        .maybe_default_station(env::var("NETATMO_STATION").ok())
        .build();

    let netatmo = Netatmo::connect(credentials, NetatmoOptions::default()).await?;
    let mut ledger = match env::args().nth(1) {
        Some(dir) => CsvLedger::open(dir)?,
        None => CsvLedger::open_default()?,
    };

    let report = netatmo.fetch().ledger(&mut ledger).call().await?;
    for entity in &report.entities {
        match &entity.outcome {
            Ok(appended) => println!(
                "{}: {} new rows, stored up to {:?}",
                entity.entity, appended, entity.watermark
            ),
            Err(e) => println!("{}: skipped ({})", entity.entity, e),
        }
    }
    println!("ledger: {}", ledger.dir().display());

    Ok(())
}
