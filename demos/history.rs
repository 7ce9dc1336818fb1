use chrono::{TimeDelta, Utc};
use netatmo_ledger::{CsvLedger, EntityKind};
use std::env;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    configure_polars_display();
    let ledger = match env::args().nth(1) {
        Some(dir) => CsvLedger::open(dir)?,
        None => CsvLedger::open_default()?,
    };
    let station = env::args()
        .nth(2)
        .unwrap_or_else(|| "70:ee:50:00:00:00".to_string());

    let now = Utc::now();
    let last_week = ledger
        .frame(EntityKind::Device)?
        .for_entity(&station)
        .get_range(now - TimeDelta::days(7), now)
        .frame
        .collect()?;

    println!("{:#?}", last_week);

    Ok(())
}

fn configure_polars_display() {
    // show every column
    env::set_var("POLARS_FMT_MAX_COLS", "-1");
    // show 20 rows
    env::set_var("POLARS_FMT_MAX_ROWS", "20");
}
