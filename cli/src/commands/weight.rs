use anyhow::{Result, bail};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use macrotrack_core::StoreHandle;
use macrotrack_core::models::WeightLog;

use super::helpers::{fmt_opt, iso_day, no_neg_zero, parse_date, print_json, resolve_person};

const KG_PER_LB: f64 = 0.453_592;

/// Convert a reading in `unit` to kilograms.
fn to_kg(value: f64, unit: &str) -> Result<f64> {
    match unit.to_lowercase().as_str() {
        "kg" => Ok(value),
        "lbs" | "lb" => Ok(no_neg_zero(value * KG_PER_LB)),
        _ => bail!("Invalid unit '{unit}'. Use 'kg' or 'lbs'"),
    }
}

fn print_weight_table(logs: &[WeightLog]) {
    #[derive(Tabled)]
    struct WeightRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Weight (kg)")]
        scale: String,
        #[tabled(rename = "Trend (kg)")]
        trend: String,
    }

    let rows: Vec<WeightRow> = logs
        .iter()
        .map(|l| WeightRow {
            id: l.id,
            date: l.date.clone(),
            scale: format!("{:.1}", l.scale_weight),
            trend: fmt_opt(l.trend_weight),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) async fn cmd_weight_log(
    store: &StoreHandle,
    person: Option<&str>,
    value: f64,
    unit: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let weight_kg = to_kg(value, unit)?;
    if !unit.eq_ignore_ascii_case("kg") {
        eprintln!("Converting {value:.1} lbs -> {weight_kg:.2} kg");
    }
    let person = resolve_person(store, person).await?;
    let date = iso_day(parse_date(date)?);
    let person_id = person.id.clone();
    let log = store
        .exec(move |db| db.add_weight_log(&person_id, &date, weight_kg))
        .await?;

    if json {
        print_json(&log)?;
    } else {
        println!(
            "Logged {:.1} kg for {} on {} (trend {} kg)",
            log.scale_weight,
            person.name,
            log.date,
            fmt_opt(log.trend_weight)
        );
    }
    Ok(())
}

pub(crate) async fn cmd_weight_history(
    store: &StoreHandle,
    person: Option<&str>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let person = resolve_person(store, person).await?;
    let person_id = person.id.clone();
    let mut logs = store
        .exec(move |db| db.get_weight_logs_by_person(&person_id))
        .await?;
    if let Some(limit) = limit {
        logs.truncate(limit);
    }

    if json {
        print_json(&logs)?;
    } else if logs.is_empty() {
        eprintln!("No weight logs found. Use `macrotrack weight log` to record your weight.");
    } else {
        print_weight_table(&logs);
    }
    Ok(())
}

pub(crate) async fn cmd_weight_range(
    store: &StoreHandle,
    person: Option<&str>,
    start: String,
    end: Option<String>,
    json: bool,
) -> Result<()> {
    let start = iso_day(parse_date(Some(start))?);
    let end = iso_day(parse_date(end)?);
    if start > end {
        bail!("Range start {start} is after its end {end}");
    }
    let person = resolve_person(store, person).await?;
    let person_id = person.id.clone();
    let logs = store
        .exec(move |db| db.get_weight_logs_in_range(&person_id, &start, &end))
        .await?;

    if json {
        print_json(&logs)?;
    } else if logs.is_empty() {
        eprintln!("No weight logs for {} in that range.", person.name);
    } else {
        print_weight_table(&logs);
    }
    Ok(())
}

pub(crate) async fn cmd_weight_delete(store: &StoreHandle, id: i64, json: bool) -> Result<()> {
    let deleted = store.exec(move |db| db.delete_weight_log(id)).await?;
    if !deleted {
        bail!("Weight log {id} not found");
    }

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted weight log {id}");
    }
    Ok(())
}
