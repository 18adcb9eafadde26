use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate, NaiveTime};
use serde::Serialize;

use macrotrack_core::StoreHandle;
use macrotrack_core::models::Person;

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// `YYYY-MM-DD`, the format the datastore keys days by.
pub(crate) fn iso_day(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parse `HH:MM`, defaulting to the current local time.
pub(crate) fn parse_time(time_str: Option<&str>) -> Result<String> {
    match time_str {
        None => Ok(Local::now().format("%H:%M").to_string()),
        Some(s) => {
            let time = NaiveTime::parse_from_str(s, "%H:%M")
                .with_context(|| format!("Invalid time '{s}'. Use HH:MM"))?;
            Ok(time.format("%H:%M").to_string())
        }
    }
}

pub(crate) fn parse_grams(s: &str) -> Result<f64> {
    let trimmed = s.trim().trim_end_matches('g').trim();
    let value: f64 = trimmed
        .parse()
        .with_context(|| format!("Invalid amount: '{s}'. Use a number like '150' or '150g'"))?;
    if !value.is_finite() || value <= 0.0 {
        bail!("Amount must be greater than 0");
    }
    Ok(value)
}

/// Stable food id for a free-text label, e.g. "Greek Yogurt" -> `custom_greek_yogurt`.
pub(crate) fn food_id_for_label(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    let mut pending_sep = false;
    for c in label.trim().chars() {
        if c.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    format!("custom_{slug}")
}

/// Value for `grams` of a food given its amount per 100g, rounded to one decimal.
pub(crate) fn scale_per_100g(per_100g: Option<f64>, grams: f64) -> f64 {
    let v = per_100g.unwrap_or(0.0) * grams / 100.0;
    no_neg_zero((v * 10.0).round() / 10.0)
}

/// Find a person by id or case-insensitive name. With no selector, the only
/// person in the store is used.
pub(crate) async fn resolve_person(store: &StoreHandle, selector: Option<&str>) -> Result<Person> {
    let persons = store.exec(|db| db.get_persons()).await?;
    pick_person(persons, selector)
}

fn pick_person(persons: Vec<Person>, selector: Option<&str>) -> Result<Person> {
    match selector {
        Some(sel) => persons
            .into_iter()
            .find(|p| p.id == sel || p.name.eq_ignore_ascii_case(sel))
            .with_context(|| format!("No person matching '{sel}'")),
        None => {
            if persons.len() == 1 {
                return Ok(persons.into_iter().next().context("No persons")?);
            }
            if persons.is_empty() {
                bail!("No persons yet. Add one with `macrotrack person add <name>`");
            }
            let names: Vec<&str> = persons.iter().map(|p| p.name.as_str()).collect();
            bail!(
                "Several persons exist ({}). Choose one with --person",
                names.join(", ")
            )
        }
    }
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |x| format!("{x:.1}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
