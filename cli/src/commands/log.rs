use anyhow::{Context, Result};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use macrotrack_core::StoreHandle;
use macrotrack_core::models::{Entry, FoodItem, NewEntry, Nutrition};

use super::helpers::{
    food_id_for_label, iso_day, json_error, no_neg_zero, parse_date, parse_grams, parse_time,
    print_json, resolve_person, scale_per_100g, truncate,
};

/// What the user typed for one `log` call.
pub(crate) struct LogArgs {
    pub food: String,
    pub amount: Option<String>,
    pub food_id: Option<String>,
    pub nutrition: Nutrition,
    pub date: Option<String>,
    pub time: Option<String>,
}

pub(crate) async fn cmd_log(
    store: &StoreHandle,
    person: Option<&str>,
    args: LogArgs,
    json: bool,
) -> Result<()> {
    let person = resolve_person(store, person).await?;
    let food_id = args
        .food_id
        .unwrap_or_else(|| food_id_for_label(&args.food));

    let grams = match args.amount.as_deref() {
        Some(amount) => parse_grams(amount)?,
        None => {
            let key = food_id.clone();
            store
                .exec(move |db| db.get_last_portion(&key))
                .await?
                .with_context(|| {
                    format!("No amount given and no previous portion for '{}'", args.food)
                })?
        }
    };

    let date = iso_day(parse_date(args.date)?);
    let time = parse_time(args.time.as_deref())?;
    let n = args.nutrition;
    let new = NewEntry {
        person_id: person.id.clone(),
        date,
        time,
        food_id: food_id.clone(),
        food_name: args.food.clone(),
        amount_grams: grams,
        kcal: scale_per_100g(n.kcal_per_100g, grams),
        protein: scale_per_100g(n.protein_per_100g, grams),
        carb: scale_per_100g(n.carb_per_100g, grams),
        fat: scale_per_100g(n.fat_per_100g, grams),
        source: "Manual (CLI)".to_string(),
        recent_item: Some(FoodItem {
            food_id: food_id.clone(),
            label: args.food,
            nutrition: n,
            piece_gram_hint: None,
            source_type: "custom".to_string(),
        }),
        last_portion_key: Some(food_id),
        ..NewEntry::default()
    };

    let entry = store.exec(move |db| db.add_entry(new)).await?;

    if json {
        print_json(&entry)?;
    } else {
        println!(
            "Logged {:.0}g {} for {} on {} at {} ({:.0} kcal)",
            entry.amount_grams, entry.food_name, person.name, entry.date, entry.time, entry.kcal
        );
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct DayTotals {
    kcal: f64,
    protein: f64,
    carb: f64,
    fat: f64,
}

fn totals(entries: &[Entry]) -> DayTotals {
    let sum = |f: fn(&Entry) -> f64| no_neg_zero(entries.iter().map(f).sum());
    DayTotals {
        kcal: sum(|e| e.kcal),
        protein: sum(|e| e.protein),
        carb: sum(|e| e.carb),
        fat: sum(|e| e.fat),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DayView {
    person_id: String,
    date: String,
    kcal_goal: f64,
    totals: DayTotals,
    entries: Vec<Entry>,
}

pub(crate) async fn cmd_day(
    store: &StoreHandle,
    person: Option<&str>,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let person = resolve_person(store, person).await?;
    let date = iso_day(parse_date(date)?);
    let (person_id, day) = (person.id.clone(), date.clone());
    let entries = store
        .exec(move |db| db.get_entries_for_person_date(&person_id, &day))
        .await?;
    let totals = totals(&entries);

    if json {
        return print_json(&DayView {
            person_id: person.id,
            date,
            kcal_goal: person.kcal_goal,
            totals,
            entries,
        });
    }

    println!("{} on {date}", person.name);
    if entries.is_empty() {
        println!("  Nothing logged.");
        return Ok(());
    }

    #[derive(Tabled)]
    struct EntryRow {
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "Food")]
        food: String,
        #[tabled(rename = "Amount (g)")]
        grams: String,
        #[tabled(rename = "kcal")]
        kcal: String,
        #[tabled(rename = "P")]
        protein: String,
        #[tabled(rename = "C")]
        carb: String,
        #[tabled(rename = "F")]
        fat: String,
        #[tabled(rename = "ID")]
        id: String,
    }

    let rows: Vec<EntryRow> = entries
        .iter()
        .map(|e| EntryRow {
            time: e.time.clone(),
            food: truncate(&e.food_name, 32),
            grams: format!("{:.0}", e.amount_grams),
            kcal: format!("{:.0}", e.kcal),
            protein: format!("{:.1}", e.protein),
            carb: format!("{:.1}", e.carb),
            fat: format!("{:.1}", e.fat),
            id: e.id.clone(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..7)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    println!(
        "  Total: {:.0} / {:.0} kcal  (P {:.1}g  C {:.1}g  F {:.1}g)",
        totals.kcal, person.kcal_goal, totals.protein, totals.carb, totals.fat
    );
    Ok(())
}

pub(crate) async fn cmd_dates(store: &StoreHandle, person: Option<&str>, json: bool) -> Result<()> {
    let person = resolve_person(store, person).await?;
    let person_id = person.id.clone();
    let dates = store
        .exec(move |db| db.get_logged_dates_by_person(&person_id))
        .await?;

    if json {
        print_json(&dates)?;
    } else if dates.is_empty() {
        eprintln!("No days logged for {} yet.", person.name);
    } else {
        for date in &dates {
            println!("{date}");
        }
    }
    Ok(())
}

pub(crate) async fn cmd_entry_delete(store: &StoreHandle, id: &str, json: bool) -> Result<()> {
    let entry_id = id.to_string();
    let deleted = store.exec(move |db| db.delete_entry(&entry_id)).await?;

    if json {
        if deleted {
            println!("{}", serde_json::json!({ "deleted": id }));
        } else {
            println!("{}", json_error(&format!("Entry '{id}' not found")));
        }
    } else if deleted {
        println!("Deleted entry {id}");
    } else {
        eprintln!("Entry '{id}' not found");
    }
    Ok(())
}
