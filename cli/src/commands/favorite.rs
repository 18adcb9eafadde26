use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use macrotrack_core::models::{FoodItem, Nutrition};
use macrotrack_core::{DEFAULT_RECENTS_LIMIT, StoreHandle};

use super::helpers::{fmt_opt, food_id_for_label, print_json, resolve_person, truncate};

#[derive(Tabled)]
struct FoodRow {
    #[tabled(rename = "Food ID")]
    food_id: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "kcal/100g")]
    kcal: String,
    #[tabled(rename = "P/100g")]
    protein: String,
    #[tabled(rename = "C/100g")]
    carb: String,
    #[tabled(rename = "F/100g")]
    fat: String,
}

impl FoodRow {
    fn new(food_id: &str, label: &str, n: &Nutrition) -> Self {
        Self {
            food_id: food_id.to_string(),
            label: truncate(label, 32),
            kcal: fmt_opt(n.kcal_per_100g),
            protein: fmt_opt(n.protein_per_100g),
            carb: fmt_opt(n.carb_per_100g),
            fat: fmt_opt(n.fat_per_100g),
        }
    }
}

fn print_food_rows(rows: &[FoodRow]) {
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..6)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) async fn cmd_fav_toggle(
    store: &StoreHandle,
    person: Option<&str>,
    label: &str,
    food_id: Option<String>,
    nutrition: Nutrition,
    json: bool,
) -> Result<()> {
    let person = resolve_person(store, person).await?;
    let item = FoodItem {
        food_id: food_id.unwrap_or_else(|| food_id_for_label(label)),
        label: label.to_string(),
        nutrition,
        piece_gram_hint: None,
        source_type: "custom".to_string(),
    };
    let person_id = person.id.clone();
    let food = item.clone();
    let state = store
        .exec(move |db| db.toggle_favorite(&person_id, &food))
        .await?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "foodId": item.food_id, "favorited": state.is_favorited() })
        );
    } else if state.is_favorited() {
        println!("Added {} to {}'s favorites", item.label, person.name);
    } else {
        println!("Removed {} from {}'s favorites", item.label, person.name);
    }
    Ok(())
}

pub(crate) async fn cmd_fav_list(store: &StoreHandle, person: Option<&str>, json: bool) -> Result<()> {
    let person = resolve_person(store, person).await?;
    let person_id = person.id.clone();
    let favorites = store.exec(move |db| db.get_favorites(&person_id)).await?;

    if json {
        print_json(&favorites)?;
    } else if favorites.is_empty() {
        eprintln!("{} has no favorites yet.", person.name);
    } else {
        let rows: Vec<FoodRow> = favorites
            .iter()
            .map(|f| FoodRow::new(&f.food_id, &f.label, &f.nutrition))
            .collect();
        print_food_rows(&rows);
    }
    Ok(())
}

pub(crate) async fn cmd_recent(
    store: &StoreHandle,
    person: Option<&str>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let person = resolve_person(store, person).await?;
    let person_id = person.id.clone();
    let limit = limit.unwrap_or(DEFAULT_RECENTS_LIMIT);
    let recents = store
        .exec(move |db| db.get_recents(&person_id, limit))
        .await?;

    if json {
        print_json(&recents)?;
    } else if recents.is_empty() {
        eprintln!("Nothing logged recently for {}.", person.name);
    } else {
        let rows: Vec<FoodRow> = recents
            .iter()
            .map(|r| FoodRow::new(&r.food_id, &r.label, &r.nutrition))
            .collect();
        print_food_rows(&rows);
    }
    Ok(())
}
