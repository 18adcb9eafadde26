use anyhow::{Result, bail};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};
use uuid::Uuid;

use macrotrack_core::StoreHandle;
use macrotrack_core::models::{MacroTargets, Person};

use super::helpers::{fmt_opt, print_json, resolve_person};

pub(crate) async fn cmd_person_add(
    store: &StoreHandle,
    name: &str,
    kcal_goal: f64,
    targets: MacroTargets,
    json: bool,
) -> Result<()> {
    let person = Person {
        id: Uuid::new_v4().to_string(),
        name: name.trim().to_string(),
        kcal_goal,
        macro_targets: targets,
    };
    let saved = person.clone();
    store.exec(move |db| db.upsert_person(&saved)).await?;

    if json {
        print_json(&person)?;
    } else {
        println!(
            "Added {} ({} kcal/day), id {}",
            person.name, person.kcal_goal, person.id
        );
    }
    Ok(())
}

pub(crate) async fn cmd_person_list(store: &StoreHandle, json: bool) -> Result<()> {
    let persons = store.exec(|db| db.get_persons()).await?;

    if json {
        print_json(&persons)?;
    } else if persons.is_empty() {
        eprintln!("No persons yet. Use `macrotrack person add <name>` to create one.");
    } else {
        #[derive(Tabled)]
        struct PersonRow {
            #[tabled(rename = "ID")]
            id: String,
            #[tabled(rename = "Name")]
            name: String,
            #[tabled(rename = "Goal (kcal)")]
            kcal: String,
            #[tabled(rename = "Protein (g)")]
            protein: String,
            #[tabled(rename = "Carbs (g)")]
            carb: String,
            #[tabled(rename = "Fat (g)")]
            fat: String,
        }

        let rows: Vec<PersonRow> = persons
            .iter()
            .map(|p| PersonRow {
                id: p.id.clone(),
                name: p.name.clone(),
                kcal: format!("{:.0}", p.kcal_goal),
                protein: fmt_opt(p.macro_targets.protein),
                carb: fmt_opt(p.macro_targets.carb),
                fat: fmt_opt(p.macro_targets.fat),
            })
            .collect();

        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(2..6)).with(Alignment::right()))
            .to_string();
        println!("{table}");
    }
    Ok(())
}

pub(crate) async fn cmd_person_delete(store: &StoreHandle, selector: &str, json: bool) -> Result<()> {
    let person = resolve_person(store, Some(selector)).await?;
    let person_id = person.id.clone();
    let summary = store
        .exec(move |db| db.delete_person_cascade(&person_id))
        .await?;
    if !summary.person_removed {
        bail!("Person '{selector}' was already removed");
    }

    if json {
        print_json(&summary)?;
    } else {
        println!(
            "Deleted {} with {} entries, {} favorites, {} recents and {} weight logs",
            person.name, summary.entries, summary.favorites, summary.recents, summary.weight_logs
        );
    }
    Ok(())
}
