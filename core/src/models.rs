use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

// --- Persons ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroTargets {
    #[serde(default, alias = "p")]
    pub protein: Option<f64>,
    #[serde(default, alias = "c")]
    pub carb: Option<f64>,
    #[serde(default, alias = "f")]
    pub fat: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: String,
    pub name: String,
    pub kcal_goal: f64,
    #[serde(default)]
    pub macro_targets: MacroTargets,
}

// --- Food snapshots ---

/// Per-100g nutrition captured at the time a food was favorited, used or looked up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Nutrition {
    #[serde(default, rename = "kcal100g")]
    pub kcal_per_100g: Option<f64>,
    #[serde(default, rename = "p100g")]
    pub protein_per_100g: Option<f64>,
    #[serde(default, rename = "c100g")]
    pub carb_per_100g: Option<f64>,
    #[serde(default, rename = "f100g")]
    pub fat_per_100g: Option<f64>,
}

/// A food as offered by a search result, favorite or recent list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodItem {
    pub food_id: String,
    pub label: String,
    #[serde(default)]
    pub nutrition: Nutrition,
    #[serde(default)]
    pub piece_gram_hint: Option<f64>,
    #[serde(default)]
    pub source_type: String,
}

// --- Entries ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: String,
    pub person_id: String,
    pub date: String,
    #[serde(default)]
    pub time: String,
    pub food_id: String,
    pub food_name: String,
    pub amount_grams: f64,
    pub kcal: f64,
    #[serde(alias = "p")]
    pub protein: f64,
    #[serde(alias = "c")]
    pub carb: f64,
    #[serde(alias = "f")]
    pub fat: f64,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub created_at: i64,
}

/// Input for logging a food. `id` and `created_at` are generated when absent.
#[derive(Debug, Clone, Default)]
pub struct NewEntry {
    pub id: Option<String>,
    pub person_id: String,
    pub date: String,
    pub time: String,
    pub food_id: String,
    pub food_name: String,
    pub amount_grams: f64,
    pub kcal: f64,
    pub protein: f64,
    pub carb: f64,
    pub fat: f64,
    pub source: String,
    pub created_at: Option<i64>,
    /// Also record the food in the person's recents.
    pub recent_item: Option<FoodItem>,
    /// Remember `amount_grams` under `lastPortion:<key>`.
    pub last_portion_key: Option<String>,
}

// --- Favorites ---

/// Natural key of a favorite: one row per (person, food).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FavoriteKey {
    pub person_id: String,
    pub food_id: String,
}

impl FavoriteKey {
    #[must_use]
    pub fn new(person_id: impl Into<String>, food_id: impl Into<String>) -> Self {
        Self {
            person_id: person_id.into(),
            food_id: food_id.into(),
        }
    }
}

impl fmt::Display for FavoriteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.person_id, self.food_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    /// `personId:foodId`, derived from the key columns on read. Ignored on import.
    #[serde(default)]
    pub id: String,
    pub person_id: String,
    pub food_id: String,
    pub label: String,
    #[serde(default)]
    pub nutrition: Nutrition,
    #[serde(default)]
    pub piece_gram_hint: Option<f64>,
    #[serde(default)]
    pub source_type: String,
    #[serde(default)]
    pub created_at: i64,
}

impl Favorite {
    #[must_use]
    pub fn key(&self) -> FavoriteKey {
        FavoriteKey::new(self.person_id.clone(), self.food_id.clone())
    }
}

/// Presence of a favorite after a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FavoriteState {
    Favorited,
    Unfavorited,
}

impl FavoriteState {
    #[must_use]
    pub fn is_favorited(self) -> bool {
        self == FavoriteState::Favorited
    }
}

// --- Recents ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recent {
    pub id: String,
    pub person_id: String,
    pub food_id: String,
    pub label: String,
    #[serde(default)]
    pub nutrition: Nutrition,
    #[serde(default)]
    pub piece_gram_hint: Option<f64>,
    #[serde(default)]
    pub source_type: String,
    pub used_at: i64,
}

// --- Weight logs ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightLog {
    pub id: i64,
    pub person_id: String,
    pub date: String,
    pub scale_weight: f64,
    pub trend_weight: Option<f64>,
}

// --- Product cache ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedProduct {
    pub barcode: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub brands: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub nutrition: Nutrition,
    #[serde(default)]
    pub fetched_at: Option<i64>,
}

// --- Meta ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaEntry {
    pub key: String,
    pub value: serde_json::Value,
}

pub const META_LAST_IMPORT_AT: &str = "lastImportAt";
pub const META_SAMPLE_SEEDED_AT: &str = "sampleSeededAt";
pub const META_LAST_PORTION_PREFIX: &str = "lastPortion:";

#[must_use]
pub fn last_portion_meta_key(portion_key: &str) -> String {
    format!("{META_LAST_PORTION_PREFIX}{portion_key}")
}

// --- Whole-database types ---

/// Point-in-time export of every data collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub schema_version: i64,
    pub exported_at: String,
    pub persons: Vec<Person>,
    pub entries: Vec<Entry>,
    pub products_cache: Vec<CachedProduct>,
    pub favorites: Vec<Favorite>,
    pub recents: Vec<Recent>,
    pub weight_logs: Vec<WeightLog>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub persons: usize,
    pub entries: usize,
    pub products_cache: usize,
    pub favorites: usize,
    pub recents: usize,
    pub weight_logs: usize,
    /// Rows that failed sanitation or referenced a person absent from the import.
    pub dropped: usize,
}

/// What [`crate::Datastore::seed_sample_data`] wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleData {
    pub persons: Vec<Person>,
    pub entries: Vec<Entry>,
}

/// Rows removed alongside a person.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeSummary {
    pub person_removed: bool,
    pub entries: usize,
    pub favorites: usize,
    pub recents: usize,
    pub weight_logs: usize,
}

// --- Validation ---

pub fn validate_required(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(StoreError::validation(field, "is required"));
    }
    Ok(())
}

pub fn validate_non_negative(field: &'static str, value: f64) -> Result<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(StoreError::validation(
            field,
            "must be a non-negative number",
        ));
    }
    Ok(value)
}

pub fn validate_positive(field: &'static str, value: f64) -> Result<f64> {
    if !value.is_finite() || value <= 0.0 {
        return Err(StoreError::validation(field, "must be a positive number"));
    }
    Ok(value)
}

fn validate_optional_non_negative(field: &'static str, value: Option<f64>) -> Result<()> {
    if let Some(v) = value {
        validate_non_negative(field, v)?;
    }
    Ok(())
}

/// Parse a `YYYY-MM-DD` calendar day. Only the zero-padded form is accepted,
/// so string order and chronological order agree.
#[must_use]
pub fn parse_iso_day(value: &str) -> Option<NaiveDate> {
    if value.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

pub fn validate_iso_day(field: &'static str, value: &str) -> Result<()> {
    validate_required(field, value)?;
    if parse_iso_day(value).is_none() {
        return Err(StoreError::validation(
            field,
            format!("'{value}' is not a YYYY-MM-DD date"),
        ));
    }
    Ok(())
}

pub fn validate_macro_targets(targets: &MacroTargets) -> Result<()> {
    validate_optional_non_negative("macroTargets.protein", targets.protein)?;
    validate_optional_non_negative("macroTargets.carb", targets.carb)?;
    validate_optional_non_negative("macroTargets.fat", targets.fat)?;
    Ok(())
}

pub fn validate_person(person: &Person) -> Result<()> {
    validate_required("id", &person.id)?;
    validate_required("name", &person.name)?;
    validate_non_negative("kcalGoal", person.kcal_goal)?;
    validate_macro_targets(&person.macro_targets)
}

pub fn validate_nutrition(nutrition: &Nutrition) -> Result<()> {
    validate_optional_non_negative("nutrition.kcal100g", nutrition.kcal_per_100g)?;
    validate_optional_non_negative("nutrition.p100g", nutrition.protein_per_100g)?;
    validate_optional_non_negative("nutrition.c100g", nutrition.carb_per_100g)?;
    validate_optional_non_negative("nutrition.f100g", nutrition.fat_per_100g)?;
    Ok(())
}

pub fn validate_food_item(item: &FoodItem) -> Result<()> {
    validate_required("foodId", &item.food_id)?;
    validate_nutrition(&item.nutrition)?;
    validate_optional_non_negative("pieceGramHint", item.piece_gram_hint)
}

pub fn validate_entry(entry: &Entry) -> Result<()> {
    validate_required("id", &entry.id)?;
    validate_required("personId", &entry.person_id)?;
    validate_iso_day("date", &entry.date)?;
    validate_required("foodId", &entry.food_id)?;
    validate_non_negative("amountGrams", entry.amount_grams)?;
    validate_non_negative("kcal", entry.kcal)?;
    validate_non_negative("protein", entry.protein)?;
    validate_non_negative("carb", entry.carb)?;
    validate_non_negative("fat", entry.fat)?;
    Ok(())
}

pub fn validate_cached_product(product: &CachedProduct) -> Result<()> {
    validate_required("barcode", &product.barcode)?;
    validate_nutrition(&product.nutrition)
}
