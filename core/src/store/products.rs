use rusqlite::{OptionalExtension, params};

use crate::error::Result;
use crate::models::{CachedProduct, validate_cached_product};
use crate::tx::StoreAccess;

use super::{json_column, to_json};

const PRODUCT_COLUMNS: &str = "barcode, product_name, brands, image_url, nutrition, fetched_at";

pub struct ProductStore<'a> {
    access: StoreAccess<'a>,
}

impl<'a> ProductStore<'a> {
    pub(crate) fn new(access: StoreAccess<'a>) -> Self {
        Self { access }
    }

    fn product_from_row(row: &rusqlite::Row) -> rusqlite::Result<CachedProduct> {
        Ok(CachedProduct {
            barcode: row.get(0)?,
            product_name: row.get(1)?,
            brands: row.get(2)?,
            image_url: row.get(3)?,
            nutrition: json_column(row, 4)?,
            fetched_at: row.get(5)?,
        })
    }

    pub fn get_all(&self) -> Result<Vec<CachedProduct>> {
        let mut stmt = self.access.conn().prepare(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products_cache ORDER BY barcode"
        ))?;
        let products = stmt
            .query_map([], Self::product_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(products)
    }

    pub fn get(&self, barcode: &str) -> Result<Option<CachedProduct>> {
        let product = self
            .access
            .conn()
            .query_row(
                &format!("SELECT {PRODUCT_COLUMNS} FROM products_cache WHERE barcode = ?1"),
                params![barcode],
                Self::product_from_row,
            )
            .optional()?;
        Ok(product)
    }

    pub fn put(&self, product: &CachedProduct) -> Result<()> {
        validate_cached_product(product)?;
        let nutrition = to_json(&product.nutrition)?;
        self.access.writer()?.execute(
            "INSERT OR REPLACE INTO products_cache (barcode, product_name, brands, image_url,
                nutrition, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                product.barcode,
                product.product_name,
                product.brands,
                product.image_url,
                nutrition,
                product.fetched_at,
            ],
        )?;
        Ok(())
    }

    pub fn delete(&self, barcode: &str) -> Result<bool> {
        let rows = self
            .access
            .writer()?
            .execute("DELETE FROM products_cache WHERE barcode = ?1", params![barcode])?;
        Ok(rows > 0)
    }

    pub fn count(&self) -> Result<usize> {
        self.access.count()
    }
}
