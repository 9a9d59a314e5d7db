pub mod format;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::product::Product;
use crate::domain::zipcode::{history_band_for, visibility_for, CatalogVisibility, HistoryBand};

const BUNDLED_PRODUCTS: &str = include_str!("../../data/sunglasses_products.json");
const BUNDLED_HISTORIES: &str = include_str!("../../data/purchase_histories.json");

/// Narrowed zipcodes only see every n-th catalog entry.
pub const NARROWED_CATALOG_STRIDE: usize = 3;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("could not read catalog file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse catalog data: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid catalog: {0}")]
    Invalid(String),
}

#[derive(Deserialize)]
struct CatalogDocument {
    products: Vec<Product>,
}

#[derive(Deserialize)]
struct HistoryDocument {
    purchase_histories: Vec<PurchaseRecord>,
}

#[derive(Clone, Debug, Default)]
pub struct Catalog {
    products: Vec<Product>,
}

impl Catalog {
    pub fn new(products: Vec<Product>) -> Result<Self, CatalogError> {
        validate_products(&products)?;
        Ok(Self { products })
    }

    pub fn bundled() -> Result<Self, CatalogError> {
        Self::from_json(BUNDLED_PRODUCTS)
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let document: CatalogDocument = serde_json::from_str(raw)?;
        Self::new(document.products)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        Self::from_json(&read_file(path)?)
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn find_by_name(&self, product_name: &str) -> Option<&Product> {
        self.products.iter().find(|product| product.is_named(product_name))
    }

    /// Products a customer with this zipcode may be recommended.
    pub fn visible_for(&self, zipcode: &str) -> Vec<Product> {
        match visibility_for(zipcode) {
            CatalogVisibility::Hidden => Vec::new(),
            CatalogVisibility::Narrowed => self
                .products
                .iter()
                .enumerate()
                .filter(|(index, _)| index % NARROWED_CATALOG_STRIDE == 0)
                .map(|(_, product)| product.clone())
                .collect(),
            CatalogVisibility::Full => self.products.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PurchaseRecord {
    pub date: String,
    pub products: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct PurchaseHistories {
    entries: Vec<PurchaseRecord>,
}

impl PurchaseHistories {
    pub fn new(entries: Vec<PurchaseRecord>) -> Self {
        Self { entries }
    }

    pub fn bundled() -> Result<Self, CatalogError> {
        Self::from_json(BUNDLED_HISTORIES)
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let document: HistoryDocument = serde_json::from_str(raw)?;
        Ok(Self::new(document.purchase_histories))
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        Self::from_json(&read_file(path)?)
    }

    pub fn entries(&self) -> &[PurchaseRecord] {
        &self.entries
    }

    pub fn for_zipcode(&self, zipcode: &str) -> Option<&PurchaseRecord> {
        match history_band_for(zipcode) {
            HistoryBand::Entry(index) => self.entries.get(index),
            HistoryBand::NoHistory => None,
        }
    }
}

fn read_file(path: &Path) -> Result<String, CatalogError> {
    fs::read_to_string(path)
        .map_err(|source| CatalogError::ReadFile { path: path.to_path_buf(), source })
}

fn validate_products(products: &[Product]) -> Result<(), CatalogError> {
    let mut row_ids = HashSet::new();
    let mut names = HashSet::new();

    for product in products {
        if product.product_name.trim().is_empty() {
            return Err(CatalogError::Invalid(format!(
                "product row {} has an empty name",
                product.row_id.0
            )));
        }
        if !row_ids.insert(product.row_id) {
            return Err(CatalogError::Invalid(format!(
                "duplicate row_id {} in catalog",
                product.row_id.0
            )));
        }
        if !names.insert(product.product_name.trim().to_lowercase()) {
            return Err(CatalogError::Invalid(format!(
                "duplicate product name `{}` in catalog",
                product.product_name
            )));
        }
        if product.full_price <= Decimal::ZERO {
            return Err(CatalogError::Invalid(format!(
                "product `{}` must have a positive price",
                product.product_name
            )));
        }
    }

    Ok(())
}
