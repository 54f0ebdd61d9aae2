use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SWATCH: &str = "black";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    Tshirt,
    #[default]
    Shirt,
    Bottle,
    Hoodie,
    Notebook,
}

impl ProductType {
    pub const ALL: [ProductType; 5] = [
        ProductType::Tshirt,
        ProductType::Shirt,
        ProductType::Bottle,
        ProductType::Hoodie,
        ProductType::Notebook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Tshirt => "tshirt",
            ProductType::Shirt => "shirt",
            ProductType::Bottle => "bottle",
            ProductType::Hoodie => "hoodie",
            ProductType::Notebook => "notebook",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized: String = raw
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|ch| ch.is_ascii_alphanumeric())
            .collect();
        ProductType::ALL
            .into_iter()
            .find(|product| product.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "Unknown product '{}'. Expected one of: {}.",
                    raw.trim(),
                    ProductType::ALL.map(|product| product.as_str()).join(", ")
                )
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub key: ProductType,
    pub name: String,
    pub price_cents: u64,
    pub description: String,
    pub colors: Vec<String>,
}

impl Product {
    pub fn supports_color(&self, color: &str) -> bool {
        let color = color.trim();
        self.colors
            .iter()
            .any(|item| item.eq_ignore_ascii_case(color))
    }

    pub fn display_price(&self) -> String {
        format_price(self.price_cents)
    }
}

/// Static product lookup used for mockups and video prompts.
#[derive(Debug, Clone)]
pub struct ProductCatalog {
    products: IndexMap<ProductType, Product>,
}

impl Default for ProductCatalog {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ProductCatalog {
    pub fn new(products: Option<IndexMap<ProductType, Product>>) -> Self {
        Self {
            products: products.unwrap_or_else(default_products),
        }
    }

    pub fn get(&self, key: ProductType) -> Option<&Product> {
        self.products.get(&key)
    }

    pub fn list(&self) -> impl Iterator<Item = &Product> {
        self.products.values()
    }
}

/// Formats a price in cents as US dollars, e.g. `$1,234.50`.
pub fn format_price(cents: u64) -> String {
    let dollars = (cents / 100).to_string();
    let mut grouped = String::new();
    for (idx, ch) in dollars.chars().enumerate() {
        if idx > 0 && (dollars.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("${grouped}.{:02}", cents % 100)
}

fn default_products() -> IndexMap<ProductType, Product> {
    let mut map = IndexMap::new();

    let mut insert = |key: ProductType,
                      name: &str,
                      price_cents: u64,
                      description: &str,
                      colors: &[&str]| {
        map.insert(
            key,
            Product {
                key,
                name: name.to_string(),
                price_cents,
                description: description.to_string(),
                colors: colors.iter().map(|item| (*item).to_string()).collect(),
            },
        );
    };

    insert(
        ProductType::Tshirt,
        "100% Cotton T-Shirt",
        2500,
        "Premium cotton t-shirt with a comfortable fit. Perfect for everyday wear.",
        &["black", "white", "gray", "blue"],
    );
    insert(
        ProductType::Shirt,
        "100% LINEN SHIRT",
        5550,
        "Regular fit-linen shirt. Button-down collar and long sleeves with buttoned cuffs. \
         Pleat detail at the centre back. Hem with side vents. Button fastening.",
        &["black", "gray", "white", "beige"],
    );
    insert(
        ProductType::Bottle,
        "Insulated Water Bottle",
        3000,
        "Double-walled stainless steel bottle that keeps your drinks cold for 24 hours or hot for 12 hours.",
        &["black", "silver", "blue", "red"],
    );
    insert(
        ProductType::Hoodie,
        "Premium Hoodie",
        4500,
        "Soft and comfortable hoodie with a kangaroo pocket and adjustable drawstring hood.",
        &["black", "gray", "navy", "green"],
    );
    insert(
        ProductType::Notebook,
        "Hardcover Notebook",
        1800,
        "Premium hardcover notebook with 192 pages of acid-free paper. Perfect for sketching and note-taking.",
        &["black", "white", "brown", "red"],
    );

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_lists_products_in_display_order() {
        let catalog = ProductCatalog::default();
        let keys: Vec<ProductType> = catalog.list().map(|product| product.key).collect();
        assert_eq!(keys, ProductType::ALL.to_vec());
    }

    #[test]
    fn every_product_offers_the_default_swatch() {
        let catalog = ProductCatalog::default();
        for product in catalog.list() {
            assert!(product.supports_color(DEFAULT_SWATCH), "{}", product.key);
        }
    }

    #[test]
    fn product_type_parses_loosely() {
        assert_eq!("T-Shirt".parse::<ProductType>(), Ok(ProductType::Tshirt));
        assert_eq!(" hoodie ".parse::<ProductType>(), Ok(ProductType::Hoodie));
        let err = "mug".parse::<ProductType>().unwrap_err();
        assert!(err.contains("Unknown product 'mug'"));
        assert_eq!(ProductType::default(), ProductType::Shirt);
    }

    #[test]
    fn prices_format_as_dollars() {
        assert_eq!(format_price(2500), "$25.00");
        assert_eq!(format_price(5550), "$55.50");
        assert_eq!(format_price(7), "$0.07");
        assert_eq!(format_price(123_456_78), "$123,456.78");
        let catalog = ProductCatalog::default();
        assert_eq!(
            catalog
                .get(ProductType::Notebook)
                .map(Product::display_price)
                .as_deref(),
            Some("$18.00")
        );
    }

    #[test]
    fn colors_match_case_insensitively() {
        let catalog = ProductCatalog::default();
        let bottle = catalog.get(ProductType::Bottle).unwrap();
        assert!(bottle.supports_color("Silver"));
        assert!(!bottle.supports_color("navy"));
    }
}
