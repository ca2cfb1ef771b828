//! Catalog types: branches, categories, products and users.
//!
//! These are the reference data an order is validated and routed against.
//! Each category names exactly one routing target (a physical printer); a
//! product belongs to exactly one category and lists the branches it can be
//! ordered at.

use serde::{Deserialize, Serialize};

/// Identifier of a physical printer / print-service endpoint. Categories map
/// onto routing targets; several categories may share one target.
pub type RoutingTarget = i64;

/// A physical location with its own user base, product eligibility and
/// order stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub location: String,
}

/// A product grouping that decides which printer its items are sent to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    /// Routing target handling items of this category.
    pub printer: RoutingTarget,
    #[serde(default)]
    pub image_url: String,
}

/// A sellable item. `unit_type` tags how quantities are measured (piece,
/// kilogram, litre, ...); quantities are real numbers to support weight and
/// volume based units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub category_id: i64,
    #[serde(rename = "type")]
    pub unit_type: String,
    #[serde(default)]
    pub image_url: String,
    /// Unit price. Legacy catalog rows predate pricing and deserialize to 0.
    #[serde(default)]
    pub price: f64,
    /// Branches this product may be ordered at.
    #[serde(default)]
    pub branch_ids: Vec<i64>,
}

impl Product {
    /// Whether this product can be ordered at the given branch.
    pub fn available_at(&self, branch_id: i64) -> bool {
        self.branch_ids.contains(&branch_id)
    }
}

/// A branch-scoped requester. `branch_id` is `None` until an administrator
/// assigns the user to a branch; unassigned users cannot place orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub is_admin: bool,
    pub branch_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_availability_checks_branch_membership() {
        let product = Product {
            id: 1,
            name: "Somsa".into(),
            category_id: 2,
            unit_type: "piece".into(),
            image_url: String::new(),
            price: 12_000.0,
            branch_ids: vec![1, 3],
        };
        assert!(product.available_at(1));
        assert!(product.available_at(3));
        assert!(!product.available_at(2));
    }

    #[test]
    fn legacy_product_json_without_price_deserializes() {
        let raw = r#"{
            "id": 4,
            "name": "Ayran",
            "category_id": 1,
            "type": "piece",
            "branch_ids": [1]
        }"#;
        let product: Product = serde_json::from_str(raw).expect("parse legacy product");
        assert_eq!(product.price, 0.0);
        assert_eq!(product.unit_type, "piece");
    }

    #[test]
    fn user_without_branch_round_trips_null() {
        let user = User {
            id: 7,
            name: "Dilshod".into(),
            phone: "+998901234567".into(),
            is_admin: false,
            branch_id: None,
        };
        let json = serde_json::to_value(&user).expect("serialize user");
        assert!(json["branch_id"].is_null());
        let back: User = serde_json::from_value(json).expect("deserialize user");
        assert_eq!(back, user);
    }
}
