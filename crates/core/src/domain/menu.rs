use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Point-in-time copy of a tenant's menu, embedded in the session context so
/// the agent keeps quoting the prices the conversation started with.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MenuSnapshot(pub Vec<MenuCategory>);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MenuCategory {
    pub name: String,
    pub items: Vec<MenuItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub name: String,
    pub ingredients: Option<String>,
    pub price: Decimal,
    pub available: bool,
    #[serde(default)]
    pub extras: Vec<MenuExtra>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MenuExtra {
    pub name: String,
    pub price: Decimal,
    pub available: bool,
}

impl MenuSnapshot {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.0.iter().map(|category| category.items.len()).sum()
    }
}
