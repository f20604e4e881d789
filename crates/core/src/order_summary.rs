//! Order summary grammar.
//!
//! The agent closes a conversation with a templated block:
//!
//! ```text
//! Resumen del Pedido:
//! Mesa: 5
//! - Plato 1: Hamburguesa - 8.50€ x2
//! --> Extra: Queso - 1.00€ x1
//! --> Sin: Cebolla
//! - Bebida 1: Coca Cola - 2.00€ x1
//! Total: 20.00 EUR
//! ```
//!
//! Parsing is tolerant: unrecognised lines are skipped. The `Total:` line is
//! never read; totals are recomputed from the line items.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::order::{round_currency, NewOrder, OrderExtra, OrderItem};
use crate::domain::tenant::TenantId;

const TABLE_PREFIX: &str = "mesa:";
const EXTRA_PREFIX: &str = "extra:";
const EXCLUSION_PREFIX: &str = "sin:";
const NESTED_MARKER: &str = "-->";
const TOTAL_PREFIX: &str = "Total:";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// `Plato`: accepts extras and exclusions.
    Dish,
    /// `Bebida`: never carries extras or exclusions.
    Beverage,
}

impl ItemKind {
    fn parse(word: &str) -> Option<Self> {
        match word.to_lowercase().as_str() {
            "plato" => Some(Self::Dish),
            "bebida" => Some(Self::Beverage),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedExtra {
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub subtotal: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedItem {
    pub kind: ItemKind,
    pub position: Option<u32>,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub subtotal: Decimal,
    pub extras: Vec<ParsedExtra>,
    pub exclusions: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedOrder {
    pub table_number: Option<u32>,
    pub items: Vec<ParsedItem>,
    pub total: Decimal,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderSummaryError {
    #[error("order summary contains no recognisable line items")]
    NoItems,
}

/// Whether an agent reply carries an order summary.
pub fn is_order_summary(reply: &str, trigger: &str) -> bool {
    !trigger.trim().is_empty() && reply.contains(trigger.trim())
}

pub fn parse_order_summary(text: &str) -> Result<ParsedOrder, OrderSummaryError> {
    let mut table_number = None;
    let mut items: Vec<ParsedItem> = Vec::new();
    // Index into `items` of the dish that nested lines attach to.
    let mut current_dish: Option<usize> = None;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = strip_prefix_ci(line, TABLE_PREFIX) {
            if table_number.is_none() {
                table_number = leading_number(rest);
            }
            continue;
        }

        if let Some(nested) = line.strip_prefix(NESTED_MARKER) {
            let Some(index) = current_dish else {
                continue;
            };
            let nested = nested.trim();
            if let Some(body) = strip_prefix_ci(nested, EXTRA_PREFIX) {
                if let Some((name, unit_price, quantity)) = parse_priced_entry(body) {
                    items[index].extras.push(ParsedExtra {
                        name,
                        unit_price,
                        quantity,
                        subtotal: line_subtotal(unit_price, quantity),
                    });
                }
            } else if let Some(body) = strip_prefix_ci(nested, EXCLUSION_PREFIX) {
                let ingredient = body.trim();
                if !ingredient.is_empty() {
                    items[index].exclusions.push(ingredient.to_string());
                }
            }
            continue;
        }

        // Dash lines that are not items are noise and leave the open dish alone.
        if let Some(item) = line.strip_prefix('-').and_then(parse_item_line) {
            let kind = item.kind;
            items.push(item);
            current_dish = (kind == ItemKind::Dish).then_some(items.len() - 1);
        }
    }

    if items.is_empty() {
        return Err(OrderSummaryError::NoItems);
    }

    let total = round_currency(
        items
            .iter()
            .map(|item| {
                item.subtotal + item.extras.iter().map(|extra| extra.subtotal).sum::<Decimal>()
            })
            .sum(),
    );

    Ok(ParsedOrder { table_number, items, total })
}

/// Replaces every `Total: ...` line with the recomputed amount, keeping the
/// line's indentation. Text without a total line is returned unchanged.
pub fn rewrite_total(text: &str, total: Decimal) -> String {
    let mut rewritten = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with(TOTAL_PREFIX) {
            let indent = &line[..line.len() - trimmed.len()];
            rewritten.push(format!("{indent}{TOTAL_PREFIX} {:.2} EUR", round_currency(total)));
        } else {
            rewritten.push(line.to_string());
        }
    }

    let mut output = rewritten.join("\n");
    if text.ends_with('\n') {
        output.push('\n');
    }
    output
}

impl ParsedOrder {
    pub fn into_new_order(
        self,
        tenant_id: TenantId,
        customer_reference: impl Into<String>,
        payment_method: impl Into<String>,
    ) -> NewOrder {
        NewOrder {
            tenant_id,
            customer_reference: customer_reference.into(),
            table_number: self.table_number,
            items: self.items.into_iter().map(ParsedItem::into_order_item).collect(),
            total: self.total,
            payment_method: payment_method.into(),
        }
    }
}

impl ParsedItem {
    pub fn into_order_item(self) -> OrderItem {
        OrderItem {
            product_name: self.name,
            unit_price: self.unit_price,
            quantity: self.quantity,
            subtotal: self.subtotal,
            extras: self
                .extras
                .into_iter()
                .map(|extra| OrderExtra {
                    name: extra.name,
                    unit_price: extra.unit_price,
                    quantity: extra.quantity,
                    subtotal: extra.subtotal,
                })
                .collect(),
            exclusions: self.exclusions,
        }
    }
}

// `Plato 1: Hamburguesa - 8.50€ x2`, with the leading dash already removed.
fn parse_item_line(body: &str) -> Option<ParsedItem> {
    let body = body.trim_start();
    let (kind_word, rest) = body.split_once(char::is_whitespace)?;
    let kind = ItemKind::parse(kind_word.trim_end_matches(':'))?;

    let rest = rest.trim_start();
    let digits_end = rest.find(|ch: char| !ch.is_ascii_digit()).unwrap_or(rest.len());
    let position = rest[..digits_end].parse::<u32>().ok();
    let rest = rest[digits_end..].trim_start();
    let rest = rest.strip_prefix(':').unwrap_or(rest);

    let (name, unit_price, quantity) = parse_priced_entry(rest)?;
    Some(ParsedItem {
        kind,
        position,
        name,
        unit_price,
        quantity,
        subtotal: line_subtotal(unit_price, quantity),
        extras: Vec::new(),
        exclusions: Vec::new(),
    })
}

// `<name> - <price>€ x<qty>`; the quantity defaults to one when omitted.
fn parse_priced_entry(body: &str) -> Option<(String, Decimal, u32)> {
    let (name, tail) = body.rsplit_once(" - ")?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let tail = tail.trim();
    let (price_raw, quantity_raw) = match tail.find('€') {
        Some(position) => (&tail[..position], &tail[position + '€'.len_utf8()..]),
        None => tail.split_once(char::is_whitespace).unwrap_or((tail, "")),
    };

    let unit_price = parse_amount(price_raw)?;
    let quantity = parse_quantity(quantity_raw)?;
    Some((name.to_string(), unit_price, quantity))
}

fn parse_amount(raw: &str) -> Option<Decimal> {
    let normalized = raw.trim().replace(',', ".");
    let amount = Decimal::from_str(&normalized).ok()?;
    (!amount.is_sign_negative()).then_some(amount)
}

fn parse_quantity(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(1);
    }

    let digits = raw
        .strip_prefix('x')
        .or_else(|| raw.strip_prefix('X'))
        .or_else(|| raw.strip_prefix('×'))?
        .trim_start();
    let quantity = leading_number(digits)?;
    (quantity > 0).then_some(quantity)
}

// Kept at full precision; only the grand total is rounded.
fn line_subtotal(unit_price: Decimal, quantity: u32) -> Decimal {
    unit_price * Decimal::from(quantity)
}

fn leading_number(raw: &str) -> Option<u32> {
    let raw = raw.trim_start();
    let end = raw.find(|ch: char| !ch.is_ascii_digit()).unwrap_or(raw.len());
    raw[..end].parse().ok()
}

fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &line[prefix.len()..])
}
