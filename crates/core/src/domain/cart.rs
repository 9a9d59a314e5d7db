use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::same_product_name;

/// Aggregate volume cap for one order, in liters.
pub const MAX_VOLUME_LITERS: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

/// Every sunglasses unit ships in the same case.
pub const UNIT_VOLUME_LITERS: Decimal = Decimal::from_parts(1, 0, 0, false, 3);

pub const ADDED_MESSAGE: &str = "Product successfully added to the cart!";
pub const REMOVED_MESSAGE: &str = "Product units successfully removed from the cart!";
pub const REMOVED_EXCEEDING_MESSAGE: &str = "The number of units to remove is greater than the number of units in the cart. Therefore, this operation only completely removed the product.";
pub const NOT_IN_CART_MESSAGE: &str = "Product not found in the cart.";
pub const INVALID_OPERATION_MESSAGE: &str = "Invalid operation";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_name: String,
    pub number_of_units: u32,
    pub price_per_unit: Decimal,
    pub volume_per_unit: Decimal,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.price_per_unit * Decimal::from(self.number_of_units)
    }

    pub fn line_volume(&self) -> Decimal {
        self.volume_per_unit * Decimal::from(self.number_of_units)
    }
}

/// Authoritative per-unit figures for a product, taken from what the catalog
/// service recommended rather than from anything the user typed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnitPricing {
    pub price_per_unit: Decimal,
    pub volume_per_unit: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CartOperation {
    Add,
    Remove,
}

impl CartOperation {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "add" => Some(Self::Add),
            "remove" => Some(Self::Remove),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdditionOutcome {
    Added { units: u32 },
    Clamped { requested: u32, added: u32 },
}

impl AdditionOutcome {
    pub fn message(&self) -> String {
        match self {
            Self::Added { .. } => ADDED_MESSAGE.to_string(),
            Self::Clamped { added, .. } => format!(
                "The maximum volume of {} liters per order has been exceeded. The number of units was adjusted to {added}.",
                MAX_VOLUME_LITERS
            ),
        }
    }

    pub fn units_added(&self) -> u32 {
        match self {
            Self::Added { units } => *units,
            Self::Clamped { added, .. } => *added,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemovalOutcome {
    NotFound,
    Decremented { remaining: u32 },
    Removed,
    RemovedExceeding { held: u32, requested: u32 },
}

impl RemovalOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            Self::NotFound => NOT_IN_CART_MESSAGE,
            Self::Decremented { .. } | Self::Removed => REMOVED_MESSAGE,
            Self::RemovedExceeding { .. } => REMOVED_EXCEEDING_MESSAGE,
        }
    }
}

/// Ordered cart lines, at most one per product name and never a zero-unit line.
///
/// Transitions never mutate in place: each returns the next snapshot together
/// with the outcome that describes it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<CartLine>", into = "Vec<CartLine>")]
pub struct Cart {
    lines: Vec<CartLine>,
}

/// Stored carts are rebuilt line by line, so duplicates merge and empty lines drop.
impl From<Vec<CartLine>> for Cart {
    fn from(lines: Vec<CartLine>) -> Self {
        Self::new(lines)
    }
}

impl From<Cart> for Vec<CartLine> {
    fn from(cart: Cart) -> Self {
        cart.lines
    }
}

impl Cart {
    pub fn new(lines: Vec<CartLine>) -> Self {
        let mut cart = Self::default();
        for line in lines.into_iter().filter(|line| line.number_of_units > 0) {
            cart = cart.merged(
                &line.product_name,
                UnitPricing {
                    price_per_unit: line.price_per_unit,
                    volume_per_unit: line.volume_per_unit,
                },
                line.number_of_units,
            );
        }
        cart
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn find(&self, product_name: &str) -> Option<&CartLine> {
        self.lines.iter().find(|line| same_product_name(&line.product_name, product_name))
    }

    pub fn total_value(&self) -> Decimal {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    pub fn total_volume(&self) -> Decimal {
        self.lines.iter().map(CartLine::line_volume).sum()
    }

    pub fn exceeds_capacity_with(&self, additional_volume: Decimal) -> bool {
        self.total_volume() + additional_volume > MAX_VOLUME_LITERS
    }

    pub fn max_addable_units(&self, volume_per_unit: Decimal) -> u32 {
        if volume_per_unit <= Decimal::ZERO {
            return u32::MAX;
        }
        let remaining = (MAX_VOLUME_LITERS - self.total_volume()).max(Decimal::ZERO);
        (remaining / volume_per_unit).floor().to_u32().unwrap_or(u32::MAX)
    }

    pub fn with_addition(
        &self,
        product_name: &str,
        pricing: UnitPricing,
        amount: u32,
    ) -> (Cart, AdditionOutcome) {
        let additional_volume = pricing.volume_per_unit * Decimal::from(amount);
        if self.exceeds_capacity_with(additional_volume) {
            let added = self.max_addable_units(pricing.volume_per_unit).min(amount);
            let next = self.merged(product_name, pricing, added);
            return (next, AdditionOutcome::Clamped { requested: amount, added });
        }

        (self.merged(product_name, pricing, amount), AdditionOutcome::Added { units: amount })
    }

    pub fn with_removal(&self, product_name: &str, amount: u32) -> (Cart, RemovalOutcome) {
        let Some(index) =
            self.lines.iter().position(|line| same_product_name(&line.product_name, product_name))
        else {
            return (self.clone(), RemovalOutcome::NotFound);
        };

        let mut next = self.clone();
        let held = next.lines[index].number_of_units;
        let outcome = if amount > held {
            next.lines.remove(index);
            RemovalOutcome::RemovedExceeding { held, requested: amount }
        } else if amount == held {
            next.lines.remove(index);
            RemovalOutcome::Removed
        } else {
            let remaining = held - amount;
            next.lines[index].number_of_units = remaining;
            RemovalOutcome::Decremented { remaining }
        };

        (next, outcome)
    }

    fn merged(&self, product_name: &str, pricing: UnitPricing, units: u32) -> Cart {
        let mut next = self.clone();
        if units == 0 {
            return next;
        }

        match next.lines.iter_mut().find(|line| same_product_name(&line.product_name, product_name))
        {
            Some(line) => line.number_of_units = line.number_of_units.saturating_add(units),
            None => next.lines.push(CartLine {
                product_name: product_name.to_string(),
                number_of_units: units,
                price_per_unit: pricing.price_per_unit,
                volume_per_unit: pricing.volume_per_unit,
            }),
        }
        next
    }
}
