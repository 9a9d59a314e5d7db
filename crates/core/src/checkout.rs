use rust_decimal::Decimal;
use serde::Serialize;

use crate::catalog::format::format_price;
use crate::domain::cart::Cart;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PaymentMethod {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
}

pub const PAYMENT_METHODS: [PaymentMethod; 4] = [
    PaymentMethod {
        id: "mercadopago",
        name: "MercadoPago",
        description: "Paga con MercadoPago (tarjetas, efectivo, transferencia)",
        icon: "💳",
    },
    PaymentMethod {
        id: "credit_card",
        name: "Tarjeta de Crédito",
        description: "Paga con tarjeta de crédito",
        icon: "💳",
    },
    PaymentMethod {
        id: "debit_card",
        name: "Tarjeta de Débito",
        description: "Paga con tarjeta de débito",
        icon: "💳",
    },
    PaymentMethod {
        id: "cash",
        name: "Efectivo",
        description: "Paga en efectivo al recibir",
        icon: "💵",
    },
];

pub fn payment_methods_block() -> String {
    let mut block = String::from("Métodos de pago disponibles:");
    for method in PAYMENT_METHODS {
        block.push_str(&format!("\n{} {}: {}", method.icon, method.name, method.description));
    }
    block
}

pub fn format_volume(liters: Decimal) -> String {
    if liters.is_zero() {
        return "0L".to_string();
    }
    format!("{}L", liters.normalize())
}

/// Text shown after a turn that edited the cart.
pub fn render_cart_summary(cart: &Cart) -> String {
    let mut lines = vec![
        "Your cart summary:".to_string(),
        format!("Distinct products: {}", cart.len()),
    ];

    for line in cart.lines() {
        let unit_label = if line.number_of_units == 1 { "unit" } else { "units" };
        lines.push(format!("- {}: {} {unit_label}", line.product_name, line.number_of_units));
    }

    lines.push(format!("Total cart value: {}", format_price(cart.total_value())));
    lines.push(format!("Total cart volume: {}", format_volume(cart.total_volume())));
    lines.push(String::new());
    lines.push(payment_methods_block());

    lines.join("\n")
}
