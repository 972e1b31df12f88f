// Shared builders for unit tests across the order domain.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal_macros::dec;
use uuid::Uuid;

use super::aggregate::{Order, OrderDraft};
use super::value_objects::{OrderLine, OrderNumber, PaymentMethod, ShippingAddress};

pub fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 14, hour, 0, 0).unwrap()
}

pub fn sample_address() -> ShippingAddress {
    ShippingAddress {
        full_name: "Lucía Ferrer".to_string(),
        email: "lucia@example.com".to_string(),
        phone: "+34 600 000 000".to_string(),
        address_line1: "Calle del Olivo 12".to_string(),
        address_line2: None,
        city: "Jaén".to_string(),
        region: Some("Andalucía".to_string()),
        postal_code: "23001".to_string(),
        country: "ES".to_string(),
    }
}

pub fn sample_order(now: DateTime<Utc>) -> Order {
    let draft = OrderDraft {
        owner_id: Uuid::new_v4(),
        items: vec![
            OrderLine {
                product_id: Uuid::new_v4(),
                name: "Picual Early Harvest 1L".to_string(),
                price: dec!(50.00),
                quantity: 2,
                image: Some("picual.jpg".to_string()),
            },
            OrderLine {
                product_id: Uuid::new_v4(),
                name: "Tasting Sampler 100ml".to_string(),
                price: dec!(7.50),
                quantity: 3,
                image: None,
            },
        ],
        shipping_address: sample_address(),
        payment_method: PaymentMethod::Card,
        notes: Some("Leave with the concierge".to_string()),
    };

    let day = NaiveDate::from_ymd_opt(2026, 5, 14).unwrap();
    Order::new(draft, OrderNumber::compose(day, 1), now)
}
