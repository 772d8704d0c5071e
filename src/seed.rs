//! Sample entities for poking around an empty emulator.

use super::{
    codec::from_json,
    models::{Entity, EntityId, EntityKey, ProjectContext, PropertyValue, Timestamp},
    store::Datastore,
};
use anyhow::Result;
use chrono::{Duration, NaiveDateTime};
use serde_json::{json, Value};

fn entity(kind: &str, id: EntityId, fields: Value) -> Entity {
    let mut entity = Entity::new(EntityKey::new(kind, id));
    if let PropertyValue::Object(properties) = from_json(fields) {
        entity.properties = properties;
    }
    entity
}

fn days_before(now: NaiveDateTime, days: i64) -> PropertyValue {
    PropertyValue::Timestamp(Timestamp::Naive(now - Duration::days(days)))
}

fn users(now: NaiveDateTime) -> Vec<Entity> {
    let rows = [
        (
            10,
            json!({
                "name": "John Doe",
                "email": "john.doe@example.com",
                "age": 30,
                "active": true,
                "preferences": {"theme": "dark", "notifications": true, "language": "en"},
                "tags": ["developer", "python", "flask"]
            }),
        ),
        (
            8,
            json!({
                "name": "Jane Smith",
                "email": "jane.smith@example.com",
                "age": 28,
                "active": true,
                "preferences": {"theme": "light", "notifications": false, "language": "es"},
                "tags": ["designer", "ui", "ux"]
            }),
        ),
        (
            5,
            json!({
                "name": "Bob Johnson",
                "email": "bob.johnson@example.com",
                "age": 35,
                "active": false,
                "preferences": {"theme": "auto", "notifications": true, "language": "fr"},
                "tags": ["manager", "team-lead"]
            }),
        ),
    ];
    rows.into_iter()
        .zip(1..)
        .map(|((age_days, fields), id)| {
            let mut user = entity("User", EntityId::Id(id), fields);
            user.properties
                .insert("created_at".into(), days_before(now, age_days));
            user
        })
        .collect()
}

fn products(now: NaiveDateTime) -> Vec<Entity> {
    let rows = [
        (
            30,
            json!({
                "name": "Laptop Pro",
                "description": "High-performance laptop for developers",
                "price": 1299.99,
                "category": "Electronics",
                "in_stock": true,
                "quantity": 25,
                "specifications": {
                    "cpu": "Intel i7",
                    "ram": "16GB",
                    "storage": "512GB SSD",
                    "screen": "15.6 inch"
                },
                "ratings": [4.5, 4.8, 4.2, 4.9, 4.6]
            }),
        ),
        (
            20,
            json!({
                "name": "Wireless Mouse",
                "description": "Ergonomic wireless mouse with long battery life",
                "price": 29.99,
                "category": "Accessories",
                "in_stock": true,
                "quantity": 150,
                "specifications": {
                    "connectivity": "Bluetooth",
                    "battery_life": "6 months",
                    "dpi": "1600",
                    "buttons": 3
                },
                "ratings": [4.1, 4.3, 4.0, 4.4]
            }),
        ),
        (
            15,
            json!({
                "name": "Mechanical Keyboard",
                "description": "RGB mechanical keyboard for gaming and typing",
                "price": 89.99,
                "category": "Accessories",
                "in_stock": false,
                "quantity": 0,
                "specifications": {
                    "switch_type": "Cherry MX Blue",
                    "backlight": "RGB",
                    "layout": "Full-size",
                    "connectivity": "USB-C"
                },
                "ratings": [4.7, 4.8, 4.9, 4.6, 4.8]
            }),
        ),
    ];
    rows.into_iter()
        .map(|(age_days, fields)| {
            // "Laptop Pro" is stored under "laptop_pro"
            let slug = fields["name"]
                .as_str()
                .unwrap_or_default()
                .replace(' ', "_")
                .to_lowercase();
            let mut product = entity("Product", EntityId::Name(slug), fields);
            product
                .properties
                .insert("created_at".into(), days_before(now, age_days));
            product
        })
        .collect()
}

fn orders(now: NaiveDateTime) -> Vec<Entity> {
    let rows = [
        (
            3,
            json!({
                "customer_email": "john.doe@example.com",
                "total_amount": 1329.98,
                "status": "completed",
                "items": [
                    {"product": "Laptop Pro", "quantity": 1, "price": 1299.99},
                    {"product": "Wireless Mouse", "quantity": 1, "price": 29.99}
                ],
                "shipping_address": {
                    "street": "123 Main St",
                    "city": "Anytown",
                    "state": "CA",
                    "zipcode": "12345",
                    "country": "USA"
                },
                "payment_method": "credit_card"
            }),
        ),
        (
            1,
            json!({
                "customer_email": "jane.smith@example.com",
                "total_amount": 89.99,
                "status": "pending",
                "items": [
                    {"product": "Mechanical Keyboard", "quantity": 1, "price": 89.99}
                ],
                "shipping_address": {
                    "street": "456 Oak Ave",
                    "city": "Another City",
                    "state": "NY",
                    "zipcode": "67890",
                    "country": "USA"
                },
                "payment_method": "paypal"
            }),
        ),
    ];
    rows.into_iter()
        .zip(1001..)
        .map(|((age_days, fields), id)| {
            let mut order = entity("Order", EntityId::Id(id), fields);
            order
                .properties
                .insert("order_date".into(), days_before(now, age_days));
            order
        })
        .collect()
}

fn settings() -> Vec<Entity> {
    [
        json!({
            "key": "app_name",
            "value": "Local Datastore Browser",
            "type": "string",
            "description": "Application name displayed in the UI"
        }),
        json!({
            "key": "max_results_per_page",
            "value": 20,
            "type": "integer",
            "description": "Maximum number of results to show per page"
        }),
        json!({
            "key": "debug_mode",
            "value": true,
            "type": "boolean",
            "description": "Enable debug mode for development"
        }),
        json!({
            "key": "allowed_origins",
            "value": ["localhost:5000", "127.0.0.1:5000"],
            "type": "array",
            "description": "List of allowed origins for CORS"
        }),
        json!({
            "key": "database_config",
            "value": {
                "host": "localhost",
                "port": 8081,
                "project": "test-project",
                "timeout": 30
            },
            "type": "object",
            "description": "Database connection configuration"
        }),
    ]
    .into_iter()
    .map(|fields| {
        let name = fields["key"].as_str().unwrap_or_default().to_string();
        entity("Settings", EntityId::Name(name), fields)
    })
    .collect()
}

/// Every sample entity, timestamps counted back from `now`.
pub fn sample_entities(now: NaiveDateTime) -> Vec<Entity> {
    let mut all = users(now);
    all.extend(products(now));
    all.extend(orders(now));
    all.extend(settings());
    all
}

/// Writes the sample entities, overwriting any with the same keys. Returns
/// how many were written.
pub async fn seed(
    store: &dyn Datastore,
    ctx: &ProjectContext,
    now: NaiveDateTime,
) -> Result<usize> {
    let entities = sample_entities(now);
    let count = entities.len();
    for entity in entities {
        let key = store.put_entity(ctx, entity).await?;
        tracing::debug!(%key, "seeded");
    }
    tracing::info!(project = %ctx.project_id, count, "wrote sample entities");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Utc;

    #[test]
    fn test_sample_shapes() {
        let now = Utc::now().naive_utc();
        let all = sample_entities(now);
        assert_eq!(all.len(), 13);

        let laptop = all
            .iter()
            .find(|e| e.key.id == Some(EntityId::Name("laptop_pro".into())))
            .unwrap();
        assert_eq!(laptop.properties["price"], PropertyValue::Float(1299.99));
        assert_eq!(laptop.properties["quantity"], PropertyValue::Integer(25));
        assert_eq!(
            laptop.properties["created_at"],
            days_before(now, 30)
        );

        let debug = all
            .iter()
            .find(|e| e.key.id == Some(EntityId::Name("debug_mode".into())))
            .unwrap();
        assert_eq!(debug.properties["value"], PropertyValue::Boolean(true));
    }

    #[tokio::test]
    async fn test_seed_into_memory() {
        let store = MemoryStore::new();
        let ctx = ProjectContext::new("test-project");
        let written = seed(&store, &ctx, Utc::now().naive_utc()).await.unwrap();
        assert_eq!(written, 13);
        assert_eq!(
            store.list_kinds(&ctx).await.unwrap(),
            vec!["Order", "Product", "Settings", "User"]
        );
        let orders = store.list_entities(&ctx, "Order", 20, 0).await.unwrap();
        assert_eq!(orders.total_count, 2);
        assert_eq!(
            orders.entities[0].key,
            EntityKey::new("Order", EntityId::Id(1001))
        );
    }
}
