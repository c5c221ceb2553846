use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use chrono::{DateTime, SubsecRound, Utc};

// ============================================================================
// Order Aggregate
// ============================================================================
//
// Wire shape shared by the stream payload, the cache entry and the HTTP
// facade. Field names follow the upstream JSON document, so renames here are
// breaking changes for producers.
//
// Only `order_uid` is mandatory; every other field falls back to its zero
// value when absent, matching what upstream producers actually send.
//
// `date_created` is held at microsecond precision, the resolution Postgres
// keeps, so a cached copy and a stored copy of one write compare equal.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Order {
    pub order_uid: Uuid,
    #[serde(default)]
    pub track_number: String,
    #[serde(default)]
    pub entry: String,
    #[serde(default)]
    pub delivery: Delivery,
    #[serde(default)]
    pub payment: Payment,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub locale: String,
    #[serde(default)]
    pub internal_signature: Option<String>,
    #[serde(default)]
    pub customer_id: String,
    #[serde(default)]
    pub delivery_service: String,
    #[serde(default)]
    pub shardkey: i64,
    #[serde(default)]
    pub sm_id: i32,
    #[serde(default = "now_micros", deserialize_with = "deserialize_micros")]
    pub date_created: DateTime<Utc>,
}

/// Current time truncated to microseconds.
pub fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn deserialize_micros<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    DateTime::<Utc>::deserialize(deserializer).map(|at| at.trunc_subsecs(6))
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

/// Money fields are integer minor units.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Payment {
    pub transaction: String,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    /// Epoch seconds.
    pub payment_dt: i64,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Item {
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub rid: String,
    pub name: String,
    pub sale: i32,
    pub size: String,
    pub total_price: i64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i32,
}

impl Order {
    /// Decode a stream payload or request body.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn id(&self) -> String {
        self.order_uid.to_string()
    }
}

/// Parse an externally supplied order identifier.
pub fn parse_order_id(id: &str) -> Result<Uuid, uuid::Error> {
    Uuid::parse_str(id)
}


#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "order_uid": "b563feb7-b2b8-4b6b-8a1d-4f2c2a1e0001",
        "track_number": "WBILMTESTTRACK",
        "entry": "WBIL",
        "delivery": {
            "name": "Test Testov",
            "phone": "+9720000000",
            "zip": "2639809",
            "city": "Kiryat Mozkin",
            "address": "Ploshad Mira 15",
            "region": "Kraiot",
            "email": "test@gmail.com"
        },
        "payment": {
            "transaction": "b563feb7b2b84b6btest",
            "request_id": "",
            "currency": "USD",
            "provider": "wbpay",
            "amount": 1817,
            "payment_dt": 1637907727,
            "bank": "alpha",
            "delivery_cost": 1500,
            "goods_total": 317,
            "custom_fee": 0
        },
        "items": [
            {
                "chrt_id": 9934930,
                "track_number": "WBILMTESTTRACK",
                "price": 453,
                "rid": "ab4219087a764ae0btest",
                "name": "Mascaras",
                "sale": 30,
                "size": "0",
                "total_price": 317,
                "nm_id": 2389212,
                "brand": "Vivienne Sabo",
                "status": 202
            }
        ],
        "locale": "en",
        "internal_signature": "",
        "customer_id": "test",
        "delivery_service": "meest",
        "shardkey": 9,
        "sm_id": 99,
        "date_created": "2021-11-26T06:22:19Z"
    }"#;

    #[test]
    fn test_decode_full_document() {
        let order = Order::from_json(SAMPLE.as_bytes()).unwrap();

        assert_eq!(order.id(), "b563feb7-b2b8-4b6b-8a1d-4f2c2a1e0001");
        assert_eq!(order.delivery.city, "Kiryat Mozkin");
        assert_eq!(order.payment.amount, 1817);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].brand, "Vivienne Sabo");
        assert_eq!(order.internal_signature.as_deref(), Some(""));
        assert_eq!(order.shardkey, 9);
    }

    #[test]
    fn test_decode_fills_missing_fields() {
        let order = Order::from_json(
            br#"{"order_uid": "b563feb7-b2b8-4b6b-8a1d-4f2c2a1e0002"}"#,
        )
        .unwrap();

        assert!(order.items.is_empty());
        assert_eq!(order.payment, Payment::default());
        assert_eq!(order.internal_signature, None);
    }

    #[test]
    fn test_decode_rejects_missing_or_bad_id() {
        assert!(Order::from_json(br#"{"track_number": "X"}"#).is_err());
        assert!(Order::from_json(br#"{"order_uid": "not-a-uuid"}"#).is_err());
        assert!(Order::from_json(b"\xff\xfe garbage").is_err());
    }

    #[test]
    fn test_money_fields_reject_fractions() {
        let doc = SAMPLE.replace("\"amount\": 1817", "\"amount\": 18.17");
        assert!(Order::from_json(doc.as_bytes()).is_err());
    }

    #[test]
    fn test_cache_encoding_preserves_order() {
        let order = fixtures::order(Uuid::new_v4(), 2, 1500);
        let decoded = Order::from_json(&order.to_json().unwrap()).unwrap();
        assert_eq!(decoded, order);
    }

    #[test]
    fn test_date_created_truncated_to_micros() {
        let doc = SAMPLE.replace("2021-11-26T06:22:19Z", "2021-11-26T06:22:19.123456789Z");
        let order = Order::from_json(doc.as_bytes()).unwrap();

        assert_eq!(order.date_created.timestamp_subsec_nanos(), 123_456_000);
        assert_eq!(Order::from_json(&order.to_json().unwrap()).unwrap(), order);
    }

    #[test]
    fn test_default_date_created_has_micro_precision() {
        let order = Order::from_json(br#"{"order_uid": "b563feb7-b2b8-4b6b-8a1d-4f2c2a1e0003"}"#).unwrap();
        assert_eq!(order.date_created.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn test_parse_order_id() {
        assert!(parse_order_id("b563feb7-b2b8-4b6b-8a1d-4f2c2a1e0001").is_ok());
        assert!(parse_order_id("").is_err());
        assert!(parse_order_id("12345").is_err());
    }
}
