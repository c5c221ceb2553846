use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::producer::OrderPublisher;
use crate::models::{now_micros, Delivery, Item, Order, Payment};
use crate::utils::Shutdown;

/// Synthetic order number `n`. Random-looking fields are derived from the
/// fresh v4 identifier.
pub fn synthetic_order(n: u64) -> Order {
    let uid = Uuid::new_v4();
    let bytes = uid.as_bytes();
    let pick = |offset: usize, modulo: u64| -> i64 {
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes[offset..offset + 8]);
        (u64::from_le_bytes(word) % modulo) as i64
    };

    let now = now_micros();
    Order {
        order_uid: uid,
        track_number: format!("TESTTRACK-{n:06}"),
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: "Load Gen".to_string(),
            phone: "+100000000".to_string(),
            city: "GenCity".to_string(),
            address: "Benchmark str.".to_string(),
            ..Delivery::default()
        },
        payment: Payment {
            transaction: uid.to_string(),
            currency: "USD".to_string(),
            provider: "generator-pay".to_string(),
            amount: pick(0, 5000) + 500,
            payment_dt: now.timestamp(),
            bank: "DemoBank".to_string(),
            ..Payment::default()
        },
        items: vec![Item {
            chrt_id: pick(8, 10_000_000),
            track_number: "TESTTRACK".to_string(),
            price: 999,
            name: "DemoItem".to_string(),
            total_price: 999,
            brand: "GeneratorCo".to_string(),
            status: 202,
            ..Item::default()
        }],
        locale: "en".to_string(),
        internal_signature: None,
        customer_id: "generator".to_string(),
        delivery_service: "generator-delivery".to_string(),
        shardkey: pick(4, 1000),
        sm_id: pick(2, 1000) as i32,
        date_created: now,
    }
}

/// Publish one synthetic order per `interval` until shutdown. Publish
/// failures are logged by the publisher and do not stop the loop.
pub async fn run_generator(publisher: Arc<dyn OrderPublisher>, interval: Duration, shutdown: Shutdown) {
    tracing::info!(interval_ms = interval.as_millis() as u64, "Load generator started");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    for n in 0u64.. {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let order = synthetic_order(n);
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            result = publisher.publish(&order) => {
                if result.is_err() {
                    tracing::debug!(n, "Synthetic order dropped");
                }
            }
        }
    }

    tracing::info!("Load generator stopped");
}
