use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::VendorId;
use domain::ShipmentRequest;
use tokio::sync::Mutex;

use super::{CarrierClient, CarrierError, CarrierOrder};

#[derive(Debug, Default)]
struct InMemoryCarrierState {
    calls: Vec<ShipmentRequest>,
    next_id: u32,
    scripted: HashMap<VendorId, VecDeque<CarrierError>>,
    always_fail: HashMap<VendorId, CarrierError>,
    delay: Option<Duration>,
}

/// In-memory carrier for testing.
///
/// Every call is logged. Failures can be scripted per vendor, either for the
/// next N calls or permanently.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCarrier {
    state: Arc<Mutex<InMemoryCarrierState>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl InMemoryCarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the vendor's next call with `error`. Queued failures are used in order.
    pub async fn fail_next(&self, vendor_id: VendorId, error: CarrierError) {
        self.state
            .lock()
            .await
            .scripted
            .entry(vendor_id)
            .or_default()
            .push_back(error);
    }

    /// Fails every call for the vendor until cleared.
    pub async fn fail_always(&self, vendor_id: VendorId, error: CarrierError) {
        self.state.lock().await.always_fail.insert(vendor_id, error);
    }

    pub async fn clear_failures(&self) {
        let mut state = self.state.lock().await;
        state.scripted.clear();
        state.always_fail.clear();
    }

    /// Makes every call take at least `delay`.
    pub async fn set_delay(&self, delay: Duration) {
        self.state.lock().await.delay = Some(delay);
    }

    /// Every request received so far, failed ones included.
    pub async fn calls(&self) -> Vec<ShipmentRequest> {
        self.state.lock().await.calls.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.state.lock().await.calls.len()
    }

    pub async fn calls_for(&self, vendor_id: VendorId) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|r| r.vendor_id() == vendor_id)
            .count()
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn respond(&self, request: &ShipmentRequest) -> Result<CarrierOrder, CarrierError> {
        let delay = {
            let mut state = self.state.lock().await;
            state.calls.push(request.clone());
            state.delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().await;
        let vendor_id = request.vendor_id();

        if let Some(error) = state
            .scripted
            .get_mut(&vendor_id)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        if let Some(error) = state.always_fail.get(&vendor_id) {
            return Err(error.clone());
        }

        state.next_id += 1;
        let n = state.next_id;
        Ok(CarrierOrder {
            carrier_order_id: format!("SR-{n:04}"),
            shipment_id: format!("SH-{n:04}"),
            status: "NEW".to_string(),
            awb_code: Some(format!("AWB{n:06}")),
            courier_name: Some("In-Memory Express".to_string()),
        })
    }
}

#[async_trait]
impl CarrierClient for InMemoryCarrier {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn create_order(&self, request: &ShipmentRequest) -> Result<CarrierOrder, CarrierError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = self.respond(request).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
