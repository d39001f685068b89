//! End-to-end scenarios against a simulated commerce target
//!
//! The simulated service implements the full API contract in memory with
//! switchable payment and delivery behaviors, so each scenario can steer
//! the target into the exact contract violation (or lack of one) under
//! test.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use bombard_config::BombardConfig;
use bombard_core::{
    BookingDto, BookingLogRecord, BucketLogRecord, DeliveryLogRecord, DeliveryOutcome,
    FinancialLogRecord, FinancialOperationType, Item, Order, OrderLine, OrderStatus,
    PaymentLogRecord, PaymentStatus, User,
};
use bombard_engine::{ControllerError, TestController, TestParams};
use bombard_interfaces::{
    ApiError, CommerceApi, CommerceApiFactory, InMemoryServiceRegistry, RecordingMetrics,
    ServiceDescriptor, ServiceRegistry,
};

const INITIAL_CREDIT: i64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PaymentBehavior {
    /// Accept the payment and move the order to payed
    Succeed,
    /// Reject with a not-enough-money payment record
    InsufficientFunds,
    /// Reject with a generic failure record
    GenericFailure,
    /// Report success but jump the order straight to delivered
    JumpToDelivered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeliveryBehavior {
    /// Pass through in-delivery and finish inside the slot
    Deliver,
    /// Pass through in-delivery, then refund with balanced bookkeeping
    Refund,
    /// Enter in-delivery and never leave it
    Stall,
}

#[derive(Debug, Default)]
struct SimState {
    users: HashMap<Uuid, User>,
    orders: HashMap<Uuid, Order>,
    financial: HashMap<Uuid, Vec<FinancialLogRecord>>,
    /// Reads served since an order entered in-delivery; the simulation
    /// serves the in-delivery snapshot at least once before concluding
    delivery_reads: HashMap<Uuid, u32>,
    /// Fake epoch-millis clock, advanced on mutations only
    clock: i64,
}

impl SimState {
    fn tick(&mut self) -> i64 {
        self.clock += 100;
        self.clock
    }
}

struct SimCommerceService {
    payment: PaymentBehavior,
    delivery: DeliveryBehavior,
    slot_seconds: i64,
    catalog: Vec<Item>,
    state: Mutex<SimState>,
}

impl SimCommerceService {
    fn new(payment: PaymentBehavior, delivery: DeliveryBehavior, slot_seconds: i64) -> Arc<Self> {
        let catalog = vec![
            Item {
                id: Uuid::new_v4(),
                title: "socks".to_string(),
                price: 50,
                amount: 100,
            },
            Item {
                id: Uuid::new_v4(),
                title: "kettle".to_string(),
                price: 120,
                amount: 100,
            },
            Item {
                id: Uuid::new_v4(),
                title: "bicycle".to_string(),
                price: 300,
                amount: 100,
            },
        ];
        Arc::new(Self {
            payment,
            delivery,
            slot_seconds,
            catalog,
            state: Mutex::new(SimState {
                clock: 1_000,
                ..SimState::default()
            }),
        })
    }

    async fn user_ids(&self) -> Vec<Uuid> {
        self.state.lock().await.users.keys().copied().collect()
    }

    fn missing_order() -> ApiError {
        ApiError::Remote {
            status: 404,
            message: "order not found".to_string(),
        }
    }
}

#[async_trait]
impl CommerceApi for SimCommerceService {
    async fn create_user(&self, name: &str, account_amount: i64) -> Result<User, ApiError> {
        let mut state = self.state.lock().await;
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            account_amount,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> Result<User, ApiError> {
        self.state
            .lock()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::Remote {
                status: 404,
                message: "user not found".to_string(),
            })
    }

    async fn get_financial_history(
        &self,
        _user_id: Uuid,
        order_id: Uuid,
    ) -> Result<Vec<FinancialLogRecord>, ApiError> {
        Ok(self
            .state
            .lock()
            .await
            .financial
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_order(&self, _user_id: Uuid) -> Result<Order, ApiError> {
        let mut state = self.state.lock().await;
        let now = state.tick();
        let order = Order {
            id: Uuid::new_v4(),
            time_created: now,
            status: OrderStatus::Collecting,
            items: HashMap::new(),
            delivery_duration: None,
            payment_history: Vec::new(),
        };
        state.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, _user_id: Uuid, order_id: Uuid) -> Result<Order, ApiError> {
        let mut state = self.state.lock().await;

        // Advance the delivery simulation: serve the in-delivery snapshot
        // at least once, then conclude per the configured behavior
        let in_delivery_since = match state.orders.get(&order_id) {
            Some(order) => match order.status {
                OrderStatus::InDelivery {
                    delivery_start_time,
                } => Some(delivery_start_time),
                _ => None,
            },
            None => return Err(Self::missing_order()),
        };
        if let Some(start) = in_delivery_since {
            let reads = state.delivery_reads.entry(order_id).or_insert(0);
            *reads += 1;
            let conclude = *reads > 1;
            if conclude {
                let now = state.clock;
                match self.delivery {
                    DeliveryBehavior::Deliver => {
                        let order = state.orders.get_mut(&order_id).unwrap();
                        order.status = OrderStatus::Delivered {
                            delivery_start_time: start,
                            delivery_finish_time: now,
                        };
                    }
                    DeliveryBehavior::Refund => {
                        let withdrawn: i64 = state
                            .financial
                            .get(&order_id)
                            .map(|records| {
                                records
                                    .iter()
                                    .filter(|r| {
                                        r.record_type == FinancialOperationType::Withdraw
                                    })
                                    .map(|r| r.amount)
                                    .sum()
                            })
                            .unwrap_or(0);
                        state
                            .financial
                            .entry(order_id)
                            .or_default()
                            .push(FinancialLogRecord {
                                record_type: FinancialOperationType::Refund,
                                amount: withdrawn,
                                order_id: Some(order_id),
                                timestamp: now,
                            });
                        let order = state.orders.get_mut(&order_id).unwrap();
                        order.status = OrderStatus::Refund;
                    }
                    DeliveryBehavior::Stall => {}
                }
            }
        }

        state
            .orders
            .get(&order_id)
            .cloned()
            .ok_or_else(Self::missing_order)
    }

    async fn get_available_items(&self, _user_id: Uuid) -> Result<Vec<Item>, ApiError> {
        Ok(self.catalog.clone())
    }

    async fn put_item_to_order(
        &self,
        _user_id: Uuid,
        order_id: Uuid,
        item_id: Uuid,
        amount: i64,
    ) -> Result<bool, ApiError> {
        let item = match self.catalog.iter().find(|i| i.id == item_id) {
            Some(item) => item.clone(),
            None => return Ok(false),
        };
        let mut state = self.state.lock().await;
        state.tick();
        let order = state.orders.get_mut(&order_id).ok_or_else(Self::missing_order)?;
        match order.status {
            OrderStatus::Collecting => {}
            // A change after booking re-opens the cart
            OrderStatus::Booked => order.status = OrderStatus::Collecting,
            _ => return Ok(false),
        }
        order.items.insert(item_id, OrderLine { item, amount });
        Ok(true)
    }

    async fn finalize_order(&self, order_id: Uuid) -> Result<BookingDto, ApiError> {
        let mut state = self.state.lock().await;
        state.tick();
        let order = state.orders.get_mut(&order_id).ok_or_else(Self::missing_order)?;
        order.status = OrderStatus::Booked;
        Ok(BookingDto {
            booking_id: Uuid::new_v4(),
            failed_items: Default::default(),
        })
    }

    async fn get_delivery_slots(&self, _order_id: Uuid) -> Result<Vec<i64>, ApiError> {
        Ok(vec![self.slot_seconds])
    }

    async fn set_delivery_time(&self, order_id: Uuid, time_seconds: i64) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.tick();
        let order = state.orders.get_mut(&order_id).ok_or_else(Self::missing_order)?;
        order.delivery_duration = Some(time_seconds);
        Ok(())
    }

    async fn pay_order(&self, _user_id: Uuid, order_id: Uuid) -> Result<Order, ApiError> {
        let mut state = self.state.lock().await;
        let now = state.tick();
        let total = {
            let order = state.orders.get(&order_id).ok_or_else(Self::missing_order)?;
            order.total_cost()
        };

        match self.payment {
            PaymentBehavior::Succeed => {
                state.financial.entry(order_id).or_default().push(
                    FinancialLogRecord {
                        record_type: FinancialOperationType::Withdraw,
                        amount: total,
                        order_id: Some(order_id),
                        timestamp: now,
                    },
                );
                let order = state.orders.get_mut(&order_id).unwrap();
                order.payment_history.push(PaymentLogRecord {
                    timestamp: now,
                    status: PaymentStatus::Success,
                    amount: total,
                });
                order.status = OrderStatus::Payed { payment_time: now };
                Ok(order.clone())
            }
            PaymentBehavior::InsufficientFunds => {
                let order = state.orders.get_mut(&order_id).unwrap();
                order.payment_history.push(PaymentLogRecord {
                    timestamp: now,
                    status: PaymentStatus::FailedNotEnoughMoney,
                    amount: total,
                });
                Ok(order.clone())
            }
            PaymentBehavior::GenericFailure => {
                let order = state.orders.get_mut(&order_id).unwrap();
                order.payment_history.push(PaymentLogRecord {
                    timestamp: now,
                    status: PaymentStatus::Failed,
                    amount: total,
                });
                Ok(order.clone())
            }
            PaymentBehavior::JumpToDelivered => {
                let order = state.orders.get_mut(&order_id).unwrap();
                order.payment_history.push(PaymentLogRecord {
                    timestamp: now,
                    status: PaymentStatus::Success,
                    amount: total,
                });
                order.status = OrderStatus::Delivered {
                    delivery_start_time: now,
                    delivery_finish_time: now,
                };
                Ok(order.clone())
            }
        }
    }

    async fn simulate_delivery(&self, order_id: Uuid) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        let now = state.tick();
        let order = state.orders.get_mut(&order_id).ok_or_else(Self::missing_order)?;
        order.status = OrderStatus::InDelivery {
            delivery_start_time: now,
        };
        Ok(())
    }

    async fn delivery_log(&self, order_id: Uuid) -> Result<DeliveryLogRecord, ApiError> {
        let state = self.state.lock().await;
        let order = state.orders.get(&order_id).ok_or_else(Self::missing_order)?;
        let outcome = match order.status {
            OrderStatus::Delivered { .. } => DeliveryOutcome::Success,
            _ => DeliveryOutcome::Failure,
        };
        Ok(DeliveryLogRecord {
            order_id,
            outcome,
        })
    }

    async fn abandoned_cart_history(
        &self,
        _order_id: Uuid,
    ) -> Result<Vec<BucketLogRecord>, ApiError> {
        Ok(Vec::new())
    }

    async fn get_booking_history(
        &self,
        _booking_id: Uuid,
    ) -> Result<Vec<BookingLogRecord>, ApiError> {
        Ok(Vec::new())
    }
}

struct SimFactory {
    api: Arc<SimCommerceService>,
}

#[async_trait]
impl CommerceApiFactory for SimFactory {
    async fn connect(
        &self,
        _descriptor: &ServiceDescriptor,
    ) -> Result<Arc<dyn CommerceApi>, ApiError> {
        Ok(self.api.clone())
    }
}

struct Harness {
    controller: Arc<TestController>,
    metrics: Arc<RecordingMetrics>,
    sim: Arc<SimCommerceService>,
}

async fn harness(sim: Arc<SimCommerceService>) -> Harness {
    let mut config = BombardConfig::default();
    config.harness.workers_per_flow = 4;
    config.harness.user_account_amount = INITIAL_CREDIT;
    config.harness.poll_interval = Duration::from_millis(10);
    config.harness.abandoned_probability = 0.0;
    config.harness.change_after_finalization_probability = 0.0;
    config.harness.stop_timeout = Duration::from_secs(10);
    config.rate_limit.slow_start = false;

    let registry = Arc::new(InMemoryServiceRegistry::new());
    registry
        .register(ServiceDescriptor {
            name: "orders-svc".to_string(),
            base_url: "http://sim.local".to_string(),
            credentials: None,
        })
        .await
        .unwrap();

    let metrics = Arc::new(RecordingMetrics::new());
    let controller = Arc::new(TestController::new(
        config,
        registry,
        Arc::new(SimFactory { api: sim.clone() }),
        metrics.clone(),
    ));

    Harness {
        controller,
        metrics,
        sim,
    }
}

fn params(number_of_tests: u64) -> TestParams {
    TestParams {
        service_name: "orders-svc".to_string(),
        number_of_users: 10,
        number_of_tests,
        rate_per_second: 50,
        test_success_by_payment_fact: false,
        stop_after_order_creation: false,
    }
}

/// Poll until the flow reports every test finished
async fn wait_for_finished(harness: &Harness, expected: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    loop {
        let snapshot = harness
            .controller
            .flow_status("orders-svc")
            .await
            .expect("flow should be running");
        if snapshot.tests_finished >= expected {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "tests did not finish in time: {snapshot:?}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_happy_path_records_one_success_sample() {
    let sim = SimCommerceService::new(PaymentBehavior::Succeed, DeliveryBehavior::Deliver, 2);
    let h = harness(sim).await;

    h.controller.start_testing(params(1)).await.unwrap();
    wait_for_finished(&h, 1).await;

    assert_eq!(h.metrics.test_samples("orders-svc", "SUCCESS").len(), 1);
    assert_eq!(h.metrics.test_sample_count("orders-svc"), 1);

    let snapshot = h.controller.flow_status("orders-svc").await.unwrap();
    assert_eq!(snapshot.tests_started, 1);
    assert_eq!(snapshot.tests_finished, 1);

    h.controller.stop_testing("orders-svc").await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_insufficient_funds_fails_and_leaves_ledger_untouched() {
    let sim = SimCommerceService::new(
        PaymentBehavior::InsufficientFunds,
        DeliveryBehavior::Deliver,
        2,
    );
    let h = harness(sim).await;

    h.controller.start_testing(params(1)).await.unwrap();
    wait_for_finished(&h, 1).await;

    assert_eq!(h.metrics.test_samples("orders-svc", "FAIL").len(), 1);
    assert_eq!(h.metrics.test_sample_count("orders-svc"), 1);

    // The local credit mirror saw no spend
    let pool = h.controller.user_pool();
    for user in h.sim.user_ids().await {
        assert_eq!(pool.balance(user).await.unwrap(), INITIAL_CREDIT);
    }

    h.controller.stop_testing("orders-svc").await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_generic_payment_failure_exhausts_retries() {
    let sim = SimCommerceService::new(
        PaymentBehavior::GenericFailure,
        DeliveryBehavior::Deliver,
        2,
    );
    let h = harness(sim).await;

    // Two tests: the flow keeps going after a retry-exhausted test
    h.controller.start_testing(params(2)).await.unwrap();
    wait_for_finished(&h, 2).await;

    assert_eq!(h.metrics.test_samples("orders-svc", "RETRY").len(), 2);
    assert_eq!(h.metrics.test_sample_count("orders-svc"), 2);

    h.controller.stop_testing("orders-svc").await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_illegal_transition_fails_the_test() {
    let sim = SimCommerceService::new(
        PaymentBehavior::JumpToDelivered,
        DeliveryBehavior::Deliver,
        2,
    );
    let h = harness(sim).await;

    h.controller.start_testing(params(1)).await.unwrap();
    wait_for_finished(&h, 1).await;

    // Booked -> Delivered is not a legal path; the audit fails the test
    assert_eq!(h.metrics.test_samples("orders-svc", "FAIL").len(), 1);

    h.controller.stop_testing("orders-svc").await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_refund_with_balanced_books_succeeds() {
    let sim = SimCommerceService::new(PaymentBehavior::Succeed, DeliveryBehavior::Refund, 2);
    let h = harness(sim).await;

    h.controller.start_testing(params(1)).await.unwrap();
    wait_for_finished(&h, 1).await;

    assert_eq!(h.metrics.test_samples("orders-svc", "SUCCESS").len(), 1);

    // Withdraw mirrored at payment, refund mirrored back at conclusion
    let pool = h.controller.user_pool();
    for user in h.sim.user_ids().await {
        assert_eq!(pool.balance(user).await.unwrap(), INITIAL_CREDIT);
    }

    h.controller.stop_testing("orders-svc").await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_interrupts_inflight_awaits_promptly() {
    // Delivery never concludes, so workers sit inside the long await
    let sim = SimCommerceService::new(PaymentBehavior::Succeed, DeliveryBehavior::Stall, 3_600);
    let h = harness(sim).await;

    h.controller.start_testing(params(5)).await.unwrap();

    // Let workers reach the delivery await
    tokio::time::sleep(Duration::from_millis(400)).await;

    let stop_started = tokio::time::Instant::now();
    h.controller.stop_testing("orders-svc").await.unwrap();
    let stop_elapsed = stop_started.elapsed();

    assert!(
        stop_elapsed < Duration::from_secs(2),
        "stop took {stop_elapsed:?}, workers did not unwind cooperatively"
    );
    assert!(matches!(
        h.controller.flow_status("orders-svc").await,
        Err(ControllerError::NotFound { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_double_start_admits_exactly_one_flow() {
    let sim = SimCommerceService::new(PaymentBehavior::Succeed, DeliveryBehavior::Deliver, 2);
    let h = harness(sim).await;

    let (first, second) = tokio::join!(
        h.controller.start_testing(params(1)),
        h.controller.start_testing(params(1)),
    );

    let outcomes = [first, second];
    let succeeded = outcomes.iter().filter(|r| r.is_ok()).count();
    let already_running = outcomes
        .iter()
        .filter(|r| matches!(r, Err(ControllerError::AlreadyRunning { .. })))
        .count();
    assert_eq!(succeeded, 1);
    assert_eq!(already_running, 1);

    wait_for_finished(&h, 1).await;
    h.controller.stop_testing("orders-svc").await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unknown_service_and_missing_flow_are_not_found() {
    let sim = SimCommerceService::new(PaymentBehavior::Succeed, DeliveryBehavior::Deliver, 2);
    let h = harness(sim).await;

    assert!(matches!(
        h.controller.flow_status("nowhere").await,
        Err(ControllerError::NotFound { .. })
    ));
    assert!(matches!(
        h.controller.stop_testing("nowhere").await,
        Err(ControllerError::NotFound { .. })
    ));

    let mut unknown = params(1);
    unknown.service_name = "unregistered-svc".to_string();
    assert!(matches!(
        h.controller.start_testing(unknown).await,
        Err(ControllerError::Registry(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_after_order_creation_ends_tests_neutrally() {
    let sim = SimCommerceService::new(PaymentBehavior::Succeed, DeliveryBehavior::Deliver, 2);
    let h = harness(sim).await;

    let mut p = params(3);
    p.stop_after_order_creation = true;
    h.controller.start_testing(p).await.unwrap();
    wait_for_finished(&h, 3).await;

    assert_eq!(h.metrics.test_samples("orders-svc", "STOP").len(), 3);

    h.controller.stop_testing("orders-svc").await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_payment_fact_flows_succeed_without_delivery() {
    // Delivery would stall forever; the payment-fact knob never reaches it
    let sim = SimCommerceService::new(PaymentBehavior::Succeed, DeliveryBehavior::Stall, 3_600);
    let h = harness(sim).await;

    let mut p = params(2);
    p.test_success_by_payment_fact = true;
    h.controller.start_testing(p).await.unwrap();
    wait_for_finished(&h, 2).await;

    assert_eq!(h.metrics.test_samples("orders-svc", "SUCCESS").len(), 2);

    h.controller.stop_testing("orders-svc").await.unwrap();
}
