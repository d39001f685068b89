//! Test controller: flow admission, worker fan-out, and lifecycle
//!
//! The controller owns the map of running flows (at most one per service
//! name), builds the per-service user pool, and fans each admitted flow out
//! over worker tasks. Workers loop — permit, fresh context, pipeline, one
//! duration sample — until the flow's test budget is spent or it is
//! cancelled; stopping a flow waits for its workers to drain cooperatively.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use bombard_config::BombardConfig;
use bombard_core::OrderStateMachine;
use bombard_interfaces::{CommerceApiFactory, HarnessMetrics, ServiceDescriptor, ServiceRegistry};
use bombard_resilience::{SlowStartPolicy, SlowStartRateLimiter};

use crate::context::{FlowKnobs, TestContext};
use crate::error::ControllerError;
use crate::flow::{FlowSnapshot, TestParams, TestingFlow};
use crate::orders::OrderCache;
use crate::pipeline::{build_pipeline, run_pipeline};
use crate::stage::StageDeps;
use crate::users::UserPool;

/// Orchestrates testing flows across target services
pub struct TestController {
    config: BombardConfig,
    registry: Arc<dyn ServiceRegistry>,
    api_factory: Arc<dyn CommerceApiFactory>,
    metrics: Arc<dyn HarnessMetrics>,
    users: Arc<UserPool>,
    orders: Arc<OrderCache>,
    running: RwLock<HashMap<String, Arc<TestingFlow>>>,
}

impl TestController {
    pub fn new(
        config: BombardConfig,
        registry: Arc<dyn ServiceRegistry>,
        api_factory: Arc<dyn CommerceApiFactory>,
        metrics: Arc<dyn HarnessMetrics>,
    ) -> Self {
        Self {
            config,
            registry,
            api_factory,
            metrics,
            users: Arc::new(UserPool::new()),
            orders: Arc::new(OrderCache::new(Arc::new(OrderStateMachine::standard()))),
            running: RwLock::new(HashMap::new()),
        }
    }

    /// The shared user pool, exposed for ledger assertions
    pub fn user_pool(&self) -> Arc<UserPool> {
        self.users.clone()
    }

    /// Admit and launch a testing flow for one service.
    ///
    /// Fails with `AlreadyRunning` when a flow for the service exists; the
    /// admission check and insert happen under one lock so concurrent
    /// starts race safely.
    pub async fn start_testing(&self, params: TestParams) -> Result<(), ControllerError> {
        validate_params(&params)?;
        let descriptor = self.registry.resolve(&params.service_name).await?;

        let flow = Arc::new(TestingFlow::new(params.clone()));
        {
            let mut running = self.running.write().await;
            if running.contains_key(&params.service_name) {
                return Err(ControllerError::AlreadyRunning {
                    service: params.service_name,
                });
            }
            running.insert(params.service_name.clone(), flow.clone());
        }

        match self.launch_flow(&descriptor, flow).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.running.write().await.remove(&params.service_name);
                Err(err)
            }
        }
    }

    async fn launch_flow(
        &self,
        descriptor: &ServiceDescriptor,
        flow: Arc<TestingFlow>,
    ) -> Result<(), ControllerError> {
        let api = self.api_factory.connect(descriptor).await?;
        let params = flow.params().clone();

        let created = self
            .users
            .create_users_pool(
                api.as_ref(),
                &params.service_name,
                params.number_of_users,
                self.config.harness.user_account_amount,
            )
            .await;
        if created == 0 {
            return Err(ControllerError::BadRequest {
                message: format!(
                    "could not create any of the {} requested users on '{}'",
                    params.number_of_users, params.service_name
                ),
            });
        }

        let limiter = Arc::new(SlowStartRateLimiter::new(
            params.rate_per_second,
            SlowStartPolicy {
                slow_start: self.config.rate_limit.slow_start,
                ramp_interval: self.config.rate_limit.ramp_interval,
            },
        ));

        for worker in 0..self.config.harness.workers_per_flow {
            let deps = StageDeps {
                api: api.clone(),
                users: self.users.clone(),
                orders: self.orders.clone(),
                metrics: self.metrics.clone(),
                cancellation: flow.cancellation().watch(),
                poll_interval: self.config.harness.poll_interval,
            };
            tokio::spawn(run_worker(
                worker,
                flow.clone(),
                limiter.clone(),
                deps,
                self.config.harness.clone(),
            ));
        }

        info!(
            service = %params.service_name,
            users = created,
            workers = self.config.harness.workers_per_flow,
            tests = params.number_of_tests,
            rate = params.rate_per_second,
            "Testing flow started"
        );
        Ok(())
    }

    /// Counter snapshot for one flow
    pub async fn flow_status(&self, service: &str) -> Result<FlowSnapshot, ControllerError> {
        self.running
            .read()
            .await
            .get(service)
            .map(|flow| flow.snapshot())
            .ok_or_else(|| ControllerError::NotFound {
                service: service.to_string(),
            })
    }

    /// Cancel a flow, wait for its workers to drain, and remove it
    pub async fn stop_testing(&self, service: &str) -> Result<(), ControllerError> {
        let flow = self
            .running
            .read()
            .await
            .get(service)
            .cloned()
            .ok_or_else(|| ControllerError::NotFound {
                service: service.to_string(),
            })?;

        flow.cancellation().cancel();
        let quiesced = flow
            .cancellation()
            .await_quiescence(self.config.harness.stop_timeout)
            .await;
        if !quiesced {
            warn!(service, "Workers did not quiesce before the stop timeout");
        }

        self.running.write().await.remove(service);
        info!(service, "Testing flow stopped");
        Ok(())
    }

    /// Stop every running flow
    pub async fn stop_all(&self) -> Result<(), ControllerError> {
        let services: Vec<String> = self.running.read().await.keys().cloned().collect();
        for service in services {
            // A flow that finished stopping concurrently is fine to skip
            match self.stop_testing(&service).await {
                Ok(()) | Err(ControllerError::NotFound { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

fn validate_params(params: &TestParams) -> Result<(), ControllerError> {
    if params.service_name.is_empty() {
        return Err(ControllerError::BadRequest {
            message: "service name cannot be empty".to_string(),
        });
    }
    if params.number_of_users == 0 {
        return Err(ControllerError::BadRequest {
            message: "number of users must be greater than 0".to_string(),
        });
    }
    if params.number_of_tests == 0 {
        return Err(ControllerError::BadRequest {
            message: "number of tests must be greater than 0".to_string(),
        });
    }
    if params.rate_per_second == 0 {
        return Err(ControllerError::BadRequest {
            message: "rate per second must be greater than 0".to_string(),
        });
    }
    Ok(())
}

/// Worker task body: acquire a permit, run one test, repeat
async fn run_worker(
    index: usize,
    flow: Arc<TestingFlow>,
    limiter: Arc<SlowStartRateLimiter>,
    deps: StageDeps,
    harness: bombard_config::HarnessConfig,
) {
    let params = flow.params().clone();
    let knobs = FlowKnobs {
        test_success_by_payment_fact: params.test_success_by_payment_fact,
        stop_after_order_creation: params.stop_after_order_creation,
    };

    let mut watch = deps.cancellation.clone();
    let count = watch.register().await;
    deps.metrics
        .set_active_workers(&params.service_name, count as u64);
    debug!(worker = index, service = %params.service_name, "Worker started");

    loop {
        if watch.is_cancelled() {
            break;
        }

        tokio::select! {
            _ = watch.cancelled() => break,
            _ = limiter.tick_blocking() => {}
        }

        let Some(test_number) = flow.try_claim_test() else {
            break;
        };

        let mut ctx = TestContext::new(params.service_name.clone(), knobs);
        let pipeline = build_pipeline(&harness, &params);
        let started = tokio::time::Instant::now();

        let outcome = run_pipeline(&pipeline, &mut ctx, &deps).await;

        deps.metrics
            .record_test_duration(&params.service_name, outcome.as_str(), started.elapsed());
        flow.test_finished();
        debug!(
            worker = index,
            test_number,
            outcome = outcome.as_str(),
            "Test finished"
        );
    }

    let count = watch.deregister().await;
    deps.metrics
        .set_active_workers(&params.service_name, count as u64);
    debug!(worker = index, service = %params.service_name, "Worker drained");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> TestParams {
        TestParams {
            service_name: "svc".to_string(),
            number_of_users: 5,
            number_of_tests: 10,
            rate_per_second: 2,
            test_success_by_payment_fact: false,
            stop_after_order_creation: false,
        }
    }

    #[test]
    fn test_validate_params_accepts_sane_input() {
        assert!(validate_params(&params()).is_ok());
    }

    #[test]
    fn test_validate_params_rejects_zeroes() {
        let mut bad = params();
        bad.number_of_tests = 0;
        assert!(matches!(
            validate_params(&bad),
            Err(ControllerError::BadRequest { .. })
        ));

        let mut bad = params();
        bad.rate_per_second = 0;
        assert!(matches!(
            validate_params(&bad),
            Err(ControllerError::BadRequest { .. })
        ));

        let mut bad = params();
        bad.service_name = String::new();
        assert!(matches!(
            validate_params(&bad),
            Err(ControllerError::BadRequest { .. })
        ));
    }
}
