//! HTTP client implementation for target e-commerce services

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use bombard_config::HttpConfig;
use bombard_core::{
    BookingDto, BookingLogRecord, BucketLogRecord, DeliveryLogRecord, FinancialLogRecord, Item,
    Order, User,
};
use bombard_interfaces::{
    ApiError, CommerceApi, CommerceApiFactory, HttpCredentials, ServiceDescriptor,
};

use crate::errors::HttpClientError;

/// `reqwest`-backed client for one target service
#[derive(Debug, Clone)]
pub struct HttpCommerceClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<HttpCredentials>,
}

impl HttpCommerceClient {
    /// Build a client for a resolved service descriptor
    pub fn new(
        descriptor: &ServiceDescriptor,
        config: &HttpConfig,
    ) -> Result<Self, HttpClientError> {
        if descriptor.base_url.is_empty() {
            return Err(HttpClientError::ConfigError(format!(
                "descriptor for '{}' has no base url",
                descriptor.name
            )));
        }

        debug!(
            service = %descriptor.name,
            timeout_ms = config.timeout.as_millis() as u64,
            "Creating commerce client"
        );

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            base_url: descriptor.base_url.trim_end_matches('/').to_string(),
            credentials: descriptor.credentials.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some(HttpCredentials::Bearer { token }) => request.bearer_auth(token),
            Some(HttpCredentials::Basic { username, password }) => {
                request.basic_auth(username, Some(password))
            }
            Some(HttpCredentials::ApiKey { key, header }) => {
                request.header(header.as_str(), key.as_str())
            }
            None => request,
        }
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(into_api_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Target returned error response");
            return Err(ApiError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        response.json::<T>().await.map_err(|e| ApiError::Decode {
            message: e.to_string(),
        })
    }

    async fn execute_unit(&self, request: RequestBuilder) -> Result<(), ApiError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(into_api_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Remote {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

fn into_api_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() || error.is_connect() {
        ApiError::Unavailable {
            message: error.to_string(),
        }
    } else {
        ApiError::Network {
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl CommerceApi for HttpCommerceClient {
    async fn create_user(&self, name: &str, account_amount: i64) -> Result<User, ApiError> {
        let body = json!({ "name": name, "accountAmount": account_amount });
        self.execute(self.client.post(self.url("/users")).json(&body))
            .await
    }

    async fn get_user(&self, id: Uuid) -> Result<User, ApiError> {
        self.execute(self.client.get(self.url(&format!("/users/{id}"))))
            .await
    }

    async fn get_financial_history(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<Vec<FinancialLogRecord>, ApiError> {
        let url = self.url(&format!("/users/{user_id}/finlog"));
        self.execute(
            self.client
                .get(url)
                .query(&[("orderId", order_id.to_string())]),
        )
        .await
    }

    async fn create_order(&self, user_id: Uuid) -> Result<Order, ApiError> {
        self.execute(self.client.post(self.url(&format!("/users/{user_id}/orders"))))
            .await
    }

    async fn get_order(&self, user_id: Uuid, order_id: Uuid) -> Result<Order, ApiError> {
        self.execute(
            self.client
                .get(self.url(&format!("/users/{user_id}/orders/{order_id}"))),
        )
        .await
    }

    async fn get_available_items(&self, user_id: Uuid) -> Result<Vec<Item>, ApiError> {
        self.execute(self.client.get(self.url(&format!("/users/{user_id}/items"))))
            .await
    }

    async fn put_item_to_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        item_id: Uuid,
        amount: i64,
    ) -> Result<bool, ApiError> {
        let url = self.url(&format!("/orders/{order_id}/items/{item_id}"));
        self.execute(self.client.put(url).query(&[
            ("userId", user_id.to_string()),
            ("amount", amount.to_string()),
        ]))
        .await
    }

    async fn finalize_order(&self, order_id: Uuid) -> Result<BookingDto, ApiError> {
        self.execute(
            self.client
                .post(self.url(&format!("/orders/{order_id}/bookings"))),
        )
        .await
    }

    async fn get_delivery_slots(&self, order_id: Uuid) -> Result<Vec<i64>, ApiError> {
        self.execute(
            self.client
                .get(self.url(&format!("/orders/{order_id}/delivery/slots"))),
        )
        .await
    }

    async fn set_delivery_time(&self, order_id: Uuid, time_seconds: i64) -> Result<(), ApiError> {
        let url = self.url(&format!("/orders/{order_id}/delivery"));
        self.execute_unit(
            self.client
                .post(url)
                .query(&[("slot", time_seconds.to_string())]),
        )
        .await
    }

    async fn pay_order(&self, user_id: Uuid, order_id: Uuid) -> Result<Order, ApiError> {
        let url = self.url(&format!("/orders/{order_id}/payment"));
        self.execute(
            self.client
                .post(url)
                .query(&[("userId", user_id.to_string())]),
        )
        .await
    }

    async fn simulate_delivery(&self, order_id: Uuid) -> Result<(), ApiError> {
        self.execute_unit(
            self.client
                .post(self.url(&format!("/orders/{order_id}/delivery/start"))),
        )
        .await
    }

    async fn delivery_log(&self, order_id: Uuid) -> Result<DeliveryLogRecord, ApiError> {
        self.execute(
            self.client
                .get(self.url(&format!("/orders/{order_id}/delivery/log"))),
        )
        .await
    }

    async fn abandoned_cart_history(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<BucketLogRecord>, ApiError> {
        self.execute(
            self.client
                .get(self.url(&format!("/orders/{order_id}/bucket/log"))),
        )
        .await
    }

    async fn get_booking_history(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<BookingLogRecord>, ApiError> {
        self.execute(
            self.client
                .get(self.url(&format!("/bookings/{booking_id}/log"))),
        )
        .await
    }
}

/// Builds [`HttpCommerceClient`]s for resolved descriptors
#[derive(Debug, Clone, Default)]
pub struct HttpCommerceClientFactory {
    config: HttpConfig,
}

impl HttpCommerceClientFactory {
    pub fn new(config: HttpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CommerceApiFactory for HttpCommerceClientFactory {
    async fn connect(
        &self,
        descriptor: &ServiceDescriptor,
    ) -> Result<Arc<dyn CommerceApi>, ApiError> {
        let client =
            HttpCommerceClient::new(descriptor, &self.config).map_err(|e| ApiError::Unavailable {
                message: e.to_string(),
            })?;
        Ok(Arc::new(client))
    }
}
