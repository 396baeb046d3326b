use std::time::Duration;

use async_trait::async_trait;
use budgetflow_core::config::ApiConfig;
use budgetflow_core::domain::record::{
    ApiEnvelope, BcrId, FinalDecisionPayload, RecommendationPayload, RecommendationRecord,
    ReviewRecord,
};
use budgetflow_core::errors::ApplicationError;
use budgetflow_core::source::BcrSource;
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::errors::ClientError;
use crate::http::HttpClient;

/// Budget change request endpoints under the configured base URL.
#[derive(Clone, Debug)]
pub struct BcrApiClient {
    http: HttpClient,
    base_url: String,
}

impl BcrApiClient {
    pub fn new(http: HttpClient, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, ClientError> {
        let mut builder = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .max_attempts(config.max_attempts)
            .backoff(Duration::from_millis(config.backoff_ms));

        if let Some(token) = &config.token {
            builder = builder.bearer_token(token.clone());
        }

        Ok(Self::new(builder.build()?, config.base_url.clone()))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    pub async fn recommendations(
        &self,
        bcr_id: BcrId,
    ) -> Result<Vec<RecommendationRecord>, ClientError> {
        self.get_list(&format!("budgetChangeRequest/{bcr_id}/recommendations")).await
    }

    pub async fn reviews(&self, bcr_id: BcrId) -> Result<Vec<ReviewRecord>, ClientError> {
        self.get_list(&format!("budgetChangeRequest/{bcr_id}/reviews")).await
    }

    pub async fn can_create(&self, bcr_id: BcrId) -> Result<bool, ClientError> {
        self.get_flag(&format!("budgetChangeRequest/{bcr_id}/recommendations/can-create")).await
    }

    pub async fn can_review(&self, bcr_id: BcrId) -> Result<bool, ClientError> {
        self.get_flag(&format!("budgetChangeRequest/{bcr_id}/reviews/can-review")).await
    }

    pub async fn create_recommendation(
        &self,
        bcr_id: BcrId,
        payload: &RecommendationPayload,
    ) -> Result<(), ClientError> {
        self.post(&format!("budgetChangeRequest/{bcr_id}/recommendations"), payload).await
    }

    pub async fn review_recommendation(
        &self,
        bcr_id: BcrId,
        payload: &FinalDecisionPayload,
    ) -> Result<(), ClientError> {
        self.post(&format!("budgetChangeRequest/{bcr_id}/reviews"), payload).await
    }

    /// Replaces a recommendation the caller filed earlier.
    pub async fn edit_recommendation(
        &self,
        bcr_id: BcrId,
        recommendation_id: u64,
        payload: &RecommendationPayload,
    ) -> Result<(), ClientError> {
        self.write(
            Method::PUT,
            &format!("budgetChangeRequest/{bcr_id}/recommendations/{recommendation_id}"),
            payload,
        )
        .await
    }

    async fn get_list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ClientError> {
        let body = self.fetch_json(Method::GET, path, None).await?;
        decode_list(path, body)
    }

    async fn get_flag(&self, path: &str) -> Result<bool, ClientError> {
        let body = self.fetch_json(Method::GET, path, None).await?;
        decode_flag(path, body)
    }

    async fn post<P: Serialize>(&self, path: &str, payload: &P) -> Result<(), ClientError> {
        self.write(Method::POST, path, payload).await
    }

    async fn write<P: Serialize>(
        &self,
        method: Method,
        path: &str,
        payload: &P,
    ) -> Result<(), ClientError> {
        let body = serde_json::to_value(payload)
            .map_err(|error| ClientError::Decode { path: path.to_string(), message: error.to_string() })?;
        let response = self.fetch_json(method, path, Some(body)).await?;
        check_envelope(path, &response)
    }

    async fn fetch_json(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ClientError> {
        let mut request = self.http.request(method.clone(), self.url(path));
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = self.http.send(request).await?;
        let status = response.status();
        if !status.is_success() {
            let message = failure_message(response).await;
            warn!(
                event_name = "bcr.api.request_failed",
                method = %method,
                path,
                status = status.as_u16(),
                message = %message,
                "budget service returned an error status"
            );
            return Err(ClientError::Status {
                method: method.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|error| ClientError::Decode { path: path.to_string(), message: error.to_string() })
    }
}

async fn failure_message(response: Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(text) => serde_json::from_str::<ApiEnvelope<Value>>(&text)
            .ok()
            .and_then(|envelope| envelope.message)
            .unwrap_or_else(|| if text.trim().is_empty() { status.to_string() } else { text }),
        Err(_) => status.to_string(),
    }
}

fn decode_list<T: DeserializeOwned>(path: &str, body: Value) -> Result<Vec<T>, ClientError> {
    let decode_error =
        |error: serde_json::Error| ClientError::Decode { path: path.to_string(), message: error.to_string() };

    match body {
        Value::Null => Ok(Vec::new()),
        Value::Array(_) => serde_json::from_value(body).map_err(decode_error),
        Value::Object(_) => {
            let envelope: ApiEnvelope<Vec<T>> = serde_json::from_value(body).map_err(decode_error)?;
            if !envelope.success {
                return Err(declined(path, envelope.message));
            }
            Ok(envelope.data.unwrap_or_default())
        }
        other => Err(ClientError::Decode {
            path: path.to_string(),
            message: format!("expected a list or envelope, found `{other}`"),
        }),
    }
}

fn decode_flag(path: &str, body: Value) -> Result<bool, ClientError> {
    match body {
        Value::Bool(flag) => Ok(flag),
        Value::Object(_) => {
            let envelope: ApiEnvelope<bool> = serde_json::from_value(body).map_err(|error| {
                ClientError::Decode { path: path.to_string(), message: error.to_string() }
            })?;
            if !envelope.success {
                return Err(declined(path, envelope.message));
            }
            Ok(envelope.data.unwrap_or(false))
        }
        other => Err(ClientError::Decode {
            path: path.to_string(),
            message: format!("expected a boolean, found `{other}`"),
        }),
    }
}

fn check_envelope(path: &str, body: &Value) -> Result<(), ClientError> {
    let success = body.get("success").and_then(Value::as_bool).unwrap_or(true);
    if success {
        return Ok(());
    }
    let message = body.get("message").and_then(Value::as_str).map(str::to_string);
    Err(declined(path, message))
}

fn declined(path: &str, message: Option<String>) -> ClientError {
    ClientError::Declined {
        path: path.to_string(),
        message: message.unwrap_or_else(|| "request was not accepted".to_string()),
    }
}

#[async_trait]
impl BcrSource for BcrApiClient {
    async fn fetch_recommendations(
        &self,
        bcr_id: BcrId,
    ) -> Result<Vec<RecommendationRecord>, ApplicationError> {
        Ok(self.recommendations(bcr_id).await?)
    }

    async fn fetch_reviews(&self, bcr_id: BcrId) -> Result<Vec<ReviewRecord>, ApplicationError> {
        Ok(self.reviews(bcr_id).await?)
    }

    async fn can_create_recommendation(&self, bcr_id: BcrId) -> Result<bool, ApplicationError> {
        Ok(self.can_create(bcr_id).await?)
    }

    async fn can_review_recommendation(&self, bcr_id: BcrId) -> Result<bool, ApplicationError> {
        Ok(self.can_review(bcr_id).await?)
    }

    async fn submit_recommendation(
        &self,
        bcr_id: BcrId,
        payload: &RecommendationPayload,
    ) -> Result<(), ApplicationError> {
        Ok(self.create_recommendation(bcr_id, payload).await?)
    }

    async fn submit_review(
        &self,
        bcr_id: BcrId,
        payload: &FinalDecisionPayload,
    ) -> Result<(), ApplicationError> {
        Ok(self.review_recommendation(bcr_id, payload).await?)
    }

    async fn edit_recommendation(
        &self,
        bcr_id: BcrId,
        recommendation_id: u64,
        payload: &RecommendationPayload,
    ) -> Result<(), ApplicationError> {
        Ok(BcrApiClient::edit_recommendation(self, bcr_id, recommendation_id, payload).await?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{check_envelope, decode_flag, decode_list};
    use crate::errors::ClientError;
    use budgetflow_core::domain::record::ReviewRecord;

    #[test]
    fn lists_decode_from_bare_arrays_and_envelopes() {
        let bare: Vec<ReviewRecord> =
            decode_list("reviews", json!([{ "Id": 1, "ApprovalLevel": "PD" }])).expect("bare list");
        assert_eq!(bare.len(), 1);

        let wrapped: Vec<ReviewRecord> =
            decode_list("reviews", json!({ "success": true, "data": [{ "Id": 2 }] }))
                .expect("envelope");
        assert_eq!(wrapped[0].id, 2);

        let empty: Vec<ReviewRecord> =
            decode_list("reviews", json!({ "success": true })).expect("envelope without data");
        assert!(empty.is_empty());
    }

    #[test]
    fn unsuccessful_envelope_is_declined_with_backend_message() {
        let error = decode_list::<ReviewRecord>(
            "reviews",
            json!({ "success": false, "message": "BCR not found" }),
        )
        .expect_err("declined");
        assert!(matches!(error, ClientError::Declined { ref message, .. } if message == "BCR not found"));
    }

    #[test]
    fn flags_accept_bare_bool_or_data_field() {
        assert!(decode_flag("can-create", json!(true)).expect("bare"));
        assert!(decode_flag("can-create", json!({ "data": true })).expect("wrapped"));
        assert!(!decode_flag("can-create", json!({ "success": true })).expect("missing data"));
        assert!(decode_flag("can-create", json!("yes")).is_err());
    }

    #[test]
    fn post_responses_only_fail_on_explicit_failure() {
        assert!(check_envelope("reviews", &json!(null)).is_ok());
        assert!(check_envelope("reviews", &json!({ "data": { "Id": 4 } })).is_ok());
        assert!(check_envelope("reviews", &json!({ "success": false })).is_err());
    }
}
