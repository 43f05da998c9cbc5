//! Request handlers.
//!
//! [`ApiHandler`] is transport-agnostic: it takes a method, a path, and a
//! body, and produces an [`ApiResponse`]. The hyper glue lives in
//! [`server`](crate::server).

use crate::config::EngineConfig;
use crate::error::ServerError;
use crate::metrics::Metrics;
use hyper::{Method, StatusCode};
use percent_encoding::percent_decode_str;
use primflow_core::{
    ExecutionContext, IssueSeverity, PrimitiveRegistry, RunReport, StateExecutor, WorkflowRunner,
};
use primflow_storage::{GraphStore, StoredState};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// A rendered response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn json(status: StatusCode, value: &Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: value.to_string().into_bytes(),
        }
    }

    pub fn text(status: StatusCode, content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    pub fn empty(status: StatusCode) -> Self {
        Self::text(status, "text/plain", Vec::new())
    }

    fn error(err: &ServerError) -> Self {
        let mut body = json!({ "error": err.to_string(), "code": err.error_code() });
        // Aborted runs still report how far they got.
        if let ServerError::Run(run) = err {
            body["runId"] = Value::String(run.run_id.clone());
            body["steps"] = serde_json::to_value(&run.steps).unwrap_or_default();
        }
        Self::json(err.status(), &body)
    }

    /// Parses the body as JSON.
    pub fn json_body(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Body of `POST /api/flow`.
#[derive(Debug, Deserialize)]
struct FlowRequest {
    states: BTreeMap<String, StoredState>,
}

/// Body of `POST /api/runs`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunRequest {
    initial_state: String,
    #[serde(default)]
    context: Option<Value>,
    #[serde(default)]
    halt_on: Option<Vec<String>>,
    #[serde(default)]
    max_steps: Option<usize>,
}

/// API handler shared by every connection.
pub struct ApiHandler {
    store: Arc<GraphStore>,
    registry: Arc<PrimitiveRegistry>,
    engine: EngineConfig,
    metrics: Option<Arc<Metrics>>,
}

impl ApiHandler {
    pub fn new(store: Arc<GraphStore>, registry: Arc<PrimitiveRegistry>) -> Self {
        Self {
            store,
            registry,
            engine: EngineConfig::default(),
            metrics: None,
        }
    }

    /// Sets the run defaults used when a request doesn't override them.
    pub fn with_engine_config(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        metrics.states_stored.set(self.store.len() as f64);
        self.metrics = Some(metrics);
        self
    }

    pub fn metrics(&self) -> Option<&Arc<Metrics>> {
        self.metrics.as_ref()
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    /// Handles a request and returns a response.
    pub async fn handle(&self, method: &Method, path: &str, body: &[u8]) -> ApiResponse {
        let route = Self::route_name(method, path);
        let timer = self
            .metrics
            .as_ref()
            .map(|m| m.request_duration.with_label_values(&[route]).start_timer());

        let result = self.dispatch(method, path, body).await;

        if let Some(ref metrics) = self.metrics {
            metrics.requests_total.with_label_values(&[route]).inc();
            if let Err(ref e) = result {
                metrics.errors_total.with_label_values(&[e.error_code()]).inc();
            }
        }
        drop(timer);

        match result {
            Ok(response) => response,
            Err(e) => {
                if e.status().is_server_error() {
                    tracing::error!("{} {} failed: {}", method, path, e);
                } else {
                    tracing::debug!("{} {} rejected: {}", method, path, e);
                }
                ApiResponse::error(&e)
            }
        }
    }

    /// Response for a request whose body exceeds the configured limit.
    pub fn payload_too_large(&self, limit: usize) -> ApiResponse {
        let err = ServerError::PayloadTooLarge { limit };
        if let Some(ref metrics) = self.metrics {
            metrics.errors_total.with_label_values(&[err.error_code()]).inc();
        }
        ApiResponse::error(&err)
    }

    /// Returns a bounded label for the route a request targets.
    fn route_name(method: &Method, path: &str) -> &'static str {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match (method, segments.as_slice()) {
            (&Method::OPTIONS, _) => "OPTIONS",
            (_, ["api", "states"]) => "/api/states",
            (_, ["api", "states", _]) => "/api/states/{name}",
            (_, ["api", "flow"]) => "/api/flow",
            (_, ["api", "primitives"]) => "/api/primitives",
            (_, ["api", "runs"]) => "/api/runs",
            (_, ["metrics"]) => "/metrics",
            (_, ["health"]) | (_, ["healthz"]) => "/health",
            _ => "unknown",
        }
    }

    async fn dispatch(
        &self,
        method: &Method,
        path: &str,
        body: &[u8],
    ) -> Result<ApiResponse, ServerError> {
        if *method == Method::OPTIONS {
            return Ok(ApiResponse::empty(StatusCode::OK));
        }

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match (method, segments.as_slice()) {
            (&Method::GET, ["api", "states"]) => self.handle_list_states(),
            (&Method::POST, ["api", "states"]) => self.handle_save_state(body),
            (&Method::DELETE, ["api", "states", name]) => {
                self.handle_delete_state(&decode_segment(name)?)
            }
            (&Method::POST, ["api", "flow"]) => self.handle_save_flow(body),
            (&Method::GET, ["api", "primitives"]) => self.handle_list_primitives(),
            (&Method::POST, ["api", "runs"]) => self.handle_run(body).await,
            (&Method::GET, ["metrics"]) => self.handle_metrics(),
            (&Method::GET, ["health"]) | (&Method::GET, ["healthz"]) => {
                Ok(ApiResponse::text(StatusCode::OK, "text/plain", "OK"))
            }
            _ => Err(ServerError::RouteNotFound {
                method: method.to_string(),
                path: path.to_string(),
            }),
        }
    }

    fn handle_list_states(&self) -> Result<ApiResponse, ServerError> {
        let states = self.store.list();
        Ok(ApiResponse::json(
            StatusCode::OK,
            &serde_json::to_value(&states)?,
        ))
    }

    fn handle_save_state(&self, body: &[u8]) -> Result<ApiResponse, ServerError> {
        let state: StoredState = parse_body(body)?;
        let name = state.name().to_string();
        tracing::info!("Saving state {}", name);

        self.store.save(state.clone())?;
        self.update_stored_gauge();

        Ok(ApiResponse::json(
            StatusCode::OK,
            &json!({ "status": "success", "state": state }),
        ))
    }

    fn handle_save_flow(&self, body: &[u8]) -> Result<ApiResponse, ServerError> {
        let flow: FlowRequest = parse_body(body)?;

        let mut states = Vec::with_capacity(flow.states.len());
        for (key, mut state) in flow.states {
            if state.definition.name.is_empty() {
                state.definition.name = key;
            } else if state.definition.name != key {
                return Err(ServerError::InvalidRequest(format!(
                    "state keyed as '{}' is named '{}'",
                    key, state.definition.name
                )));
            }
            states.push(state);
        }

        let saved = self.store.save_all(states)?;
        self.update_stored_gauge();
        tracing::info!("Saved flow with {} states", saved);

        Ok(ApiResponse::json(
            StatusCode::OK,
            &json!({ "status": "success", "saved": saved }),
        ))
    }

    fn handle_delete_state(&self, name: &str) -> Result<ApiResponse, ServerError> {
        if !self.store.delete(name)? {
            return Err(ServerError::StateNotFound(name.to_string()));
        }
        self.update_stored_gauge();

        Ok(ApiResponse::json(
            StatusCode::OK,
            &json!({ "status": "success" }),
        ))
    }

    fn handle_list_primitives(&self) -> Result<ApiResponse, ServerError> {
        Ok(ApiResponse::json(
            StatusCode::OK,
            &json!(self.registry.names()),
        ))
    }

    fn handle_metrics(&self) -> Result<ApiResponse, ServerError> {
        match self.metrics {
            Some(ref metrics) => Ok(ApiResponse::text(
                StatusCode::OK,
                "text/plain; version=0.0.4; charset=utf-8",
                metrics.encode(),
            )),
            None => Err(ServerError::RouteNotFound {
                method: "GET".to_string(),
                path: "/metrics".to_string(),
            }),
        }
    }

    async fn handle_run(&self, body: &[u8]) -> Result<ApiResponse, ServerError> {
        let request: RunRequest = parse_body(body)?;
        if request.initial_state.is_empty() {
            return Err(ServerError::InvalidRequest(
                "initialState is required".to_string(),
            ));
        }

        let catalog = self.store.catalog()?;
        let errors: Vec<String> = catalog
            .validate(&self.registry)
            .into_iter()
            .filter(|issue| issue.severity == IssueSeverity::Error)
            .map(|issue| format!("{}: {}", issue.state, issue.message))
            .collect();
        if !errors.is_empty() {
            return Err(ServerError::InvalidRequest(format!(
                "stored graph is not runnable: {}",
                errors.join("; ")
            )));
        }

        let mut runner = WorkflowRunner::new(StateExecutor::new(
            Arc::new(catalog),
            self.registry.clone(),
        ))
        .with_halt_states(request.halt_on.unwrap_or_else(|| self.engine.halt_states.clone()));
        let budget = match request.max_steps {
            Some(0) => None,
            Some(n) => Some(n),
            None => self.engine.step_budget(),
        };
        if let Some(max) = budget {
            runner = runner.with_max_steps(max);
        }

        let mut ctx = match request.context {
            None => ExecutionContext::new(),
            Some(Value::Object(data)) => ExecutionContext::with_data(data),
            Some(_) => {
                return Err(ServerError::InvalidRequest(
                    "context must be a JSON object".to_string(),
                ))
            }
        };
        let initial = request.initial_state;

        let started = Instant::now();
        let (result, ctx) = tokio::task::spawn_blocking(move || {
            let result = runner.run(&initial, &mut ctx);
            (result, ctx)
        })
        .await
        .map_err(|e| ServerError::Internal(format!("run task failed: {}", e)))?;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(report) => {
                self.record_run(&report, elapsed);
                Ok(ApiResponse::json(
                    StatusCode::OK,
                    &json!({ "report": report, "context": ctx }),
                ))
            }
            Err(e) => {
                if let Some(ref metrics) = self.metrics {
                    metrics.runs_total.with_label_values(&["aborted"]).inc();
                    metrics.run_duration.observe(elapsed);
                }
                Err(e.into())
            }
        }
    }

    fn record_run(&self, report: &RunReport, elapsed: f64) {
        if let Some(ref metrics) = self.metrics {
            metrics
                .runs_total
                .with_label_values(&[report.termination.label()])
                .inc();
            for step in &report.steps {
                metrics
                    .states_executed_total
                    .with_label_values(&[step.status.label()])
                    .inc();
            }
            metrics.run_duration.observe(elapsed);
        }
    }

    fn update_stored_gauge(&self) {
        if let Some(ref metrics) = self.metrics {
            metrics.states_stored.set(self.store.len() as f64);
        }
    }
}

/// Percent-decodes one path segment.
fn decode_segment(segment: &str) -> Result<String, ServerError> {
    percent_decode_str(segment)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| ServerError::InvalidRequest(format!("path segment '{}' is not UTF-8", segment)))
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ServerError> {
    if body.is_empty() {
        return Err(ServerError::InvalidRequest("request body is empty".to_string()));
    }
    Ok(serde_json::from_slice(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use primflow_core::{from_fn, PrimitiveResult};
    use tempfile::TempDir;

    fn test_handler() -> (TempDir, ApiHandler) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(GraphStore::open(dir.path()).unwrap());
        let registry = Arc::new(primflow_primitives::default_registry());
        let handler = ApiHandler::new(store, registry)
            .with_metrics(Arc::new(Metrics::new().unwrap()));
        (dir, handler)
    }

    fn order_flow() -> Value {
        json!({
            "states": {
                "OrderReceived": {
                    "preliminaryActions": [
                        {"primitives": ["validateOrder", "checkInventory"], "executionOrder": 1}
                    ],
                    "mainAction": "processPayment",
                    "transitions": {"success": "OrderFulfillment", "failure": "OrderCancelled"},
                    "position": {"x": 100.0, "y": 50.0}
                },
                "OrderFulfillment": {
                    "preliminaryActions": [
                        {"primitives": ["allocateInventory"], "executionOrder": 1},
                        {"primitives": ["generateShippingLabel"], "executionOrder": 2}
                    ],
                    "mainAction": "shipOrder",
                    "transitions": {"success": "OrderCompleted", "failure": "CustomerServiceReview"}
                }
            }
        })
    }

    fn sample_order(amount: f64) -> Value {
        json!({
            "id": "ORD-12345",
            "amount": amount,
            "items": [{"id": "ITEM-1", "quantity": 1}, {"id": "ITEM-2", "quantity": 1}],
            "shippingAddress": {"street": "123 Main St", "city": "Springfield", "country": "USA"}
        })
    }

    async fn call(handler: &ApiHandler, method: Method, path: &str, body: Value) -> ApiResponse {
        let bytes = if body.is_null() {
            Vec::new()
        } else {
            body.to_string().into_bytes()
        };
        handler.handle(&method, path, &bytes).await
    }

    #[tokio::test]
    async fn test_save_and_list_states() {
        let (_dir, handler) = test_handler();

        let response = call(
            &handler,
            Method::POST,
            "/api/states",
            json!({"name": "A", "mainAction": "validateOrder", "transitions": {"success": "B", "failure": ""}}),
        )
        .await;
        assert_eq!(response.status, StatusCode::OK);
        let body = response.json_body().unwrap();
        assert_eq!(body["status"], "success");
        assert_eq!(body["state"]["name"], "A");

        let response = call(&handler, Method::GET, "/api/states", Value::Null).await;
        let states = response.json_body().unwrap();
        assert_eq!(states.as_array().unwrap().len(), 1);
        assert_eq!(states[0]["transitions"]["success"], "B");
    }

    #[tokio::test]
    async fn test_save_flow_fills_names_from_keys() {
        let (_dir, handler) = test_handler();

        let response = call(&handler, Method::POST, "/api/flow", order_flow()).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json_body().unwrap()["saved"], 2);

        let stored = handler.store().get("OrderReceived").unwrap();
        assert_eq!(stored.position.unwrap().x, 100.0);
    }

    #[tokio::test]
    async fn test_save_flow_rejects_mismatched_key() {
        let (_dir, handler) = test_handler();

        let response = call(
            &handler,
            Method::POST,
            "/api/flow",
            json!({"states": {"A": {"name": "B"}}}),
        )
        .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.json_body().unwrap()["code"], "BAD_REQUEST");
        assert!(handler.store().is_empty());
    }

    #[tokio::test]
    async fn test_delete_state() {
        let (_dir, handler) = test_handler();
        call(&handler, Method::POST, "/api/flow", order_flow()).await;

        let response = call(&handler, Method::DELETE, "/api/states/OrderFulfillment", Value::Null).await;
        assert_eq!(response.status, StatusCode::OK);
        assert!(handler.store().get("OrderFulfillment").is_none());

        let response = call(&handler, Method::DELETE, "/api/states/OrderFulfillment", Value::Null).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.json_body().unwrap()["code"], "STATE_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_list_primitives() {
        let (_dir, handler) = test_handler();

        let response = call(&handler, Method::GET, "/api/primitives", Value::Null).await;
        let names = response.json_body().unwrap();
        assert_eq!(names.as_array().unwrap().len(), 6);
        assert!(names.as_array().unwrap().contains(&json!("shipOrder")));
    }

    #[tokio::test]
    async fn test_run_order_flow() {
        let (_dir, handler) = test_handler();
        call(&handler, Method::POST, "/api/flow", order_flow()).await;

        let response = call(
            &handler,
            Method::POST,
            "/api/runs",
            json!({
                "initialState": "OrderReceived",
                "context": {"order": sample_order(99.99)},
                "haltOn": ["OrderCompleted", "OrderCancelled", "CustomerServiceReview"]
            }),
        )
        .await;
        assert_eq!(response.status, StatusCode::OK);

        let body = response.json_body().unwrap();
        assert_eq!(body["report"]["termination"]["reason"], "halted");
        assert_eq!(body["report"]["termination"]["state"], "OrderCompleted");
        assert_eq!(body["report"]["steps"].as_array().unwrap().len(), 2);
        assert_eq!(body["context"]["shippingStatus"], "in_transit");

        let metrics = String::from_utf8(handler.metrics().unwrap().encode()).unwrap();
        assert!(metrics.contains("primflow_runs_total{termination=\"halted\"} 1"));
        assert!(metrics.contains("primflow_states_executed_total{status=\"succeeded\"} 2"));
    }

    #[tokio::test]
    async fn test_run_declined_payment() {
        let (_dir, handler) = test_handler();
        call(&handler, Method::POST, "/api/flow", order_flow()).await;

        let response = call(
            &handler,
            Method::POST,
            "/api/runs",
            json!({"initialState": "OrderReceived", "context": {"order": sample_order(0.0)}, "maxSteps": 1}),
        )
        .await;

        let body = response.json_body().unwrap();
        assert_eq!(body["report"]["steps"][0]["status"], "failed");
        assert_eq!(body["report"]["steps"][0]["nextState"], "OrderCancelled");
        assert_eq!(body["report"]["termination"]["reason"], "step_budget_exhausted");
    }

    #[tokio::test]
    async fn test_run_unknown_initial_state_completes() {
        let (_dir, handler) = test_handler();

        let response = call(
            &handler,
            Method::POST,
            "/api/runs",
            json!({"initialState": "Nowhere"}),
        )
        .await;

        let body = response.json_body().unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(body["report"]["steps"][0]["status"], "not_found");
        assert_eq!(body["report"]["termination"]["reason"], "completed");
    }

    #[tokio::test]
    async fn test_run_rejects_unknown_primitive() {
        let (_dir, handler) = test_handler();
        call(
            &handler,
            Method::POST,
            "/api/states",
            json!({"name": "A", "mainAction": "teleport"}),
        )
        .await;

        let response = call(&handler, Method::POST, "/api/runs", json!({"initialState": "A"})).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(response.json_body().unwrap()["error"]
            .as_str()
            .unwrap()
            .contains("teleport"));
    }

    #[tokio::test]
    async fn test_run_infrastructure_error() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(GraphStore::open(dir.path()).unwrap());
        store
            .save(
                primflow_core::StateDefinition::new("Start")
                    .with_main_action("ok")
                    .with_transitions("A", "")
                    .into(),
            )
            .unwrap();
        store
            .save(
                primflow_core::StateDefinition::new("A")
                    .with_main_action("flaky")
                    .into(),
            )
            .unwrap();
        let mut registry = PrimitiveRegistry::new();
        registry.register("ok", from_fn(|_| Ok(PrimitiveResult::ok())));
        registry.register(
            "flaky",
            from_fn(|_| -> Result<PrimitiveResult, primflow_core::PrimitiveError> {
                Err(primflow_core::PrimitiveError::Other("socket closed".to_string()))
            }),
        );
        let handler = ApiHandler::new(store, Arc::new(registry));

        let response = call(&handler, Method::POST, "/api/runs", json!({"initialState": "Start"})).await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.json_body().unwrap();
        assert_eq!(body["code"], "PRIMITIVE_ERROR");
        assert!(body["runId"].is_string());
        let steps = body["steps"].as_array().unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0]["state"], "Start");
        assert_eq!(steps[0]["nextState"], "A");
    }

    #[tokio::test]
    async fn test_run_rejects_non_object_context() {
        let (_dir, handler) = test_handler();

        let response = call(
            &handler,
            Method::POST,
            "/api/runs",
            json!({"initialState": "A", "context": [1, 2, 3]}),
        )
        .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(response.json_body().unwrap()["error"]
            .as_str()
            .unwrap()
            .contains("JSON object"));
    }

    #[tokio::test]
    async fn test_delete_percent_encoded_name() {
        let (_dir, handler) = test_handler();
        call(
            &handler,
            Method::POST,
            "/api/states",
            json!({"name": "Order Review"}),
        )
        .await;
        call(&handler, Method::POST, "/api/states", json!({"name": "Prüfung"})).await;

        let response = call(&handler, Method::DELETE, "/api/states/Order%20Review", Value::Null).await;
        assert_eq!(response.status, StatusCode::OK);
        assert!(handler.store().get("Order Review").is_none());

        let response = call(&handler, Method::DELETE, "/api/states/Pr%C3%BCfung", Value::Null).await;
        assert_eq!(response.status, StatusCode::OK);
        assert!(handler.store().is_empty());

        let response = call(&handler, Method::DELETE, "/api/states/%FF", Value::Null).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_errors_and_routing() {
        let (_dir, handler) = test_handler();

        let response = call(&handler, Method::GET, "/api/unknown", Value::Null).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);

        let response = handler.handle(&Method::POST, "/api/states", b"{not json").await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);

        let response = call(&handler, Method::POST, "/api/states", Value::Null).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);

        let response = call(&handler, Method::OPTIONS, "/api/states", Value::Null).await;
        assert_eq!(response.status, StatusCode::OK);

        let response = call(&handler, Method::GET, "/health", Value::Null).await;
        assert_eq!(response.body, b"OK");

        let metrics = String::from_utf8(handler.metrics().unwrap().encode()).unwrap();
        assert!(metrics.contains("primflow_errors_total{code=\"NOT_FOUND\"} 1"));
        assert!(metrics.contains("primflow_errors_total{code=\"BAD_REQUEST\"} 2"));
    }

    #[test]
    fn test_route_names_are_bounded() {
        assert_eq!(
            ApiHandler::route_name(&Method::DELETE, "/api/states/Anything"),
            "/api/states/{name}"
        );
        assert_eq!(ApiHandler::route_name(&Method::GET, "/x/y/z"), "unknown");
    }
}
