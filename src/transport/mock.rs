//! Scripted in-memory transport for unit tests.

use crate::transport::error::TransportError;
use crate::transport::{HttpResponse, Transport};
use serde_json::{json, Value};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub params: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn param_i64(&self, key: &str) -> Option<i64> {
        self.param(key).and_then(|v| v.parse().ok())
    }

    pub fn is_token(&self) -> bool {
        self.method == Method::Post && self.url.ends_with("/oauth2/token")
    }

    pub fn is_grant(&self, grant: &str) -> bool {
        self.is_token() && self.param("grant_type") == Some(grant)
    }

    pub fn is_measure(&self) -> bool {
        self.method == Method::Get && self.url.ends_with("/api/getmeasure")
    }

    pub fn is_station_data(&self) -> bool {
        self.method == Method::Get && self.url.ends_with("/api/getstationsdata")
    }
}

type Responder =
    Box<dyn Fn(&RecordedRequest) -> Result<HttpResponse, TransportError> + Send + Sync>;

pub(crate) struct MockTransport {
    responder: Responder,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new(
        responder: impl Fn(&RecordedRequest) -> Result<HttpResponse, TransportError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&RecordedRequest) -> bool) -> usize {
        self.requests.lock().unwrap().iter().filter(|r| predicate(r)).count()
    }

    fn record(
        &self,
        method: Method,
        url: &str,
        bearer: Option<&str>,
        params: &[(&str, String)],
    ) -> Result<HttpResponse, TransportError> {
        let request = RecordedRequest {
            method,
            url: url.to_string(),
            bearer: bearer.map(str::to_string),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        };
        self.requests.lock().unwrap().push(request.clone());
        (self.responder)(&request)
    }
}

impl Transport for MockTransport {
    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, String)],
    ) -> Result<HttpResponse, TransportError> {
        self.record(Method::Post, url, None, form)
    }

    async fn get(
        &self,
        url: &str,
        bearer_token: &str,
        query: &[(&str, String)],
    ) -> Result<HttpResponse, TransportError> {
        self.record(Method::Get, url, Some(bearer_token), query)
    }
}

pub(crate) fn respond(status: u16, body: Value) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse::new(status, body.to_string()))
}

pub(crate) fn unavailable(request: &RecordedRequest) -> Result<HttpResponse, TransportError> {
    Err(TransportError::Unavailable {
        url: request.url.clone(),
        reason: "connection refused".to_string(),
    })
}

pub(crate) fn token_body(access: &str, refresh: &str, expires_in: i64) -> Value {
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": expires_in,
        "expire_in": expires_in,
        "scope": ["read_station"],
    })
}

pub(crate) fn provider_error(code: i64, message: &str) -> Value {
    json!({ "error": { "code": code, "message": message } })
}

/// Keyed `getmeasure` body with one value per requested metric.
pub(crate) fn measure_body(rows: &[(i64, Vec<Option<f64>>)]) -> Value {
    if rows.is_empty() {
        return json!({ "status": "ok", "body": [], "time_server": 1_600_000_000 });
    }
    let body: serde_json::Map<String, Value> = rows
        .iter()
        .map(|(t, values)| (t.to_string(), json!(values)))
        .collect();
    json!({ "status": "ok", "body": body, "time_server": 1_600_000_000 })
}

/// A station with one indoor module.
pub(crate) fn station_data_body() -> Value {
    json!({
        "status": "ok",
        "time_server": 1_600_000_000,
        "body": {
            "user": { "mail": "rene@example.com" },
            "devices": [{
                "_id": "70:ee:50:aa:aa:aa",
                "station_name": "Maison",
                "module_name": "Salon",
                "type": "NAMain",
                "date_setup": 1_480_000_000,
                "last_setup": 1_480_000_000,
                "wifi_status": 52,
                "data_type": ["Temperature", "CO2", "Humidity", "Noise", "Pressure"],
                "dashboard_data": { "time_utc": 1_599_999_700, "Temperature": 21.4 },
                "place": { "city": "Paris", "country": "FR", "altitude": 35 },
                "modules": [{
                    "_id": "03:00:00:bb:bb:bb",
                    "module_name": "Chambre",
                    "type": "NAModule4",
                    "last_setup": 1_480_000_100,
                    "battery_percent": 76,
                    "rf_status": 68,
                    "firmware": 44,
                    "data_type": ["Temperature", "CO2", "Humidity"],
                    "dashboard_data": { "time_utc": 1_599_999_650 }
                }]
            }]
        }
    })
}
