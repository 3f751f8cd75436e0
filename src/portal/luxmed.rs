//! Patient-portal client implementation
//!
//! This module implements the PortalClient/PortalSession traits over the
//! portal's JSON HTTP API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{ACCEPT, AUTHORIZATION, COOKIE, SET_COOKIE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{PortalClient, PortalSession};
use crate::domain::{BookingConfirmation, Credentials, Doctor, LockHandle, ServiceVariant, Term, TermsForDay};
use crate::error::{Result, SlotwatchError};

/// Default portal address
pub const DEFAULT_BASE_URL: &str = "https://portalpacjenta.luxmed.pl";

/// Cookie that proves the login succeeded
const SESSION_COOKIE: &str = "ASP.NET_SessionId";

const LOGIN_PATH: &str = "PatientPortal/Account/LogIn";
const VARIANTS_PATH: &str = "PatientPortal/NewPortal/Dictionary/serviceVariantsGroups";
const DOCTORS_PATH: &str = "PatientPortal/NewPortal/Dictionary/facilitiesAndDoctors";
const TERMS_PATH: &str = "PatientPortal/NewPortal/terms/index";
const LOCK_PATH: &str = "PatientPortal/NewPortal/reservation/lockterm";
const CONFIRM_PATH: &str = "PatientPortal/NewPortal/reservation/confirm";

/// Configuration for the portal client
#[derive(Debug, Clone)]
pub struct LuxmedConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// City searched for in-person slots
    pub city_id: u32,
    pub city_name: String,
}

impl Default for LuxmedConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            city_id: 3,
            city_name: "Kraków".to_string(),
        }
    }
}

impl LuxmedConfig {
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[derive(Debug, Deserialize)]
struct LoginContent {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ServiceVariantGroup {
    #[serde(default)]
    children: Vec<ServiceVariant>,
}

#[derive(Debug, Deserialize)]
struct DoctorRoot {
    #[serde(default)]
    doctors: Vec<Doctor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchVisitRoot {
    #[serde(default)]
    terms_for_service: Option<TermsForService>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TermsForService {
    #[serde(default)]
    terms_for_days: Vec<TermsForDay>,
}

#[derive(Debug, Deserialize)]
struct LockTermResult {
    value: Option<LockHandle>,
    #[serde(default)]
    errors: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ConfirmResult {
    value: Option<BookingConfirmation>,
    #[serde(default)]
    errors: Vec<Value>,
}

/// Portal client; cheap to clone
#[derive(Debug, Clone)]
pub struct LuxmedPortal {
    client: Client,
    config: Arc<LuxmedConfig>,
}

impl LuxmedPortal {
    pub fn new(config: LuxmedConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }
}

#[async_trait]
impl PortalClient for LuxmedPortal {
    async fn login(&self, credentials: &Credentials) -> Result<Box<dyn PortalSession>> {
        let response = self
            .client
            .post(self.config.url(LOGIN_PATH))
            .header(ACCEPT, "application/json")
            .json(&json!({ "login": credentials.login, "password": credentials.password }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SlotwatchError::RateLimited(LOGIN_PATH.to_string()));
        }
        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(SlotwatchError::Auth(format!(
                "login for {} rejected with {}",
                credentials.login, status
            )));
        }
        if !status.is_success() {
            return Err(SlotwatchError::Portal {
                status: status.as_u16(),
                message: "login failed".to_string(),
            });
        }

        let cookies: Vec<(String, String)> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(parse_set_cookie)
            .collect();
        if !cookies.iter().any(|(name, _)| name == SESSION_COOKIE) {
            return Err(SlotwatchError::Auth(format!("no {} cookie in login response", SESSION_COOKIE)));
        }

        let content: LoginContent = response.json().await?;
        log::debug!("Logged in as {}", credentials.login);

        Ok(Box::new(LuxmedSession {
            client: self.client.clone(),
            config: self.config.clone(),
            cookie_header: cookie_header(&cookies),
            token: content.token,
        }))
    }
}

/// Authenticated session: cookies plus bearer token
struct LuxmedSession {
    client: Client,
    config: Arc<LuxmedConfig>,
    cookie_header: String,
    token: String,
}

impl LuxmedSession {
    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let bearer = format!("Bearer {}", self.token);
        builder
            .header(ACCEPT, "application/json")
            .header(COOKIE, &self.cookie_header)
            .header("authorization-token", &bearer)
            .header(AUTHORIZATION, &bearer)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.authorized(self.client.get(self.config.url(path)))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.authorized(self.client.post(self.config.url(path)))
    }

    async fn send(&self, builder: RequestBuilder, path: &str) -> Result<Response> {
        let response = builder.send().await?;
        check_status(response, path).await
    }
}

async fn check_status(response: Response, path: &str) -> Result<Response> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(SlotwatchError::RateLimited(path.to_string()));
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
        return Err(SlotwatchError::Portal {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

#[async_trait]
impl PortalSession for LuxmedSession {
    async fn find_variant(&self, service: &str) -> Result<Option<ServiceVariant>> {
        let response = self.send(self.get(VARIANTS_PATH), VARIANTS_PATH).await?;
        let groups: Vec<ServiceVariantGroup> = response.json().await?;
        Ok(find_in_catalog(groups, service))
    }

    async fn find_doctor(&self, variant_id: i64, first_name: &str, last_name: &str) -> Result<Option<Doctor>> {
        let builder = self.get(DOCTORS_PATH).query(&[
            ("cityId", self.config.city_id.to_string()),
            ("serviceVariantId", variant_id.to_string()),
        ]);
        let response = self.send(builder, DOCTORS_PATH).await?;
        let root: DoctorRoot = response.json().await?;
        Ok(root.doctors.into_iter().find(|d| d.is_named(first_name, last_name)))
    }

    async fn search_terms(
        &self,
        variant: &ServiceVariant,
        doctor_id: Option<i64>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TermsForDay>> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(id) = doctor_id {
            query.push(("doctorsIds", id.to_string()));
        }
        query.extend([
            ("searchPlace.id", self.config.city_id.to_string()),
            ("searchPlace.name", self.config.city_name.clone()),
            ("searchPlace.type", "0".to_string()),
            ("serviceVariantId", variant.id.to_string()),
            ("searchDateFrom", from.format("%Y-%m-%d").to_string()),
            ("searchDateTo", to.format("%Y-%m-%d").to_string()),
            ("delocalized", "false".to_string()),
        ]);

        let response = self.send(self.get(TERMS_PATH).query(&query), TERMS_PATH).await?;
        let root: SearchVisitRoot = response.json().await?;
        let days = root.terms_for_service.map(|t| t.terms_for_days).unwrap_or_default();
        Ok(filter_by_doctor(days, doctor_id))
    }

    async fn lock_term(&self, term: &Term, variant: &ServiceVariant) -> Result<LockHandle> {
        let response = self
            .send(self.post(LOCK_PATH).json(&lock_body(term, variant)), LOCK_PATH)
            .await?;
        let result: LockTermResult = response.json().await?;
        match result.value {
            Some(handle) if result.errors.is_empty() => Ok(handle),
            _ => Err(SlotwatchError::Booking(format!("lock rejected: {:?}", result.errors))),
        }
    }

    async fn book(&self, lock: &LockHandle, term: &Term, variant: &ServiceVariant) -> Result<BookingConfirmation> {
        let response = self
            .send(self.post(CONFIRM_PATH).json(&confirm_body(lock, term, variant)), CONFIRM_PATH)
            .await?;
        let result: ConfirmResult = response.json().await?;
        match result.value {
            Some(confirmation) if result.errors.is_empty() => Ok(confirmation),
            _ => Err(SlotwatchError::Booking(format!("confirmation rejected: {:?}", result.errors))),
        }
    }
}

/// Extract `name=value` from a Set-Cookie header, dropping attributes
fn parse_set_cookie(raw: &str) -> Option<(String, String)> {
    let pair = raw.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.to_string()))
}

fn cookie_header(cookies: &[(String, String)]) -> String {
    cookies
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("; ")
}

fn find_in_catalog(groups: Vec<ServiceVariantGroup>, service: &str) -> Option<ServiceVariant> {
    let wanted = service.to_lowercase();
    groups
        .into_iter()
        .flat_map(|g| g.children)
        .find(|v| v.name.to_lowercase() == wanted)
}

/// Keep only the requested doctor's slots, dropping days left empty
fn filter_by_doctor(days: Vec<TermsForDay>, doctor_id: Option<i64>) -> Vec<TermsForDay> {
    let Some(id) = doctor_id else {
        return days;
    };
    days.into_iter()
        .filter_map(|mut day| {
            day.terms.retain(|t| t.doctor.id == id);
            (!day.terms.is_empty()).then_some(day)
        })
        .collect()
}

fn lock_body(term: &Term, variant: &ServiceVariant) -> Value {
    json!({
        "serviceVariantId": variant.id,
        "facilityId": term.clinic_id,
        "roomId": term.room_id,
        "scheduleId": term.schedule_id,
        "date": term.date_time_from.format("%Y-%m-%dT%H:%M:%S").to_string(),
        "timeFrom": term.date_time_from.format("%H:%M").to_string(),
        "timeTo": term.date_time_to.format("%H:%M").to_string(),
        "doctorId": term.doctor.id,
    })
}

fn confirm_body(lock: &LockHandle, term: &Term, variant: &ServiceVariant) -> Value {
    json!({
        "temporaryReservationId": lock.temporary_reservation_id,
        "valuation": lock.valuations.first(),
        "serviceVariantId": variant.id,
        "facilityId": term.clinic_id,
        "roomId": term.room_id,
        "scheduleId": term.schedule_id,
        "date": term.date_time_from.format("%Y-%m-%dT%H:%M:%S").to_string(),
        "timeFrom": term.date_time_from.format("%H:%M").to_string(),
        "doctorId": term.doctor.id,
    })
}
