//! HTTP surface: thin request/response translation over the record stores.
//!
//! Every route answers with the `{"success": bool, "data"?, "message"?,
//! "error"?}` envelope, including body-deserialization failures. Validation
//! failures map to 400, missing records to 404, and anything upstream to a
//! generic 500 with the original error logged server-side only.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Path, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::dashboard;
use crate::error::{Error, Result};
use crate::sheets::{GoogleAuth, SheetsClient};
use crate::store::{LeadStore, NewLead, NewStudent, StudentStore};
use crate::types::{lead_col, student_col, InteractionType, LeadPatch, LeadSource, StudentPatch};

/// Application state shared across requests.
pub struct AppState {
    pub leads: LeadStore,
    pub students: StudentStore,
}

/// Build the injected adapter stack: one shared HTTP client, one auth
/// handle, one sheets client per backing spreadsheet.
pub fn app_state(config: &Config) -> Result<Arc<AppState>> {
    let http = reqwest::Client::new();
    let auth = Arc::new(GoogleAuth::new(
        http.clone(),
        config.service_account_email.clone(),
        &config.private_key_pem,
    )?);

    let leads_sheet = Arc::new(SheetsClient::new(
        http.clone(),
        auth.clone(),
        config.leads.clone(),
        lead_col::LAST,
    ));
    let students_sheet = Arc::new(SheetsClient::new(
        http,
        auth,
        config.students.clone(),
        student_col::LAST,
    ));

    Ok(Arc::new(AppState {
        leads: LeadStore::new(leads_sheet),
        students: StudentStore::new(students_sheet),
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/leads", get(list_leads).post(create_lead))
        .route(
            "/api/leads/{id}",
            get(get_lead).put(update_lead).delete(delete_lead),
        )
        .route("/api/leads/{id}/logs", post(add_lead_log))
        .route("/api/students", get(list_students).post(create_student))
        .route(
            "/api/students/{id}",
            get(get_student).put(update_student).delete(delete_student),
        )
        .route("/api/dashboard", get(get_dashboard))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server.
pub async fn serve(port: u16, config: Config) -> anyhow::Result<()> {
    let state = app_state(&config)?;
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!(%addr, "Server running");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Response envelope shared by every route.
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn message(message: &str) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.to_string()),
            error: None,
        }
    }

    fn failure(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(message),
        }
    }
}

/// Request-body extractor that keeps malformed or type-invalid JSON inside
/// the error envelope: every rejection becomes a 400 validation failure
/// instead of axum's plain-text 422.
struct ApiJson<T>(T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(Error::Validation(rejection.body_text())),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
            _ => {
                error!(error = %self, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(ApiResponse::failure(message))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CreateLeadRequest {
    child_name: Option<String>,
    parent_name: Option<String>,
    child_age: Option<u32>,
    phone: Option<String>,
    location: Option<String>,
    lead_source: Option<LeadSource>,
}

impl CreateLeadRequest {
    fn validate(self) -> Result<NewLead> {
        let required = |field: Option<String>| field.filter(|value| !value.is_empty());

        match (
            required(self.child_name),
            required(self.parent_name),
            required(self.phone),
        ) {
            (Some(child_name), Some(parent_name), Some(phone)) => Ok(NewLead {
                child_name,
                parent_name,
                child_age: self.child_age.unwrap_or(0),
                phone,
                location: self.location.unwrap_or_default(),
                lead_source: self.lead_source.unwrap_or_default(),
            }),
            _ => Err(Error::Validation("Missing required fields".to_string())),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CreateStudentRequest {
    child_name: Option<String>,
    parent_name: Option<String>,
    child_age: Option<u32>,
    phone: Option<String>,
    location: Option<String>,
    joined_date: Option<String>,
    lead_id: Option<String>,
}

impl CreateStudentRequest {
    fn validate(self) -> Result<NewStudent> {
        let required = |field: Option<String>| field.filter(|value| !value.is_empty());

        match (
            required(self.child_name),
            required(self.parent_name),
            required(self.phone),
        ) {
            (Some(child_name), Some(parent_name), Some(phone)) => Ok(NewStudent {
                child_name,
                parent_name,
                child_age: self.child_age.unwrap_or(0),
                phone,
                location: self.location.unwrap_or_default(),
                joined_date: self.joined_date.filter(|date| !date.is_empty()),
                lead_id: self.lead_id.filter(|id| !id.is_empty()),
            }),
            _ => Err(Error::Validation("Missing required fields".to_string())),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AddLogRequest {
    #[serde(rename = "type")]
    kind: Option<InteractionType>,
    note: Option<String>,
    /// Absent key keeps the stored follow-up; explicit `null` clears it.
    #[serde(deserialize_with = "crate::types::double_option")]
    next_followup: Option<Option<String>>,
}

async fn list_leads(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse> {
    let leads = state.leads.all().await?;
    Ok(Json(ApiResponse::success(leads)))
}

async fn create_lead(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<CreateLeadRequest>,
) -> Result<impl IntoResponse> {
    let lead = state.leads.create(body.validate()?).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(lead))))
}

async fn get_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let lead = state.leads.get(&id).await?;
    Ok(Json(ApiResponse::success(lead)))
}

async fn update_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<LeadPatch>,
) -> Result<impl IntoResponse> {
    let lead = state.leads.update(&id, patch).await?;
    Ok(Json(ApiResponse::success(lead)))
}

async fn delete_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.leads.delete(&id).await?;
    Ok(Json(ApiResponse::message("Lead deleted successfully")))
}

async fn add_lead_log(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<AddLogRequest>,
) -> Result<impl IntoResponse> {
    let (kind, note) = match (body.kind, body.note.filter(|note| !note.is_empty())) {
        (Some(kind), Some(note)) => (kind, note),
        _ => {
            return Err(Error::Validation(
                "Missing required fields (type, note)".to_string(),
            ))
        }
    };

    let lead = state
        .leads
        .add_log(&id, kind, note, body.next_followup)
        .await?;
    Ok(Json(ApiResponse::success(lead)))
}

async fn list_students(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse> {
    let students = state.students.all().await?;
    Ok(Json(ApiResponse::success(students)))
}

async fn create_student(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<CreateStudentRequest>,
) -> Result<impl IntoResponse> {
    let student = state.students.create(body.validate()?).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(student))))
}

async fn get_student(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let student = state.students.get(&id).await?;
    Ok(Json(ApiResponse::success(student)))
}

async fn update_student(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<StudentPatch>,
) -> Result<impl IntoResponse> {
    let student = state.students.update(&id, patch).await?;
    Ok(Json(ApiResponse::success(student)))
}

async fn delete_student(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.students.delete(&id).await?;
    Ok(Json(ApiResponse::message("Student deleted successfully")))
}

async fn get_dashboard(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse> {
    let leads = state.leads.all().await?;
    let students = state.students.all().await?;
    let today = chrono::Local::now().date_naive();

    Ok(Json(ApiResponse::success(dashboard::build(
        &leads, &students, today,
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::fake::FakeSheet;
    use crate::sheets::RowStore;
    use crate::store::today;
    use crate::types::{lead_col, Lead, LeadStatus};
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_app() -> (Router, Arc<FakeSheet>, Arc<FakeSheet>) {
        let leads = Arc::new(FakeSheet::empty());
        let students = Arc::new(FakeSheet::empty());
        let state = Arc::new(AppState {
            leads: LeadStore::new(leads.clone()),
            students: StudentStore::new(students.clone()),
        });
        (router(state), leads, students)
    }

    async fn send(
        app: Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn create_lead_body(name: &str) -> Value {
        json!({
            "child_name": name,
            "parent_name": "Parent",
            "child_age": 5,
            "phone": "12345",
            "location": "Roma",
            "lead_source": "Park",
        })
    }

    #[tokio::test]
    async fn test_list_leads_empty_returns_success_envelope() {
        let (app, _, _) = test_app();

        let (status, body) = send(app, "GET", "/api/leads", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn test_create_lead_returns_201_with_generated_id() {
        let (app, _, _) = test_app();

        let (status, body) = send(app, "POST", "/api/leads", Some(create_lead_body("Giulia"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"]["lead_id"], json!("L001"));
        assert_eq!(body["data"]["status"], json!("cold"));
        assert_eq!(body["data"]["free_session"], json!("no"));
        assert_eq!(body["data"]["logs"], json!([]));
    }

    #[tokio::test]
    async fn test_create_lead_missing_phone_is_400() {
        let (app, _, _) = test_app();
        let body = json!({ "child_name": "Giulia", "parent_name": "Marco" });

        let (status, body) = send(app, "POST", "/api/leads", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"], json!("Missing required fields"));
    }

    #[tokio::test]
    async fn test_create_lead_unknown_source_is_enveloped_400() {
        let (app, _, _) = test_app();
        let mut body = create_lead_body("Giulia");
        body["lead_source"] = json!("Carrier pigeon");

        let (status, body) = send(app, "POST", "/api/leads", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
        assert!(body["error"].as_str().unwrap().contains("lead_source"));
    }

    #[tokio::test]
    async fn test_malformed_json_body_is_enveloped_400() {
        let (app, _, _) = test_app();

        let request = Request::builder()
            .method("POST")
            .uri("/api/leads")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
        assert!(!body["error"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_negative_child_age_is_enveloped_400() {
        let (app, _, _) = test_app();
        let mut body = create_lead_body("Giulia");
        body["child_age"] = json!(-3);

        let (status, body) = send(app, "POST", "/api/leads", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn test_get_unknown_lead_is_404() {
        let (app, _, _) = test_app();

        let (status, body) = send(app, "GET", "/api/leads/L042", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"], json!("Lead not found"));
    }

    #[tokio::test]
    async fn test_update_lead_partial_changes_only_status_and_updated_date() {
        let (app, _, _) = test_app();
        send(app.clone(), "POST", "/api/leads", Some(create_lead_body("Giulia"))).await;

        let (status, body) = send(
            app.clone(),
            "PUT",
            "/api/leads/L001",
            Some(json!({ "status": "hot" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], json!("hot"));
        assert_eq!(body["data"]["child_name"], json!("Giulia"));
        assert_eq!(body["data"]["updated_date"], json!(today()));

        let (_, fetched) = send(app, "GET", "/api/leads/L001", None).await;
        assert_eq!(fetched["data"]["status"], json!("hot"));
        assert_eq!(fetched["data"]["phone"], json!("12345"));
    }

    #[tokio::test]
    async fn test_update_unknown_lead_is_404() {
        let (app, _, _) = test_app();

        let (status, _) = send(
            app,
            "PUT",
            "/api/leads/L001",
            Some(json!({ "status": "hot" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_lead_then_get_is_404() {
        let (app, _, _) = test_app();
        send(app.clone(), "POST", "/api/leads", Some(create_lead_body("Giulia"))).await;

        let (status, body) = send(app.clone(), "DELETE", "/api/leads/L001", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["message"], json!("Lead deleted successfully"));

        let (status, _) = send(app, "GET", "/api/leads/L001", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_add_log_requires_type_and_note() {
        let (app, _, _) = test_app();
        send(app.clone(), "POST", "/api/leads", Some(create_lead_body("Giulia"))).await;

        let (status, body) = send(
            app,
            "POST",
            "/api/leads/L001/logs",
            Some(json!({ "type": "call" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("Missing required fields (type, note)"));
    }

    #[tokio::test]
    async fn test_add_log_appends_and_respects_followup_tristate() {
        let (app, _, _) = test_app();
        send(app.clone(), "POST", "/api/leads", Some(create_lead_body("Giulia"))).await;

        // Set a follow-up alongside the first log.
        let (status, body) = send(
            app.clone(),
            "POST",
            "/api/leads/L001/logs",
            Some(json!({ "type": "call", "note": "first", "next_followup": "2030-01-01" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["logs"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"]["next_followup"], json!("2030-01-01"));

        // Omitting the field keeps the stored value.
        let (_, body) = send(
            app.clone(),
            "POST",
            "/api/leads/L001/logs",
            Some(json!({ "type": "visit", "note": "second" })),
        )
        .await;
        assert_eq!(body["data"]["logs"].as_array().unwrap().len(), 2);
        assert_eq!(body["data"]["logs"][0]["note"], json!("first"));
        assert_eq!(body["data"]["logs"][1]["type"], json!("visit"));
        assert_eq!(body["data"]["next_followup"], json!("2030-01-01"));

        // Explicit null clears it.
        let (_, body) = send(
            app,
            "POST",
            "/api/leads/L001/logs",
            Some(json!({ "type": "follow_up", "note": "third", "next_followup": null })),
        )
        .await;
        assert_eq!(body["data"]["next_followup"], json!(null));
    }

    #[tokio::test]
    async fn test_create_student_defaults_joined_date() {
        let (app, _, _) = test_app();

        let (status, body) = send(
            app,
            "POST",
            "/api/students",
            Some(json!({
                "child_name": "Luca",
                "parent_name": "Anna",
                "child_age": 7,
                "phone": "555",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["student_id"], json!("S001"));
        assert_eq!(body["data"]["joined_date"], json!(today()));
        assert_eq!(body["data"]["status"], json!("active"));
    }

    #[tokio::test]
    async fn test_dashboard_counts_and_caps_previews() {
        let (app, leads_sheet, students_sheet) = test_app();

        for i in 1..=7 {
            let mut lead = Lead::from_row(&[]).unwrap();
            lead.lead_id = format!("L{i:03}");
            lead.status = LeadStatus::Hot;
            lead.next_followup = Some(today());
            leads_sheet.append(lead.to_row().unwrap()).await.unwrap();
        }
        // One closed lead due today must not count.
        let mut closed = Lead::from_row(&[]).unwrap();
        closed.lead_id = "L008".to_string();
        closed.status = LeadStatus::Closed;
        closed.next_followup = Some(today());
        leads_sheet.append(closed.to_row().unwrap()).await.unwrap();

        students_sheet
            .append(vec![
                "S001".into(),
                "Luca".into(),
                "Anna".into(),
                "7".into(),
                "555".into(),
                "Roma".into(),
                "2025-01-20".into(),
                "".into(),
                "active".into(),
            ])
            .await
            .unwrap();

        let (status, body) = send(app, "GET", "/api/dashboard", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["stats"]["total_leads"], json!(8));
        assert_eq!(body["data"]["stats"]["hot_leads"], json!(7));
        assert_eq!(body["data"]["stats"]["today_followups"], json!(7));
        assert_eq!(body["data"]["stats"]["active_students"], json!(1));
        assert_eq!(body["data"]["hot_leads"].as_array().unwrap().len(), 5);
        assert_eq!(body["data"]["today_followups"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_corrupt_logs_cell_maps_to_generic_500() {
        let (app, leads_sheet, _) = test_app();
        let mut row = Lead::from_row(&[]).unwrap().to_row().unwrap();
        row[lead_col::ID] = "L001".to_string();
        row[lead_col::LOGS] = "{broken".to_string();
        leads_sheet.append(row).await.unwrap();

        let (status, body) = send(app, "GET", "/api/leads", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"], json!("Internal server error"));
    }
}
