//! Intake endpoint: receives the validated form or the chat report.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use coordination::chat::ChatIntakeReport;
use coordination::form::EmergencyFormData;

use crate::errors::CollaboratorError;

#[async_trait]
pub trait IntakeEndpoint: Send + Sync {
    async fn submit_form(&self, form: &EmergencyFormData) -> Result<(), CollaboratorError>;
    async fn submit_chat(&self, report: &ChatIntakeReport) -> Result<(), CollaboratorError>;
}

/// POSTs JSON to `<base>/forms` and `<base>/chats`.
#[derive(Clone)]
pub struct HttpIntake {
    http: reqwest::Client,
    base_url: String,
}

impl HttpIntake {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CollaboratorError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollaboratorError::Configuration(format!("intake client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<(), CollaboratorError> {
        let url = format!("{}/{path}", self.base_url);
        let response = self.http.post(&url).json(body).send().await?;
        let status = response.status();
        if status.is_success() {
            info!(url = %url, "Intake accepted submission");
            Ok(())
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(CollaboratorError::rejected("intake", status.as_u16(), message))
        }
    }
}

#[async_trait]
impl IntakeEndpoint for HttpIntake {
    async fn submit_form(&self, form: &EmergencyFormData) -> Result<(), CollaboratorError> {
        self.post("forms", form).await
    }

    async fn submit_chat(&self, report: &ChatIntakeReport) -> Result<(), CollaboratorError> {
        self.post("chats", report).await
    }
}

/// Accepts everything after a fixed latency and keeps it in memory.
#[derive(Default)]
pub struct LocalIntake {
    latency: Duration,
    forms: Mutex<Vec<EmergencyFormData>>,
    chats: Mutex<Vec<ChatIntakeReport>>,
}

impl LocalIntake {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }

    pub async fn forms(&self) -> Vec<EmergencyFormData> {
        self.forms.lock().await.clone()
    }

    pub async fn chats(&self) -> Vec<ChatIntakeReport> {
        self.chats.lock().await.clone()
    }
}

#[async_trait]
impl IntakeEndpoint for LocalIntake {
    async fn submit_form(&self, form: &EmergencyFormData) -> Result<(), CollaboratorError> {
        tokio::time::sleep(self.latency).await;
        info!(
            plate = %form.license_plate,
            images = form.images.len(),
            "Emergency form received"
        );
        self.forms.lock().await.push(form.clone());
        Ok(())
    }

    async fn submit_chat(&self, report: &ChatIntakeReport) -> Result<(), CollaboratorError> {
        tokio::time::sleep(self.latency).await;
        info!(
            session_id = %report.session_id,
            turns = report.turns.len(),
            "Chat report received"
        );
        self.chats.lock().await.push(report.clone());
        Ok(())
    }
}
