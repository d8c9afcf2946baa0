//! API surface over the session service.

use std::sync::Arc;

use async_trait::async_trait;

use harmonic_core::types::CiMap;
use harmonic_runtime::{ExecuteOptions, SessionService};

use crate::dto::{
    ExecuteRequest, ExecuteResponse, HistoryItemResponse, HistoryResponse, PageRequest,
    SessionListResponse, StatusResponse,
};
use crate::ApiError;

/// External service surface consumed by transports and control planes.
#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn register_script(
        &self,
        script_id: Option<String>,
        wire_text: String,
    ) -> Result<String, ApiError>;

    async fn delete_script(&self, script_id: String) -> Result<bool, ApiError>;

    async fn start_session(
        &self,
        script_id: String,
        metadata: CiMap<String>,
    ) -> Result<StatusResponse, ApiError>;

    async fn execute_next(
        &self,
        session_id: String,
        request: ExecuteRequest,
    ) -> Result<ExecuteResponse, ApiError>;

    async fn execute_message(
        &self,
        session_id: String,
        index: usize,
        request: ExecuteRequest,
    ) -> Result<ExecuteResponse, ApiError>;

    async fn get_status(&self, session_id: String) -> Result<StatusResponse, ApiError>;

    async fn get_history(&self, session_id: String) -> Result<HistoryResponse, ApiError>;

    async fn get_history_item(
        &self,
        session_id: String,
        index: usize,
    ) -> Result<HistoryItemResponse, ApiError>;

    async fn list_sessions(
        &self,
        script_id: Option<String>,
        page: PageRequest,
    ) -> Result<SessionListResponse, ApiError>;

    async fn cancel_session(&self, session_id: String) -> Result<StatusResponse, ApiError>;

    async fn delete_session(&self, session_id: String) -> Result<bool, ApiError>;
}

/// Default implementation delegating to a `SessionService`.
#[derive(Clone)]
pub struct EngineApi {
    service: Arc<SessionService>,
}

impl EngineApi {
    pub fn new(service: Arc<SessionService>) -> Self {
        Self { service }
    }
}

fn execute_options(request: ExecuteRequest) -> ExecuteOptions {
    let mut options = ExecuteOptions::default().with_input(request.input);
    if let Some(execution_id) = request.execution_id {
        options = options.with_execution_id(execution_id);
    }
    options
}

#[async_trait]
impl SessionApi for EngineApi {
    async fn register_script(
        &self,
        script_id: Option<String>,
        wire_text: String,
    ) -> Result<String, ApiError> {
        Ok(self.service.register_script(script_id, &wire_text).await?)
    }

    async fn delete_script(&self, script_id: String) -> Result<bool, ApiError> {
        Ok(self.service.delete_script(&script_id).await?)
    }

    async fn start_session(
        &self,
        script_id: String,
        metadata: CiMap<String>,
    ) -> Result<StatusResponse, ApiError> {
        let session = self.service.start_session(&script_id, metadata).await?;
        Ok(StatusResponse::from(&session))
    }

    async fn execute_next(
        &self,
        session_id: String,
        request: ExecuteRequest,
    ) -> Result<ExecuteResponse, ApiError> {
        let outcome = self
            .service
            .execute_next(&session_id, execute_options(request))
            .await?;
        Ok(ExecuteResponse::from(&outcome))
    }

    async fn execute_message(
        &self,
        session_id: String,
        index: usize,
        request: ExecuteRequest,
    ) -> Result<ExecuteResponse, ApiError> {
        let outcome = self
            .service
            .execute_message(&session_id, index, execute_options(request))
            .await?;
        Ok(ExecuteResponse::from(&outcome))
    }

    async fn get_status(&self, session_id: String) -> Result<StatusResponse, ApiError> {
        let session = self.service.get_session(&session_id).await?;
        Ok(StatusResponse::from(&session))
    }

    async fn get_history(&self, session_id: String) -> Result<HistoryResponse, ApiError> {
        let session = self.service.get_session(&session_id).await?;
        Ok(HistoryResponse::from(&session))
    }

    async fn get_history_item(
        &self,
        session_id: String,
        index: usize,
    ) -> Result<HistoryItemResponse, ApiError> {
        let session = self.service.get_session(&session_id).await?;
        Ok(HistoryItemResponse {
            session_id: session.session_id.clone(),
            script_id: session.script_id.clone(),
            index,
            record: session.history.get(index).cloned(),
        })
    }

    async fn list_sessions(
        &self,
        script_id: Option<String>,
        page: PageRequest,
    ) -> Result<SessionListResponse, ApiError> {
        let result = self
            .service
            .list_sessions(
                script_id.as_deref(),
                page.limit,
                page.continuation_token.as_deref(),
            )
            .await?;
        Ok(SessionListResponse {
            script_id,
            session_ids: result.session_ids,
            continuation_token: result.continuation_token,
        })
    }

    async fn cancel_session(&self, session_id: String) -> Result<StatusResponse, ApiError> {
        let session = self.service.cancel_session(&session_id).await?;
        Ok(StatusResponse::from(&session))
    }

    async fn delete_session(&self, session_id: String) -> Result<bool, ApiError> {
        Ok(self.service.delete_session(&session_id).await?)
    }
}
