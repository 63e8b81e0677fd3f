//! The stdio tool-RPC server: the same ten operations the HTTP facade
//! exposes, wired up as MCP tools instead of JSON routes.

use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{ServerCapabilities, ServerInfo};
use rmcp::{ServerHandler, tool, tool_handler, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::storage::{NewObservation, NewPrompt, SearchFilter, Store};

/// Project name recorded when an implicit `CreateSession` has no project to
/// work from, so `Stats().projects` never carries a bare empty string.
const IMPLICIT_PROJECT: &str = "unspecified";
/// Directory recorded when an implicit `CreateSession` has no working
/// directory to work from.
const IMPLICIT_DIRECTORY: &str = "(unknown)";

/// The MCP server. Clonable: `rmcp` dispatches each call against a fresh
/// clone that shares the same underlying store.
#[derive(Clone)]
pub struct EngramServer {
    store: Arc<Store>,
    tool_router: ToolRouter<Self>,
}

impl EngramServer {
    /// Builds a server over `store`.
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            tool_router: Self::tool_router(),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SaveParams {
    #[schemars(description = "Session id this observation belongs to")]
    session_id: String,
    #[schemars(description = "Caller-defined type tag, e.g. \"decision\" or \"bugfix\"")]
    r#type: String,
    #[schemars(description = "Short title")]
    title: String,
    #[schemars(description = "Body content")]
    content: String,
    #[schemars(description = "Name of the tool that produced this observation")]
    tool_name: Option<String>,
    #[schemars(description = "Project name, if different from the session's")]
    project: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SavePromptParams {
    #[schemars(description = "Session id this prompt belongs to")]
    session_id: String,
    #[schemars(description = "Prompt content")]
    content: String,
    #[schemars(description = "Project name")]
    project: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SessionSummaryParams {
    #[schemars(description = "Session id to end")]
    session_id: String,
    #[schemars(description = "Summary text; empty clears any existing summary")]
    summary: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchParams {
    #[schemars(description = "Full-text search query")]
    query: String,
    #[schemars(description = "Restrict to observations of this type")]
    r#type: Option<String>,
    #[schemars(description = "Restrict to this project")]
    project: Option<String>,
    #[schemars(description = "Maximum rows to return, capped by the server's hard limit")]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ContextParams {
    #[schemars(description = "Restrict the digest to this project")]
    project: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct TimelineParams {
    #[schemars(description = "Observation id to center the timeline on")]
    pivot_id: i64,
    #[schemars(description = "Observations to include before the pivot (0 = default of 5)")]
    before: Option<usize>,
    #[schemars(description = "Observations to include after the pivot (0 = default of 5)")]
    after: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct GetObservationParams {
    #[schemars(description = "Observation id to fetch")]
    id: i64,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SessionStartParams {
    #[schemars(description = "Caller-supplied session id")]
    id: String,
    #[schemars(description = "Project name")]
    project: String,
    #[schemars(description = "Working directory the session runs in")]
    directory: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SessionEndParams {
    #[schemars(description = "Session id to end")]
    id: String,
    #[schemars(description = "Summary text")]
    summary: String,
}

#[tool_router]
impl EngramServer {
    #[tool(description = "Save an observation (a fact, decision, or event) to the current session's memory.")]
    fn mem_save(&self, Parameters(params): Parameters<SaveParams>) -> Result<String, String> {
        self.store
            .create_session(
                &params.session_id,
                params.project.as_deref().unwrap_or(IMPLICIT_PROJECT),
                IMPLICIT_DIRECTORY,
            )
            .map_err(|e| e.to_string())?;
        let id = self
            .store
            .add_observation(NewObservation {
                session_id: params.session_id,
                r#type: params.r#type,
                title: params.title,
                content: params.content,
                tool_name: params.tool_name,
                project: params.project,
            })
            .map_err(|e| e.to_string())?;
        serde_json::to_string(&serde_json::json!({ "id": id })).map_err(|e| e.to_string())
    }

    #[tool(description = "Save a user prompt to the current session's memory.")]
    fn mem_save_prompt(&self, Parameters(params): Parameters<SavePromptParams>) -> Result<String, String> {
        self.store
            .create_session(
                &params.session_id,
                params.project.as_deref().unwrap_or(IMPLICIT_PROJECT),
                IMPLICIT_DIRECTORY,
            )
            .map_err(|e| e.to_string())?;
        let id = self
            .store
            .add_prompt(NewPrompt {
                session_id: params.session_id,
                content: params.content,
                project: params.project,
            })
            .map_err(|e| e.to_string())?;
        serde_json::to_string(&serde_json::json!({ "id": id })).map_err(|e| e.to_string())
    }

    #[tool(description = "Record (or overwrite) the end-of-session summary.")]
    fn mem_session_summary(&self, Parameters(params): Parameters<SessionSummaryParams>) -> Result<String, String> {
        self.store
            .end_session(&params.session_id, &params.summary)
            .map_err(|e| e.to_string())?;
        Ok("{\"status\": \"ok\"}".to_string())
    }

    #[tool(description = "Full-text search past observations.")]
    fn mem_search(&self, Parameters(params): Parameters<SearchParams>) -> Result<String, String> {
        let filter = SearchFilter {
            r#type: params.r#type,
            project: params.project,
            limit: params.limit,
        };
        let results = self.store.search(&params.query, &filter).map_err(|e| e.to_string())?;
        serde_json::to_string_pretty(&results).map_err(|e| e.to_string())
    }

    #[tool(description = "Build the markdown context digest of recent sessions, prompts, and observations.")]
    fn mem_context(&self, Parameters(params): Parameters<ContextParams>) -> Result<String, String> {
        self.store
            .format_context(params.project.as_deref())
            .map_err(|e| e.to_string())
    }

    #[tool(description = "Get the observations immediately surrounding a pivot observation within its session.")]
    fn mem_timeline(&self, Parameters(params): Parameters<TimelineParams>) -> Result<String, String> {
        let result = self
            .store
            .timeline(params.pivot_id, params.before.unwrap_or(0), params.after.unwrap_or(0))
            .map_err(|e| e.to_string())?;
        serde_json::to_string_pretty(&result).map_err(|e| e.to_string())
    }

    #[tool(description = "Report aggregate counts and known project names.")]
    fn mem_stats(&self) -> Result<String, String> {
        let stats = self.store.stats().map_err(|e| e.to_string())?;
        serde_json::to_string_pretty(&stats).map_err(|e| e.to_string())
    }

    #[tool(description = "Fetch one observation by id.")]
    fn mem_get_observation(&self, Parameters(params): Parameters<GetObservationParams>) -> Result<String, String> {
        let observation = self.store.get_observation(params.id).map_err(|e| e.to_string())?;
        serde_json::to_string_pretty(&observation).map_err(|e| e.to_string())
    }

    #[tool(description = "Create a session (idempotent: a repeat call with the same id is a no-op).")]
    fn mem_session_start(&self, Parameters(params): Parameters<SessionStartParams>) -> Result<String, String> {
        self.store
            .create_session(&params.id, &params.project, &params.directory)
            .map_err(|e| e.to_string())?;
        Ok("{\"status\": \"ok\"}".to_string())
    }

    #[tool(description = "End a session, recording its summary (overwrites on repeat calls).")]
    fn mem_session_end(&self, Parameters(params): Parameters<SessionEndParams>) -> Result<String, String> {
        self.store.end_session(&params.id, &params.summary).map_err(|e| e.to_string())?;
        Ok("{\"status\": \"ok\"}".to_string())
    }
}

#[tool_handler]
impl ServerHandler for EngramServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Persistent memory for coding agent sessions. Call mem_session_start once per \
                 session, mem_save/mem_save_prompt to record facts as they happen, mem_context \
                 to pull a digest of recent history, mem_search/mem_timeline to look something up, \
                 and mem_session_end when the session wraps up."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Runs the stdio tool-RPC server until the client disconnects.
///
/// # Errors
///
/// Returns [`crate::Error::Storage`] if the transport fails to start or the
/// service loop exits with an error.
pub async fn run(store: Arc<Store>) -> crate::Result<()> {
    use rmcp::ServiceExt;

    let server = EngramServer::new(store);
    let service = server
        .serve(rmcp::transport::stdio())
        .await
        .map_err(|e| crate::Error::Storage {
            operation: "mcp_serve".to_string(),
            cause: e.to_string(),
        })?;
    service.waiting().await.map_err(|e| crate::Error::Storage {
        operation: "mcp_wait".to_string(),
        cause: e.to_string(),
    })?;
    Ok(())
}
