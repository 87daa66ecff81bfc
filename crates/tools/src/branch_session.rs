//! Agent tool for forking the current session into a new branch.

use std::sync::Arc;

use {
    anyhow::Result,
    async_trait::async_trait,
    moltis_agents::tool_registry::AgentTool,
    moltis_sessions::{metadata::SqliteSessionMetadata, store::SessionStore},
    serde_json::{Value, json},
};

/// Agent tool that forks the current session at a given message index.
pub struct BranchSessionTool {
    store: Arc<SessionStore>,
    metadata: Arc<SqliteSessionMetadata>,
}

impl BranchSessionTool {
    pub fn new(store: Arc<SessionStore>, metadata: Arc<SqliteSessionMetadata>) -> Self {
        Self { store, metadata }
    }
}

#[async_trait]
impl AgentTool for BranchSessionTool {
    fn name(&self) -> &str {
        "branch_session"
    }

    fn description(&self) -> &str {
        "Fork the current session into a new branch at a given message index. \
         Messages up to fork_point are copied to the new session. \
         The new session inherits the parent's model and project."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["label"],
            "properties": {
                "label": {
                    "type": "string",
                    "description": "Label for the new branched session"
                },
                "fork_point": {
                    "type": "integer",
                    "description": "Message index to fork at (0-based, exclusive). \
                                    Defaults to all messages."
                }
            }
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let parent_key = params
            .get("_session_key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing session context"))?;

        let label = params
            .get("label")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing 'label'"))?;

        let messages = self.store.read(parent_key).await?;
        let msg_count = messages.len();

        let fork_point = params
            .get("fork_point")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(msg_count);

        if fork_point > msg_count {
            anyhow::bail!("fork_point {fork_point} exceeds message count {msg_count}");
        }

        let new_key = format!("session:{}", uuid::Uuid::new_v4());
        let forked_messages: Vec<Value> = messages[..fork_point].to_vec();

        self.store
            .replace_history(&new_key, forked_messages)
            .await?;

        let entry = self
            .metadata
            .upsert(&new_key, Some(label.to_string()))
            .await
            .map_err(|e| anyhow::anyhow!("failed to create session: {e}"))?;

        self.metadata.touch(&new_key, fork_point as u32).await;

        // Inherit model and project from parent.
        if let Some(parent) = self.metadata.get(parent_key).await {
            if parent.model.is_some() {
                self.metadata.set_model(&new_key, parent.model).await;
            }
            if parent.project_id.is_some() {
                self.metadata
                    .set_project_id(&new_key, parent.project_id)
                    .await;
            }
        }

        // Set parent relationship.
        self.metadata
            .set_parent(
                &new_key,
                Some(parent_key.to_string()),
                Some(fork_point as u32),
            )
            .await;

        Ok(json!({
            "sessionKey": new_key,
            "id": entry.id,
            "label": label,
            "forkPoint": fork_point,
            "messageCount": fork_point,
        }))
    }
}
