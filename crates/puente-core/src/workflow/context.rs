//! Run context accumulator.
//!
//! `WorkflowContext` is the explicit state that flows through a workflow run.
//! Each step's payload is merged into the accumulated data rather than
//! replacing it; on key collisions the later write wins. The context also
//! keeps each step's raw output and which step last wrote each key, with size
//! limits to prevent unbounded memory growth.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::definition::WorkflowError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum size of a single step payload (1 MB).
pub const MAX_STEP_OUTPUT_SIZE: usize = 1_048_576;

/// Maximum total size of all context data (10 MB).
pub const MAX_CONTEXT_SIZE: usize = 10_485_760;

/// Writer recorded for values supplied when the run starts.
pub const INITIAL_WRITER: &str = "_initial";

fn json_len(value: &Value) -> usize {
    serde_json::to_string(value).map(|s| s.len()).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// WorkflowContext
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowContext {
    pub workflow_id: String,
    pub run_id: Uuid,
    /// Accumulated key/value data visible to predicates and handlers.
    pub data: Map<String, Value>,
    /// Raw payload of each step, keyed by step ID.
    pub step_outputs: HashMap<String, Value>,
    /// Step ID that last wrote each data key.
    pub written_by: HashMap<String, String>,
}

impl WorkflowContext {
    /// Create a context seeded with `initial` data.
    pub fn new(workflow_id: impl Into<String>, run_id: Uuid, initial: Map<String, Value>) -> Self {
        let written_by = initial
            .keys()
            .map(|k| (k.clone(), INITIAL_WRITER.to_string()))
            .collect();
        Self {
            workflow_id: workflow_id.into(),
            run_id,
            data: initial,
            step_outputs: HashMap::new(),
            written_by,
        }
    }

    /// Merge a step's payload into the accumulated data.
    ///
    /// Existing keys are overwritten (last write wins). A payload larger
    /// than `MAX_STEP_OUTPUT_SIZE` is not merged; its step output is replaced
    /// with a truncation marker. Fails without changing anything if the
    /// merge would take the total context past `MAX_CONTEXT_SIZE`.
    pub fn merge(&mut self, step_id: &str, payload: Map<String, Value>) -> Result<(), WorkflowError> {
        let size = serde_json::to_string(&payload)
            .map_err(|e| WorkflowError::ExecutionError(e.to_string()))?
            .len();
        let oversized = size > MAX_STEP_OUTPUT_SIZE;

        let output = if oversized {
            json!({
                "_truncated": true,
                "_original_size": size,
                "_message": format!(
                    "payload exceeded {} byte limit and was discarded",
                    MAX_STEP_OUTPUT_SIZE
                )
            })
        } else {
            Value::Object(payload)
        };

        // Overwritten data keys are not subtracted, so this is an upper bound.
        let replaced = self.step_outputs.get(step_id).map_or(0, json_len);
        let added = json_len(&output) + if oversized { 0 } else { size };
        let projected = (self.total_size() + added).saturating_sub(replaced);
        if projected > MAX_CONTEXT_SIZE {
            return Err(WorkflowError::ExecutionError(format!(
                "total context size ({} bytes) exceeds maximum ({} bytes)",
                projected, MAX_CONTEXT_SIZE
            )));
        }

        if oversized {
            tracing::warn!(
                step_id,
                size,
                max = MAX_STEP_OUTPUT_SIZE,
                "step payload exceeds size limit, not merged"
            );
        } else if let Value::Object(map) = &output {
            for (key, value) in map {
                if let Some(previous) = self.written_by.get(key) {
                    if self.data.get(key) != Some(value) {
                        tracing::debug!(key, previous_writer = %previous, step_id, "overwriting context key");
                    }
                }
                self.data.insert(key.clone(), value.clone());
                self.written_by.insert(key.clone(), step_id.to_string());
            }
        }
        self.step_outputs.insert(step_id.to_string(), output);

        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_step_output(&self, step_id: &str) -> Option<&Value> {
        self.step_outputs.get(step_id)
    }

    /// Which step last wrote `key`.
    pub fn writer_of(&self, key: &str) -> Option<&str> {
        self.written_by.get(key).map(String::as_str)
    }

    /// Total serialized size of data and step outputs in bytes.
    pub fn total_size(&self) -> usize {
        let data_size = serde_json::to_string(&self.data).map(|s| s.len()).unwrap_or(0);
        let outputs_size: usize = self.step_outputs.values().map(json_len).sum();
        data_size + outputs_size
    }

    /// Serialize the entire context to JSON for checkpointing.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(json!({}))
    }

    /// Restore a context from a JSON checkpoint.
    pub fn from_json(value: Value) -> Result<Self, WorkflowError> {
        serde_json::from_value(value)
            .map_err(|e| WorkflowError::ParseError(format!("failed to restore context: {}", e)))
    }

    /// Build a JSON object for JEXL evaluation.
    ///
    /// Accumulated data sits at the top level so predicates read
    /// `match_score >= 90`. `steps.<id>.output` and `workflow.{id,run_id}`
    /// are added unless the data already uses those keys.
    pub fn to_expression_context(&self) -> Value {
        let mut root = self.data.clone();

        let mut steps = Map::new();
        for (id, output) in &self.step_outputs {
            steps.insert(id.clone(), json!({ "output": output }));
        }
        root.entry("steps").or_insert(Value::Object(steps));
        root.entry("workflow").or_insert(json!({
            "id": self.workflow_id,
            "run_id": self.run_id.to_string(),
        }));

        Value::Object(root)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn test_context() -> WorkflowContext {
        WorkflowContext::new(
            "actualizacion_catastral_v1",
            Uuid::now_v7(),
            object(json!({ "canal": "ventanilla" })),
        )
    }

    #[test]
    fn test_new_context_records_initial_writer() {
        let ctx = test_context();
        assert_eq!(ctx.get("canal"), Some(&json!("ventanilla")));
        assert_eq!(ctx.writer_of("canal"), Some(INITIAL_WRITER));
        assert!(ctx.step_outputs.is_empty());
    }

    #[test]
    fn test_merge_accumulates() {
        let mut ctx = test_context();
        ctx.merge("search_rpp_records", object(json!({ "folio_real": "FR-2024-001234" })))
            .unwrap();
        ctx.merge("auto_linking_process", object(json!({ "match_score": 95 })))
            .unwrap();

        assert_eq!(ctx.get("folio_real"), Some(&json!("FR-2024-001234")));
        assert_eq!(ctx.get("match_score"), Some(&json!(95)));
        assert_eq!(ctx.get("canal"), Some(&json!("ventanilla")));
        assert_eq!(
            ctx.get_step_output("auto_linking_process"),
            Some(&json!({ "match_score": 95 }))
        );
    }

    #[test]
    fn test_merge_last_write_wins() {
        let mut ctx = test_context();
        ctx.merge("first", object(json!({ "status": "pending", "a": 1 }))).unwrap();
        ctx.merge("second", object(json!({ "status": "done" }))).unwrap();

        assert_eq!(ctx.get("status"), Some(&json!("done")));
        assert_eq!(ctx.writer_of("status"), Some("second"));
        assert_eq!(ctx.writer_of("a"), Some("first"));
        // The earlier step's own output is untouched.
        assert_eq!(ctx.get_step_output("first").unwrap()["status"], "pending");
    }

    #[test]
    fn test_oversized_payload_is_not_merged() {
        let mut ctx = test_context();
        let big = "x".repeat(MAX_STEP_OUTPUT_SIZE + 10);
        ctx.merge("huge", object(json!({ "blob": big }))).unwrap();

        assert!(ctx.get("blob").is_none());
        assert_eq!(ctx.get_step_output("huge").unwrap()["_truncated"], true);
    }

    #[test]
    fn test_total_context_size_check() {
        let mut ctx = test_context();
        let chunk = "y".repeat(MAX_STEP_OUTPUT_SIZE / 2);
        let mut result = Ok(());
        for i in 0..30 {
            result = ctx.merge(&format!("step_{i}"), object(json!({ format!("k{i}"): chunk.clone() })));
            if result.is_err() {
                break;
            }
        }
        let err = result.unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_rejected_merge_leaves_context_untouched() {
        let mut ctx = test_context();
        let chunk = "z".repeat(MAX_STEP_OUTPUT_SIZE / 2);
        let mut i = 0;
        loop {
            let before = ctx.clone();
            let payload = object(json!({ "canal": "en_linea", format!("k{i}"): chunk.clone() }));
            if ctx.merge(&format!("step_{i}"), payload).is_err() {
                assert_eq!(ctx, before);
                assert!(ctx.get(&format!("k{i}")).is_none());
                assert!(ctx.get_step_output(&format!("step_{i}")).is_none());
                break;
            }
            i += 1;
        }
        assert!(ctx.total_size() <= MAX_CONTEXT_SIZE);
    }

    #[test]
    fn test_json_checkpoint_roundtrip() {
        let mut ctx = test_context();
        ctx.merge("search", object(json!({ "property_found": true }))).unwrap();

        let restored = WorkflowContext::from_json(ctx.to_json()).unwrap();
        assert_eq!(restored, ctx);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = WorkflowContext::from_json(json!({ "data": 3 })).unwrap_err();
        assert!(err.to_string().contains("failed to restore context"));
    }

    #[test]
    fn test_to_expression_context() {
        let mut ctx = test_context();
        ctx.merge("auto_linking_process", object(json!({ "match_score": 95 }))).unwrap();

        let expr = ctx.to_expression_context();
        assert_eq!(expr["match_score"], 95);
        assert_eq!(expr["steps"]["auto_linking_process"]["output"]["match_score"], 95);
        assert_eq!(expr["workflow"]["id"], "actualizacion_catastral_v1");
    }

    #[test]
    fn test_expression_context_data_keys_take_precedence() {
        let ctx = WorkflowContext::new("w", Uuid::now_v7(), object(json!({ "steps": 3 })));
        assert_eq!(ctx.to_expression_context()["steps"], 3);
    }
}
