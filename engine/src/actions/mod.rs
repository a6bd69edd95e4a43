//! Action definitions
//!
//! An `Action` is a named, schema-parameterized unit of work the agent can
//! invoke. Actions are immutable once handed to an `ActionRegistry`; the task
//! loop only ever holds shared references to them.

pub mod registry;

pub use registry::ActionRegistry;

use crate::schema::CompiledSchema;
use sdk::{
    ActionContext, ActionError, ActionHandler, ActionOutput, ActionParams, AgentError, FnHandler,
};
use serde_json::{json, Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A declared action
pub struct Action {
    /// Unique id within a registry
    id: String,

    /// What the action does, shown to the model
    description: String,

    /// JSON schema of the parameters, if any
    parameters: Option<Value>,

    /// Compiled form of `parameters`, filled in at registration
    compiled: Option<CompiledSchema>,

    /// Actions that must have run before this one
    depends_on: Vec<String>,

    /// Retry budget declared for the action.
    ///
    /// Exposed in the action catalog; the loop itself never retries.
    retries: u32,

    /// Whether the action may run again once it has run in an interaction
    allow_rerun: bool,

    handler: Arc<dyn ActionHandler>,
}

impl Action {
    /// Create an action backed by a handler
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        handler: impl ActionHandler + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            parameters: None,
            compiled: None,
            depends_on: Vec::new(),
            retries: 0,
            allow_rerun: true,
            handler: Arc::new(handler),
        }
    }

    /// Create an action backed by an async closure
    ///
    /// # Examples
    ///
    /// ```
    /// use sdk::{ActionContext, ActionError, ActionOutput, ActionParams};
    /// use serde_json::json;
    /// use taskloop_engine::actions::Action;
    ///
    /// let sum = Action::from_fn("sum", "Add two numbers", |_ctx: ActionContext, params: ActionParams| async move {
    ///     let a = params.param_f64("a")?;
    ///     let b = params.param_f64("b")?;
    ///     Ok::<_, ActionError>(ActionOutput::value(json!(a + b)))
    /// });
    /// assert_eq!(sum.id(), "sum");
    /// ```
    pub fn from_fn<F, Fut>(id: impl Into<String>, description: impl Into<String>, f: F) -> Self
    where
        F: Fn(ActionContext, ActionParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ActionOutput, ActionError>> + Send + 'static,
    {
        Self::new(id, description, FnHandler::new(f))
    }

    /// Declare the JSON schema of the parameters
    pub fn with_parameters(mut self, schema: Value) -> Self {
        self.parameters = Some(schema);
        self.compiled = None;
        self
    }

    /// Declare dependencies
    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in ids {
            let id = id.into();
            if !self.depends_on.contains(&id) {
                self.depends_on.push(id);
            }
        }
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Allow or forbid running the action more than once per interaction
    pub fn allow_rerun(mut self, allow: bool) -> Self {
        self.allow_rerun = allow;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> Option<&Value> {
        self.parameters.as_ref()
    }

    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn allows_rerun(&self) -> bool {
        self.allow_rerun
    }

    /// Compile the parameter schema. Called once at registration.
    pub(crate) fn compile(&mut self) -> Result<(), AgentError> {
        if let Some(schema) = &self.parameters {
            let compiled = CompiledSchema::compile(schema.clone()).map_err(|message| {
                AgentError::InvalidParameterSchema {
                    action_id: self.id.clone(),
                    message,
                }
            })?;
            self.compiled = Some(compiled);
        }
        Ok(())
    }

    /// Validate model-proposed parameters.
    ///
    /// `null` is normalised to an empty object. Returns the parameters that
    /// should be handed to the action.
    pub fn validate_parameters(&self, params: &Value) -> Result<Value, AgentError> {
        let params = match params {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };

        if !params.is_object() {
            return Err(AgentError::ActionParameterValidation {
                action_id: self.id.clone(),
                message: "parameters must be a JSON object".to_string(),
            });
        }

        let result = match (&self.compiled, &self.parameters) {
            (Some(compiled), _) => compiled.validate(&params),
            (None, Some(schema)) => {
                CompiledSchema::compile(schema.clone()).and_then(|c| c.validate(&params))
            }
            (None, None) => Ok(()),
        };

        result.map_err(|message| AgentError::ActionParameterValidation {
            action_id: self.id.clone(),
            message,
        })?;

        Ok(params)
    }

    /// Run the action body
    pub async fn run(
        &self,
        ctx: ActionContext,
        params: ActionParams,
    ) -> Result<ActionOutput, ActionError> {
        self.handler.execute(ctx, params).await
    }

    /// Catalog entry shown to the model
    pub fn catalog_entry(&self) -> Value {
        let mut entry = json!({
            "id": self.id,
            "description": self.description,
            "parameters": self.parameters.clone().unwrap_or_else(|| json!({"type": "object"})),
            "dependsOn": self.depends_on,
            "retries": self.retries,
        });
        if !self.allow_rerun {
            entry["allowRerun"] = json!(false);
        }
        entry
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("depends_on", &self.depends_on)
            .field("retries", &self.retries)
            .field("allow_rerun", &self.allow_rerun)
            .finish_non_exhaustive()
    }
}
