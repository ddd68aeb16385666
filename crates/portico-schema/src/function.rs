//! Function schemas: named inputs, required set, optional output.

use crate::value::{IssueCode, ValidationIssue, ValidationOutcome, ValueSchema};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Descriptive metadata carried by every function schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// The contract for one callable: what it accepts and what it produces.
///
/// Inputs keep their declaration order (transports that marshal named
/// parameters positionally rely on it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSchema {
    metadata: SchemaMetadata,
    inputs: IndexMap<String, ValueSchema>,
    #[serde(default)]
    required: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output: Option<ValueSchema>,
}

impl FunctionSchema {
    pub fn builder(name: impl Into<String>) -> FunctionSchemaBuilder {
        FunctionSchemaBuilder::new(name)
    }

    pub fn metadata(&self) -> &SchemaMetadata {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn inputs(&self) -> &IndexMap<String, ValueSchema> {
        &self.inputs
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    pub fn output(&self) -> Option<&ValueSchema> {
        self.output.as_ref()
    }

    /// Validate a parameter value: must be a JSON object whose fields match
    /// the declared inputs, with every required input present.
    pub fn validate_params(&self, params: &Value) -> ValidationOutcome {
        let Some(map) = params.as_object() else {
            return vec![ValidationIssue::new(
                "",
                "parameters must be a JSON object of named values",
                IssueCode::NotAnObject,
            )]
            .into();
        };

        let mut issues = Vec::new();
        for name in &self.required {
            if !map.contains_key(name) {
                issues.push(ValidationIssue::new(
                    name.clone(),
                    format!("missing required parameter `{name}`"),
                    IssueCode::MissingRequired,
                ));
            }
        }
        for (name, value) in map {
            match self.inputs.get(name) {
                Some(schema) => issues.extend(schema.validate_at(name, value)),
                None => issues.push(ValidationIssue::new(
                    name.clone(),
                    format!("unknown parameter `{name}`"),
                    IssueCode::UnknownField,
                )),
            }
        }
        issues.into()
    }

    /// Validate a result value against the declared output, if any.
    pub fn validate_result(&self, result: &Value) -> ValidationOutcome {
        match &self.output {
            Some(schema) => schema.validate(result),
            None => ValidationOutcome::valid(),
        }
    }
}

/// Explicit builder for declaring a native callable's contract.
#[derive(Debug, Clone)]
pub struct FunctionSchemaBuilder {
    metadata: SchemaMetadata,
    inputs: IndexMap<String, ValueSchema>,
    required: Vec<String>,
    output: Option<ValueSchema>,
}

impl FunctionSchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: SchemaMetadata {
                name: name.into(),
                description: String::new(),
            },
            inputs: IndexMap::new(),
            required: Vec::new(),
            output: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = description.into();
        self
    }

    /// Declare an optional input.
    pub fn input(mut self, name: impl Into<String>, schema: ValueSchema) -> Self {
        self.inputs.insert(name.into(), schema);
        self
    }

    /// Declare an input that callers must supply.
    pub fn required_input(mut self, name: impl Into<String>, schema: ValueSchema) -> Self {
        let name = name.into();
        self.inputs.insert(name.clone(), schema);
        self.required.push(name);
        self
    }

    pub fn output(mut self, schema: ValueSchema) -> Self {
        self.output = Some(schema);
        self
    }

    pub fn build(self) -> FunctionSchema {
        FunctionSchema {
            metadata: self.metadata,
            inputs: self.inputs,
            required: self.required,
            output: self.output,
        }
    }
}
