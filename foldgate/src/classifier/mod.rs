//! Submission classification.
//!
//! A submission is inspected exactly once, here, to decide its shape:
//! individual or batch. The decision is encoded in the produced records'
//! [`JobKind`] tags and downstream components branch on those tags only —
//! nobody re-infers shape from the payload.
//!
//! A submission is a batch when its task is an explicit batch type
//! ([`TaskKind::BatchScreen`]) or when a task that normally takes one
//! ligand carries more than one. Each batch child receives the shared
//! primary parameters merged with exactly one ligand.
//!
//! Validation never coerces: missing or malformed primary fields are a
//! synchronous [`ValidationError`] and no records are produced.

use crate::job::{JobInput, JobKind, JobRecord, TaskKind};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// A submission as received from the API surface.
#[derive(Clone, Debug, Deserialize)]
pub struct SubmissionPayload {
    /// The requested prediction task.
    pub task: TaskKind,

    /// Task parameters.
    pub params: Value,
}

/// Rejection of a submission. Nothing was persisted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is absent.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// A field is present but unusable.
    #[error("malformed field `{field}`: {reason}")]
    Malformed {
        field: &'static str,
        reason: String,
    },

    /// A batch submission with zero ligands has no work to do.
    #[error("ligand list is empty")]
    EmptyLigandList,
}

/// The record graph a submission classifies into.
#[derive(Clone, Debug)]
pub enum JobPlan {
    /// One individual job.
    Individual(JobRecord),

    /// One batch parent plus its children, in persistence order (parent
    /// first, so children always resolve their parent).
    Batch {
        parent: JobRecord,
        children: Vec<JobRecord>,
    },
}

impl JobPlan {
    /// The id returned to the submitter.
    pub fn root_id(&self) -> &crate::job::JobId {
        match self {
            Self::Individual(record) => &record.id,
            Self::Batch { parent, .. } => &parent.id,
        }
    }

    /// All records in persistence order.
    pub fn records(&self) -> Vec<&JobRecord> {
        match self {
            Self::Individual(record) => vec![record],
            Self::Batch { parent, children } => {
                let mut all = Vec::with_capacity(children.len() + 1);
                all.push(parent);
                all.extend(children.iter());
                all
            }
        }
    }
}

/// Classifies a submission into its record graph.
pub fn classify(payload: SubmissionPayload) -> Result<JobPlan, ValidationError> {
    let params = as_object(&payload.params)?;

    match payload.task {
        TaskKind::FoldPrediction => {
            require_string(params, "sequence")?;
            Ok(JobPlan::Individual(JobRecord::individual(JobInput::new(
                payload.task,
                payload.params,
            ))))
        }
        TaskKind::LigandDocking | TaskKind::BindingAffinity | TaskKind::BatchScreen => {
            require_string(params, "protein")?;
            let ligands = extract_ligands(params, payload.task)?;

            let is_batch = payload.task.is_explicit_batch() || ligands.len() > 1;
            if is_batch {
                Ok(plan_batch(payload.task, params, ligands))
            } else {
                // Exactly one ligand: an individual job, normalized so the
                // record always carries a singular `ligand` field.
                let ligand = ligands.into_iter().next().ok_or(ValidationError::EmptyLigandList)?;
                let input = JobInput::new(
                    payload.task.unit_kind(),
                    Value::Object(unit_params(params, &ligand)),
                );
                Ok(JobPlan::Individual(JobRecord::individual(input)))
            }
        }
    }
}

fn plan_batch(task: TaskKind, params: &Map<String, Value>, ligands: Vec<String>) -> JobPlan {
    let parent = JobRecord::batch_parent(JobInput::new(task, Value::Object(params.clone())));

    let children = ligands
        .iter()
        .map(|ligand| {
            let input = JobInput::new(task.unit_kind(), Value::Object(unit_params(params, ligand)));
            JobRecord::batch_child(input, parent.id.clone())
        })
        .collect::<Vec<_>>();

    debug!(
        parent_id = %parent.id,
        children = children.len(),
        task = %task,
        "Classified batch submission"
    );
    debug_assert!(children.iter().all(|c| c.kind == JobKind::BatchChild));

    JobPlan::Batch { parent, children }
}

/// The shared primary parameters merged with one ligand.
fn unit_params(params: &Map<String, Value>, ligand: &str) -> Map<String, Value> {
    let mut unit = params.clone();
    unit.remove("ligands");
    unit.insert("ligand".to_string(), Value::String(ligand.to_string()));
    unit
}

fn as_object(params: &Value) -> Result<&Map<String, Value>, ValidationError> {
    params.as_object().ok_or(ValidationError::Malformed {
        field: "params",
        reason: "expected a JSON object".to_string(),
    })
}

fn require_string(params: &Map<String, Value>, field: &'static str) -> Result<(), ValidationError> {
    match params.get(field) {
        None => Err(ValidationError::MissingField(field)),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(()),
        Some(Value::String(_)) => Err(ValidationError::Malformed {
            field,
            reason: "must not be empty".to_string(),
        }),
        Some(other) => Err(ValidationError::Malformed {
            field,
            reason: format!("expected a string, got {other}"),
        }),
    }
}

/// Pulls the ligand list out of a single- or multi-ligand submission.
fn extract_ligands(
    params: &Map<String, Value>,
    task: TaskKind,
) -> Result<Vec<String>, ValidationError> {
    if let Some(value) = params.get("ligands") {
        let array = value.as_array().ok_or(ValidationError::Malformed {
            field: "ligands",
            reason: "expected an array of strings".to_string(),
        })?;
        if array.is_empty() {
            return Err(ValidationError::EmptyLigandList);
        }
        let mut ligands = Vec::with_capacity(array.len());
        for entry in array {
            let ligand = entry.as_str().ok_or(ValidationError::Malformed {
                field: "ligands",
                reason: "every entry must be a string".to_string(),
            })?;
            if ligand.trim().is_empty() {
                return Err(ValidationError::Malformed {
                    field: "ligands",
                    reason: "entries must not be empty".to_string(),
                });
            }
            ligands.push(ligand.to_string());
        }
        return Ok(ligands);
    }

    if let Some(value) = params.get("ligand") {
        let ligand = value.as_str().ok_or(ValidationError::Malformed {
            field: "ligand",
            reason: "expected a string".to_string(),
        })?;
        if ligand.trim().is_empty() {
            return Err(ValidationError::Malformed {
                field: "ligand",
                reason: "must not be empty".to_string(),
            });
        }
        return Ok(vec![ligand.to_string()]);
    }

    // An explicit batch screen needs a list; single-ligand tasks need at
    // least the singular field.
    if task.is_explicit_batch() {
        Err(ValidationError::MissingField("ligands"))
    } else {
        Err(ValidationError::MissingField("ligand"))
    }
}
