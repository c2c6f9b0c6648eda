//! Job input payloads.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The prediction task a job runs, resolved once at classification time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Structure prediction from a protein sequence. Primary input only.
    FoldPrediction,

    /// Dock one ligand against a protein target.
    LigandDocking,

    /// Binding affinity estimate for a protein/ligand pair.
    BindingAffinity,

    /// Explicit batch screen of many ligands against one target.
    BatchScreen,
}

impl TaskKind {
    /// Returns true if this task takes a ligand secondary input.
    pub fn takes_ligand(&self) -> bool {
        matches!(
            self,
            Self::LigandDocking | Self::BindingAffinity | Self::BatchScreen
        )
    }

    /// Returns true if this task is an explicit batch type.
    pub fn is_explicit_batch(&self) -> bool {
        matches!(self, Self::BatchScreen)
    }

    /// The per-unit task a batch member runs.
    ///
    /// An explicit batch screen fans out into docking units; non-batch
    /// tasks map to themselves.
    pub fn unit_kind(&self) -> TaskKind {
        match self {
            Self::BatchScreen => Self::LigandDocking,
            other => *other,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FoldPrediction => write!(f, "fold_prediction"),
            Self::LigandDocking => write!(f, "ligand_docking"),
            Self::BindingAffinity => write!(f, "binding_affinity"),
            Self::BatchScreen => write!(f, "batch_screen"),
        }
    }
}

/// The input a job was created with: task kind plus structured parameters.
///
/// Immutable after creation. For batch children the parameters are the
/// shared primary input merged with exactly one ligand.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobInput {
    /// The prediction task to run.
    pub task: TaskKind,

    /// Task parameters as given by the submitter (opaque to the
    /// orchestrator beyond classification).
    pub params: serde_json::Value,
}

impl JobInput {
    /// Creates a new job input.
    pub fn new(task: TaskKind, params: serde_json::Value) -> Self {
        Self { task, params }
    }
}
