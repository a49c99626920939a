//! Tabular question answering over the employee dataset
//!
//! Questions are translated by the reasoning engine into a small JSON
//! computation language, which is screened, validated and executed in a
//! sandbox against the in-memory table.

mod computation;
mod sandbox;
mod table;
mod translator;
mod views;

pub use computation::{
    Computation, ComputationOutput, Filter, FilterOp, GroupValue, Operation, SortOrder,
};
pub use sandbox::Sandbox;
pub use table::{Column, ColumnKind, Table, Value};
pub use translator::{NlQueryTranslator, TabularAnswer};
pub use views::{DataView, TableView};

use crate::errors::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one translation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationPhase {
    Idle,
    Translating,
    Executing,
    Succeeded,
    Failed,
}

impl fmt::Display for TranslationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TranslationPhase::Idle => "idle",
            TranslationPhase::Translating => "translating",
            TranslationPhase::Executing => "executing",
            TranslationPhase::Succeeded => "succeeded",
            TranslationPhase::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Why a translation ended in `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationFailureKind {
    Malformed,
    Unsafe,
    SchemaMismatch,
    Execution,
    Timeout,
}

impl TranslationFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranslationFailureKind::Malformed => "malformed",
            TranslationFailureKind::Unsafe => "unsafe",
            TranslationFailureKind::SchemaMismatch => "schema_mismatch",
            TranslationFailureKind::Execution => "execution",
            TranslationFailureKind::Timeout => "timeout",
        }
    }
}

impl fmt::Display for TranslationFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TranslationFailureKind::Malformed => "malformed computation",
            TranslationFailureKind::Unsafe => "unsafe computation",
            TranslationFailureKind::SchemaMismatch => "schema mismatch",
            TranslationFailureKind::Execution => "execution error",
            TranslationFailureKind::Timeout => "execution timed out",
        };
        write!(f, "{}", s)
    }
}

pub(crate) fn translation_failed(
    phase: TranslationPhase,
    kind: TranslationFailureKind,
    reason: impl Into<String>,
) -> AppError {
    AppError::TranslationFailed {
        phase,
        kind,
        reason: reason.into(),
    }
}
