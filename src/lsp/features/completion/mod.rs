//! Context-aware completion for sls documents
//!
//! Completion runs in two steps:
//! - [`context::determine_intent`] classifies the cursor into a
//!   [`CompletionIntent`] using only the parsed tree and the text
//! - [`engine::complete`] answers module, function and parameter intents from
//!   the static [`StateSchema`](crate::state_schema::StateSchema)
//!
//! Requisite targets are state ids declared somewhere in the include closure,
//! so they are answered from [`StateRef`]s collected by the workspace index.

pub mod context;
pub mod engine;

pub use context::{CompletionIntent, determine_intent};
pub use engine::{Suggestion, SuggestionKind, complete};

use tower_lsp::lsp_types::{CompletionItem, CompletionItemKind, Documentation};

use crate::lsp::backend::workspace_index::StateRef;

/// Requisite target suggestions. With a target module only states using a
/// function of that module qualify.
pub fn state_suggestions(states: &[StateRef], target_module: Option<&str>, prefix: &str) -> Vec<Suggestion> {
    states
        .iter()
        .filter(|state| state.id.starts_with(prefix))
        .filter(|state| match target_module {
            Some(module) => state
                .functions
                .iter()
                .any(|function| function.split_once('.').is_some_and(|(m, _)| m == module)),
            None => true,
        })
        .map(|state| Suggestion {
            label: state.id.clone(),
            kind: SuggestionKind::StateId,
            documentation: None,
            detail: (!state.functions.is_empty()).then(|| state.functions.join(", ")),
        })
        .collect()
}

pub fn to_completion_item(suggestion: Suggestion) -> CompletionItem {
    let kind = match suggestion.kind {
        SuggestionKind::Module => CompletionItemKind::MODULE,
        SuggestionKind::Function => CompletionItemKind::FUNCTION,
        SuggestionKind::Parameter => CompletionItemKind::PROPERTY,
        SuggestionKind::KeywordArguments => CompletionItemKind::TEXT,
        SuggestionKind::StateId => CompletionItemKind::REFERENCE,
    };
    CompletionItem {
        label: suggestion.label,
        kind: Some(kind),
        detail: suggestion.detail,
        // schema docstrings verbatim
        documentation: suggestion.documentation.map(Documentation::String),
        ..Default::default()
    }
}
