//! Turns a completion intent into suggestions from the static schema.
//!
//! Results keep schema declaration order; nothing is re-sorted. A module or
//! function missing from the schema yields an empty list.

use crate::state_schema::{ParameterSchema, StateSchema};

use super::context::CompletionIntent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionKind {
    Module,
    Function,
    Parameter,
    /// Informational entry for functions accepting arbitrary keyword
    /// arguments; not a key that can be inserted.
    KeywordArguments,
    StateId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub label: String,
    pub kind: SuggestionKind,
    pub documentation: Option<String>,
    pub detail: Option<String>,
}

pub fn complete(schema: &StateSchema, intent: &CompletionIntent) -> Vec<Suggestion> {
    match intent {
        CompletionIntent::ModuleName { prefix } => schema
            .modules()
            .iter()
            .filter(|module| module.name.starts_with(prefix.as_str()))
            .map(|module| Suggestion {
                label: module.name.clone(),
                kind: SuggestionKind::Module,
                documentation: module.module_doc().map(str::to_string),
                detail: None,
            })
            .collect(),

        CompletionIntent::FunctionName { module, prefix } => {
            let Some(module) = schema.module(module) else {
                return Vec::new();
            };
            module
                .submodules
                .iter()
                .filter(|submodule| submodule.name.starts_with(prefix.as_str()))
                .map(|submodule| Suggestion {
                    label: submodule.name.clone(),
                    kind: SuggestionKind::Function,
                    documentation: module.submodule_doc(&submodule.name).map(str::to_string),
                    detail: None,
                })
                .collect()
        }

        CompletionIntent::ParameterName { module, function, present, prefix } => {
            let Some(submodule) = schema
                .module(module)
                .and_then(|module| module.submodule(function))
            else {
                return Vec::new();
            };
            submodule
                .parameters
                .iter()
                .filter(|param| param.is_kwargs_marker() || !present.contains(&param.name))
                .filter(|param| param.is_kwargs_marker() || param.name.starts_with(prefix.as_str()))
                .map(parameter_suggestion)
                .collect()
        }

        // Targets are state ids, which only the workspace knows.
        CompletionIntent::RequisiteTarget { .. } => Vec::new(),
    }
}

fn parameter_suggestion(param: &ParameterSchema) -> Suggestion {
    if param.is_kwargs_marker() {
        let variadic = param
            .default
            .as_ref()
            .and_then(|value| value.as_str())
            .unwrap_or(&param.name);
        return Suggestion {
            label: format!("**{}", variadic),
            kind: SuggestionKind::KeywordArguments,
            documentation: None,
            detail: Some("accepts arbitrary keyword arguments".to_string()),
        };
    }
    Suggestion {
        label: param.name.clone(),
        kind: SuggestionKind::Parameter,
        documentation: None,
        detail: param.default.as_ref().map(|value| format!("default: {}", value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(suggestions: &[Suggestion]) -> Vec<&str> {
        suggestions.iter().map(|s| s.label.as_str()).collect()
    }

    #[test]
    fn test_modules_filtered_by_prefix_in_schema_order() {
        let schema = StateSchema::bundled();
        let all = complete(&schema, &CompletionIntent::ModuleName { prefix: String::new() });
        assert_eq!(labels(&all)[..3], ["cmd", "cron", "file"]);
        let c = complete(&schema, &CompletionIntent::ModuleName { prefix: "c".into() });
        assert_eq!(labels(&c), vec!["cmd", "cron"]);
    }

    #[test]
    fn test_functions_keep_order_and_verbatim_docs() {
        let schema = StateSchema::bundled();
        let intent = CompletionIntent::FunctionName { module: "file".into(), prefix: String::new() };
        let suggestions = complete(&schema, &intent);
        assert_eq!(suggestions.len(), 30);
        assert_eq!(suggestions[0].label, "hardlink");
        assert_eq!(suggestions[0].documentation.as_deref(), Some(""));
        assert_eq!(suggestions[29].label, "not_cached");
        assert!(suggestions.iter().all(|s| s.kind == SuggestionKind::Function));
    }

    #[test]
    fn test_unknown_module_yields_nothing() {
        let schema = StateSchema::bundled();
        let intent = CompletionIntent::FunctionName { module: "nosuch".into(), prefix: String::new() };
        assert!(complete(&schema, &intent).is_empty());
        assert!(complete(&StateSchema::empty(), &CompletionIntent::ModuleName { prefix: String::new() }).is_empty());
    }

    #[test]
    fn test_parameters_exclude_present_and_mark_kwargs() {
        let schema = StateSchema::bundled();
        let intent = CompletionIntent::ParameterName {
            module: "file".into(),
            function: "hardlink".into(),
            present: vec!["name".into(), "target".into()],
            prefix: String::new(),
        };
        let suggestions = complete(&schema, &intent);
        assert_eq!(
            labels(&suggestions),
            vec!["force", "makedirs", "user", "group", "dir_mode", "**kwargs"]
        );
        assert_eq!(suggestions[0].detail.as_deref(), Some("default: false"));
        assert_eq!(suggestions[2].detail, None);
        assert_eq!(suggestions[5].kind, SuggestionKind::KeywordArguments);
    }

    #[test]
    fn test_parameters_of_empty_function_are_empty() {
        let schema = StateSchema::bundled();
        let intent = CompletionIntent::ParameterName {
            module: "file".into(),
            function: String::new(),
            present: vec![],
            prefix: String::new(),
        };
        assert!(complete(&schema, &intent).is_empty());
    }

    #[test]
    fn test_requisite_targets_are_not_schema_driven() {
        let intent = CompletionIntent::RequisiteTarget { target_module: None, prefix: String::new() };
        assert!(complete(&StateSchema::bundled(), &intent).is_empty());
    }
}
