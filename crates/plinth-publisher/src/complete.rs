//! Shell completion: `plinth --complete <shell> [cursor] tokens...`.
//!
//! Suggestions come from the catalog description of each registered
//! application, so completing never instantiates a handler.

use crate::publisher::Publisher;
use crate::system::{SYSTEM_HANDLER, is_hidden};
use plinth_kernel::{Channel, Description, MethodDescription};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    /// A top-level command of the binary itself.
    Root,
    Handler,
    Method,
    /// A method of the hidden `_system` handler.
    System,
    Parameter,
    /// One member of a closed enumeration, offered after its option.
    Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub value: String,
    pub display: String,
    pub description: String,
    pub inline_hint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

impl Suggestion {
    fn new(kind: SuggestionKind, value: impl Into<String>, description: Option<&str>) -> Self {
        let value = value.into();
        Self {
            kind,
            display: value.clone(),
            value,
            description: description.unwrap_or_default().trim().to_string(),
            inline_hint: String::new(),
            required: None,
        }
    }

    fn hint(mut self, hint: String) -> Self {
        self.inline_hint = hint;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionPayload {
    pub shell: String,
    pub cursor: Option<usize>,
    pub current_fragment: String,
    pub completed_tokens: Vec<String>,
    pub suggestions: Vec<Suggestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompletionPayload {
    /// Payload for a malformed `--complete` invocation.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            shell: String::new(),
            cursor: None,
            current_fragment: String::new(),
            completed_tokens: Vec::new(),
            suggestions: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Split the words after `--complete` into shell, optional cursor and the
/// command line being completed. The last token is the fragment under the
/// cursor; an empty last token means a fresh word.
pub fn parse_completion_args<S: AsRef<str>>(
    args: &[S],
) -> Result<(String, Option<usize>, Vec<String>), String> {
    let mut words = args.iter().map(AsRef::as_ref);
    let shell = words.next().ok_or_else(|| "missing shell identifier".to_string())?;
    let mut rest: Vec<String> = words.map(str::to_string).collect();
    let cursor = match rest.first().map(|w| w.parse::<usize>()) {
        Some(Ok(cursor)) => {
            rest.remove(0);
            Some(cursor)
        }
        _ => None,
    };
    Ok((shell.to_string(), cursor, rest))
}

fn matches(candidate: &str, fragment: &str) -> bool {
    candidate.to_lowercase().starts_with(&fragment.to_lowercase())
}

fn method_hint(method: &MethodDescription) -> String {
    method
        .parameters
        .iter()
        .map(|p| {
            if p.required {
                format!("<{}>", p.name)
            } else {
                format!("[{}]", p.name)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn namespace_suggestions(
    node: &Description,
    fragment: &str,
    method_kind: SuggestionKind,
) -> Vec<Suggestion> {
    let mut out: Vec<Suggestion> = node
        .children
        .iter()
        .filter(|child| !is_hidden(&child.name) && matches(&child.name, fragment))
        .map(|child| {
            Suggestion::new(SuggestionKind::Handler, &child.name, child.description.as_deref())
        })
        .collect();
    out.extend(
        node.methods
            .iter()
            .filter(|m| m.exposure.allows(Channel::Cli) && matches(&m.name, fragment))
            .map(|m| {
                Suggestion::new(method_kind, &m.name, m.description.as_deref()).hint(method_hint(m))
            }),
    );
    out
}

/// `--name value` and `--name=value` both name `name`.
fn named_option(token: &str) -> Option<&str> {
    token
        .strip_prefix("--")
        .and_then(|option| option.split('=').next())
        .filter(|name| !name.is_empty())
}

fn parameter_suggestions(
    method: &MethodDescription,
    given: &[String],
    fragment: &str,
) -> Vec<Suggestion> {
    let awaiting = given
        .last()
        .filter(|last| !last.contains('='))
        .and_then(|last| named_option(last))
        .and_then(|name| method.parameters.iter().find(|p| p.name == name));
    if let Some(param) = awaiting {
        return param
            .choices
            .iter()
            .flatten()
            .filter(|choice| matches(choice, fragment))
            .map(|choice| Suggestion::new(SuggestionKind::Value, choice, Some(param.name.as_str())))
            .collect();
    }
    let fragment = fragment.trim_start_matches("--");
    method
        .parameters
        .iter()
        .filter(|p| !given.iter().any(|g| named_option(g) == Some(p.name.as_str())))
        .filter(|p| matches(&p.name, fragment))
        .map(|p| {
            let fallback = if p.required { "required parameter" } else { "optional parameter" };
            let description = p.description.as_deref().unwrap_or(fallback);
            let value = format!("--{}", p.name);
            let mut suggestion =
                Suggestion::new(SuggestionKind::Parameter, value, Some(description))
                    .hint(format!("<{}>", p.kind));
            suggestion.required = Some(p.required);
            suggestion
        })
        .collect()
}

impl Publisher {
    /// The namespace tree the CLI can reach: every CLI-enabled
    /// application as described by the catalog, plus `_system`. An
    /// application whose source no longer resolves is left out.
    fn completion_root(&self) -> Description {
        let mut root = Description {
            name: String::new(),
            path: String::new(),
            description: None,
            methods: Vec::new(),
            children: Vec::new(),
        };
        for app in self.list().into_iter().filter(|app| app.cli_enabled) {
            if let Ok(mut document) = self.describe(Some(&app.name)) {
                root.children.append(&mut document.root.children);
            }
        }
        let tree = self.tree().read();
        if let Some(node) = tree.child(tree.root(), SYSTEM_HANDLER)
            && let Ok(system) = tree.describe_node(node, Some(Channel::Cli))
        {
            root.children.push(system);
        }
        root
    }

    /// Suggest what may follow `tokens`. `root_commands` are the binary's
    /// own commands, offered alongside applications for the first word.
    pub fn complete<S: AsRef<str>>(
        &self,
        shell: &str,
        cursor: Option<usize>,
        tokens: &[S],
        root_commands: &[(&str, &str)],
    ) -> CompletionPayload {
        let tokens: Vec<String> = tokens.iter().map(|t| t.as_ref().to_string()).collect();
        let (completed, fragment) = match tokens.split_last() {
            Some((last, head)) => (head.to_vec(), last.clone()),
            None => (Vec::new(), String::new()),
        };
        let mut payload = CompletionPayload {
            shell: shell.to_string(),
            cursor,
            current_fragment: fragment.clone(),
            completed_tokens: completed.clone(),
            suggestions: Vec::new(),
            error: None,
        };
        match self.suggest(&completed, &fragment, root_commands) {
            Ok(suggestions) => payload.suggestions = suggestions,
            Err(error) => payload.error = Some(error),
        }
        payload
    }

    fn suggest(
        &self,
        completed: &[String],
        fragment: &str,
        root_commands: &[(&str, &str)],
    ) -> Result<Vec<Suggestion>, String> {
        let root = self.completion_root();
        if completed.is_empty() {
            let mut out = namespace_suggestions(&root, fragment, SuggestionKind::Method);
            if fragment.starts_with('_') && matches(SYSTEM_HANDLER, fragment) {
                let system = root.child(SYSTEM_HANDLER).and_then(|s| s.description.as_deref());
                out.push(Suggestion::new(SuggestionKind::Handler, SYSTEM_HANDLER, system));
            }
            out.extend(
                root_commands
                    .iter()
                    .filter(|(name, _)| matches(name, fragment))
                    .map(|(name, about)| {
                        Suggestion::new(SuggestionKind::Root, *name, Some(*about))
                    }),
            );
            return Ok(out);
        }
        if root_commands.iter().any(|(name, _)| *name == completed[0]) {
            return Ok(Vec::new());
        }

        let mut node = &root;
        for (index, token) in completed.iter().enumerate() {
            if let Some(child) = node.child(token) {
                node = child;
                continue;
            }
            if let Some(method) = node.method(token).filter(|m| m.exposure.allows(Channel::Cli)) {
                return Ok(parameter_suggestions(method, &completed[index + 1..], fragment));
            }
            return Err(format!("unknown command: {}", completed[..=index].join(" ")));
        }
        let kind = if node.name == SYSTEM_HANDLER {
            SuggestionKind::System
        } else {
            SuggestionKind::Method
        };
        Ok(namespace_suggestions(node, fragment, kind))
    }
}
