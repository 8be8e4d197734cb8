//! Human-readable rendering of CLI results and help tables.

use crate::system::is_hidden;
use plinth_kernel::{Description, MethodDescription};
use serde_json::Value;

/// Scalars print bare unless `force_json`; everything else prints as
/// pretty JSON.
pub fn render_value(value: &Value, force_json: bool) -> String {
    match value {
        Value::String(s) if !force_json => s.clone(),
        Value::Number(n) if !force_json => n.to_string(),
        Value::Bool(b) if !force_json => b.to_string(),
        Value::Null if !force_json => String::new(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn method_row(method: &MethodDescription) -> (String, String) {
    let signature = std::iter::once(method.name.clone())
        .chain(method.parameters.iter().map(|p| p.signature()))
        .collect::<Vec<_>>()
        .join(" ");
    (signature, method.description.clone().unwrap_or_default())
}

fn table(rows: &[(String, String)]) -> String {
    let width = rows.iter().map(|(left, _)| left.len()).max().unwrap_or(0);
    rows.iter()
        .map(|(left, right)| {
            if right.is_empty() {
                format!("  {left}\n")
            } else {
                format!("  {left:<width$}  {right}\n")
            }
        })
        .collect()
}

/// Help for one namespace: its methods with signatures, then its
/// nested handlers.
pub fn render_help(program: &str, description: &Description) -> String {
    let mut out = String::new();
    let label = if description.path.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", description.path.replace('.', " "))
    };
    match &description.description {
        Some(text) => out.push_str(&format!("{label} - {text}\n")),
        None => out.push_str(&format!("{label}\n")),
    }

    let methods: Vec<_> = description.methods.iter().map(method_row).collect();
    if !methods.is_empty() {
        out.push_str("\nMethods:\n");
        out.push_str(&table(&methods));
    }

    let handlers: Vec<_> = description
        .children
        .iter()
        .filter(|child| !is_hidden(&child.name))
        .map(|child| (child.name.clone(), child.description.clone().unwrap_or_default()))
        .collect();
    if !handlers.is_empty() {
        out.push_str("\nHandlers:\n");
        out.push_str(&table(&handlers));
    }

    if methods.is_empty() && handlers.is_empty() {
        out.push_str("\nNothing is exposed here.\n");
    } else {
        out.push_str(&format!("\nUsage: {label} <method> [args...] [--name value]\n"));
    }
    out
}

/// Help for a single method.
pub fn render_method_help(program: &str, method: &MethodDescription) -> String {
    let (signature, text) = method_row(method);
    let prefix = method.path.rsplit_once('.').map(|(head, _)| head.replace('.', " "));
    let mut out = match prefix {
        Some(prefix) => format!("Usage: {program} {prefix} {signature}\n"),
        None => format!("Usage: {program} {signature}\n"),
    };
    if !text.is_empty() {
        out.push_str(&format!("\n{text}\n"));
    }
    let rows: Vec<_> = method
        .parameters
        .iter()
        .map(|p| {
            let mut notes = Vec::new();
            if let Some(choices) = &p.choices {
                notes.push(format!("one of: {}", choices.join(", ")));
            }
            notes.extend(p.constraints.iter().map(ToString::to_string));
            if let Some(description) = &p.description {
                notes.insert(0, description.clone());
            }
            (p.signature(), notes.join("; "))
        })
        .collect();
    if !rows.is_empty() {
        out.push_str("\nArguments:\n");
        out.push_str(&table(&rows));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_kernel::{Api, Constraint, ParamKind, ParamSpec};
    use serde_json::json;

    struct Shop;

    fn shop() -> Description {
        let mut api = Api::<Shop>::new("shop").describe("A tiny shop");
        api.method("add")
            .doc("Add an article")
            .param(ParamSpec::new("name", ParamKind::Str))
            .param(ParamSpec::new("price", ParamKind::Float).constrain(Constraint::Gt(0.0)))
            .param(
                ParamSpec::new("category", ParamKind::choice(["food", "tools"]))
                    .with_default("food"),
            )
            .blocking(|_: &Shop, _| Ok(json!(null)))
            .expect("add should declare");
        api.describe_type()
    }

    #[test]
    fn scalars_print_bare_unless_forced() {
        assert_eq!(render_value(&json!(30), false), "30");
        assert_eq!(render_value(&json!("hi"), false), "hi");
        assert_eq!(render_value(&json!("hi"), true), "\"hi\"");
        assert_eq!(render_value(&json!({"a": 1}), false), "{\n  \"a\": 1\n}");
    }

    #[test]
    fn help_lists_signatures() {
        let help = render_help("plinth", &shop());
        assert!(help.starts_with("plinth shop - A tiny shop\n"));
        assert!(help.contains("add <name:str> <price:float> [category:choice[food|tools]=food]"));
        assert!(help.contains("Add an article"));
    }

    #[test]
    fn method_help_lists_choices_and_constraints() {
        let description = shop();
        let add = description.method("add").expect("add should be described");
        let help = render_method_help("plinth", add);
        assert!(help.starts_with("Usage: plinth shop add <name:str>"));
        assert!(help.contains("one of: food, tools"));
    }
}
