use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Every page the handlers can render. Each lives at `<dir>/<name>.html`.
pub const TEMPLATE_NAMES: [&str; 4] = ["edit", "view", "list", "add"];

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read template {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template {name}: {message}")]
    Parse { name: String, message: String },

    #[error("template {0} is not loaded")]
    Unknown(String),

    #[error("template {template}: no value for '{field}'")]
    MissingField { template: String, field: String },

    #[error("template {template}: '{field}' is not a list")]
    NotAList { template: String, field: String },

    #[error("template data could not be serialized: {0}")]
    Data(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Field(String),
    Each { path: String, body: Vec<Node> },
}

#[derive(Debug, Clone)]
struct Template {
    name: String,
    nodes: Vec<Node>,
}

/// The compiled page templates.
///
/// Built once at startup and shared read-only by every handler, so no request
/// ever re-reads a template from disk.
#[derive(Debug, Clone)]
pub struct Templates {
    templates: HashMap<String, Template>,
}

impl Templates {
    /// Read and compile every template in [`TEMPLATE_NAMES`] from `dir`.
    pub fn load(dir: &Path) -> Result<Self, TemplateError> {
        let mut sources = Vec::with_capacity(TEMPLATE_NAMES.len());
        for name in TEMPLATE_NAMES {
            let path = dir.join(format!("{}.html", name));
            let source = std::fs::read_to_string(&path)
                .map_err(|source| TemplateError::Read { path, source })?;
            sources.push((name.to_string(), source));
        }
        Self::from_sources(sources)
    }

    pub fn from_sources<I, N, S>(sources: I) -> Result<Self, TemplateError>
    where
        I: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: AsRef<str>,
    {
        let mut templates = HashMap::new();
        for (name, source) in sources {
            let name = name.into();
            let nodes = parse(source.as_ref()).map_err(|message| TemplateError::Parse {
                name: name.clone(),
                message,
            })?;
            templates.insert(name.clone(), Template { name, nodes });
        }
        Ok(Self { templates })
    }

    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> Result<String, TemplateError> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| TemplateError::Unknown(name.to_string()))?;
        let context = serde_json::to_value(data)?;

        let mut out = String::new();
        let mut scopes = vec![&context];
        render_nodes(template, &template.nodes, &mut scopes, &mut out)?;
        Ok(out)
    }
}

// ── Parsing ────────────────────────────────────────────────────────────────

fn parse(source: &str) -> Result<Vec<Node>, String> {
    let mut remaining = source;
    parse_block(&mut remaining, None)
}

/// Parse until end of input, or until `{{/each}}` when inside a block.
fn parse_block(remaining: &mut &str, open: Option<&str>) -> Result<Vec<Node>, String> {
    let mut nodes = Vec::new();

    while let Some(start) = remaining.find("{{") {
        if start > 0 {
            nodes.push(Node::Text(remaining[..start].to_string()));
        }
        let after_open = &remaining[start + 2..];
        let end = after_open
            .find("}}")
            .ok_or_else(|| "unclosed tag".to_string())?;
        let tag = after_open[..end].trim();
        *remaining = &after_open[end + 2..];

        if let Some(path) = tag.strip_prefix("#each") {
            let path = path.trim();
            if path.is_empty() {
                return Err("#each needs a field to iterate".to_string());
            }
            let body = parse_block(remaining, Some(path))?;
            nodes.push(Node::Each {
                path: path.to_string(),
                body,
            });
        } else if tag == "/each" {
            return match open {
                Some(_) => Ok(nodes),
                None => Err("{{/each}} without a matching #each".to_string()),
            };
        } else if tag.is_empty() {
            return Err("empty tag".to_string());
        } else {
            nodes.push(Node::Field(tag.to_string()));
        }
    }

    if let Some(path) = open {
        return Err(format!("#each {} is never closed", path));
    }
    if !remaining.is_empty() {
        nodes.push(Node::Text(remaining.to_string()));
        *remaining = "";
    }
    Ok(nodes)
}

// ── Rendering ──────────────────────────────────────────────────────────────

fn render_nodes<'a>(
    template: &Template,
    nodes: &[Node],
    scopes: &mut Vec<&'a Value>,
    out: &mut String,
) -> Result<(), TemplateError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Field(path) => {
                let value = lookup(scopes, path).ok_or_else(|| TemplateError::MissingField {
                    template: template.name.clone(),
                    field: path.clone(),
                })?;
                push_escaped(out, &display_value(value));
            }
            Node::Each { path, body } => {
                let value = lookup(scopes, path).ok_or_else(|| TemplateError::MissingField {
                    template: template.name.clone(),
                    field: path.clone(),
                })?;
                let items = match value {
                    Value::Array(items) => items,
                    Value::Null => continue,
                    _ => {
                        return Err(TemplateError::NotAList {
                            template: template.name.clone(),
                            field: path.clone(),
                        })
                    }
                };
                for item in items {
                    scopes.push(item);
                    let result = render_nodes(template, body, scopes, out);
                    scopes.pop();
                    result?;
                }
            }
        }
    }
    Ok(())
}

/// Resolve a dotted path against the innermost scope that has it.
/// `this` names the innermost scope itself.
fn lookup<'a>(scopes: &[&'a Value], path: &str) -> Option<&'a Value> {
    let (first, rest) = match path.split_once('.') {
        Some((first, rest)) => (first, Some(rest)),
        None => (path, None),
    };

    let root = if first == "this" {
        scopes.last().copied()?
    } else {
        scopes.iter().rev().find_map(|scope| scope.get(first))?
    };

    match rest {
        Some(rest) => resolve_json_path(root, rest),
        None => Some(root),
    }
}

/// Walk a dotted path through a JSON value, e.g. `page.title` or `todos.0`.
fn resolve_json_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
}
