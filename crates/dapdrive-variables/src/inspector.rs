//! The inspector: scope selection, bounded expansion, evaluation.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;

use dapdrive_protocol::ProtocolVariable;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::source::VariableSource;
use crate::value::{CollectionValue, Primitive, RenderedValue, VariableValue};
use crate::LocalsSnapshot;

/// Cap on children fetched per `variables` request.
const VARIABLE_FETCH_CAP: i64 = 100;

/// Property names that are never expanded: compiler-generated and
/// reflection metadata plus debugger-noise pseudo members.
const DENIED_PROPERTY_NAMES: &[&str] = &[
    "EqualityContract",
    "DeclaringType",
    "ReflectedType",
    "MemberType",
    "MetadataToken",
    "Module",
    "Assembly",
    "CustomAttributes",
    "[More]",
    "Static members",
    "Non-Public members",
    "Raw View",
];

/// Null-family renderings dropped by `omit_null_properties`.
const NULL_RENDERINGS: &[&str] = &["null", "None", "undefined", "nil"];

/// Member-type suffixes treated as injected services and compacted.
const SERVICE_SUFFIXES: &[&str] =
    &["Logger", "Repository", "Service", "Provider", "Factory", "Manager", "Handler"];

static DENIED_TYPE_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"System\.RuntimeType|System\.Reflection\.|System\.Type\b|TypeInfo\b|\bGuid\b").ok()
});
static IDENT_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").ok());
static COUNT_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"Count\s*=\s*(\d+)").ok());
static BRACKET_COUNT_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\[(\d+)\]").ok());
static GENERIC_ARG_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"<\s*([^<>,]+?)\s*>").ok());

/// Inspector policy knobs.
#[derive(Debug, Clone)]
pub struct InspectorConfig {
    /// Maximum member depth below a top-level variable.
    pub max_depth: u32,
    /// Maximum expanded items per collection.
    pub max_collection_items: usize,
    /// Replace repeated object content with a `[see: <path>]` reference.
    pub deduplicate_by_content: bool,
    /// Render service-like members as `{<type>}` without expansion.
    pub compact_services: bool,
    /// Drop members whose rendering is a null-family string.
    pub omit_null_properties: bool,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_collection_items: 20,
            deduplicate_by_content: true,
            compact_services: true,
            omit_null_properties: true,
        }
    }
}

/// Result of one watch evaluation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    /// Rendered result, absent on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Result type when the adapter reports one.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// The adapter's failure message, verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Variable inspection policy over a [`VariableSource`].
#[derive(Debug, Clone, Default)]
pub struct VariableInspector {
    config: InspectorConfig,
}

impl VariableInspector {
    /// Creates an inspector with the given policy.
    pub fn new(config: InspectorConfig) -> Self {
        Self { config }
    }

    /// The active policy.
    pub fn config(&self) -> &InspectorConfig {
        &self.config
    }

    /// Fetches and expands the locals of a stopped frame.
    ///
    /// Scopes whose name is not locals-shaped (locals, arguments, block,
    /// closure) are skipped. Fetch failures degrade to missing entries;
    /// this never fails the stop that requested it.
    pub async fn get_locals<S>(&self, source: &S, frame_id: i64) -> LocalsSnapshot
    where
        S: VariableSource + ?Sized,
    {
        let mut locals = LocalsSnapshot::new();
        let scopes = match source.scopes(frame_id).await {
            Ok(scopes) => scopes,
            Err(err) => {
                warn!("scopes fetch failed for frame {frame_id}: {err}");
                return locals;
            }
        };

        let mut expansion = Expansion::new(&self.config, source);
        for scope in scopes.iter().filter(|s| is_locals_scope(&s.name)) {
            let variables =
                match source.variables(scope.variables_reference, Some(VARIABLE_FETCH_CAP)).await {
                    Ok(variables) => variables,
                    Err(err) => {
                        warn!("variables fetch failed for scope '{}': {err}", scope.name);
                        continue;
                    }
                };
            for variable in variables {
                let name = variable.name.clone();
                let value = expansion.expand(variable, self.config.max_depth, name.clone()).await;
                locals.insert(name, value);
            }
        }
        locals
    }

    /// Evaluates each expression in `watch` context against a frame.
    ///
    /// A failing expression records its error and does not stop the rest.
    pub async fn evaluate<S>(
        &self,
        source: &S,
        frame_id: i64,
        expressions: &[String],
    ) -> IndexMap<String, EvaluationResult>
    where
        S: VariableSource + ?Sized,
    {
        let mut results = IndexMap::new();
        for expression in expressions {
            let entry = match source.evaluate(expression, frame_id, "watch").await {
                Ok(body) => EvaluationResult {
                    result: Some(body.result),
                    type_name: body.type_name,
                    error: None,
                },
                Err(err) => {
                    debug!("evaluate '{expression}' failed: {err}");
                    EvaluationResult { result: None, type_name: None, error: Some(err.to_string()) }
                }
            };
            results.insert(expression.clone(), entry);
        }
        results
    }
}

/// Scope names treated as frame locals, case-insensitively.
fn is_locals_scope(name: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    matches!(lowered.as_str(), "locals" | "local" | "arguments" | "block" | "closure")
        || lowered.starts_with("local:")
        || lowered.starts_with("local ")
}

fn is_denied_property(name: &str) -> bool {
    DENIED_PROPERTY_NAMES.contains(&name)
}

fn is_denied_type(type_name: &str) -> bool {
    DENIED_TYPE_RE.as_ref().is_some_and(|re| re.is_match(type_name))
}

fn is_service_type(type_name: &str) -> bool {
    let Some(re) = IDENT_RE.as_ref() else {
        return false;
    };
    re.find_iter(type_name)
        .any(|ident| SERVICE_SUFFIXES.iter().any(|suffix| ident.as_str().ends_with(suffix)))
}

fn is_collection_type(type_name: &str) -> bool {
    if type_name.ends_with("[]") {
        return true;
    }
    const COMPOSITE: &[&str] = &["List", "Array", "Set", "Dictionary", "Map", "Collection"];
    if COMPOSITE.iter().any(|p| type_name.contains(p)) {
        return true;
    }
    matches!(type_name, "list" | "dict" | "set" | "tuple" | "frozenset")
}

fn element_type_of(type_name: &str) -> Option<String> {
    if let Some(prefix) = type_name.strip_suffix("[]") {
        return Some(prefix.to_string());
    }
    GENERIC_ARG_RE
        .as_ref()
        .and_then(|re| re.captures(type_name))
        .map(|caps| caps[1].to_string())
}

/// Per-snapshot expansion state: the visited reference handles and the
/// content-hash map, both reset between stops.
struct Expansion<'a, S: ?Sized> {
    config: &'a InspectorConfig,
    source: &'a S,
    visited: HashSet<i64>,
    hashes: HashMap<u64, String>,
}

impl<'a, S> Expansion<'a, S>
where
    S: VariableSource + ?Sized,
{
    fn new(config: &'a InspectorConfig, source: &'a S) -> Self {
        Self { config, source, visited: HashSet::new(), hashes: HashMap::new() }
    }

    /// Expands one adapter variable to at most `depth` member levels.
    fn expand<'s>(
        &'s mut self,
        variable: ProtocolVariable,
        depth: u32,
        path: String,
    ) -> Pin<Box<dyn Future<Output = VariableValue> + Send + 's>> {
        Box::pin(async move {
            let type_name = variable.type_name.clone();
            let primitive = Primitive::parse(&variable.value, type_name.as_deref());
            let reference =
                (variable.variables_reference > 0).then_some(variable.variables_reference);
            let mut node = VariableValue {
                type_name: type_name.clone(),
                value: RenderedValue::Primitive(primitive),
                reference,
                cyclic: false,
                deduplicated: false,
            };

            let Some(reference) = reference else {
                return node;
            };
            if depth == 0 {
                return node;
            }

            if let Some(type_name) = type_name.as_deref() {
                if is_denied_type(type_name) {
                    return node;
                }
                if self.config.compact_services && is_service_type(type_name) {
                    node.value =
                        RenderedValue::Primitive(Primitive::Raw(format!("{{{type_name}}}")));
                    return node;
                }
            }

            if self.visited.contains(&reference) {
                node.cyclic = true;
                return node;
            }
            self.visited.insert(reference);

            let children = match self.source.variables(reference, Some(VARIABLE_FETCH_CAP)).await {
                Ok(children) => children,
                Err(err) => {
                    debug!("expansion fetch failed at {path}: {err}");
                    return node;
                }
            };
            let children: Vec<ProtocolVariable> = children
                .into_iter()
                .filter(|child| !is_denied_property(&child.name))
                .filter(|child| {
                    !(self.config.omit_null_properties
                        && NULL_RENDERINGS.contains(&child.value.trim()))
                })
                .collect();

            let collection_like = type_name.as_deref().is_some_and(is_collection_type);
            if collection_like {
                let count = collection_count(&variable, children.len());
                let mut items = Vec::new();
                for (index, child) in
                    children.into_iter().take(self.config.max_collection_items).enumerate()
                {
                    let item_path = format!("{path}[{index}]");
                    items.push(self.expand(child, depth - 1, item_path).await);
                }
                node.value = RenderedValue::Collection(CollectionValue {
                    element_type: type_name.as_deref().and_then(element_type_of),
                    count,
                    items,
                });
                return node;
            }

            // Objects with identical immediate projections collapse to a
            // reference pointing at the first expansion.
            if self.config.deduplicate_by_content {
                let hash = content_hash(type_name.as_deref(), &children);
                if let Some(first_path) = self.hashes.get(&hash) {
                    node.value =
                        RenderedValue::Primitive(Primitive::Str(format!("[see: {first_path}]")));
                    node.deduplicated = true;
                    return node;
                }
                self.hashes.insert(hash, path.clone());
            }

            let mut members = IndexMap::new();
            for child in children {
                let name = child.name.clone();
                let member_path = format!("{path}.{name}");
                members.insert(name, self.expand(child, depth - 1, member_path).await);
            }
            node.value = RenderedValue::Object(members);
            node
        })
    }
}

/// Best count for a collection: adapter-reported child counts, then a
/// `Count = N` substring, then a `[N]` substring, then the fetched length.
fn collection_count(variable: &ProtocolVariable, fetched: usize) -> usize {
    if let Some(indexed) = variable.indexed_variables.filter(|n| *n > 0) {
        return indexed as usize;
    }
    if let Some(named) = variable.named_variables.filter(|n| *n > 0) {
        return named as usize;
    }
    if let Some(caps) = COUNT_RE.as_ref().and_then(|re| re.captures(&variable.value)) {
        if let Ok(count) = caps[1].parse() {
            return count;
        }
    }
    if let Some(caps) = BRACKET_COUNT_RE.as_ref().and_then(|re| re.captures(&variable.value)) {
        if let Ok(count) = caps[1].parse() {
            return count;
        }
    }
    fetched
}

/// Content hash over the immediate projection: the parent type plus each
/// child's `name:type:primitive` line, sorted by name. Grandchildren do
/// not participate, so objects that diverge only below their immediate
/// members still collapse together.
fn content_hash(type_name: Option<&str>, children: &[ProtocolVariable]) -> u64 {
    let mut lines: Vec<String> = children
        .iter()
        .map(|child| {
            let primitive = Primitive::parse(&child.value, child.type_name.as_deref());
            format!(
                "{}:{}:{}",
                child.name,
                child.type_name.as_deref().unwrap_or(""),
                primitive.hash_text()
            )
        })
        .collect();
    lines.sort();

    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    type_name.unwrap_or("").hash(&mut hasher);
    for line in &lines {
        line.hash(&mut hasher);
    }
    hasher.finish()
}
