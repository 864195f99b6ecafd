//! Walking the inner-exception chain out of captured locals.

use dapdrive_variables::{LocalsSnapshot, Primitive, RenderedValue, VariableValue};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::classify::{classify_type, hint_for};
use crate::{ExceptionAnalysis, RootCause};

/// Default cap on chain depth.
const DEFAULT_MAX_DEPTH: usize = 5;

/// Local names that carry the thrown exception.
const EXCEPTION_LOCAL_NAMES: &[&str] = &["$exception", "exception"];

/// Member names that link to the wrapped exception.
const INNER_MEMBER_NAMES: &[&str] = &["InnerException", "__cause__", "cause"];

/// `Namespace.Type {Runtime.Type}`: the brace part is the runtime type and
/// wins over the declared one.
static BRACED_TYPE_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\{\s*([A-Za-z_][\w.+`]*)\s*\}").ok());

/// One flattened level of the exception chain.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionChainEntry {
    /// Zero-based depth; 0 is the outermost exception.
    pub depth: usize,
    /// Runtime exception type.
    #[serde(rename = "type")]
    pub exception_type: String,
    /// The exception message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// The reporting component, when captured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// The throw site, from the target site or the first stack line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throw_site: Option<String>,
    /// Family-specific extracted fields (error numbers, status codes, ...).
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub extracted_data: IndexMap<String, Value>,
    /// Set on the deepest entry only.
    pub is_root_cause: bool,
}

/// Walks and classifies exception chains found in captured locals.
#[derive(Debug, Clone)]
pub struct ExceptionAnalyzer {
    max_depth: usize,
}

impl Default for ExceptionAnalyzer {
    fn default() -> Self {
        Self { max_depth: DEFAULT_MAX_DEPTH }
    }
}

impl ExceptionAnalyzer {
    /// Creates an analyzer with an explicit chain depth cap.
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth: max_depth.max(1) }
    }

    /// Analyzes the exception captured in a frame's locals.
    ///
    /// Returns `None` when no `$exception`-shaped local is present. Member
    /// extraction is best effort: whatever is missing stays absent.
    pub fn analyze(&self, locals: &LocalsSnapshot) -> Option<ExceptionAnalysis> {
        let exception = locals.iter().find_map(|(name, value)| {
            EXCEPTION_LOCAL_NAMES
                .iter()
                .any(|candidate| name.eq_ignore_ascii_case(candidate))
                .then_some(value)
        })?;

        let mut chain = Vec::new();
        let mut current = Some(exception);
        while let Some(node) = current {
            if chain.len() >= self.max_depth {
                break;
            }
            let entry = flatten_level(node, chain.len());
            current = inner_exception_of(node);
            chain.push(entry);
        }
        if chain.is_empty() {
            return None;
        }

        if let Some(last) = chain.last_mut() {
            last.is_root_cause = true;
        }
        let root_cause = chain.last().map(|entry| {
            let category = classify_type(&entry.exception_type);
            let code = extracted_code(&entry.extracted_data);
            RootCause {
                exception_type: entry.exception_type.clone(),
                category,
                actionable_hint: hint_for(&entry.exception_type, code.as_deref(), category),
            }
        });

        Some(ExceptionAnalysis { chain, root_cause })
    }
}

/// Builds one chain entry from a rendered exception value.
fn flatten_level(node: &VariableValue, depth: usize) -> ExceptionChainEntry {
    let exception_type = runtime_type_of(node);
    let members = object_members(node);

    let message = members.and_then(|m| member_text(m, "Message"));
    let source = members.and_then(|m| member_text(m, "Source"));
    let throw_site = members.and_then(throw_site_of);
    let extracted_data =
        members.map(|m| extract_family_fields(&exception_type, m)).unwrap_or_default();

    ExceptionChainEntry {
        depth,
        exception_type,
        message,
        source,
        throw_site,
        extracted_data,
        is_root_cause: false,
    }
}

fn object_members(node: &VariableValue) -> Option<&IndexMap<String, VariableValue>> {
    match &node.value {
        RenderedValue::Object(members) => Some(members),
        _ => None,
    }
}

/// The runtime type: a `{...}` brace in the rendered text or the declared
/// type wins in that order, the raw text is the last resort.
fn runtime_type_of(node: &VariableValue) -> String {
    let raw = raw_text(node);
    if let Some(re) = BRACED_TYPE_RE.as_ref() {
        if let Some(captures) = raw.as_deref().and_then(|text| re.captures(text)) {
            return captures[1].to_string();
        }
        if let Some(captures) = node.type_name.as_deref().and_then(|text| re.captures(text)) {
            return captures[1].to_string();
        }
    }
    if let Some(type_name) = &node.type_name {
        return type_name.clone();
    }
    raw.unwrap_or_else(|| "Exception".to_string())
}

fn raw_text(node: &VariableValue) -> Option<String> {
    match &node.value {
        RenderedValue::Primitive(p) => Some(p.hash_text()),
        _ => None,
    }
}

fn member_text(members: &IndexMap<String, VariableValue>, name: &str) -> Option<String> {
    let member = members.get(name)?;
    match &member.value {
        RenderedValue::Primitive(Primitive::Null | Primitive::Undefined) => None,
        RenderedValue::Primitive(p) => Some(p.hash_text()),
        _ => None,
    }
}

/// The throw site: a `TargetSite`-shaped member when present, otherwise
/// the first line of the captured stack trace.
fn throw_site_of(members: &IndexMap<String, VariableValue>) -> Option<String> {
    if let Some(site) = member_text(members, "TargetSite") {
        let trimmed = site.trim_matches(|c| c == '{' || c == '}').trim().to_string();
        if !trimmed.is_empty() {
            return Some(trimmed);
        }
    }
    member_text(members, "StackTrace")
        .and_then(|trace| trace.lines().next().map(|line| line.trim().to_string()))
        .filter(|line| !line.is_empty())
}

/// Family-specific extra fields, keyed by what the member is called on the
/// exception object.
fn extract_family_fields(
    exception_type: &str,
    members: &IndexMap<String, VariableValue>,
) -> IndexMap<String, Value> {
    let segment = exception_type.rsplit('.').next().unwrap_or(exception_type);
    let field_names: &[&str] = if segment.contains("Sql") || segment.contains("Db") {
        &["Number", "State", "Class", "ErrorCode"]
    } else if segment.contains("Socket") {
        &["ErrorCode", "NativeErrorCode", "SocketErrorCode"]
    } else if segment.contains("Http") || segment.contains("Web") {
        &["StatusCode"]
    } else if segment.contains("Argument") {
        &["ParamName"]
    } else if segment.contains("File") || segment.contains("Directory") || segment.contains("Path")
    {
        &["FileName", "Path"]
    } else {
        &[]
    };

    let mut data = IndexMap::new();
    for name in field_names {
        if let Some(member) = members.get(*name) {
            if let RenderedValue::Primitive(p) = &member.value {
                if !matches!(p, Primitive::Null | Primitive::Undefined) {
                    data.insert((*name).to_string(), p.to_json());
                }
            }
        }
    }
    data
}

/// The first numeric-looking extracted field, as the composite hint key.
fn extracted_code(data: &IndexMap<String, Value>) -> Option<String> {
    const CODE_FIELDS: &[&str] = &["Number", "ErrorCode", "NativeErrorCode", "StatusCode"];
    for field in CODE_FIELDS {
        match data.get(*field) {
            Some(Value::Number(n)) => return Some(n.to_string()),
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            _ => {}
        }
    }
    None
}

/// Follows the `InnerException`-shaped member to the wrapped exception.
fn inner_exception_of(node: &VariableValue) -> Option<&VariableValue> {
    let members = object_members(node)?;
    for name in INNER_MEMBER_NAMES {
        if let Some(inner) = members.get(*name) {
            match &inner.value {
                RenderedValue::Primitive(Primitive::Null | Primitive::Undefined) => return None,
                RenderedValue::Object(_) => return Some(inner),
                // Unexpanded but typed: still worth one shallow entry.
                RenderedValue::Primitive(_) if inner.reference.is_some() => return Some(inner),
                _ => return None,
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExceptionCategory;
    use dapdrive_variables::CollectionValue;

    fn primitive(text: &str, type_name: Option<&str>) -> VariableValue {
        VariableValue::primitive(
            Primitive::parse(text, type_name),
            type_name.map(str::to_string),
        )
    }

    fn object(
        type_name: &str,
        members: Vec<(&str, VariableValue)>,
        reference: i64,
    ) -> VariableValue {
        VariableValue {
            type_name: Some(type_name.to_string()),
            value: RenderedValue::Object(
                members.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            ),
            reference: Some(reference),
            cyclic: false,
            deduplicated: false,
        }
    }

    fn locals_with_exception(exception: VariableValue) -> LocalsSnapshot {
        let mut locals = LocalsSnapshot::new();
        locals.insert("order".to_string(), primitive("Order {...}", Some("Order")));
        locals.insert("$exception".to_string(), exception);
        locals
    }

    #[test]
    fn test_missing_exception_local_yields_none() {
        let mut locals = LocalsSnapshot::new();
        locals.insert("x".to_string(), primitive("1", Some("int")));
        assert!(ExceptionAnalyzer::default().analyze(&locals).is_none());
    }

    #[test]
    fn test_two_level_chain_marks_deepest_as_root_cause() {
        let socket = object(
            "System.Exception {System.Net.Sockets.SocketException}",
            vec![
                ("Message", primitive("\"Connection refused\"", Some("string"))),
                ("NativeErrorCode", primitive("10061", Some("int"))),
                ("InnerException", primitive("null", None)),
            ],
            12,
        );
        let db = object(
            "System.Exception {DbConnectionException}",
            vec![
                ("Message", primitive("\"Could not open connection\"", Some("string"))),
                ("Source", primitive("\"OrderService\"", Some("string"))),
                ("InnerException", socket),
            ],
            11,
        );

        let analysis = ExceptionAnalyzer::default().analyze(&locals_with_exception(db)).unwrap();
        assert_eq!(analysis.chain.len(), 2);
        assert!(!analysis.chain[0].is_root_cause);
        assert!(analysis.chain[1].is_root_cause);
        assert_eq!(analysis.chain[0].exception_type, "DbConnectionException");
        assert_eq!(analysis.chain[1].exception_type, "System.Net.Sockets.SocketException");
        assert_eq!(analysis.chain[1].extracted_data["NativeErrorCode"], 10061);

        let root = analysis.root_cause.unwrap();
        assert_eq!(root.category, ExceptionCategory::Network);
        assert!(root.actionable_hint.unwrap().contains("Connection refused"));
    }

    #[test]
    fn test_chain_depth_is_capped() {
        // Five nested levels with a cap of three.
        let mut node = object("E4", vec![("Message", primitive("\"leaf\"", None))], 5);
        for (index, name) in ["E3", "E2", "E1", "E0"].iter().enumerate() {
            node = object(name, vec![("InnerException", node)], 4 - index as i64);
        }

        let analysis = ExceptionAnalyzer::new(3).analyze(&locals_with_exception(node)).unwrap();
        assert_eq!(analysis.chain.len(), 3);
        assert!(analysis.chain[2].is_root_cause);
        assert_eq!(analysis.chain.iter().filter(|e| e.is_root_cause).count(), 1);
    }

    #[test]
    fn test_braced_runtime_type_wins_over_declared() {
        let node = object(
            "System.Exception {System.IO.FileNotFoundException}",
            vec![
                ("Message", primitive("\"missing\"", Some("string"))),
                ("FileName", primitive("\"/etc/app.json\"", Some("string"))),
            ],
            7,
        );
        let analysis = ExceptionAnalyzer::default().analyze(&locals_with_exception(node)).unwrap();
        assert_eq!(analysis.chain[0].exception_type, "System.IO.FileNotFoundException");
        assert_eq!(analysis.chain[0].extracted_data["FileName"], "/etc/app.json");

        let root = analysis.root_cause.unwrap();
        assert_eq!(root.category, ExceptionCategory::FileSystem);
    }

    #[test]
    fn test_throw_site_prefers_target_site_then_stack_first_line() {
        let with_target = object(
            "InvalidOperationException",
            vec![
                ("TargetSite", primitive("{OrderService.Process}", None)),
                ("StackTrace", primitive("   at OrderService.Other() in /app/Order.cs:line 9", None)),
            ],
            3,
        );
        let analysis =
            ExceptionAnalyzer::default().analyze(&locals_with_exception(with_target)).unwrap();
        assert_eq!(analysis.chain[0].throw_site.as_deref(), Some("OrderService.Process"));

        let stack_only = object(
            "InvalidOperationException",
            vec![(
                "StackTrace",
                primitive("   at OrderService.Process() in /app/Order.cs:line 42\n   at Program.Main()", None),
            )],
            4,
        );
        let analysis =
            ExceptionAnalyzer::default().analyze(&locals_with_exception(stack_only)).unwrap();
        assert_eq!(
            analysis.chain[0].throw_site.as_deref(),
            Some("at OrderService.Process() in /app/Order.cs:line 42")
        );
    }

    #[test]
    fn test_extraction_survives_non_object_members() {
        // $exception captured shallowly: no members at all.
        let shallow = VariableValue {
            type_name: Some("System.DivideByZeroException".to_string()),
            value: RenderedValue::Collection(CollectionValue {
                element_type: None,
                count: 0,
                items: Vec::new(),
            }),
            reference: Some(9),
            cyclic: false,
            deduplicated: false,
        };
        let analysis =
            ExceptionAnalyzer::default().analyze(&locals_with_exception(shallow)).unwrap();
        assert_eq!(analysis.chain.len(), 1);
        assert_eq!(analysis.chain[0].exception_type, "System.DivideByZeroException");
        assert!(analysis.chain[0].message.is_none());
    }
}
