//! Request bodies accepted by the agent bridge, plus their validation.
//!
//! Validation walks the raw JSON and collects every problem with its path
//! (`messages[0].role`, `workflow.graph.nodes[1].agent.name`, ...) before the
//! body is deserialized into the typed request.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BridgeError, ValidationIssue};

/// One chat turn forwarded to the agent. Unknown fields are preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            extra: Map::new(),
        }
    }
}

/// Agent definition understood by the swarm runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functions: Option<Vec<Value>>,
    /// Either a tool name or a tool-choice object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            model: None,
            functions: None,
            tool_choice: None,
            parallel_tool_calls: None,
            extra: Map::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Normalized body of `POST /api/ai/swarm`, as written to the agent's stdin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmRequest {
    pub messages: Vec<ChatTurn>,
    #[serde(default)]
    pub context_variables: Map<String, Value>,
    pub agent: AgentSpec,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    pub name: String,
    pub description: String,
    pub agent: AgentSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowGraph {
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
    pub entry_node: String,
    pub exit_node: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    pub description: String,
    pub graph: WorkflowGraph,
}

/// Normalized body of `POST /api/ai/swarm/langgraph`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanggraphRequest {
    pub workflow: Workflow,
    pub input: String,
    #[serde(default)]
    pub context_variables: Map<String, Value>,
    #[serde(default)]
    pub stream: bool,
}

/// Anything the bridge can hand to an agent script.
pub trait AgentRequest: Serialize + Send + Sync {
    fn is_streaming(&self) -> bool;
}

impl AgentRequest for SwarmRequest {
    fn is_streaming(&self) -> bool {
        self.stream
    }
}

impl AgentRequest for LanggraphRequest {
    fn is_streaming(&self) -> bool {
        self.stream
    }
}

// ── Validation ──────────────────────────────────────────────────────

impl SwarmRequest {
    pub fn from_value(body: Value) -> Result<Self, BridgeError> {
        let mut v = Validator::default();
        let Some(obj) = v.object(&body, "") else {
            return Err(v.finish());
        };

        match obj.get("messages") {
            Some(Value::Array(items)) if !items.is_empty() => {
                for (i, item) in items.iter().enumerate() {
                    let path = format!("messages[{i}]");
                    if let Some(turn) = v.object(item, &path) {
                        v.string(turn, &path, "role");
                        v.string(turn, &path, "content");
                    }
                }
            }
            Some(Value::Array(_)) => v.issue("messages", "Must contain at least one message"),
            Some(_) => v.issue("messages", "Expected array"),
            None => v.issue("messages", "Required"),
        }

        match obj.get("agent") {
            Some(agent) => {
                if let Some(agent) = v.object(agent, "agent") {
                    v.agent(agent, "agent");
                }
            }
            None => v.issue("agent", "Required"),
        }

        v.optional_object(obj, "", "context_variables");
        v.optional_bool(obj, "", "stream");
        v.into_typed(body)
    }
}

impl LanggraphRequest {
    pub fn from_value(body: Value) -> Result<Self, BridgeError> {
        let mut v = Validator::default();
        let Some(obj) = v.object(&body, "") else {
            return Err(v.finish());
        };

        match obj.get("workflow") {
            Some(workflow) => {
                if let Some(workflow) = v.object(workflow, "workflow") {
                    v.string(workflow, "workflow", "name");
                    v.string(workflow, "workflow", "description");
                    match workflow.get("graph") {
                        Some(graph) => {
                            if let Some(graph) = v.object(graph, "workflow.graph") {
                                v.graph(graph, "workflow.graph");
                            }
                        }
                        None => v.issue("workflow.graph", "Required"),
                    }
                }
            }
            None => v.issue("workflow", "Required"),
        }

        v.string(obj, "", "input");
        v.optional_object(obj, "", "context_variables");
        v.optional_bool(obj, "", "stream");
        v.into_typed(body)
    }
}

#[derive(Default)]
struct Validator {
    issues: Vec<ValidationIssue>,
}

fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

impl Validator {
    fn issue(&mut self, path: impl Into<String>, message: &str) {
        self.issues.push(ValidationIssue::new(path, message));
    }

    fn object<'a>(&mut self, value: &'a Value, path: &str) -> Option<&'a Map<String, Value>> {
        match value.as_object() {
            Some(obj) => Some(obj),
            None => {
                self.issue(path, "Expected object");
                None
            }
        }
    }

    fn string(&mut self, obj: &Map<String, Value>, parent: &str, key: &str) {
        match obj.get(key) {
            Some(Value::String(_)) => {}
            Some(_) => self.issue(join(parent, key), "Expected string"),
            None => self.issue(join(parent, key), "Required"),
        }
    }

    fn optional_string(&mut self, obj: &Map<String, Value>, parent: &str, key: &str) {
        if obj.get(key).is_some_and(|value| !value.is_string()) {
            self.issue(join(parent, key), "Expected string");
        }
    }

    fn optional_bool(&mut self, obj: &Map<String, Value>, parent: &str, key: &str) {
        if obj.get(key).is_some_and(|value| !value.is_boolean()) {
            self.issue(join(parent, key), "Expected boolean");
        }
    }

    fn optional_object(&mut self, obj: &Map<String, Value>, parent: &str, key: &str) {
        if obj.get(key).is_some_and(|value| !value.is_object()) {
            self.issue(join(parent, key), "Expected object");
        }
    }

    fn optional_string_array(&mut self, obj: &Map<String, Value>, parent: &str, key: &str) {
        match obj.get(key) {
            None => {}
            Some(Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    if !item.is_string() {
                        self.issue(format!("{}[{i}]", join(parent, key)), "Expected string");
                    }
                }
            }
            Some(_) => self.issue(join(parent, key), "Expected array"),
        }
    }

    fn agent(&mut self, agent: &Map<String, Value>, path: &str) {
        self.string(agent, path, "name");
        self.string(agent, path, "instructions");
        self.optional_string(agent, path, "model");
        if agent.get("functions").is_some_and(|f| !f.is_array()) {
            self.issue(join(path, "functions"), "Expected array");
        }
        if agent
            .get("tool_choice")
            .is_some_and(|c| !(c.is_string() || c.is_object()))
        {
            self.issue(join(path, "tool_choice"), "Expected string or object");
        }
        self.optional_bool(agent, path, "parallel_tool_calls");
    }

    fn graph(&mut self, graph: &Map<String, Value>, path: &str) {
        match graph.get("nodes") {
            Some(Value::Array(nodes)) => {
                for (i, node) in nodes.iter().enumerate() {
                    let node_path = format!("{path}.nodes[{i}]");
                    let Some(node) = self.object(node, &node_path) else {
                        continue;
                    };
                    self.string(node, &node_path, "id");
                    self.string(node, &node_path, "name");
                    self.string(node, &node_path, "description");
                    match node.get("agent") {
                        Some(agent) => {
                            let agent_path = join(&node_path, "agent");
                            if let Some(agent) = self.object(agent, &agent_path) {
                                self.agent(agent, &agent_path);
                            }
                        }
                        None => self.issue(join(&node_path, "agent"), "Required"),
                    }
                    self.optional_string_array(node, &node_path, "next");
                    self.optional_string(node, &node_path, "condition");
                }
            }
            Some(_) => self.issue(join(path, "nodes"), "Expected array"),
            None => self.issue(join(path, "nodes"), "Required"),
        }

        match graph.get("edges") {
            Some(Value::Array(edges)) => {
                for (i, edge) in edges.iter().enumerate() {
                    let edge_path = format!("{path}.edges[{i}]");
                    if let Some(edge) = self.object(edge, &edge_path) {
                        self.string(edge, &edge_path, "from");
                        self.string(edge, &edge_path, "to");
                        self.optional_string(edge, &edge_path, "condition");
                    }
                }
            }
            Some(_) => self.issue(join(path, "edges"), "Expected array"),
            None => self.issue(join(path, "edges"), "Required"),
        }

        self.string(graph, path, "entryNode");
        self.string(graph, path, "exitNode");
    }

    fn finish(self) -> BridgeError {
        BridgeError::Validation(self.issues)
    }

    fn into_typed<T: serde::de::DeserializeOwned>(self, body: Value) -> Result<T, BridgeError> {
        if !self.issues.is_empty() {
            return Err(self.finish());
        }
        serde_json::from_value(body)
            .map_err(|e| BridgeError::Validation(vec![ValidationIssue::new("", e.to_string())]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issues(err: BridgeError) -> Vec<ValidationIssue> {
        match err {
            BridgeError::Validation(issues) => issues,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    fn paths(err: BridgeError) -> Vec<String> {
        issues(err).into_iter().map(|i| i.path).collect()
    }

    #[test]
    fn swarm_request_normalizes_defaults() {
        let req = SwarmRequest::from_value(json!({
            "messages": [{"role": "user", "content": "hi", "name": "ana"}],
            "agent": {"name": "Helper", "instructions": "Be nice", "temperature": 0.2}
        }))
        .unwrap();

        assert!(!req.stream);
        assert!(req.context_variables.is_empty());

        let wire = serde_json::to_value(&req).unwrap();
        assert_eq!(wire["context_variables"], json!({}));
        assert_eq!(wire["stream"], json!(false));
        assert_eq!(wire["messages"][0]["name"], "ana");
        assert_eq!(wire["agent"]["temperature"], json!(0.2));
        assert!(wire["agent"].get("model").is_none());
    }

    #[test]
    fn missing_agent_is_reported() {
        let err = SwarmRequest::from_value(json!({
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap_err();
        assert_eq!(paths(err), vec!["agent"]);
    }

    #[test]
    fn empty_messages_are_rejected() {
        let err = SwarmRequest::from_value(json!({
            "messages": [],
            "agent": {"name": "a", "instructions": "b"}
        }))
        .unwrap_err();
        assert_eq!(paths(err), vec!["messages"]);
    }

    #[test]
    fn all_problems_are_collected() {
        let err = SwarmRequest::from_value(json!({
            "messages": [{"role": 1}],
            "agent": {"name": "a", "tool_choice": 5},
            "stream": "yes"
        }))
        .unwrap_err();
        let p = paths(err);
        assert!(p.contains(&"messages[0].role".to_string()));
        assert!(p.contains(&"messages[0].content".to_string()));
        assert!(p.contains(&"agent.instructions".to_string()));
        assert!(p.contains(&"agent.tool_choice".to_string()));
        assert!(p.contains(&"stream".to_string()));
    }

    #[test]
    fn non_object_body_is_rejected() {
        let err = SwarmRequest::from_value(json!([1, 2])).unwrap_err();
        assert_eq!(issues(err)[0].message, "Expected object");
    }

    fn workflow_body() -> Value {
        json!({
            "workflow": {
                "name": "triage",
                "description": "route tickets",
                "graph": {
                    "nodes": [{
                        "id": "n1",
                        "name": "Router",
                        "description": "routes",
                        "agent": {"name": "router", "instructions": "route", "tool_choice": {"type": "auto"}},
                        "next": ["n2"]
                    }],
                    "edges": [{"from": "n1", "to": "n2"}],
                    "entryNode": "n1",
                    "exitNode": "n2"
                }
            },
            "input": "my printer is on fire",
            "stream": true
        })
    }

    #[test]
    fn langgraph_request_parses() {
        let req = LanggraphRequest::from_value(workflow_body()).unwrap();
        assert!(req.is_streaming());
        assert_eq!(req.workflow.graph.entry_node, "n1");
        assert_eq!(req.workflow.graph.nodes[0].next.as_deref(), Some(&["n2".to_string()][..]));

        let wire = serde_json::to_value(&req).unwrap();
        assert_eq!(wire["workflow"]["graph"]["exitNode"], "n2");
        assert_eq!(wire["context_variables"], json!({}));
    }

    #[test]
    fn langgraph_reports_nested_paths() {
        let mut body = workflow_body();
        body["workflow"]["graph"]["nodes"][0]["agent"]
            .as_object_mut()
            .unwrap()
            .remove("instructions");
        body["workflow"]["graph"]["edges"][0]["to"] = json!(3);
        body.as_object_mut().unwrap().remove("input");

        let p = paths(LanggraphRequest::from_value(body).unwrap_err());
        assert_eq!(
            p,
            vec![
                "workflow.graph.nodes[0].agent.instructions",
                "workflow.graph.edges[0].to",
                "input",
            ]
        );
    }
}
