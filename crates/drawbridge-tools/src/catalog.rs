//! Static catalog of drawing/layout operations.

use serde::Serialize;
use serde_json::{json, Value};

/// The one registry entry handled locally instead of being relayed: returns
/// and atomically clears the most recent free-text message typed on the
/// canvas side.
pub const CANVAS_MESSAGE_TOOL: &str = "get_and_clear_last_canvas_message";

/// One catalog entry as exposed to tool-calling clients.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl ToolSpec {
    fn new(name: &str, description: &str, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Registry of available drawing tools.
pub struct ToolCatalog {
    tools: Vec<ToolSpec>,
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self {
            tools: builtin_specs(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.tools
    }

    /// Entries for the stdio `tools/list` response.
    pub fn to_registry_entries(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "inputSchema": t.input_schema,
                })
            })
            .collect()
    }

    /// Function-tool definitions for the remote completion endpoint.
    /// The handoff-message tool is excluded: it is a client-side affordance,
    /// not something the remote planner should call.
    pub fn to_function_tools(&self) -> Vec<Value> {
        self.tools
            .iter()
            .filter(|t| t.name != CANVAS_MESSAGE_TOOL)
            .map(|t| {
                json!({
                    "type": "function",
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.input_schema,
                })
            })
            .collect()
    }
}

fn color_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "r": { "type": "number", "minimum": 0, "maximum": 1 },
            "g": { "type": "number", "minimum": 0, "maximum": 1 },
            "b": { "type": "number", "minimum": 0, "maximum": 1 },
            "a": { "type": "number", "minimum": 0, "maximum": 1 }
        },
        "required": ["r", "g", "b"]
    })
}

fn builtin_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new(
            "create_frame",
            "Create a frame (container) node on the canvas. Returns the new node's id.",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Layer name" },
                    "x": { "type": "number" },
                    "y": { "type": "number" },
                    "width": { "type": "number" },
                    "height": { "type": "number" },
                    "parentId": { "type": "string", "description": "Id of the parent node; omit for page root" }
                },
                "required": ["x", "y", "width", "height"]
            }),
        ),
        ToolSpec::new(
            "create_rectangle",
            "Create a rectangle node. Returns the new node's id.",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "x": { "type": "number" },
                    "y": { "type": "number" },
                    "width": { "type": "number" },
                    "height": { "type": "number" },
                    "parentId": { "type": "string" }
                },
                "required": ["x", "y", "width", "height"]
            }),
        ),
        ToolSpec::new(
            "create_text",
            "Create a text node with the given content. Returns the new node's id.",
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "x": { "type": "number" },
                    "y": { "type": "number" },
                    "text": { "type": "string" },
                    "fontSize": { "type": "number" },
                    "fontWeight": { "type": "number", "description": "100..900" },
                    "fontColor": color_schema(),
                    "parentId": { "type": "string" }
                },
                "required": ["x", "y", "text"]
            }),
        ),
        ToolSpec::new(
            "set_fill_color",
            "Set the solid fill color of a node.",
            json!({
                "type": "object",
                "properties": {
                    "nodeId": { "type": "string" },
                    "r": { "type": "number", "minimum": 0, "maximum": 1 },
                    "g": { "type": "number", "minimum": 0, "maximum": 1 },
                    "b": { "type": "number", "minimum": 0, "maximum": 1 },
                    "a": { "type": "number", "minimum": 0, "maximum": 1 }
                },
                "required": ["nodeId", "r", "g", "b"]
            }),
        ),
        ToolSpec::new(
            "set_stroke_color",
            "Set the stroke color and optional weight of a node.",
            json!({
                "type": "object",
                "properties": {
                    "nodeId": { "type": "string" },
                    "r": { "type": "number", "minimum": 0, "maximum": 1 },
                    "g": { "type": "number", "minimum": 0, "maximum": 1 },
                    "b": { "type": "number", "minimum": 0, "maximum": 1 },
                    "a": { "type": "number", "minimum": 0, "maximum": 1 },
                    "weight": { "type": "number", "minimum": 0 }
                },
                "required": ["nodeId", "r", "g", "b"]
            }),
        ),
        ToolSpec::new(
            "set_corner_radius",
            "Set the corner radius of a node.",
            json!({
                "type": "object",
                "properties": {
                    "nodeId": { "type": "string" },
                    "radius": { "type": "number", "minimum": 0 }
                },
                "required": ["nodeId", "radius"]
            }),
        ),
        ToolSpec::new(
            "set_text_content",
            "Replace the text content of an existing text node.",
            json!({
                "type": "object",
                "properties": {
                    "nodeId": { "type": "string" },
                    "text": { "type": "string" }
                },
                "required": ["nodeId", "text"]
            }),
        ),
        ToolSpec::new(
            "move_node",
            "Move a node to a new position.",
            json!({
                "type": "object",
                "properties": {
                    "nodeId": { "type": "string" },
                    "x": { "type": "number" },
                    "y": { "type": "number" }
                },
                "required": ["nodeId", "x", "y"]
            }),
        ),
        ToolSpec::new(
            "resize_node",
            "Resize a node.",
            json!({
                "type": "object",
                "properties": {
                    "nodeId": { "type": "string" },
                    "width": { "type": "number", "minimum": 0 },
                    "height": { "type": "number", "minimum": 0 }
                },
                "required": ["nodeId", "width", "height"]
            }),
        ),
        ToolSpec::new(
            "delete_node",
            "Delete a node from the canvas.",
            json!({
                "type": "object",
                "properties": {
                    "nodeId": { "type": "string" }
                },
                "required": ["nodeId"]
            }),
        ),
        ToolSpec::new(
            "get_selection",
            "Get the ids of the currently selected nodes.",
            json!({ "type": "object", "properties": {} }),
        ),
        ToolSpec::new(
            "get_node_info",
            "Get position, size, and style information for a node.",
            json!({
                "type": "object",
                "properties": {
                    "nodeId": { "type": "string" }
                },
                "required": ["nodeId"]
            }),
        ),
        ToolSpec::new(
            "export_node_as_image",
            "Export a node as an image and return it base64-encoded.",
            json!({
                "type": "object",
                "properties": {
                    "nodeId": { "type": "string" },
                    "format": { "type": "string", "enum": ["PNG", "JPG", "SVG"] }
                },
                "required": ["nodeId"]
            }),
        ),
        ToolSpec::new(
            CANVAS_MESSAGE_TOOL,
            "Return and clear the most recent request typed by the user on the canvas side. Empty result when no message is waiting.",
            json!({ "type": "object", "properties": {} }),
        ),
    ]
}
