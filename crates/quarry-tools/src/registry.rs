use std::fmt::Write;

/// One tool advertised to the model: id, prose description and parameter schema.
#[derive(Debug, Clone)]
pub struct ToolDef {
    pub id: &'static str,
    pub description: &'static str,
    pub schema: schemars::Schema,
}

#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDef>,
}

impl ToolRegistry {
    #[must_use]
    pub fn from_definitions(tools: Vec<ToolDef>) -> Self {
        Self { tools }
    }

    #[must_use]
    pub fn tools(&self) -> &[ToolDef] {
        &self.tools
    }

    #[must_use]
    pub fn find(&self, id: &str) -> Option<&ToolDef> {
        self.tools.iter().find(|t| t.id == id)
    }

    /// Render every tool as a prompt fragment.
    #[must_use]
    pub fn format_for_prompt(&self) -> String {
        let mut out = String::from("<tools>\n");
        for tool in &self.tools {
            format_tool(&mut out, tool);
        }
        out.push_str("</tools>");
        out
    }

    /// Tool definitions in the JSON shape function-calling APIs expect.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.id,
                        "description": t.description,
                        "parameters": t.schema,
                    })
                })
                .collect(),
        )
    }
}

fn format_tool(out: &mut String, tool: &ToolDef) {
    let _ = writeln!(out, "## {}", tool.id);
    let _ = writeln!(out, "{}", tool.description);
    let _ = writeln!(
        out,
        "Invocation: use tool_call with {{\"tool_id\": \"{}\", \"params\": {{...}}}}",
        tool.id
    );
    let params = param_docs(&tool.schema);
    if !params.is_empty() {
        let _ = writeln!(out, "Parameters:");
        for p in params {
            let req = if p.required { "required" } else { "optional" };
            let _ = writeln!(out, "  - {}: {} ({}, {req})", p.name, p.description, p.ty);
        }
    }
    out.push('\n');
}

/// One top-level property of a tool's parameter schema.
struct ParamDoc<'a> {
    name: &'a str,
    ty: &'a str,
    description: &'a str,
    required: bool,
}

fn param_docs(schema: &schemars::Schema) -> Vec<ParamDoc<'_>> {
    let Some(obj) = schema.as_object() else {
        return Vec::new();
    };
    let Some(props) = obj.get("properties").and_then(serde_json::Value::as_object) else {
        return Vec::new();
    };
    let required = obj
        .get("required")
        .and_then(serde_json::Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    props
        .iter()
        .map(|(name, prop)| ParamDoc {
            name,
            ty: prop_type(prop).unwrap_or("string"),
            description: prop
                .get("description")
                .and_then(serde_json::Value::as_str)
                .unwrap_or(""),
            required: required.iter().any(|r| r.as_str() == Some(name.as_str())),
        })
        .collect()
}

/// The declared type, skipping `null` in the `["T", "null"]` and
/// `anyOf: [{T}, {null}]` shapes schemars emits for `Option<T>`.
fn prop_type(prop: &serde_json::Value) -> Option<&str> {
    let not_null = |t: &&str| *t != "null";
    match prop.get("type") {
        Some(serde_json::Value::String(t)) => Some(t.as_str()),
        Some(serde_json::Value::Array(types)) => {
            types.iter().filter_map(serde_json::Value::as_str).find(not_null)
        }
        _ => prop
            .get("anyOf")?
            .as_array()?
            .iter()
            .filter_map(|v| v.get("type")?.as_str())
            .find(not_null),
    }
}
