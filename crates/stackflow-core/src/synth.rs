//! Template synthesis
//!
//! Renders each unit into a CloudFormation template. Handles into the same
//! unit become `Ref`/`Fn::GetAtt`; handles into an upstream unit become
//! `Fn::ImportValue` and the upstream unit gains a matching export output.

use crate::app::App;
use crate::assembly::{Assembly, SynthesizedUnit};
use crate::error::Result;
use crate::model::{Attribute, Handle, Prop, Resource, Unit};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Synthesize every unit of the app in deployment order
pub fn synthesize(app: &App) -> Result<Assembly> {
    let graph = app.dependency_graph();
    let order = app.deployment_order()?;

    // Exports each producer unit has to publish
    let mut exports: BTreeMap<&str, BTreeSet<&Handle>> = BTreeMap::new();
    for unit in &order {
        for handle in unit.foreign_handles() {
            exports.entry(handle.unit()).or_default().insert(handle);
        }
    }

    let mut units = Vec::with_capacity(order.len());
    for unit in order {
        let unit_exports = exports.get(unit.id()).cloned().unwrap_or_default();
        let template = render_unit(unit, &unit_exports);
        debug!(
            unit = %unit.id(),
            resources = unit.resources().len(),
            exports = unit_exports.len(),
            "Rendered template"
        );
        units.push(SynthesizedUnit {
            id: unit.id().to_string(),
            target: unit.target().clone(),
            dependencies: graph.dependencies_of(unit.id()),
            template,
        });
    }

    info!(units = units.len(), "Synthesis complete");
    Ok(Assembly { units })
}

/// Output key generated for an exported handle
pub fn export_output_id(handle: &Handle) -> String {
    match handle.attribute() {
        Attribute::Ref => format!("ExportsOutputRef{}", handle.logical_id()),
        Attribute::GetAtt(attr) => format!(
            "ExportsOutputFnGetAtt{}{}",
            handle.logical_id(),
            alphanumeric(attr)
        ),
    }
}

/// Export name consumers import through `Fn::ImportValue`
pub fn export_name(handle: &Handle) -> String {
    format!("{}:{}", handle.unit(), export_output_id(handle))
}

fn alphanumeric(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

fn render_unit(unit: &Unit, exports: &BTreeSet<&Handle>) -> Value {
    let mut template = Map::new();
    template.insert(
        "AWSTemplateFormatVersion".to_string(),
        json!(TEMPLATE_FORMAT_VERSION),
    );
    if let Some(description) = unit.description() {
        template.insert("Description".to_string(), json!(description));
    }

    let mut resources = Map::new();
    for resource in unit.resources() {
        resources.insert(
            resource.logical_id().to_string(),
            render_resource(unit, resource),
        );
    }
    template.insert("Resources".to_string(), Value::Object(resources));

    let mut outputs = Map::new();
    for (name, output) in unit.outputs() {
        let mut rendered = Map::new();
        if let Some(description) = &output.description {
            rendered.insert("Description".to_string(), json!(description));
        }
        rendered.insert("Value".to_string(), render_prop(unit, &output.value));
        if let Some(export) = &output.export_name {
            rendered.insert("Export".to_string(), json!({ "Name": export }));
        }
        outputs.insert(name.clone(), Value::Object(rendered));
    }
    for handle in exports {
        outputs.insert(
            export_output_id(handle),
            json!({
                "Value": render_local(handle),
                "Export": { "Name": export_name(handle) },
            }),
        );
    }
    if !outputs.is_empty() {
        template.insert("Outputs".to_string(), Value::Object(outputs));
    }

    Value::Object(template)
}

fn render_resource(unit: &Unit, resource: &Resource) -> Value {
    let mut rendered = Map::new();
    rendered.insert("Type".to_string(), json!(resource.resource_type()));

    if !resource.properties().is_empty() {
        let properties: Map<String, Value> = resource
            .properties()
            .iter()
            .map(|(k, v)| (k.clone(), render_prop(unit, v)))
            .collect();
        rendered.insert("Properties".to_string(), Value::Object(properties));
    }

    if !resource.dependencies().is_empty() {
        let mut deps: Vec<&String> = resource.dependencies().iter().collect();
        deps.sort();
        rendered.insert("DependsOn".to_string(), json!(deps));
    }

    Value::Object(rendered)
}

fn render_prop(unit: &Unit, prop: &Prop) -> Value {
    match prop {
        Prop::Null => Value::Null,
        Prop::Bool(b) => json!(b),
        Prop::Integer(i) => json!(i),
        Prop::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Prop::String(s) => json!(s),
        Prop::List(items) => Value::Array(items.iter().map(|p| render_prop(unit, p)).collect()),
        Prop::Map(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_prop(unit, v)))
                .collect(),
        ),
        Prop::Handle(handle) if handle.unit() == unit.id() => render_local(handle),
        Prop::Handle(handle) => json!({ "Fn::ImportValue": export_name(handle) }),
        Prop::Foreign(foreign) => json!(foreign.value()),
        Prop::Join(delimiter, parts) => {
            let parts: Vec<Value> = parts.iter().map(|p| render_prop(unit, p)).collect();
            json!({ "Fn::Join": [delimiter, parts] })
        }
        Prop::Base64(inner) => json!({ "Fn::Base64": render_prop(unit, inner) }),
    }
}

fn render_local(handle: &Handle) -> Value {
    match handle.attribute() {
        Attribute::Ref => json!({ "Ref": handle.logical_id() }),
        Attribute::GetAtt(attr) => json!({ "Fn::GetAtt": [handle.logical_id(), attr] }),
    }
}
