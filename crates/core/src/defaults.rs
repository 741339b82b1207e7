//! Process-wide default formats and directives.
//!
//! These are the second tier of every instance-level lookup: a registry
//! consults its own overrides first, then falls through to here. The
//! tables are seeded with the JSON built-ins and may be extended during
//! the single-threaded registration phase.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use serde_json::{Map, Value};

use crate::api::{ContextMap, Directive};
use crate::format::{InputFormat, OutputFormat, json_input, json_output};

static INPUT_FORMATS: OnceLock<RwLock<HashMap<String, InputFormat>>> = OnceLock::new();
static OUTPUT_FORMAT: OnceLock<RwLock<OutputFormat>> = OnceLock::new();
static DIRECTIVES: OnceLock<RwLock<HashMap<String, Directive>>> = OnceLock::new();

fn input_formats() -> &'static RwLock<HashMap<String, InputFormat>> {
    INPUT_FORMATS.get_or_init(|| {
        let mut formats = HashMap::new();
        formats.insert("application/json".to_string(), json_input());
        RwLock::new(formats)
    })
}

fn output_format_slot() -> &'static RwLock<OutputFormat> {
    OUTPUT_FORMAT.get_or_init(|| RwLock::new(json_output()))
}

fn directive_table() -> &'static RwLock<HashMap<String, Directive>> {
    DIRECTIVES.get_or_init(|| {
        let mut directives: HashMap<String, Directive> = HashMap::new();
        // Built-in: expose the owning registry's context map as a value.
        directives.insert(
            "context".to_string(),
            Arc::new(|ctx: &ContextMap| {
                Value::Object(ctx.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Map<_, _>>())
            }),
        );
        RwLock::new(directives)
    })
}

/// The process-default decoder for `content_type`, if one is registered.
pub fn input_format(content_type: &str) -> Option<InputFormat> {
    input_formats()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(content_type)
        .cloned()
}

/// Registers a process-default decoder for `content_type`.
pub fn register_input_format(content_type: &str, handler: InputFormat) {
    input_formats()
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .insert(content_type.to_string(), handler);
}

/// The process-default encoder.
pub fn output_format() -> OutputFormat {
    output_format_slot()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}

/// Replaces the process-default encoder.
pub fn set_output_format(format: OutputFormat) {
    *output_format_slot().write().unwrap_or_else(|e| e.into_inner()) = format;
}

/// Snapshot of the process-default directives.
pub fn directives() -> HashMap<String, Directive> {
    directive_table()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}

/// One process-default directive by name.
pub fn directive(name: &str) -> Option<Directive> {
    directive_table()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(name)
        .cloned()
}

/// Registers a process-default directive.
pub fn register_directive(name: &str, directive: Directive) {
    directive_table()
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .insert(name.to_string(), directive);
}
