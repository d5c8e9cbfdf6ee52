// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! `terraform.*` builtins. Each returns the documents of one kind of
//! top-level block of the module.
//!
//! Functions taking a `schema` compile it into the content to retrieve;
//! `options` may set `expand_mode` to `"expand"` or `"none"`.

use super::types::{self, array_of, PolicyType};
use super::{as_str, Decl, Function};
use crate::conversion::{
    blocks_to_json, json_to_option, locals_to_json, named_blocks_to_json, typed_blocks_to_json,
};
use crate::hcl::{BlockSchema, BodyContent, BodySchema, ContentBlock, Pos, Range, SchemaMode};
use crate::range::{json_to_object, range_to_json};
use crate::runner::Runner;
use crate::schema::{json_to_schema, TypeMap};

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

/// Wildcard type filter.
const ANY_TYPE: &str = "*";

fn decl(name: &str, args: Vec<PolicyType>, result: PolicyType) -> Decl {
    Decl {
        name: name.to_string(),
        args,
        result,
        memoize: true,
        nondeterministic: true,
    }
}

fn block_schema(kind: &str, label_names: &[&str], body: BodySchema) -> BlockSchema {
    BlockSchema {
        kind: kind.to_string(),
        label_names: label_names.iter().map(|l| l.to_string()).collect(),
        body,
    }
}

fn blocks_schema(blocks: Vec<BlockSchema>) -> BodySchema {
    BodySchema {
        blocks,
        ..BodySchema::default()
    }
}

fn decode_schema(schema: &Value) -> Result<(BodySchema, TypeMap)> {
    json_to_schema(json_to_object(schema, "schema")?, "schema")
}

fn module_content(runner: &dyn Runner, schema: &BodySchema, options: &Value) -> Result<BodyContent> {
    let option = json_to_option(options, "options")?;
    let option = option.expand_mode.is_some().then_some(&option);
    runner.get_module_content(schema, option)
}

fn type_matches(filter: &str, block: &ContentBlock) -> bool {
    filter == ANY_TYPE || block.labels.first().is_some_and(|l| l == filter)
}

fn typed_block_func(
    type_arg: &Value,
    schema_arg: &Value,
    options: &Value,
    block_type: &str,
    runner: &dyn Runner,
) -> Result<Value> {
    let type_name = as_str(type_arg, "type")?;
    let (schema, ty_map) = decode_schema(schema_arg)?;
    let content = module_content(
        runner,
        &blocks_schema(vec![block_schema(block_type, &["type", "name"], schema)]),
        options,
    )?;

    let blocks: Vec<ContentBlock> = content
        .blocks
        .into_iter()
        .filter(|b| type_matches(type_name, b))
        .collect();
    Ok(Value::Array(typed_blocks_to_json(&blocks, &ty_map, "schema", runner)?))
}

fn named_block_func(
    schema_arg: &Value,
    options: &Value,
    block_type: &str,
    runner: &dyn Runner,
) -> Result<Value> {
    let (schema, ty_map) = decode_schema(schema_arg)?;
    let content = module_content(
        runner,
        &blocks_schema(vec![block_schema(block_type, &["name"], schema)]),
        options,
    )?;
    Ok(Value::Array(named_blocks_to_json(&content.blocks, &ty_map, "schema", runner)?))
}

fn block_func(
    schema_arg: &Value,
    options: &Value,
    block_type: &str,
    runner: &dyn Runner,
) -> Result<Value> {
    let (schema, ty_map) = decode_schema(schema_arg)?;
    let content = module_content(
        runner,
        &blocks_schema(vec![block_schema(block_type, &[], schema)]),
        options,
    )?;
    Ok(Value::Array(blocks_to_json(&content.blocks, &ty_map, "schema", runner)?))
}

fn typed(name: &str, block_type: &'static str, runner: Arc<dyn Runner>) -> Function {
    Function::Function3(
        decl(
            name,
            vec![PolicyType::String, types::SCHEMA.clone(), types::OPTIONS.clone()],
            array_of(&types::TYPED_BLOCK),
        ),
        Arc::new(move |ty: &Value, schema: &Value, options: &Value| {
            typed_block_func(ty, schema, options, block_type, runner.as_ref())
        }),
    )
}

fn named(name: &str, block_type: &'static str, runner: Arc<dyn Runner>) -> Function {
    Function::Function2(
        decl(
            name,
            vec![types::SCHEMA.clone(), types::OPTIONS.clone()],
            array_of(&types::NAMED_BLOCK),
        ),
        Arc::new(move |schema: &Value, options: &Value| {
            named_block_func(schema, options, block_type, runner.as_ref())
        }),
    )
}

fn unlabeled(name: &str, block_type: &'static str, runner: Arc<dyn Runner>) -> Function {
    Function::Function2(
        decl(
            name,
            vec![types::SCHEMA.clone(), types::OPTIONS.clone()],
            array_of(&types::BLOCK),
        ),
        Arc::new(move |schema: &Value, options: &Value| {
            block_func(schema, options, block_type, runner.as_ref())
        }),
    )
}

/// `terraform.resources(resource_type, schema, options)`: `resource` blocks
/// as `array[typed_block]`. A type of `"*"` selects all resources.
pub fn resources(runner: Arc<dyn Runner>) -> Function {
    typed("terraform.resources", "resource", runner)
}

/// `terraform.data_sources(data_type, schema, options)`: `data` blocks,
/// including the ones scoped in `check` blocks.
pub fn data_sources(runner: Arc<dyn Runner>) -> Function {
    Function::Function3(
        decl(
            "terraform.data_sources",
            vec![PolicyType::String, types::SCHEMA.clone(), types::OPTIONS.clone()],
            array_of(&types::TYPED_BLOCK),
        ),
        Arc::new(move |ty: &Value, schema_arg: &Value, options: &Value| {
            let runner = runner.as_ref();
            let type_name = as_str(ty, "type")?;
            let (schema, ty_map) = decode_schema(schema_arg)?;
            let data = block_schema("data", &["type", "name"], schema);
            let content = module_content(
                runner,
                &blocks_schema(vec![
                    data.clone(),
                    block_schema("check", &["name"], blocks_schema(vec![data])),
                ]),
                options,
            )?;

            let mut blocks = vec![];
            for block in content.blocks {
                match block.kind.as_str() {
                    "data" if type_matches(type_name, &block) => blocks.push(block),
                    "check" => blocks.extend(
                        block
                            .body
                            .blocks
                            .into_iter()
                            .filter(|b| type_matches(type_name, b)),
                    ),
                    _ => (),
                }
            }
            Ok(Value::Array(typed_blocks_to_json(&blocks, &ty_map, "schema", runner)?))
        }),
    )
}

/// `terraform.ephemeral_resources(resource_type, schema, options)`
pub fn ephemeral_resources(runner: Arc<dyn Runner>) -> Function {
    typed("terraform.ephemeral_resources", "ephemeral", runner)
}

/// `terraform.actions(action_type, schema, options)`
pub fn actions(runner: Arc<dyn Runner>) -> Function {
    typed("terraform.actions", "action", runner)
}

/// `terraform.module_calls(schema, options)`: `module` blocks as
/// `array[named_block]`.
pub fn module_calls(runner: Arc<dyn Runner>) -> Function {
    named("terraform.module_calls", "module", runner)
}

pub fn providers(runner: Arc<dyn Runner>) -> Function {
    named("terraform.providers", "provider", runner)
}

/// `terraform.settings(schema, options)`: `terraform` blocks as
/// `array[block]`.
pub fn settings(runner: Arc<dyn Runner>) -> Function {
    unlabeled("terraform.settings", "terraform", runner)
}

pub fn variables(runner: Arc<dyn Runner>) -> Function {
    named("terraform.variables", "variable", runner)
}

pub fn outputs(runner: Arc<dyn Runner>) -> Function {
    named("terraform.outputs", "output", runner)
}

pub fn checks(runner: Arc<dyn Runner>) -> Function {
    named("terraform.checks", "check", runner)
}

/// `terraform.locals(options)`: every local value as `array[local]`.
pub fn locals(runner: Arc<dyn Runner>) -> Function {
    Function::Function1(
        decl(
            "terraform.locals",
            vec![types::OPTIONS.clone()],
            array_of(&types::LOCAL),
        ),
        Arc::new(move |options: &Value| {
            let runner = runner.as_ref();
            let schema = blocks_schema(vec![block_schema(
                "locals",
                &[],
                BodySchema {
                    mode: SchemaMode::JustAttributes,
                    ..BodySchema::default()
                },
            )]);
            let content = module_content(runner, &schema, options)?;

            let mut locals = vec![];
            for block in &content.blocks {
                locals.extend(locals_to_json(block.body.attributes.values(), runner)?);
            }
            Ok(Value::Array(locals))
        }),
    )
}

pub fn moved_blocks(runner: Arc<dyn Runner>) -> Function {
    unlabeled("terraform.moved_blocks", "moved", runner)
}

pub fn imports(runner: Arc<dyn Runner>) -> Function {
    unlabeled("terraform.imports", "import", runner)
}

pub fn removed_blocks(runner: Arc<dyn Runner>) -> Function {
    unlabeled("terraform.removed_blocks", "removed", runner)
}

/// `terraform.module_range()`: zero-width range at the start of `main.tf`
/// in the directory of the module. Useful to report missing declarations.
pub fn module_range(runner: Arc<dyn Runner>) -> Function {
    Function::FunctionDyn(
        decl("terraform.module_range", vec![], types::RANGE.clone()),
        Arc::new(move |_: &[Value]| {
            let files = runner.get_files()?;
            let dir = files
                .keys()
                .next()
                .and_then(|name| Path::new(name).parent())
                .unwrap_or_else(|| Path::new(""));
            let filename = dir.join("main.tf");

            Ok(range_to_json(&Range::new(
                filename.to_string_lossy(),
                Pos::INITIAL,
                Pos::INITIAL,
            )))
        }),
    )
}
