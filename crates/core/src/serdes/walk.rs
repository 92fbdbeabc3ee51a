//! The recursive serialize/deserialize walkers.
//!
//! Both walkers visit a node, run the matching codecs in registration order
//! until one settles the node, then descend into children. The path stack
//! is pushed before and popped after every child visit, so `ctx.path` on
//! return always equals `ctx.path` on entry.
//!
//! Owned `Value` trees cannot alias, so the classic cyclic-object hazard
//! appears here as a runaway `Replace` chain or pathological nesting; both
//! are cut off with named errors rather than hanging.

use serde_json::Value;

use crate::errors::SerializationError;

use super::codec::{CodecRegistry, CodecSignal};
use super::ctx::{DesCtx, MapAfterFn, PathSegment, SerCtx, render_path};

/// Deepest node the walkers will visit.
const MAX_DEPTH: usize = 256;

/// Longest `Replace` chain allowed on a single node.
const MAX_REPLACEMENTS: usize = 64;

pub(crate) fn serialize_walk(
    value: Value,
    ctx: &mut SerCtx,
    registry: &CodecRegistry,
) -> Result<Value, SerializationError> {
    if ctx.path.len() > MAX_DEPTH {
        return Err(SerializationError::at(
            render_path(&ctx.path),
            "maximum traversal depth exceeded (cyclic or pathological structure)",
        ));
    }

    let mut current = value;
    let mut replacements = 0usize;
    let mut recurse = true;

    'pipeline: loop {
        for (selector, codec) in registry.iter() {
            if !selector.matches_ser(&current, ctx) {
                continue;
            }
            match codec.serialize(&current, ctx)? {
                CodecSignal::Nevermind => {}
                CodecSignal::Continue(update) => {
                    if let Some(updated) = update {
                        current = updated;
                    }
                }
                CodecSignal::Replace(replacement) => {
                    replacements += 1;
                    if replacements > MAX_REPLACEMENTS {
                        return Err(SerializationError::at(
                            render_path(&ctx.path),
                            "codec replacement chain exceeded its budget (cyclic codec?)",
                        ));
                    }
                    current = replacement;
                    continue 'pipeline;
                }
                CodecSignal::Recurse(update) => {
                    if let Some(updated) = update {
                        current = updated;
                    }
                    break;
                }
                CodecSignal::Done(final_value) => {
                    current = final_value;
                    recurse = false;
                    break;
                }
            }
        }
        break;
    }

    match current {
        Value::Array(items) if recurse => {
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                ctx.path.push(PathSegment::Index(index));
                let walked = serialize_walk(item, ctx, registry);
                ctx.path.pop();
                out.push(walked?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) if recurse => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                ctx.path.push(PathSegment::Key(key.clone()));
                let walked = serialize_walk(item, ctx, registry);
                ctx.path.pop();
                out.insert(key, walked?);
            }
            Ok(Value::Object(out))
        }
        Value::Number(number) => {
            check_number_policy(&number, ctx)?;
            Ok(Value::Number(number))
        }
        settled => Ok(settled),
    }
}

pub(crate) fn deserialize_walk(
    value: Value,
    ctx: &mut DesCtx<'_>,
    registry: &CodecRegistry,
) -> Result<Value, SerializationError> {
    if ctx.path.len() > MAX_DEPTH {
        return Err(SerializationError::at(
            render_path(&ctx.path),
            "maximum traversal depth exceeded (cyclic or pathological structure)",
        ));
    }

    let after_mark = ctx.map_after.len();
    let mut current = value;
    let mut replacements = 0usize;
    let mut recurse = true;

    'pipeline: loop {
        for (selector, codec) in registry.iter() {
            if !selector.matches_des(&current, ctx) {
                continue;
            }
            match codec.deserialize(&current, ctx)? {
                CodecSignal::Nevermind => {}
                CodecSignal::Continue(update) => {
                    if let Some(updated) = update {
                        current = updated;
                    }
                }
                CodecSignal::Replace(replacement) => {
                    replacements += 1;
                    if replacements > MAX_REPLACEMENTS {
                        return Err(SerializationError::at(
                            render_path(&ctx.path),
                            "codec replacement chain exceeded its budget (cyclic codec?)",
                        ));
                    }
                    current = replacement;
                    continue 'pipeline;
                }
                CodecSignal::Recurse(update) => {
                    if let Some(updated) = update {
                        current = updated;
                    }
                    break;
                }
                CodecSignal::Done(final_value) => {
                    current = final_value;
                    recurse = false;
                    break;
                }
            }
        }
        break;
    }

    let mut result = match current {
        Value::Array(items) if recurse => {
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                ctx.path.push(PathSegment::Index(index));
                let walked = deserialize_walk(item, ctx, registry);
                ctx.path.pop();
                out.push(walked?);
            }
            Value::Array(out)
        }
        Value::Object(map) if recurse => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                ctx.path.push(PathSegment::Key(key.clone()));
                let walked = deserialize_walk(item, ctx, registry);
                ctx.path.pop();
                out.insert(key, walked?);
            }
            Value::Object(out)
        }
        settled => settled,
    };

    // Hooks registered at this node run after its children completed,
    // in registration order.
    let afters: Vec<MapAfterFn> = ctx.map_after.drain(after_mark..).collect();
    for after in afters {
        result = after(result)?;
    }

    Ok(result)
}

fn check_number_policy(
    number: &serde_json::Number,
    ctx: &SerCtx,
) -> Result<(), SerializationError> {
    if ctx.big_numbers {
        return Ok(());
    }
    let literal = number.to_string();
    let is_integer = !literal.contains(['.', 'e', 'E']);
    if is_integer && literal.parse::<i64>().is_err() && literal.parse::<u64>().is_err() {
        return Err(SerializationError::at(
            render_path(&ctx.path),
            "arbitrary-precision integer emitted while big numbers are disabled",
        ));
    }
    Ok(())
}
