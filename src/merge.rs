//! Streamed message reconstruction
//!
//! Completion streams deliver a message as a series of partial fragments.
//! Text fields arrive as pieces to concatenate, nested objects arrive as
//! partial objects, and tool calls arrive tagged with the `index` of the call
//! they extend. [`merge_chunk`] folds one fragment into an accumulator and
//! hands the accumulator back, so the fold can be tested in isolation.

use serde_json::{json, Map, Value};

use crate::error::{Result, SwarmError};
use crate::types::Message;

/// One streamed fragment of a message
pub type Delta = Map<String, Value>;

const TOOL_CALLS: &str = "tool_calls";

/// Empty accumulator for an assistant message produced by `sender`
pub fn seed_message(sender: &str) -> Delta {
    let seed = json!({
        "content": "",
        "sender": sender,
        "role": "assistant",
        "function_call": null,
        "tool_calls": [],
    });
    match seed {
        Value::Object(map) => map,
        _ => Delta::new(),
    }
}

/// Recursively merge `source` into `target`.
///
/// Strings concatenate, objects recurse, missing keys start from an empty
/// value of the incoming shape. Lists are never merged here and `null`
/// never overwrites.
pub fn merge_fields(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        match value {
            Value::Null => {}
            Value::String(piece) => {
                let slot = target
                    .entry(key)
                    .or_insert_with(|| Value::String(String::new()));
                match slot {
                    Value::String(existing) => existing.push_str(&piece),
                    other => *other = Value::String(piece),
                }
            }
            Value::Object(nested) => {
                let slot = target.entry(key).or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                if let Value::Object(inner) = slot {
                    merge_fields(inner, nested);
                }
            }
            Value::Array(_) => {
                target.entry(key).or_insert_with(|| Value::Array(Vec::new()));
            }
            scalar => {
                target.insert(key, scalar);
            }
        }
    }
}

/// Fold one fragment into the accumulator and return the new accumulator.
///
/// Every tool call fragment must carry an `index` naming an existing call
/// or the next new one.
pub fn merge_chunk(mut accumulator: Delta, mut delta: Delta) -> Result<Delta> {
    delta.remove("role");
    let tool_calls = delta.remove(TOOL_CALLS);

    merge_fields(&mut accumulator, delta);

    if let Some(Value::Array(fragments)) = tool_calls {
        for fragment in fragments {
            let mut fragment = match fragment {
                Value::Object(map) => map,
                other => {
                    return Err(SwarmError::InvalidDelta(format!(
                        "tool call fragment is not an object: {other}"
                    )))
                }
            };
            let index = match fragment.remove("index") {
                Some(Value::Number(n)) => n.as_u64(),
                _ => None,
            }
            .ok_or_else(|| {
                SwarmError::InvalidDelta("tool call fragment without a valid index".into())
            })?;
            merge_tool_call(&mut accumulator, index, fragment)?;
        }
    }

    Ok(accumulator)
}

fn merge_tool_call(accumulator: &mut Delta, index: u64, fragment: Map<String, Value>) -> Result<()> {
    let slot = accumulator
        .entry(TOOL_CALLS)
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    let Value::Array(calls) = slot else {
        return Ok(());
    };

    let index = usize::try_from(index)
        .ok()
        .filter(|i| *i <= calls.len())
        .ok_or_else(|| {
            SwarmError::InvalidDelta(format!(
                "tool call index {index} skips ahead of {} known calls",
                calls.len()
            ))
        })?;
    if index == calls.len() {
        calls.push(Value::Object(Map::new()));
    }
    if !calls[index].is_object() {
        calls[index] = Value::Object(Map::new());
    }
    if let Value::Object(call) = &mut calls[index] {
        merge_fields(call, fragment);
    }
    Ok(())
}

/// Read a finished accumulator as a message. An empty tool call list
/// becomes "no tool calls".
pub fn into_message(mut accumulator: Delta) -> Result<Message> {
    let no_calls = accumulator
        .get(TOOL_CALLS)
        .and_then(Value::as_array)
        .is_some_and(Vec::is_empty);
    if no_calls {
        accumulator.insert(TOOL_CALLS.to_string(), Value::Null);
    }
    serde_json::from_value(Value::Object(accumulator)).map_err(SwarmError::InvalidMessage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::message_deltas;
    use crate::types::{Role, ToolCall};

    fn fold(deltas: Vec<Delta>) -> Delta {
        deltas
            .into_iter()
            .try_fold(seed_message("Agent"), merge_chunk)
            .unwrap()
    }

    fn delta(value: Value) -> Delta {
        match value {
            Value::Object(map) => map,
            _ => panic!("delta must be an object"),
        }
    }

    #[test]
    fn test_content_concatenates() {
        let merged = fold(vec![
            delta(json!({"role": "assistant", "content": "Hel"})),
            delta(json!({"content": "lo"})),
            delta(json!({"content": null})),
            delta(json!({"content": "!"})),
        ]);
        assert_eq!(merged["content"], "Hello!");
        assert_eq!(merged["role"], "assistant");
        assert_eq!(merged["sender"], "Agent");
    }

    #[test]
    fn test_missing_keys_start_empty() {
        let merged = merge_chunk(
            Delta::new(),
            delta(json!({"refusal": "no", "meta": {"a": "b"}, "list": [1, 2]})),
        )
        .unwrap();
        assert_eq!(merged["refusal"], "no");
        assert_eq!(merged["meta"], json!({"a": "b"}));
        assert_eq!(merged["list"], json!([]));
    }

    #[test]
    fn test_indexed_tool_calls() {
        let merged = fold(vec![
            delta(json!({"tool_calls": [{"index": 0, "id": "call_a", "type": "function",
                "function": {"name": "get_weather", "arguments": ""}}]})),
            delta(json!({"tool_calls": [{"index": 1, "id": "call_b", "type": "function",
                "function": {"name": "get_time", "arguments": ""}}]})),
            delta(json!({"tool_calls": [{"index": 0, "function": {"arguments": "{\"location\":"}}]})),
            delta(json!({"tool_calls": [{"index": 1, "function": {"arguments": "{}"}}]})),
            delta(json!({"tool_calls": [{"index": 0, "function": {"arguments": "\"Paris\"}"}}]})),
        ]);

        let message = into_message(merged).unwrap();
        assert_eq!(
            message.tool_calls.unwrap(),
            vec![
                ToolCall::new("call_a", "get_weather", "{\"location\":\"Paris\"}"),
                ToolCall::new("call_b", "get_time", "{}"),
            ]
        );
    }

    #[test]
    fn test_index_is_stripped() {
        let merged = fold(vec![delta(
            json!({"tool_calls": [{"index": 0, "id": "x", "function": {"name": "f"}}]}),
        )]);
        assert!(merged["tool_calls"][0].get("index").is_none());
    }

    #[test]
    fn test_split_matches_whole() {
        let mut message = Message::assistant("The weather in Paris is sunny, 24 degrees.");
        message.tool_calls = Some(vec![
            ToolCall::new("call_1", "get_weather", "{\"location\":\"Paris\",\"unit\":\"c\"}"),
            ToolCall::new("call_2", "transfer_to_sales", "{}"),
        ]);

        let whole = into_message(fold(message_deltas(&message, usize::MAX))).unwrap();
        for chunk_size in [1, 2, 3, 7, 64] {
            let split = into_message(fold(message_deltas(&message, chunk_size))).unwrap();
            assert_eq!(split, whole, "chunk size {chunk_size}");
        }

        assert_eq!(whole.content, message.content);
        assert_eq!(whole.tool_calls, message.tool_calls);
        assert_eq!(whole.sender.as_deref(), Some("Agent"));
    }

    #[test]
    fn test_empty_tool_calls_become_none() {
        let message = into_message(fold(vec![delta(json!({"content": "done"}))])).unwrap();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.content.as_deref(), Some("done"));
        assert!(message.tool_calls.is_none());
    }

    #[test]
    fn test_fragment_without_index_is_rejected() {
        let first = merge_chunk(
            seed_message("Agent"),
            delta(json!({"tool_calls": [{"index": 0, "id": "a",
                "function": {"name": "f", "arguments": "{}"}}]})),
        )
        .unwrap();

        let err = merge_chunk(
            first.clone(),
            delta(json!({"tool_calls": [{"id": "b", "function": {"name": "g", "arguments": "{}"}}]})),
        )
        .unwrap_err();
        assert!(matches!(err, SwarmError::InvalidDelta(_)));

        let err = merge_chunk(
            first,
            delta(json!({"tool_calls": [{"index": "1", "id": "b", "function": {"name": "g"}}]})),
        )
        .unwrap_err();
        assert!(matches!(err, SwarmError::InvalidDelta(_)));
    }

    #[test]
    fn test_index_cannot_skip_ahead() {
        let err = merge_chunk(
            seed_message("Agent"),
            delta(json!({"tool_calls": [{"index": 1, "id": "b", "function": {"name": "g"}}]})),
        )
        .unwrap_err();
        assert!(matches!(err, SwarmError::InvalidDelta(_)));

        let err = merge_chunk(
            seed_message("Agent"),
            delta(json!({"tool_calls": [{"index": u64::MAX, "function": {"name": "g"}}]})),
        )
        .unwrap_err();
        assert!(matches!(err, SwarmError::InvalidDelta(_)));
    }
}
