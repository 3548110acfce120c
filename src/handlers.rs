//! Operation handlers and the error translator wrapped around them.
//!
//! A handler is a plain function that runs one store operation and returns the
//! operation-specific part of the payload. [`translate`] turns a handler into
//! a total function `(store, operation) -> Completion`: the request identity is
//! merged into every payload, store errors become classified outcomes, and a
//! panicking handler becomes an internal error instead of unwinding into the
//! worker loop.

use crate::operation::{Completion, OpKind, Operation, Outcome};
use crate::store::{GraphError, GraphResult, GraphStore};
use serde_json::{Map, Value, json};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// A raw handler: may fail with a store error.
pub type Handler<S> = fn(&mut S, &Operation) -> GraphResult<Value>;

/// The dispatch table.
pub fn handler_for<S: GraphStore + ?Sized>(kind: OpKind) -> Handler<S> {
    match kind {
        OpKind::Count => count,
        OpKind::AddNode => add_node,
        OpKind::RemoveNode => remove_node,
        OpKind::AddEdge => add_edge,
        OpKind::RemoveEdge => remove_edge,
        OpKind::GetNode => get_node,
        OpKind::GetEdge => get_edge,
        OpKind::BatchNodes => batch_nodes,
        OpKind::BatchEdges => batch_edges,
        OpKind::GetNeighbors => get_neighbors,
        OpKind::SetNeighbors => set_neighbors,
        OpKind::GetPredecessors => get_predecessors,
        OpKind::SetPredecessors => set_predecessors,
        OpKind::Shutdown => shutdown,
    }
}

/// Wrap a handler so it can never fail or unwind.
pub fn translate<S: GraphStore + ?Sized>(handler: Handler<S>) -> impl Fn(&mut S, &Operation) -> Completion {
    move |store: &mut S, operation: &Operation| match panic::catch_unwind(AssertUnwindSafe(|| handler(store, operation))) {
        Ok(Ok(payload)) => Completion::success(merge(operation.identity(), payload)),
        Ok(Err(e)) => error_completion(operation, &e),
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            log::error!("Handler for {} panicked: {}", operation.kind().name(), message);
            error_completion(operation, &GraphError::internal(message))
        }
    }
}

/// Outcome class for a store error.
pub fn classify(error: &GraphError) -> Outcome {
    match error {
        GraphError::NodeNotFound(_) | GraphError::EdgeNotFound { .. } => Outcome::NotFound,
        GraphError::InvalidKey { .. } => Outcome::InvalidInput,
        GraphError::Internal(_) => Outcome::InternalError,
    }
}

fn error_completion(operation: &Operation, error: &GraphError) -> Completion {
    let outcome = classify(error);
    match outcome {
        Outcome::InternalError => log::warn!("{} failed: {}", operation.kind().name(), error),
        _ => log::debug!("{} rejected: {}", operation.kind().name(), error),
    }

    let mut payload = json!({ "error": error.to_string() });
    if let Some(flag) = negative_flag(operation.kind()) {
        payload[flag] = Value::Bool(false);
    }
    Completion::failure(outcome, merge(operation.identity(), payload))
}

/// The flag a failed operation reports as false.
fn negative_flag(kind: OpKind) -> Option<&'static str> {
    match kind {
        OpKind::GetNode | OpKind::GetEdge | OpKind::GetNeighbors | OpKind::GetPredecessors => Some("found"),
        OpKind::RemoveNode | OpKind::RemoveEdge => Some("removed"),
        OpKind::AddNode | OpKind::AddEdge => Some("created"),
        OpKind::SetNeighbors | OpKind::SetPredecessors => Some("success"),
        OpKind::Count | OpKind::BatchNodes | OpKind::BatchEdges | OpKind::Shutdown => None,
    }
}

/// Merge the fields of `extra` into `base`; `extra` wins on conflicts.
fn merge(base: Value, extra: Value) -> Value {
    match (base, extra) {
        (Value::Object(mut base), Value::Object(extra)) => {
            base.extend(extra);
            Value::Object(base)
        }
        (Value::Object(base), extra) if base.is_empty() => extra,
        (base, Value::Object(extra)) if extra.is_empty() => base,
        (base, extra) => {
            let mut map = Map::new();
            map.insert("request".to_string(), base);
            map.insert("result".to_string(), extra);
            Value::Object(map)
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

fn mismatch(operation: &Operation) -> GraphError {
    GraphError::internal(format!("no handler for {}", operation.kind().name()))
}

fn count<S: GraphStore + ?Sized>(store: &mut S, _operation: &Operation) -> GraphResult<Value> {
    let counts = store.counts()?;
    Ok(json!({
        "nodes_count": counts.nodes_count,
        "edges_count": counts.edges_count,
        "avg_degree": counts.avg_degree,
    }))
}

fn add_node<S: GraphStore + ?Sized>(store: &mut S, operation: &Operation) -> GraphResult<Value> {
    let Operation::AddNode { node } = operation else {
        return Err(mismatch(operation));
    };
    let created = store.add_node(node)?;
    let record = store.node(node)?;
    Ok(json!({
        "index": record.index,
        "created_at": record.created_at,
        "created": created,
    }))
}

fn remove_node<S: GraphStore + ?Sized>(store: &mut S, operation: &Operation) -> GraphResult<Value> {
    let Operation::RemoveNode { node } = operation else {
        return Err(mismatch(operation));
    };
    store.remove_node(node)?;
    Ok(json!({ "removed": true }))
}

fn add_edge<S: GraphStore + ?Sized>(store: &mut S, operation: &Operation) -> GraphResult<Value> {
    let Operation::AddEdge { source, target } = operation else {
        return Err(mismatch(operation));
    };
    let created = store.add_edge(source, target)?;
    Ok(json!({ "created": created }))
}

fn remove_edge<S: GraphStore + ?Sized>(store: &mut S, operation: &Operation) -> GraphResult<Value> {
    let Operation::RemoveEdge { source, target } = operation else {
        return Err(mismatch(operation));
    };
    store.remove_edge(source, target)?;
    Ok(json!({ "removed": true }))
}

fn get_node<S: GraphStore + ?Sized>(store: &mut S, operation: &Operation) -> GraphResult<Value> {
    let Operation::GetNode { node } = operation else {
        return Err(mismatch(operation));
    };
    let record = store.node(node)?;
    Ok(json!({
        "index": record.index,
        "created_at": record.created_at,
        "found": true,
    }))
}

fn get_edge<S: GraphStore + ?Sized>(store: &mut S, operation: &Operation) -> GraphResult<Value> {
    let Operation::GetEdge { source, target } = operation else {
        return Err(mismatch(operation));
    };
    let record = store.edge(source, target)?;
    Ok(json!({
        "index": record.index,
        "created_at": record.created_at,
        "found": true,
    }))
}

fn batch_nodes<S: GraphStore + ?Sized>(store: &mut S, operation: &Operation) -> GraphResult<Value> {
    let Operation::BatchNodes { size, cursor } = operation else {
        return Err(mismatch(operation));
    };
    let page = store.batch_nodes(*size, *cursor)?;
    Ok(json!({ "nodes": page.items, "cursor": page.cursor }))
}

fn batch_edges<S: GraphStore + ?Sized>(store: &mut S, operation: &Operation) -> GraphResult<Value> {
    let Operation::BatchEdges { size, cursor } = operation else {
        return Err(mismatch(operation));
    };
    let page = store.batch_edges(*size, *cursor)?;
    Ok(json!({ "edges": page.items, "cursor": page.cursor }))
}

fn get_neighbors<S: GraphStore + ?Sized>(store: &mut S, operation: &Operation) -> GraphResult<Value> {
    let Operation::GetNeighbors { node } = operation else {
        return Err(mismatch(operation));
    };
    Ok(json!({ "neighbors": store.neighbors(node)? }))
}

fn set_neighbors<S: GraphStore + ?Sized>(store: &mut S, operation: &Operation) -> GraphResult<Value> {
    let Operation::SetNeighbors { node, nodes } = operation else {
        return Err(mismatch(operation));
    };
    store.set_neighbors(node, nodes)?;
    Ok(json!({ "success": true }))
}

fn get_predecessors<S: GraphStore + ?Sized>(store: &mut S, operation: &Operation) -> GraphResult<Value> {
    let Operation::GetPredecessors { node } = operation else {
        return Err(mismatch(operation));
    };
    Ok(json!({ "predecessors": store.predecessors(node)? }))
}

fn set_predecessors<S: GraphStore + ?Sized>(store: &mut S, operation: &Operation) -> GraphResult<Value> {
    let Operation::SetPredecessors { node, nodes } = operation else {
        return Err(mismatch(operation));
    };
    store.set_predecessors(node, nodes)?;
    Ok(json!({ "success": true }))
}

fn shutdown<S: GraphStore + ?Sized>(_store: &mut S, _operation: &Operation) -> GraphResult<Value> {
    Ok(json!({ "closed": true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteGraph;

    fn run(store: &mut SqliteGraph, operation: Operation) -> Completion {
        translate(handler_for::<SqliteGraph>(operation.kind()))(store, &operation)
    }

    fn node_op(key: &str) -> Operation {
        Operation::GetNode { node: key.to_string() }
    }

    #[test]
    fn test_add_node_payload() {
        let mut store = SqliteGraph::in_memory().unwrap();

        let completion = run(&mut store, Operation::AddNode { node: "A".to_string() });
        assert_eq!(completion.outcome, Outcome::Success);
        assert_eq!(completion.get("node"), Some(&json!("A")));
        assert_eq!(completion.get("created"), Some(&json!(true)));
        assert!(completion.get("created_at").is_some());

        let again = run(&mut store, Operation::AddNode { node: "A".to_string() });
        assert_eq!(again.outcome, Outcome::Success);
        assert_eq!(again.get("created"), Some(&json!(false)));
    }

    #[test]
    fn test_get_missing_node() {
        let mut store = SqliteGraph::in_memory().unwrap();

        let completion = run(&mut store, node_op("Z"));
        assert_eq!(completion.outcome, Outcome::NotFound);
        assert_eq!(completion.get("node"), Some(&json!("Z")));
        assert_eq!(completion.get("found"), Some(&json!(false)));
        assert!(completion.get("error").is_some());
    }

    #[test]
    fn test_remove_missing_edge_echoes_endpoints() {
        let mut store = SqliteGraph::in_memory().unwrap();

        let completion = run(
            &mut store,
            Operation::RemoveEdge {
                source: "A".to_string(),
                target: "B".to_string(),
            },
        );
        assert_eq!(completion.outcome, Outcome::NotFound);
        assert_eq!(completion.get("edge"), Some(&json!({ "source": "A", "target": "B" })));
        assert_eq!(completion.get("removed"), Some(&json!(false)));
    }

    #[test]
    fn test_invalid_key_is_invalid_input() {
        let mut store = SqliteGraph::in_memory().unwrap();

        let completion = run(&mut store, Operation::AddNode { node: String::new() });
        assert_eq!(completion.outcome, Outcome::InvalidInput);
        assert_eq!(completion.get("created"), Some(&json!(false)));
    }

    #[test]
    fn test_count_empty() {
        let mut store = SqliteGraph::in_memory().unwrap();

        let completion = run(&mut store, Operation::Count);
        assert_eq!(completion.outcome, Outcome::Success);
        assert_eq!(
            completion.payload,
            json!({ "nodes_count": 0, "edges_count": 0, "avg_degree": 0 })
        );
    }

    #[test]
    fn test_batch_nodes_payload() {
        let mut store = SqliteGraph::in_memory().unwrap();
        run(&mut store, Operation::AddNode { node: "A".to_string() });
        run(&mut store, Operation::AddNode { node: "B".to_string() });

        let completion = run(&mut store, Operation::BatchNodes { size: 10, cursor: 0 });
        assert_eq!(completion.outcome, Outcome::Success);
        let nodes = completion.get("nodes").and_then(Value::as_array).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0]["key"], json!("A"));
        assert_eq!(completion.get("cursor"), Some(&Value::Null));
    }

    #[test]
    fn test_panicking_handler_is_internal_error() {
        let mut store = SqliteGraph::in_memory().unwrap();
        let handler: Handler<SqliteGraph> = |_, _| panic!("boom");

        let completion = translate(handler)(&mut store, &node_op("A"));
        assert_eq!(completion.outcome, Outcome::InternalError);
        assert_eq!(completion.get("found"), Some(&json!(false)));
        assert!(completion.get("error").and_then(Value::as_str).unwrap().contains("boom"));
    }

    #[test]
    fn test_mismatched_operation_is_internal_error() {
        let mut store = SqliteGraph::in_memory().unwrap();

        let completion = translate(handler_for::<SqliteGraph>(OpKind::AddNode))(&mut store, &Operation::Count);
        assert_eq!(completion.outcome, Outcome::InternalError);
    }

    #[test]
    fn test_merge() {
        assert_eq!(merge(json!({ "a": 1 }), json!({ "b": 2 })), json!({ "a": 1, "b": 2 }));
        assert_eq!(merge(json!({ "a": 1 }), json!({ "a": 2 })), json!({ "a": 2 }));
        assert_eq!(merge(json!({}), json!([1])), json!([1]));
    }
}
