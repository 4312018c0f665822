//! Property-based tests for the tool-call tracker

use super::*;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Call(String),
    Result(String),
}

fn arb_name() -> impl Strategy<Value = String> {
    prop_oneof![Just("calc".to_string()), Just("search".to_string()), Just("shell".to_string())]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![arb_name().prop_map(Op::Call), arb_name().prop_map(Op::Result)]
}

proptest! {
    /// A result applies iff a running entry with that name exists, and it
    /// never changes the number of entries.
    #[test]
    fn prop_result_applies_iff_running_entry_exists(ops in proptest::collection::vec(arb_op(), 0..40)) {
        let mut tracker = ToolCallTracker::new();
        for op in ops {
            match op {
                Op::Call(name) => {
                    let before = tracker.len();
                    tracker.on_tool_call(&name, "{}");
                    prop_assert_eq!(tracker.len(), before + 1);
                }
                Op::Result(name) => {
                    let had_running = tracker
                        .calls()
                        .iter()
                        .any(|c| c.name == name && c.status == ToolStatus::Running);
                    let before = tracker.len();
                    let applied = tracker.on_tool_result(&name, "r");
                    prop_assert_eq!(applied.is_some(), had_running);
                    prop_assert_eq!(tracker.len(), before);
                }
            }
        }
    }

    /// Statuses only move forward across any sequence of operations
    #[test]
    fn prop_status_monotone(ops in proptest::collection::vec(arb_op(), 0..40)) {
        let mut tracker = ToolCallTracker::new();
        let mut seen: Vec<ToolStatus> = Vec::new();
        for op in ops {
            match op {
                Op::Call(name) => { tracker.on_tool_call(&name, "{}"); }
                Op::Result(name) => { tracker.on_tool_result(&name, "r"); }
            }
            for (i, call) in tracker.calls().iter().enumerate() {
                if let Some(prev) = seen.get(i) {
                    prop_assert!(call.status >= *prev);
                    if prev.is_finished() {
                        prop_assert_eq!(call.status, *prev);
                    }
                }
            }
            seen = tracker.calls().iter().map(|c| c.status).collect();
        }
    }
}
