//! Trajectory extraction and alignment scoring.
//!
//! A trajectory is the ordered list of tool names an agent invoked during one
//! run, lower-cased. `align` counts observed steps that do not line up with
//! the reference in a single greedy left-to-right pass.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Feedback key the alignment score is logged under.
pub const UNMATCHED_STEPS_KEY: &str = "unmatched_steps";

/// Output field holding a trajectory.
pub const TRAJECTORY_FIELD: &str = "trajectory";

/// Ordered, case-normalized action names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trajectory(Vec<String>);

impl Trajectory {
    pub fn new<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(steps.into_iter().map(|s| s.as_ref().to_lowercase()).collect())
    }

    /// Tool-call names across `messages`, in order.
    ///
    /// Accepts `tool_calls[].name` and the nested `tool_calls[].function.name`
    /// shape. Messages without tool calls contribute nothing.
    pub fn from_messages(messages: &[Value]) -> Self {
        let names = messages
            .iter()
            .filter_map(|m| m.get("tool_calls").and_then(Value::as_array))
            .flatten()
            .filter_map(|call| {
                call.get("name")
                    .or_else(|| call.get("function").and_then(|f| f.get("name")))
                    .and_then(Value::as_str)
            });
        Self::new(names)
    }

    /// Read `{"trajectory": [...]}`. Non-string entries are ignored.
    pub fn from_outputs(outputs: &Value) -> Option<Self> {
        let steps = outputs.get(TRAJECTORY_FIELD)?.as_array()?;
        Some(Self::new(steps.iter().filter_map(Value::as_str)))
    }

    pub fn to_outputs(&self) -> Value {
        let mut outputs = serde_json::Map::new();
        outputs.insert(TRAJECTORY_FIELD.to_string(), json!(self.0));
        Value::Object(outputs)
    }

    pub fn steps(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Number of observed steps that are not part of the reference.
///
/// Walks both sequences once: a matching step advances both pointers, any
/// other observed step counts as unmatched and advances only the observed
/// pointer. Observed steps left after the reference is exhausted are all
/// unmatched. Reference steps left after the observed sequence is exhausted
/// are not counted.
pub fn align<T: PartialEq>(observed: &[T], reference: &[T]) -> usize {
    let (mut i, mut j) = (0, 0);
    let mut unmatched = 0;

    while i < reference.len() && j < observed.len() {
        if reference[i] == observed[j] {
            i += 1;
        } else {
            unmatched += 1;
        }
        j += 1;
    }

    unmatched + (observed.len() - j)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(steps: &[&str]) -> Trajectory {
        Trajectory::new(steps.iter().copied())
    }

    fn score(observed: &[&str], reference: &[&str]) -> usize {
        align(t(observed).steps(), t(reference).steps())
    }

    #[test]
    fn identical_sequences_align() {
        assert_eq!(score(&["a", "b", "c"], &["a", "b", "c"]), 0);
    }

    #[test]
    fn observed_prefix_is_not_penalized() {
        assert_eq!(score(&["a", "b"], &["a", "b", "c"]), 0);
    }

    #[test]
    fn disjoint_sequences_count_every_observed_step() {
        assert_eq!(score(&["x", "y"], &["a", "b", "c"]), 2);
    }

    #[test]
    fn interleaved_extra_step_counts_once() {
        assert_eq!(score(&["a", "x", "b", "c"], &["a", "b", "c"]), 1);
    }

    #[test]
    fn duplicate_observed_step_is_extra() {
        assert_eq!(score(&["a", "a"], &["a"]), 1);
    }

    #[test]
    fn empty_observed_scores_zero() {
        assert_eq!(score(&[], &["a", "b", "c", "d", "e"]), 0);
    }

    #[test]
    fn trailing_steps_after_reference_are_unmatched() {
        assert_eq!(score(&["a", "b", "c", "d", "e"], &["a"]), 4);
        assert_eq!(score(&["a"], &[]), 1);
    }

    #[test]
    fn alignment_is_asymmetric() {
        assert_eq!(score(&["a", "b", "c"], &["a"]), 2);
        assert_eq!(score(&["a"], &["a", "b", "c"]), 0);
    }

    #[test]
    fn comparison_is_case_normalized() {
        assert_eq!(score(&["Write_Email", "DONE"], &["write_email", "done"]), 0);
    }

    #[test]
    fn extracts_tool_calls_from_both_shapes() {
        let messages = vec![
            json!({"role": "user", "content": "hi"}),
            json!({"role": "assistant", "tool_calls": [{"name": "Check_Calendar_Availability", "args": {}}]}),
            json!({"role": "tool", "content": "free"}),
            json!({"role": "assistant", "tool_calls": [
                {"function": {"name": "schedule_meeting"}},
                {"name": "Done"}
            ]}),
            json!({"role": "assistant", "tool_calls": null}),
        ];
        let trajectory = Trajectory::from_messages(&messages);
        assert_eq!(
            trajectory,
            t(&["check_calendar_availability", "schedule_meeting", "done"])
        );
    }

    #[test]
    fn outputs_round_trip_through_trajectory_field() {
        let trajectory = t(&["write_email", "done"]);
        let outputs = trajectory.to_outputs();
        assert_eq!(outputs, json!({"trajectory": ["write_email", "done"]}));
        assert_eq!(Trajectory::from_outputs(&outputs), Some(trajectory));
        assert_eq!(Trajectory::from_outputs(&json!({"answer": 1})), None);
    }
}
