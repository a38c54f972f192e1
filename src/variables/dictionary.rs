use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::recognition::RecognitionResult;

pub type Variables = BTreeMap<String, Value>;

/// Immutable, cheaply clonable snapshot of a document's variables.
///
/// Updates build a new map; readers holding an older snapshot never see a
/// half-applied merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableDictionary(Arc<Variables>);

impl VariableDictionary {
    pub fn new(variables: Variables) -> Self {
        Self(Arc::new(variables))
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Variables {
        &self.0
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        )
    }

    /// New dictionary with every assignment record applied in order.
    pub fn merge_assignments(&self, results: &[RecognitionResult]) -> Self {
        let mut assignments = results.iter().filter(|result| result.is_assignment).peekable();
        if assignments.peek().is_none() {
            return self.clone();
        }

        let mut next = (*self.0).clone();
        for result in assignments {
            next.insert(result.expression.clone(), result.value.clone());
        }
        Self::new(next)
    }

    /// New dictionary with `variables` layered on top.
    pub fn merge_map(&self, variables: &Variables) -> Self {
        if variables.is_empty() {
            return self.clone();
        }
        let mut next = (*self.0).clone();
        next.extend(variables.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self::new(next)
    }
}

impl From<Variables> for VariableDictionary {
    fn from(value: Variables) -> Self {
        Self::new(value)
    }
}

pub fn merge_assignments(
    current: &VariableDictionary,
    results: &[RecognitionResult],
) -> VariableDictionary {
    current.merge_assignments(results)
}
