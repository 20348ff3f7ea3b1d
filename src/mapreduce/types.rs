use crate::error::{GridError, Result};
use crate::mapreduce::functions::EmitBuffer;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a MapReduce task (UUID v4).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one unit of work dispatched to one node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartId(pub String);

impl PartId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for PartId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keys stored in the grid. They are routed and stored by their string form,
/// so parsing it back must give the same key.
pub trait GridKey:
    ToString + FromStr<Err: fmt::Display> + Clone + Eq + Hash + Send + Sync + 'static
{
}

impl<T> GridKey for T where
    T: ToString + FromStr<Err: fmt::Display> + Clone + Eq + Hash + Send + Sync + 'static
{
}

/// Values stored in the grid, kept as JSON.
pub trait GridValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> GridValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

pub fn decode_key<K: GridKey>(key: &str) -> Result<K> {
    K::from_str(key).map_err(|e| GridError::MalformedKey {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Storage key of an intermediate entry. Shared intermediate caches hold
/// entries of several tasks, so keys are prefixed with the task id there.
pub fn intermediate_storage_key(task_id: &TaskId, key: &str, composite: bool) -> String {
    if composite {
        format!("{}::{}", task_id, key)
    } else {
        key.to_string()
    }
}

/// User map function.
///
/// The mapper travels to remote nodes as its serialized state, so it must
/// be serde-encodable. `NAME` identifies the implementation on the receiver,
/// where it has to be registered in the `FunctionRegistry`.
///
/// Parts that run on the invoking node map with a `clone()` of the mapper.
/// `Clone` must therefore yield an independent copy that shares no mutable
/// state with the original; a derived `Clone` over an `Arc<Mutex<_>>` or an
/// atomic behind an `Arc` does not.
pub trait Mapper<KIn, VIn, KOut, VOut>:
    Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const NAME: &'static str;

    fn map(&self, key: KIn, value: VIn, collector: &mut Collector<'_, KOut, VOut>);
}

/// User reduce function, also usable as a combiner.
///
/// Same `Clone` contract as `Mapper`: local reduce parts and the local reduce
/// phase work on a copy, which must not share mutable state with the
/// original.
pub trait Reducer<KOut, VOut>: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const NAME: &'static str;

    fn reduce(&self, key: &KOut, values: Vec<VOut>) -> VOut;
}

/// Final transformation of the reduced map on the invoking node.
pub trait Collator<KOut, VOut, R>: Send + Sync {
    fn collate(&self, reduced: HashMap<KOut, VOut>) -> R;
}

impl<KOut, VOut, R, F> Collator<KOut, VOut, R> for F
where
    F: Fn(HashMap<KOut, VOut>) -> R + Send + Sync,
{
    fn collate(&self, reduced: HashMap<KOut, VOut>) -> R {
        self(reduced)
    }
}

/// Sink handed to `Mapper::map`.
pub struct Collector<'a, KOut, VOut> {
    buffer: &'a mut EmitBuffer,
    _types: PhantomData<fn(KOut, VOut)>,
}

impl<'a, KOut: ToString, VOut: Serialize> Collector<'a, KOut, VOut> {
    pub(crate) fn new(buffer: &'a mut EmitBuffer) -> Self {
        Self {
            buffer,
            _types: PhantomData,
        }
    }

    pub fn emit(&mut self, key: KOut, value: VOut) {
        match serde_json::to_value(value) {
            Ok(value) => self.buffer.emit_raw(key.to_string(), value),
            Err(e) => self.buffer.record_error(e.into()),
        }
    }

    /// True once the task part running this mapper was cancelled.
    /// Long-running mappers may poll it and stop early.
    pub fn is_cancelled(&self) -> bool {
        self.buffer.is_cancelled()
    }
}
