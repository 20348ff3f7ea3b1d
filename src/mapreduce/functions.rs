//! Function Shipping
//!
//! Mappers, reducers and combiners run on whichever node owns the data. The
//! coordinator sends a `FunctionDescriptor` (implementation name plus
//! serialized state); the receiver rebuilds the function through its
//! `FunctionRegistry`. Locally executed parts never go through serialization,
//! they get an independent copy via `duplicate()` instead.

use super::types::{Collector, GridKey, GridValue, Mapper, Reducer, decode_key};
use crate::error::{GridError, Result};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Portable form of a user function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDescriptor {
    pub name: String,
    pub state: Value,
}

/// Output of a mapper before it reaches the intermediate cache:
/// JSON values grouped by the string form of their key.
pub struct EmitBuffer {
    entries: HashMap<String, Vec<Value>>,
    emitted: usize,
    error: Option<GridError>,
    token: CancellationToken,
}

impl EmitBuffer {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            entries: HashMap::new(),
            emitted: 0,
            error: None,
            token,
        }
    }

    pub fn emit_raw(&mut self, key: String, value: Value) {
        self.entries.entry(key).or_default().push(value);
        self.emitted += 1;
    }

    /// Keeps the first failure; later emits are still buffered.
    pub(crate) fn record_error(&mut self, error: GridError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    pub fn take_error(&mut self) -> Option<GridError> {
        self.error.take()
    }

    /// Number of values buffered since the last `take`.
    pub fn len(&self) -> usize {
        self.emitted
    }

    pub fn is_empty(&self) -> bool {
        self.emitted == 0
    }

    pub fn take(&mut self) -> HashMap<String, Vec<Value>> {
        self.emitted = 0;
        std::mem::take(&mut self.entries)
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

// ============================================================
// Type-erased functions
// ============================================================

pub trait MapFunction: Send + Sync {
    fn name(&self) -> &'static str;

    fn map(&self, key: &str, value: &Value, out: &mut EmitBuffer) -> Result<()>;

    /// Independent copy for in-process execution.
    fn duplicate(&self) -> Arc<dyn MapFunction>;

    fn descriptor(&self) -> Result<FunctionDescriptor>;
}

pub trait ReduceFunction: Send + Sync {
    fn name(&self) -> &'static str;

    fn reduce(&self, key: &str, values: Vec<Value>) -> Result<Value>;

    fn duplicate(&self) -> Arc<dyn ReduceFunction>;

    fn descriptor(&self) -> Result<FunctionDescriptor>;
}

pub struct MapperAdapter<M, KIn, VIn, KOut, VOut> {
    mapper: M,
    _types: PhantomData<fn(KIn, VIn) -> (KOut, VOut)>,
}

impl<M, KIn, VIn, KOut, VOut> MapperAdapter<M, KIn, VIn, KOut, VOut>
where
    M: Mapper<KIn, VIn, KOut, VOut>,
    KIn: GridKey,
    VIn: GridValue,
    KOut: GridKey,
    VOut: GridValue,
{
    pub fn erase(mapper: M) -> Arc<dyn MapFunction> {
        Arc::new(Self {
            mapper,
            _types: PhantomData,
        })
    }
}

impl<M, KIn, VIn, KOut, VOut> MapFunction for MapperAdapter<M, KIn, VIn, KOut, VOut>
where
    M: Mapper<KIn, VIn, KOut, VOut>,
    KIn: GridKey,
    VIn: GridValue,
    KOut: GridKey,
    VOut: GridValue,
{
    fn name(&self) -> &'static str {
        M::NAME
    }

    fn map(&self, key: &str, value: &Value, out: &mut EmitBuffer) -> Result<()> {
        let key: KIn = decode_key(key)?;
        let value: VIn = serde_json::from_value(value.clone())?;

        let mut collector = Collector::<KOut, VOut>::new(out);
        self.mapper.map(key, value, &mut collector);

        match out.take_error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn duplicate(&self) -> Arc<dyn MapFunction> {
        Self::erase(self.mapper.clone())
    }

    fn descriptor(&self) -> Result<FunctionDescriptor> {
        Ok(FunctionDescriptor {
            name: M::NAME.to_string(),
            state: serde_json::to_value(&self.mapper)?,
        })
    }
}

pub struct ReducerAdapter<R, KOut, VOut> {
    reducer: R,
    _types: PhantomData<fn(KOut) -> VOut>,
}

impl<R, KOut, VOut> ReducerAdapter<R, KOut, VOut>
where
    R: Reducer<KOut, VOut>,
    KOut: GridKey,
    VOut: GridValue,
{
    pub fn erase(reducer: R) -> Arc<dyn ReduceFunction> {
        Arc::new(Self {
            reducer,
            _types: PhantomData,
        })
    }
}

impl<R, KOut, VOut> ReduceFunction for ReducerAdapter<R, KOut, VOut>
where
    R: Reducer<KOut, VOut>,
    KOut: GridKey,
    VOut: GridValue,
{
    fn name(&self) -> &'static str {
        R::NAME
    }

    fn reduce(&self, key: &str, values: Vec<Value>) -> Result<Value> {
        let typed_key: KOut = decode_key(key)?;
        let typed_values = values
            .into_iter()
            .map(serde_json::from_value::<VOut>)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let reduced = self.reducer.reduce(&typed_key, typed_values);
        Ok(serde_json::to_value(reduced)?)
    }

    fn duplicate(&self) -> Arc<dyn ReduceFunction> {
        Self::erase(self.reducer.clone())
    }

    fn descriptor(&self) -> Result<FunctionDescriptor> {
        Ok(FunctionDescriptor {
            name: R::NAME.to_string(),
            state: serde_json::to_value(&self.reducer)?,
        })
    }
}

// ============================================================
// Registry
// ============================================================

type MapperDecoder = Arc<dyn Fn(Value) -> Result<Arc<dyn MapFunction>> + Send + Sync>;
type ReducerDecoder = Arc<dyn Fn(Value) -> Result<Arc<dyn ReduceFunction>> + Send + Sync>;

/// Rebuilds shipped functions by name on the receiving node.
pub struct FunctionRegistry {
    mappers: DashMap<String, MapperDecoder>,
    reducers: DashMap<String, ReducerDecoder>,
}

impl FunctionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register_mapper<M, KIn, VIn, KOut, VOut>(&self)
    where
        M: Mapper<KIn, VIn, KOut, VOut>,
        KIn: GridKey,
        VIn: GridValue,
        KOut: GridKey,
        VOut: GridValue,
    {
        let decoder: MapperDecoder = Arc::new(|state| {
            let mapper: M = serde_json::from_value(state)?;
            Ok(MapperAdapter::<M, KIn, VIn, KOut, VOut>::erase(mapper))
        });
        self.mappers.insert(M::NAME.to_string(), decoder);
        tracing::debug!("Registered mapper: {}", M::NAME);
    }

    /// Registers a reducer. Combiners are reducers and resolve the same way.
    pub fn register_reducer<R, KOut, VOut>(&self)
    where
        R: Reducer<KOut, VOut>,
        KOut: GridKey,
        VOut: GridValue,
    {
        let decoder: ReducerDecoder = Arc::new(|state| {
            let reducer: R = serde_json::from_value(state)?;
            Ok(ReducerAdapter::<R, KOut, VOut>::erase(reducer))
        });
        self.reducers.insert(R::NAME.to_string(), decoder);
        tracing::debug!("Registered reducer: {}", R::NAME);
    }

    pub fn resolve_mapper(&self, descriptor: &FunctionDescriptor) -> Result<Arc<dyn MapFunction>> {
        let decoder = self
            .mappers
            .get(&descriptor.name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| GridError::UnknownFunction(descriptor.name.clone()))?;
        decoder(descriptor.state.clone())
    }

    pub fn resolve_reducer(
        &self,
        descriptor: &FunctionDescriptor,
    ) -> Result<Arc<dyn ReduceFunction>> {
        let decoder = self
            .reducers
            .get(&descriptor.name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| GridError::UnknownFunction(descriptor.name.clone()))?;
        decoder(descriptor.state.clone())
    }

    pub fn has_mapper(&self, name: &str) -> bool {
        self.mappers.contains_key(name)
    }

    pub fn has_reducer(&self, name: &str) -> bool {
        self.reducers.contains_key(name)
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self {
            mappers: DashMap::new(),
            reducers: DashMap::new(),
        }
    }
}
