use std::collections::BTreeMap;

use syn::Expr;

use crate::config::SupplyExprFn;
use crate::container::registry::NodeId;
use crate::key::TypeKey;
use crate::provider::{Location, Value};

/// The per-output-type state the registry keeps: which provider(s) produce
/// the type and what has been resolved so far. Dispatch is by variant; the
/// solver drives the state machines.
pub(crate) enum Resolver {
    Simple(SimpleResolver),
    ModuleDep(ModuleDepResolver),
    Group(GroupResolver),
    SliceOfGroup(SliceOfGroupResolver),
    OnePerModule(OnePerModuleResolver),
    MapOfOnePerModule(MapOfOnePerModuleResolver),
    Supply(SupplyResolver),
}

/// One provider, one output position; values cached on the node.
pub(crate) struct SimpleResolver {
    pub(crate) node: NodeId,
    pub(crate) idx: usize,
}

/// One provider called at most once per consuming module key.
pub(crate) struct ModuleDepResolver {
    pub(crate) node: NodeId,
    pub(crate) idx: usize,
}

/// All providers contributing elements of one many-per-container type.
/// Registered under the element type, which consumers may not request
/// directly.
pub(crate) struct GroupResolver {
    pub(crate) elem: TypeKey,
    pub(crate) slice: TypeKey,
    pub(crate) build_slice: fn(Vec<Value>) -> Value,
    pub(crate) providers: Vec<GroupProvider>,
}

#[derive(Clone, Copy)]
pub(crate) struct GroupProvider {
    pub(crate) node: NodeId,
    pub(crate) idx: usize,
    /// The provider outputs a whole `Vec` of elements rather than one.
    pub(crate) splat: bool,
}

/// The companion resolver serving `Vec<T>` requests, built lazily on first
/// use and cached afterwards.
pub(crate) struct SliceOfGroupResolver {
    pub(crate) elem: TypeKey,
    pub(crate) cached: Option<Cached>,
}

/// All providers contributing one-per-module elements, keyed by module
/// name. Registered under the element type, which consumers may not
/// request directly.
pub(crate) struct OnePerModuleResolver {
    pub(crate) elem: TypeKey,
    pub(crate) map: TypeKey,
    pub(crate) build_map: fn(Vec<(String, Value)>) -> Value,
    pub(crate) providers: BTreeMap<String, (NodeId, usize)>,
}

/// The companion resolver serving `BTreeMap<String, T>` requests.
pub(crate) struct MapOfOnePerModuleResolver {
    pub(crate) elem: TypeKey,
    pub(crate) cached: Option<Cached>,
}

/// A user-supplied value; fully resolved from the start.
pub(crate) struct SupplyResolver {
    pub(crate) value: Value,
    pub(crate) expr: SupplyExprFn,
    pub(crate) location: Location,
    /// The expression consumers reference once the value has been emitted.
    pub(crate) emitted: Option<Expr>,
}

#[derive(Clone)]
pub(crate) struct Cached {
    pub(crate) value: Value,
    pub(crate) expr: Option<Expr>,
}
