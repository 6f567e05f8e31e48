use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::sync::Arc;

use snafu::prelude::*;
use syn::Expr;

use crate::config::{Config, ConfigEntry, SupplyExprFn};
use crate::container::resolver::{
    GroupProvider, GroupResolver, MapOfOnePerModuleResolver, ModuleDepResolver,
    OnePerModuleResolver, Resolver, SimpleResolver, SliceOfGroupResolver, SupplyResolver,
};
use crate::key::{ModuleKey, ModuleKeyContext, TypeKey};
use crate::provider::{
    InputKind, InterfaceCast, Location, OutputKind, ProviderDescriptor, Value,
};

/// Errors raised while a [`Config`] is registered, before anything is
/// resolved.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum ConfigError {
    #[snafu(display("provider {location} has an invalid shape: {reason}"))]
    #[non_exhaustive]
    BadProviderShape { location: Location, reason: String },

    #[snafu(display("provider {location} declares an output after its error output"))]
    #[non_exhaustive]
    BadErrorPosition { location: Location },

    #[snafu(display(
        "provider {location} marks {type_name} optional, which its input kind does not support"
    ))]
    #[non_exhaustive]
    BadOptionalTag {
        location: Location,
        type_name: &'static str,
    },

    #[snafu(display("{type_name}, reachable from {location}, has no nameable path for code emission"))]
    #[non_exhaustive]
    Unexported { location: Location, type_name: String },

    #[snafu(display(
        "provider {location} declares {type_name} as a direct input; request the collection type instead"
    ))]
    #[non_exhaustive]
    BadInputType {
        location: Location,
        type_name: &'static str,
    },

    #[snafu(display("provider {location} cannot output {type_name}: {reason}"))]
    #[non_exhaustive]
    BadReturnType {
        location: Location,
        type_name: &'static str,
        reason: String,
    },

    #[snafu(display(
        "provider {location} outputs one-per-module type {type_name} outside any module"
    ))]
    #[non_exhaustive]
    OutOfScope {
        location: Location,
        type_name: &'static str,
    },

    #[snafu(display("duplicate provision of {type_name}: first by {first}, then by {second}"))]
    #[non_exhaustive]
    Duplicate {
        type_name: String,
        first: String,
        second: String,
    },

    #[snafu(display("the configuration carries an error supplied by the caller"))]
    #[non_exhaustive]
    Supplied {
        source: Box<dyn Error + Send + Sync>,
    },
}

pub(crate) type NodeId = usize;

/// One registered provider plus its per-build call state.
pub(crate) struct NodeSlot {
    pub(crate) descriptor: Arc<ProviderDescriptor>,
    pub(crate) module: Option<ModuleKey>,
    pub(crate) module_scoped: bool,
    pub(crate) state: NodeState,
}

pub(crate) enum NodeState {
    Fresh,
    Called(NodeCall),
    PerModule(HashMap<ModuleKey, NodeCall>),
}

#[derive(Clone)]
pub(crate) struct NodeCall {
    pub(crate) values: Vec<Value>,
    pub(crate) exprs: Option<Vec<Expr>>,
}

/// Holds resolvers keyed by type, the interface-binding table and the cast
/// table, and classifies providers as they are registered.
pub(crate) struct Registry {
    pub(crate) resolvers: HashMap<TypeKey, Resolver>,
    pub(crate) bindings: HashMap<(TypeKey, Option<ModuleKey>), (TypeKey, Location)>,
    pub(crate) casts: HashMap<TypeKey, Vec<(TypeKey, InterfaceCast)>>,
    pub(crate) nodes: Vec<NodeSlot>,
    pub(crate) invokers: Vec<NodeId>,
    codegen: bool,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("resolvers", &self.resolvers.len())
            .field("bindings", &self.bindings.len())
            .field("casts", &self.casts.len())
            .field("nodes", &self.nodes.len())
            .field("invokers", &self.invokers.len())
            .field("codegen", &self.codegen)
            .finish()
    }
}

impl Registry {
    pub(crate) fn register(
        config: Config,
        mkctx: &ModuleKeyContext,
        codegen: bool,
    ) -> Result<Self, ConfigError> {
        let mut registry = Self {
            resolvers: HashMap::new(),
            bindings: HashMap::new(),
            casts: HashMap::new(),
            nodes: Vec::new(),
            invokers: Vec::new(),
            codegen,
        };
        for entry in config.entries {
            match entry {
                ConfigEntry::Provide { descriptor, module } => {
                    let module = module.map(|name| mkctx.for_name(&name));
                    registry.add_provider(descriptor, module)?;
                }
                ConfigEntry::Supply {
                    key,
                    value,
                    expr,
                    location,
                } => registry.add_supply(key, value, expr, location)?,
                ConfigEntry::Invoke { descriptor, module } => {
                    let module = module.map(|name| mkctx.for_name(&name));
                    registry.add_invoker(descriptor, module)?;
                }
                ConfigEntry::BindInterface {
                    iface,
                    implementation,
                    module,
                    location,
                } => {
                    let module = module.map(|name| mkctx.for_name(&name));
                    registry.add_binding(iface, implementation, module, location)?;
                }
                ConfigEntry::Error { error } => return Err(error),
            }
        }
        Ok(registry)
    }

    fn add_provider(
        &mut self,
        descriptor: Arc<ProviderDescriptor>,
        module: Option<ModuleKey>,
    ) -> Result<(), ConfigError> {
        self.check_nameable(&descriptor)?;
        let module_scoped = descriptor
            .inputs
            .iter()
            .any(|input| matches!(input.kind, InputKind::ModuleKey));
        let node = self.nodes.len();
        tracing::trace!(provider = %descriptor.location, module_scoped, "registering resolvers");

        for (idx, out) in descriptor.outputs.iter().enumerate() {
            for cast in &out.casts {
                self.casts
                    .entry(cast.iface())
                    .or_default()
                    .push((out.key(), *cast));
            }

            if module_scoped {
                self.insert_exclusive(
                    out.key(),
                    Resolver::ModuleDep(ModuleDepResolver { node, idx }),
                    &descriptor.location,
                )?;
                continue;
            }

            match out.kind {
                OutputKind::Plain => self.insert_exclusive(
                    out.key(),
                    Resolver::Simple(SimpleResolver { node, idx }),
                    &descriptor.location,
                )?,
                OutputKind::GroupElement { slice, build_slice } => self.append_group(
                    out.key(),
                    slice,
                    build_slice,
                    GroupProvider {
                        node,
                        idx,
                        splat: false,
                    },
                    &descriptor.location,
                )?,
                OutputKind::GroupElements {
                    elem,
                    slice,
                    build_slice,
                    ..
                } => self.append_group(
                    elem,
                    slice,
                    build_slice,
                    GroupProvider {
                        node,
                        idx,
                        splat: true,
                    },
                    &descriptor.location,
                )?,
                OutputKind::OnePerModuleElement { map, build_map } => {
                    let Some(module) = module.as_ref() else {
                        return OutOfScopeSnafu {
                            location: descriptor.location.clone(),
                            type_name: out.key().name(),
                        }
                        .fail();
                    };
                    self.append_one_per_module(
                        out.key(),
                        map,
                        build_map,
                        module.name().to_owned(),
                        (node, idx),
                        &descriptor.location,
                    )?;
                }
            }
        }

        let state = if module_scoped {
            NodeState::PerModule(HashMap::new())
        } else {
            NodeState::Fresh
        };
        self.nodes.push(NodeSlot {
            descriptor,
            module,
            module_scoped,
            state,
        });
        Ok(())
    }

    fn insert_exclusive(
        &mut self,
        key: TypeKey,
        resolver: Resolver,
        location: &Location,
    ) -> Result<(), ConfigError> {
        if let Some(existing) = self.resolvers.get(&key) {
            return DuplicateSnafu {
                type_name: key.name(),
                first: self.describe_resolver(existing),
                second: location.to_string(),
            }
            .fail();
        }
        self.resolvers.insert(key, resolver);
        Ok(())
    }

    fn append_group(
        &mut self,
        elem: TypeKey,
        slice: TypeKey,
        build_slice: fn(Vec<Value>) -> Value,
        provider: GroupProvider,
        location: &Location,
    ) -> Result<(), ConfigError> {
        let existing = match self.resolvers.get(&elem) {
            None => None,
            Some(Resolver::Group(_)) => Some(None),
            Some(other) => Some(Some(self.describe_resolver(other))),
        };
        match existing {
            None => {
                self.resolvers.insert(
                    elem,
                    Resolver::Group(GroupResolver {
                        elem,
                        slice,
                        build_slice,
                        providers: vec![provider],
                    }),
                );
                Ok(())
            }
            Some(None) => {
                let Some(Resolver::Group(group)) = self.resolvers.get_mut(&elem) else {
                    unreachable!("the resolver for `{elem}` should be a group")
                };
                group.providers.push(provider);
                Ok(())
            }
            Some(Some(first)) => DuplicateSnafu {
                type_name: elem.name(),
                first,
                second: location.to_string(),
            }
            .fail(),
        }
    }

    fn append_one_per_module(
        &mut self,
        elem: TypeKey,
        map: TypeKey,
        build_map: fn(Vec<(String, Value)>) -> Value,
        module_name: String,
        provider: (NodeId, usize),
        location: &Location,
    ) -> Result<(), ConfigError> {
        let existing = match self.resolvers.get(&elem) {
            None => None,
            Some(Resolver::OnePerModule(resolver)) => Some(
                resolver
                    .providers
                    .get(&module_name)
                    .map(|(node, _)| self.nodes[*node].descriptor.location.to_string()),
            ),
            Some(other) => Some(Some(self.describe_resolver(other))),
        };
        match existing {
            None => {
                let mut providers = BTreeMap::new();
                providers.insert(module_name, provider);
                self.resolvers.insert(
                    elem,
                    Resolver::OnePerModule(OnePerModuleResolver {
                        elem,
                        map,
                        build_map,
                        providers,
                    }),
                );
                Ok(())
            }
            Some(None) => {
                let Some(Resolver::OnePerModule(resolver)) = self.resolvers.get_mut(&elem) else {
                    unreachable!("the resolver for `{elem}` should be one-per-module")
                };
                resolver.providers.insert(module_name, provider);
                Ok(())
            }
            Some(Some(first)) => DuplicateSnafu {
                type_name: elem.name(),
                first,
                second: location.to_string(),
            }
            .fail(),
        }
    }

    fn add_supply(
        &mut self,
        key: TypeKey,
        value: Value,
        expr: SupplyExprFn,
        location: Location,
    ) -> Result<(), ConfigError> {
        if self.codegen && !key.is_nameable() {
            return UnexportedSnafu {
                location,
                type_name: key.name(),
            }
            .fail();
        }
        self.insert_exclusive(
            key,
            Resolver::Supply(SupplyResolver {
                value,
                expr,
                location: location.clone(),
                emitted: None,
            }),
            &location,
        )
    }

    fn add_invoker(
        &mut self,
        descriptor: Arc<ProviderDescriptor>,
        module: Option<ModuleKey>,
    ) -> Result<(), ConfigError> {
        self.check_nameable(&descriptor)?;
        let node = self.nodes.len();
        self.nodes.push(NodeSlot {
            descriptor,
            module,
            module_scoped: false,
            state: NodeState::Fresh,
        });
        self.invokers.push(node);
        Ok(())
    }

    fn add_binding(
        &mut self,
        iface: TypeKey,
        implementation: TypeKey,
        module: Option<ModuleKey>,
        location: Location,
    ) -> Result<(), ConfigError> {
        if let Some((_, existing)) = self.bindings.get(&(iface, module.clone())) {
            return DuplicateSnafu {
                type_name: iface.name(),
                first: existing.to_string(),
                second: location.to_string(),
            }
            .fail();
        }
        self.bindings.insert((iface, module), (implementation, location));
        Ok(())
    }

    fn check_nameable(&self, descriptor: &ProviderDescriptor) -> Result<(), ConfigError> {
        if !self.codegen {
            return Ok(());
        }
        if !descriptor.location.is_nameable() {
            return UnexportedSnafu {
                location: descriptor.location.clone(),
                type_name: descriptor.location.name(),
            }
            .fail();
        }
        for input in &descriptor.inputs {
            if !input.key().is_nameable() {
                return UnexportedSnafu {
                    location: descriptor.location.clone(),
                    type_name: input.key().name(),
                }
                .fail();
            }
        }
        for output in &descriptor.outputs {
            if !output.key().is_nameable() {
                return UnexportedSnafu {
                    location: descriptor.location.clone(),
                    type_name: output.key().name(),
                }
                .fail();
            }
        }
        Ok(())
    }

    pub(crate) fn describe_resolver(&self, resolver: &Resolver) -> String {
        match resolver {
            Resolver::Simple(SimpleResolver { node, .. })
            | Resolver::ModuleDep(ModuleDepResolver { node, .. }) => {
                self.nodes[*node].descriptor.location.to_string()
            }
            Resolver::Group(group) => group
                .providers
                .first()
                .map(|p| self.nodes[p.node].descriptor.location.to_string())
                .unwrap_or_else(|| "group".to_owned()),
            Resolver::SliceOfGroup(_) => "group collection".to_owned(),
            Resolver::OnePerModule(resolver) => resolver
                .providers
                .values()
                .next()
                .map(|(node, _)| self.nodes[*node].descriptor.location.to_string())
                .unwrap_or_else(|| "one-per-module".to_owned()),
            Resolver::MapOfOnePerModule(_) => "one-per-module collection".to_owned(),
            Resolver::Supply(supply) => supply.location.to_string(),
        }
    }

    pub(crate) fn binding(&self, iface: TypeKey, module: Option<&ModuleKey>) -> Option<TypeKey> {
        if let Some(module) = module {
            if let Some((implementation, _)) = self.bindings.get(&(iface, Some(module.clone()))) {
                return Some(*implementation);
            }
        }
        self.bindings
            .get(&(iface, None))
            .map(|(implementation, _)| *implementation)
    }

    pub(crate) fn cast_for(&self, iface: TypeKey, implementation: TypeKey) -> Option<InterfaceCast> {
        self.casts.get(&iface).and_then(|entries| {
            entries
                .iter()
                .find(|(key, _)| *key == implementation)
                .map(|(_, cast)| *cast)
        })
    }

    pub(crate) fn implementers_with_resolvers(
        &self,
        iface: TypeKey,
    ) -> Vec<(TypeKey, InterfaceCast)> {
        let Some(entries) = self.casts.get(&iface) else {
            return Vec::new();
        };
        entries
            .iter()
            .filter(|(key, _)| self.resolvers.contains_key(key))
            .map(|(key, cast)| (*key, *cast))
            .collect()
    }

    /// Lazily pairs a `Vec<T>` request with the group resolver of `T`.
    pub(crate) fn ensure_slice_resolver(&mut self, slice: TypeKey, elem: TypeKey) -> bool {
        if self.resolvers.contains_key(&slice) {
            return true;
        }
        if matches!(self.resolvers.get(&elem), Some(Resolver::Group(_))) {
            self.resolvers.insert(
                slice,
                Resolver::SliceOfGroup(SliceOfGroupResolver { elem, cached: None }),
            );
            return true;
        }
        false
    }

    /// Lazily pairs a `BTreeMap<String, T>` request with the one-per-module
    /// resolver of `T`.
    pub(crate) fn ensure_map_resolver(&mut self, map: TypeKey, elem: TypeKey) -> bool {
        if self.resolvers.contains_key(&map) {
            return true;
        }
        if matches!(self.resolvers.get(&elem), Some(Resolver::OnePerModule(_))) {
            self.resolvers.insert(
                map,
                Resolver::MapOfOnePerModule(MapOfOnePerModuleResolver { elem, cached: None }),
            );
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use crate::config::{self, provide, provide_in_module, supply};

    use super::*;

    fn answer() -> Result<i32, Infallible> {
        Ok(42)
    }

    fn other_answer() -> Result<i32, Infallible> {
        Ok(43)
    }

    #[test]
    fn register_succeeds_for_distinct_outputs() {
        fn stringify(x: i32) -> Result<String, Infallible> {
            Ok(format!("{x}"))
        }

        let mkctx = ModuleKeyContext::new();
        let config = config::configs([provide(answer), provide(stringify)]);
        let registry = Registry::register(config, &mkctx, false).unwrap();

        assert!(registry.resolvers.contains_key(&TypeKey::of::<i32>()));
        assert!(registry.resolvers.contains_key(&TypeKey::of::<String>()));
        assert_eq!(registry.nodes.len(), 2);
    }

    #[test]
    fn register_fails_when_two_providers_output_one_type() {
        let mkctx = ModuleKeyContext::new();
        let config = config::configs([provide(answer), provide(other_answer)]);
        let err = Registry::register(config, &mkctx, false).unwrap_err();

        match err {
            ConfigError::Duplicate { first, second, .. } => {
                assert!(first.contains("answer"));
                assert!(second.contains("other_answer"));
            }
            other => panic!("expected Duplicate, got {other}"),
        }
    }

    #[test]
    fn register_fails_when_supply_collides_with_provider() {
        let mkctx = ModuleKeyContext::new();
        let config = config::configs([supply(3i32), provide(answer)]);
        let err = Registry::register(config, &mkctx, false).unwrap_err();

        assert!(matches!(err, ConfigError::Duplicate { .. }));
    }

    #[test]
    fn register_fails_when_module_scoped_providers_share_an_output() {
        use crate::key::ModuleKey;

        fn scoped(key: ModuleKey) -> Result<i32, Infallible> {
            Ok(key.name().len() as i32)
        }
        fn also_scoped(key: ModuleKey) -> Result<i32, Infallible> {
            Ok(key.name().len() as i32)
        }

        let mkctx = ModuleKeyContext::new();
        let config = config::configs([
            provide_in_module("a", scoped),
            provide_in_module("b", also_scoped),
        ]);
        let err = Registry::register(config, &mkctx, false).unwrap_err();

        assert!(matches!(err, ConfigError::Duplicate { .. }));
    }

    #[test]
    fn register_fails_for_closure_providers_in_codegen_mode() {
        let mkctx = ModuleKeyContext::new();
        let config = provide(|| Ok::<_, Infallible>(1i32));
        let err = Registry::register(config, &mkctx, true).unwrap_err();

        assert!(matches!(err, ConfigError::Unexported { .. }));
    }
}
