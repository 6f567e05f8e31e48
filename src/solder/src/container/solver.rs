use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use snafu::prelude::*;
use syn::{parse_quote, Expr};

use crate::codegen::{ident_prefix, FuncGen};
use crate::container::graph::Graph;
use crate::container::registry::{NodeCall, NodeId, NodeState, Registry};
use crate::container::resolver::{Cached, Resolver};
use crate::debug::LogSink;
use crate::error::Error;
use crate::key::{ModuleKey, OwnModuleKey, TypeKey};
use crate::provider::{
    BoxError, CastStyle, InputKind, InputSpec, InterfaceCast, Location, OutputKind,
    ProviderDescriptor, Value,
};

/// Errors raised while the dependency graph is being solved.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ResolveError {
    #[snafu(display(
        "{type_name} was requested by {location}, which does not run under any module"
    ))]
    #[non_exhaustive]
    NoModuleScope {
        type_name: &'static str,
        location: Location,
    },

    #[snafu(display("could not resolve {type_name}:\n{stack}"))]
    #[non_exhaustive]
    Unresolvable {
        type_name: &'static str,
        stack: String,
    },

    #[snafu(display("multiple implicit bindings satisfy {iface}: {implementations}"))]
    #[non_exhaustive]
    MultipleImplicitBindings {
        iface: &'static str,
        implementations: String,
    },

    #[snafu(display("{iface} is bound to {implementation}, which is not registered"))]
    #[non_exhaustive]
    ExplicitBindingNotFound {
        iface: &'static str,
        implementation: &'static str,
    },

    #[snafu(display("provider cycle through {location}:\n\t{stack}"))]
    #[non_exhaustive]
    Cycle { location: Location, stack: String },

    #[snafu(display("provider {location} failed"))]
    #[non_exhaustive]
    ProviderError {
        location: Location,
        source: BoxError,
    },

    #[snafu(display(
        "{type_name} is a many-per-container element; request a Vec of it instead"
    ))]
    #[non_exhaustive]
    CannotUseGroupElementAsInput { type_name: &'static str },

    #[snafu(display(
        "{type_name} is a one-per-module element; request a BTreeMap keyed by module name instead"
    ))]
    #[non_exhaustive]
    CannotUseOnePerModuleElementAsInput { type_name: &'static str },
}

/// One resolved input: the runtime value plus, in codegen mode, the
/// expression future consumers reference.
pub(crate) struct Slot {
    pub(crate) value: Value,
    pub(crate) expr: Option<Expr>,
}

impl From<Cached> for Slot {
    fn from(cached: Cached) -> Self {
        Self {
            value: cached.value,
            expr: cached.expr,
        }
    }
}

struct CallerFrame {
    location: Location,
}

struct ResolveFrame {
    type_name: &'static str,
    requester: String,
}

enum Plan {
    Simple { node: NodeId, idx: usize },
    ModuleDep { node: NodeId, idx: usize },
    GroupDirect,
    OnePerModuleDirect,
    Slice { elem: TypeKey },
    Map { elem: TypeKey },
    Supply,
}

/// The recursive, single-threaded resolution engine. Walks the graph once,
/// producing runtime values and (when enabled) the equivalent statements.
pub(crate) struct Solver {
    pub(crate) registry: Registry,
    caller_stack: Vec<CallerFrame>,
    caller_set: HashSet<NodeId>,
    resolve_stack: Vec<ResolveFrame>,
    cast_cache: HashMap<(TypeKey, TypeKey), Cached>,
    pub(crate) codegen: Option<FuncGen>,
    pub(crate) graph: Graph,
    logger: Option<Box<dyn LogSink>>,
}

impl Solver {
    pub(crate) fn new(
        registry: Registry,
        codegen: Option<FuncGen>,
        logger: Option<Box<dyn LogSink>>,
    ) -> Self {
        Self {
            registry,
            caller_stack: Vec::new(),
            caller_set: HashSet::new(),
            resolve_stack: Vec::new(),
            cast_cache: HashMap::new(),
            codegen,
            graph: Graph::new(),
            logger,
        }
    }

    /// Resolves the requested outputs, then runs the queued invokers.
    /// Any failure is fatal: invokers do not run after an error.
    pub(crate) fn build(
        &mut self,
        targets: &[InputSpec],
        caller: &Location,
    ) -> Result<Vec<Option<Slot>>, Error> {
        let root = self.graph.ensure_node(caller.name());
        self.graph.mark_used(root);
        self.caller_stack.push(CallerFrame {
            location: caller.clone(),
        });
        let mut slots = Vec::with_capacity(targets.len());
        for spec in targets {
            match self.resolve(spec, None, caller) {
                Ok(slot) => slots.push(slot),
                Err(err) => {
                    self.caller_stack.pop();
                    return Err(err);
                }
            }
        }
        self.caller_stack.pop();

        for node in self.registry.invokers.clone() {
            self.call_node(node, None)?;
        }
        Ok(slots)
    }

    fn log(&self, message: &str) {
        tracing::debug!("{message}");
        if let Some(logger) = &self.logger {
            let indent = "  ".repeat(self.resolve_stack.len());
            logger.line(&format!("{indent}{message}"));
        }
    }

    fn resolve(
        &mut self,
        spec: &InputSpec,
        module: Option<&ModuleKey>,
        caller: &Location,
    ) -> Result<Option<Slot>, Error> {
        self.log(&format!("resolving {} for {}", spec.key(), caller));
        self.resolve_stack.push(ResolveFrame {
            type_name: spec.key().name(),
            requester: caller.to_string(),
        });
        let result = self.resolve_inner(spec, module, caller);
        self.resolve_stack.pop();
        result
    }

    fn resolve_inner(
        &mut self,
        spec: &InputSpec,
        module: Option<&ModuleKey>,
        caller: &Location,
    ) -> Result<Option<Slot>, Error> {
        match spec.kind {
            InputKind::ModuleKey => {
                let Some(module) = module else {
                    return Err(NoModuleScopeSnafu {
                        type_name: spec.key().name(),
                        location: caller.clone(),
                    }
                    .build()
                    .into());
                };
                let expr = match self.codegen.as_mut() {
                    Some(gen) => Some(gen.module_key_expr(module.name())?),
                    None => None,
                };
                Ok(Some(Slot {
                    value: Value::new(module.clone()),
                    expr,
                }))
            }
            InputKind::OwnModuleKey => {
                let Some(module) = module else {
                    return Err(NoModuleScopeSnafu {
                        type_name: spec.key().name(),
                        location: caller.clone(),
                    }
                    .build()
                    .into());
                };
                let expr = match self.codegen.as_mut() {
                    Some(gen) => Some(gen.own_module_key_expr(module.name())?),
                    None => None,
                };
                Ok(Some(Slot {
                    value: Value::new(OwnModuleKey::new(module.clone())),
                    expr,
                }))
            }
            InputKind::Interface => self.resolve_interface(spec, module, caller),
            InputKind::SliceOfGroup { elem } => {
                if self.registry.ensure_slice_resolver(spec.key(), elem) {
                    self.resolve_key(spec.key(), module, caller).map(Some)
                } else {
                    self.absent_or_unresolvable(spec)
                }
            }
            InputKind::MapOfOnePerModule { elem } => {
                if self.registry.ensure_map_resolver(spec.key(), elem) {
                    self.resolve_key(spec.key(), module, caller).map(Some)
                } else {
                    self.absent_or_unresolvable(spec)
                }
            }
            InputKind::Plain => {
                if self.registry.resolvers.contains_key(&spec.key()) {
                    self.resolve_key(spec.key(), module, caller).map(Some)
                } else {
                    self.absent_or_unresolvable(spec)
                }
            }
            InputKind::GroupElement => Err(CannotUseGroupElementAsInputSnafu {
                type_name: spec.key().name(),
            }
            .build()
            .into()),
            InputKind::OnePerModuleElement => Err(CannotUseOnePerModuleElementAsInputSnafu {
                type_name: spec.key().name(),
            }
            .build()
            .into()),
        }
    }

    fn resolve_interface(
        &mut self,
        spec: &InputSpec,
        module: Option<&ModuleKey>,
        caller: &Location,
    ) -> Result<Option<Slot>, Error> {
        let iface = spec.key();

        if let Some(implementation) = self.registry.binding(iface, module) {
            let Some(cast) = self.registry.cast_for(iface, implementation) else {
                return Err(ExplicitBindingNotFoundSnafu {
                    iface: iface.name(),
                    implementation: implementation.name(),
                }
                .build()
                .into());
            };
            if !self.registry.resolvers.contains_key(&implementation) {
                return Err(ExplicitBindingNotFoundSnafu {
                    iface: iface.name(),
                    implementation: implementation.name(),
                }
                .build()
                .into());
            }
            let slot = self.resolve_key(implementation, module, caller)?;
            return self.apply_cast(iface, implementation, cast, slot).map(Some);
        }

        if self.registry.resolvers.contains_key(&iface) {
            return self.resolve_key(iface, module, caller).map(Some);
        }

        let implementers = self.registry.implementers_with_resolvers(iface);
        match implementers.as_slice() {
            [] => self.absent_or_unresolvable(spec),
            [(implementation, cast)] => {
                let (implementation, cast) = (*implementation, *cast);
                let slot = self.resolve_key(implementation, module, caller)?;
                self.apply_cast(iface, implementation, cast, slot).map(Some)
            }
            many => Err(MultipleImplicitBindingsSnafu {
                iface: iface.name(),
                implementations: many
                    .iter()
                    .map(|(key, _)| key.name())
                    .collect::<Vec<_>>()
                    .join(", "),
            }
            .build()
            .into()),
        }
    }

    fn absent_or_unresolvable(&self, spec: &InputSpec) -> Result<Option<Slot>, Error> {
        if spec.optional() {
            self.log(&format!("{} is absent, using its zero value", spec.key()));
            Ok(None)
        } else {
            Err(UnresolvableSnafu {
                type_name: spec.key().name(),
                stack: self.format_resolve_stack(),
            }
            .build()
            .into())
        }
    }

    fn resolve_key(
        &mut self,
        key: TypeKey,
        module: Option<&ModuleKey>,
        caller: &Location,
    ) -> Result<Slot, Error> {
        let plan = match self.registry.resolvers.get(&key) {
            Some(Resolver::Simple(r)) => Plan::Simple {
                node: r.node,
                idx: r.idx,
            },
            Some(Resolver::ModuleDep(r)) => Plan::ModuleDep {
                node: r.node,
                idx: r.idx,
            },
            Some(Resolver::Group(_)) => Plan::GroupDirect,
            Some(Resolver::OnePerModule(_)) => Plan::OnePerModuleDirect,
            Some(Resolver::SliceOfGroup(r)) => match &r.cached {
                Some(cached) => return Ok(cached.clone().into()),
                None => Plan::Slice { elem: r.elem },
            },
            Some(Resolver::MapOfOnePerModule(r)) => match &r.cached {
                Some(cached) => return Ok(cached.clone().into()),
                None => Plan::Map { elem: r.elem },
            },
            Some(Resolver::Supply(_)) => Plan::Supply,
            None => unreachable!("resolve_key should only see registered types"),
        };

        match plan {
            Plan::Simple { node, idx } => {
                self.call_node(node, module)?;
                Ok(self.node_output(node, None, idx))
            }
            Plan::ModuleDep { node, idx } => {
                self.call_node(node, module)?;
                Ok(self.node_output(node, module, idx))
            }
            Plan::GroupDirect => Err(CannotUseGroupElementAsInputSnafu {
                type_name: key.name(),
            }
            .build()
            .into()),
            Plan::OnePerModuleDirect => Err(CannotUseOnePerModuleElementAsInputSnafu {
                type_name: key.name(),
            }
            .build()
            .into()),
            Plan::Slice { elem } => self.resolve_slice(key, elem, module),
            Plan::Map { elem } => self.resolve_map(key, elem),
            Plan::Supply => self.resolve_supply(key),
        }
    }

    fn resolve_slice(
        &mut self,
        key: TypeKey,
        elem: TypeKey,
        module: Option<&ModuleKey>,
    ) -> Result<Slot, Error> {
        let (providers, build_slice) = match self.registry.resolvers.get(&elem) {
            Some(Resolver::Group(group)) => (group.providers.clone(), group.build_slice),
            _ => unreachable!("a slice resolver should be paired with a group"),
        };

        let mut values = Vec::new();
        let mut contributions: Vec<(Expr, bool)> = Vec::new();
        for provider in providers {
            self.call_node(provider.node, module)?;
            let slot = self.node_output(provider.node, None, provider.idx);
            if let Some(expr) = slot.expr {
                contributions.push((expr, provider.splat));
            }
            if provider.splat {
                let descriptor = Arc::clone(&self.registry.nodes[provider.node].descriptor);
                match descriptor.outputs[provider.idx].kind {
                    OutputKind::GroupElements { split, .. } => values.extend(split(slot.value)),
                    _ => unreachable!("a splat contribution should be a group-elements output"),
                }
            } else {
                values.push(slot.value);
            }
        }
        let value = build_slice(values);

        let expr = match self.codegen.as_mut() {
            Some(gen) => {
                let ty = gen.file.type_expr(key)?;
                let ident = gen.create_local(&ident_prefix(key.short_name()));
                let lead: Vec<Expr> = contributions
                    .iter()
                    .take_while(|(_, splat)| !*splat)
                    .map(|(expr, _)| crate::codegen::clone_expr(expr))
                    .collect();
                let rest = &contributions[lead.len()..];
                if rest.is_empty() {
                    gen.push_stmt(parse_quote!(let #ident: #ty = vec![#(#lead),*];));
                } else {
                    gen.push_stmt(parse_quote!(let mut #ident: #ty = vec![#(#lead),*];));
                    for (expr, splat) in rest {
                        let expr = crate::codegen::clone_expr(expr);
                        if *splat {
                            gen.push_stmt(parse_quote!(#ident.extend(#expr);));
                        } else {
                            gen.push_stmt(parse_quote!(#ident.push(#expr);));
                        }
                    }
                }
                Some(parse_quote!(#ident))
            }
            None => None,
        };

        let cached = Cached {
            value: value.clone(),
            expr: expr.clone(),
        };
        if let Some(Resolver::SliceOfGroup(resolver)) = self.registry.resolvers.get_mut(&key) {
            resolver.cached = Some(cached);
        }
        Ok(Slot { value, expr })
    }

    fn resolve_map(&mut self, key: TypeKey, elem: TypeKey) -> Result<Slot, Error> {
        let (providers, build_map) = match self.registry.resolvers.get(&elem) {
            Some(Resolver::OnePerModule(resolver)) => {
                (resolver.providers.clone(), resolver.build_map)
            }
            _ => unreachable!("a map resolver should be paired with a one-per-module resolver"),
        };

        let mut entries = Vec::new();
        let mut entry_exprs: Vec<(String, Expr)> = Vec::new();
        for (name, (node, idx)) in providers {
            self.call_node(node, None)?;
            let slot = self.node_output(node, None, idx);
            if let Some(expr) = slot.expr {
                entry_exprs.push((name.clone(), expr));
            }
            entries.push((name, slot.value));
        }
        let value = build_map(entries);

        let expr = match self.codegen.as_mut() {
            Some(gen) => {
                let ty = gen.file.type_expr(key)?;
                let ctor = crate::codegen::path_without_args(&ty);
                let ident = gen.create_local(&ident_prefix(key.short_name()));
                let pairs: Vec<Expr> = entry_exprs
                    .iter()
                    .map(|(name, expr)| {
                        let expr = crate::codegen::clone_expr(expr);
                        parse_quote!((#name.to_string(), #expr))
                    })
                    .collect();
                gen.push_stmt(parse_quote!(let #ident: #ty = #ctor::from([#(#pairs),*]);));
                Some(parse_quote!(#ident))
            }
            None => None,
        };

        let cached = Cached {
            value: value.clone(),
            expr: expr.clone(),
        };
        if let Some(Resolver::MapOfOnePerModule(resolver)) = self.registry.resolvers.get_mut(&key)
        {
            resolver.cached = Some(cached);
        }
        Ok(Slot { value, expr })
    }

    fn resolve_supply(&mut self, key: TypeKey) -> Result<Slot, Error> {
        let (value, emitted, expr_fn) = match self.registry.resolvers.get(&key) {
            Some(Resolver::Supply(supply)) => {
                (supply.value.clone(), supply.emitted.clone(), supply.expr)
            }
            _ => unreachable!("resolve_supply should only see supply resolvers"),
        };
        let Some(gen) = self.codegen.as_mut() else {
            return Ok(Slot { value, expr: None });
        };
        if let Some(expr) = emitted {
            return Ok(Slot {
                value,
                expr: Some(expr),
            });
        }

        let expr: Expr = if let Some(param) = gen.prebound(key) {
            parse_quote!(#param)
        } else {
            let literal = expr_fn(&value, &mut gen.file)?;
            let ty = gen.file.type_expr(key)?;
            let ident = gen.create_local(&ident_prefix(key.short_name()));
            gen.push_stmt(parse_quote!(let #ident: #ty = #literal;));
            parse_quote!(#ident)
        };
        if let Some(Resolver::Supply(supply)) = self.registry.resolvers.get_mut(&key) {
            supply.emitted = Some(expr.clone());
        }
        Ok(Slot {
            value,
            expr: Some(expr),
        })
    }

    fn apply_cast(
        &mut self,
        iface: TypeKey,
        implementation: TypeKey,
        cast: InterfaceCast,
        slot: Slot,
    ) -> Result<Slot, Error> {
        if let Some(cached) = self.cast_cache.get(&(iface, implementation)) {
            return Ok(cached.clone().into());
        }
        let value = (cast.cast)(slot.value);
        let expr = match self.codegen.as_mut() {
            Some(gen) => {
                let Some(source) = slot.expr else {
                    unreachable!("codegen mode should carry an expression for every value")
                };
                let source = crate::codegen::clone_expr(&source);
                let ty = gen.file.type_expr(iface)?;
                let cast_expr: Expr = match cast.style {
                    CastStyle::ArcNew => {
                        let sync = gen.file.alias_for("std::sync");
                        parse_quote!(#sync::Arc::new(#source))
                    }
                    CastStyle::Coerce => parse_quote!(#source as #ty),
                };
                let ident = gen.create_local(&ident_prefix(iface.short_name()));
                gen.push_stmt(parse_quote!(let #ident: #ty = #cast_expr;));
                Some(parse_quote!(#ident))
            }
            None => None,
        };
        let cached = Cached {
            value: value.clone(),
            expr: expr.clone(),
        };
        self.cast_cache.insert((iface, implementation), cached);
        Ok(Slot { value, expr })
    }

    fn call_node(
        &mut self,
        node_id: NodeId,
        consumer_module: Option<&ModuleKey>,
    ) -> Result<(), Error> {
        let (module_scoped, own_module) = {
            let node = &self.registry.nodes[node_id];
            (node.module_scoped, node.module.clone())
        };
        let consuming = if module_scoped {
            consumer_module.cloned()
        } else {
            own_module
        };

        match &self.registry.nodes[node_id].state {
            NodeState::Called(_) => return Ok(()),
            NodeState::PerModule(calls) => {
                if let Some(module) = consuming.as_ref() {
                    if calls.contains_key(module) {
                        return Ok(());
                    }
                }
            }
            NodeState::Fresh => {}
        }

        let descriptor = Arc::clone(&self.registry.nodes[node_id].descriptor);
        let graph_node = self.graph.ensure_node(descriptor.location.name());
        if let Some(parent) = self.caller_stack.last() {
            let parent_node = self.graph.ensure_node(parent.location.name());
            self.graph.add_edge(parent_node, graph_node);
        }

        if !self.caller_set.insert(node_id) {
            self.graph.mark_failed(graph_node);
            return Err(CycleSnafu {
                location: descriptor.location.clone(),
                stack: self.format_caller_stack(),
            }
            .build()
            .into());
        }
        self.caller_stack.push(CallerFrame {
            location: descriptor.location.clone(),
        });
        self.log(&format!("calling provider {}", descriptor.location));

        let result = self.call_node_inner(&descriptor, module_scoped, consuming.as_ref());

        self.caller_stack.pop();
        self.caller_set.remove(&node_id);

        let call = match result {
            Ok(call) => {
                self.graph.mark_used(graph_node);
                call
            }
            Err(err) => {
                self.graph.mark_failed(graph_node);
                return Err(err);
            }
        };

        match &mut self.registry.nodes[node_id].state {
            NodeState::PerModule(calls) => {
                let Some(module) = consuming else {
                    unreachable!("a module-scoped call should carry a module key")
                };
                calls.insert(module, call);
            }
            state => *state = NodeState::Called(call),
        }
        Ok(())
    }

    fn call_node_inner(
        &mut self,
        descriptor: &ProviderDescriptor,
        module_scoped: bool,
        consuming: Option<&ModuleKey>,
    ) -> Result<NodeCall, Error> {
        let mut value_slots = Vec::with_capacity(descriptor.inputs.len());
        let mut expr_slots = Vec::with_capacity(descriptor.inputs.len());
        for spec in &descriptor.inputs {
            match self.resolve(spec, consuming, &descriptor.location)? {
                Some(slot) => {
                    value_slots.push(Some(slot.value));
                    expr_slots.push(slot.expr);
                }
                None => {
                    value_slots.push(None);
                    expr_slots.push(None);
                }
            }
        }

        let values = (descriptor.call)(value_slots).map_err(|source| {
            Error::from(ResolveError::ProviderError {
                location: descriptor.location.clone(),
                source,
            })
        })?;

        let exprs = match self.codegen.as_mut() {
            Some(gen) => Some(emit_call(
                gen,
                descriptor,
                module_scoped.then(|| consuming.map(ModuleKey::name)).flatten(),
                &expr_slots,
            )?),
            None => None,
        };
        Ok(NodeCall { values, exprs })
    }

    fn node_output(&self, node: NodeId, module: Option<&ModuleKey>, idx: usize) -> Slot {
        let slot = &self.registry.nodes[node];
        let call = match (&slot.state, module) {
            (NodeState::Called(call), _) => call,
            (NodeState::PerModule(calls), Some(module)) => match calls.get(module) {
                Some(call) => call,
                None => unreachable!("the node should have been called for this module"),
            },
            _ => unreachable!("the node should have been called"),
        };
        Slot {
            value: call.values[idx].clone(),
            expr: call.exprs.as_ref().map(|exprs| exprs[idx].clone()),
        }
    }

    fn format_resolve_stack(&self) -> String {
        self.resolve_stack
            .iter()
            .map(|frame| format!("\twhile resolving {} for {}", frame.type_name, frame.requester))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_caller_stack(&self) -> String {
        self.caller_stack
            .iter()
            .map(|frame| frame.location.to_string())
            .collect::<Vec<_>>()
            .join("\n\t")
    }
}

fn emit_call(
    gen: &mut FuncGen,
    descriptor: &ProviderDescriptor,
    module_suffix: Option<&str>,
    expr_slots: &[Option<Expr>],
) -> Result<Vec<Expr>, Error> {
    let mut args = Vec::with_capacity(descriptor.args.len());
    for arg in &descriptor.args {
        let slice = &expr_slots[arg.start..arg.start + arg.len];
        args.push((arg.build_expr)(slice, &mut gen.file)?);
    }
    let path = gen.file.fn_path(&descriptor.location)?;
    let mut call: Expr = parse_quote!(#path(#(#args),*));
    if descriptor.fallible {
        call = parse_quote!(#call?);
    }

    if descriptor.outputs.is_empty() {
        gen.push_stmt(parse_quote!(#call;));
        return Ok(Vec::new());
    }

    let mut prefix = match descriptor.outputs.first() {
        Some(out) => ident_prefix(out.key().short_name()),
        None => ident_prefix(descriptor.location.short_name()),
    };
    if let Some(suffix) = module_suffix {
        prefix = format!("{prefix}_for_{}", ident_prefix(suffix));
    }
    let ident = gen.create_local(&prefix);
    gen.push_stmt(parse_quote!(let #ident = #call;));

    let mut outputs = Vec::with_capacity(descriptor.outputs.len());
    for out in &descriptor.outputs {
        let mut expr: Expr = parse_quote!(#ident);
        for field in &out.access {
            let field = syn::Ident::new(field, proc_macro2::Span::call_site());
            expr = parse_quote!(#expr.#field);
        }
        outputs.push(expr);
    }
    Ok(outputs)
}
