pub(crate) mod graph;
pub mod registry;
pub(crate) mod resolver;
pub mod solver;

use crate::config::Config;
use crate::debug::{self, DebugOptions};
use crate::error::Error;
use crate::key::ModuleKeyContext;
use crate::provider::{ArgExprFn, InputSpec, Location, Providable, Value};

use registry::Registry;
use solver::Solver;

/// How one requested output is rendered in a generated function's return
/// value.
pub struct OutputBinding {
    pub(crate) key: crate::key::TypeKey,
    pub(crate) len: usize,
    pub(crate) build_expr: ArgExprFn,
}

/// The caller's output pointers: a single `&mut T` or a tuple of them.
/// Each target type describes how it is requested from the graph and how
/// the resolved value is written back.
pub trait OutputTargets {
    fn specs() -> Vec<InputSpec>;

    #[doc(hidden)]
    fn outputs() -> Vec<OutputBinding>;

    fn fill(self, values: Vec<Option<Value>>);
}

impl OutputTargets for () {
    fn specs() -> Vec<InputSpec> {
        Vec::new()
    }

    fn outputs() -> Vec<OutputBinding> {
        Vec::new()
    }

    fn fill(self, _values: Vec<Option<Value>>) {}
}

impl<T: Providable> OutputTargets for &mut T {
    fn specs() -> Vec<InputSpec> {
        T::input_shape().inputs
    }

    fn outputs() -> Vec<OutputBinding> {
        vec![OutputBinding {
            key: T::key(),
            len: T::input_shape().inputs.len(),
            build_expr: T::arg_expr,
        }]
    }

    fn fill(self, values: Vec<Option<Value>>) {
        let mut slots = values.into_iter();
        *self = T::from_resolved(&mut slots);
    }
}

macro_rules! impl_output_targets {
    ($($target:ident)+) => {
        #[allow(non_snake_case)]
        impl<$($target: OutputTargets),+> OutputTargets for ($($target,)+) {
            fn specs() -> Vec<InputSpec> {
                let mut specs = Vec::new();
                $(specs.extend($target::specs());)+
                specs
            }

            fn outputs() -> Vec<OutputBinding> {
                let mut outputs = Vec::new();
                $(outputs.extend($target::outputs());)+
                outputs
            }

            fn fill(self, mut values: Vec<Option<Value>>) {
                let ($($target,)+) = self;
                $(
                    let rest = values.split_off($target::specs().len());
                    $target.fill(values);
                    values = rest;
                )+
                let _ = values;
            }
        }
    };
}

impl_output_targets!(T1);
impl_output_targets!(T1 T2);
impl_output_targets!(T1 T2 T3);
impl_output_targets!(T1 T2 T3 T4);
impl_output_targets!(T1 T2 T3 T4 T5);
impl_output_targets!(T1 T2 T3 T4 T5 T6);
impl_output_targets!(T1 T2 T3 T4 T5 T6 T7);
impl_output_targets!(T1 T2 T3 T4 T5 T6 T7 T8);

/// Builds the graph described by `config` and writes each requested output
/// through the caller's pointer.
#[track_caller]
pub fn inject<T: OutputTargets>(config: Config, targets: T) -> Result<(), Error> {
    inject_with_debug(DebugOptions::new(), config, targets)
}

/// Like [`inject`], with debug sinks and hooks attached to the build.
#[track_caller]
pub fn inject_with_debug<T: OutputTargets>(
    options: DebugOptions,
    config: Config,
    targets: T,
) -> Result<(), Error> {
    let location = Location::call_site("solder::inject");
    let DebugOptions {
        logger,
        visualizer,
        on_success,
        on_error,
    } = options;

    let mkctx = ModuleKeyContext::new();
    let registry = match Registry::register(config, &mkctx, false) {
        Ok(registry) => registry,
        Err(err) => {
            let err = Error::from(err);
            for hook in on_error {
                hook(&err);
            }
            return Err(err);
        }
    };

    let mut solver = Solver::new(registry, None, logger);
    match solver.build(&T::specs(), &location) {
        Ok(slots) => {
            if let Some(sink) = &visualizer {
                sink.graph(&debug::render_dot(&solver.graph));
            }
            for hook in on_success {
                hook();
            }
            targets.fill(slots.into_iter().map(|slot| slot.map(|slot| slot.value)).collect());
            Ok(())
        }
        Err(err) => {
            if let Some(sink) = &visualizer {
                sink.graph(&debug::render_dot(&solver.graph));
            }
            for hook in on_error {
                hook(&err);
            }
            Err(err)
        }
    }
}
