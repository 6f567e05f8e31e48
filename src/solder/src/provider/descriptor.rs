use std::error::Error;
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::panic;

use syn::Expr;

use crate::codegen::{CodegenError, FileGen};
use crate::container::registry::{
    BadErrorPositionSnafu, BadInputTypeSnafu, BadOptionalTagSnafu, BadProviderShapeSnafu,
    BadReturnTypeSnafu, ConfigError,
};
use crate::provider::providable::{InputKind, InputSpec, OutputSpec, Providable};
use crate::provider::value::Value;

pub(crate) type BoxError = Box<dyn Error + Send + Sync>;
pub(crate) type CallFn = Box<dyn Fn(Vec<Option<Value>>) -> Result<Vec<Value>, BoxError> + Send + Sync>;
pub(crate) type ArgExprFn = fn(&[Option<Expr>], &mut FileGen) -> Result<Expr, CodegenError>;

/// Where a provider was defined: the factory's path plus the registration
/// call site. Used in every diagnostic, in graph nodes and as the callable
/// path in generated code.
#[derive(Clone)]
pub struct Location {
    name: String,
    file: &'static str,
    line: u32,
}

impl Location {
    #[track_caller]
    pub(crate) fn capture<F: ?Sized>(f: &F) -> Self {
        let caller = panic::Location::caller();
        Self {
            name: std::any::type_name_of_val(f).to_owned(),
            file: caller.file(),
            line: caller.line(),
        }
    }

    #[track_caller]
    pub(crate) fn call_site(name: &str) -> Self {
        let caller = panic::Location::caller();
        Self {
            name: name.to_owned(),
            file: caller.file(),
            line: caller.line(),
        }
    }

    /// The factory's fully qualified path, e.g. `app::new_db`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self) -> &'static str {
        self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    /// Whether the path can appear in generated code. Closures have no
    /// nameable path and only work at runtime.
    pub(crate) fn is_nameable(&self) -> bool {
        !self.name.contains("{{")
    }

    /// The trailing path segment, used to seed generated variable names.
    pub(crate) fn short_name(&self) -> &str {
        match self.name.rfind("::") {
            Some(pos) => &self.name[pos + 2..],
            None => &self.name,
        }
    }
}

impl Debug for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Display::fmt(self, f)
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{} ({}:{})", self.name, self.file, self.line)
    }
}

/// One factory argument: which expanded input slots it covers and how to
/// rebuild its expression in generated code.
pub(crate) struct ArgSpec {
    pub(crate) start: usize,
    pub(crate) len: usize,
    pub(crate) build_expr: ArgExprFn,
}

/// A normalized provider: expanded inputs and outputs plus a call-through
/// that accepts resolved values and returns the produced values.
pub struct ProviderDescriptor {
    pub(crate) location: Location,
    pub(crate) inputs: Vec<InputSpec>,
    pub(crate) args: Vec<ArgSpec>,
    pub(crate) outputs: Vec<OutputSpec>,
    pub(crate) fallible: bool,
    pub(crate) call: CallFn,
}

impl ProviderDescriptor {
    pub fn location(&self) -> &Location {
        &self.location
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let mut has_module_key = false;
        let mut has_own_module_key = false;
        for input in &self.inputs {
            match input.kind {
                InputKind::ModuleKey => has_module_key = true,
                InputKind::OwnModuleKey => has_own_module_key = true,
                InputKind::GroupElement => {
                    return BadInputTypeSnafu {
                        location: self.location.clone(),
                        type_name: input.key.name(),
                    }
                    .fail();
                }
                InputKind::OnePerModuleElement => {
                    return BadInputTypeSnafu {
                        location: self.location.clone(),
                        type_name: input.key.name(),
                    }
                    .fail();
                }
                _ => {}
            }
        }
        if has_module_key && has_own_module_key {
            return BadProviderShapeSnafu {
                location: self.location.clone(),
                reason: "both ModuleKey and OwnModuleKey are declared",
            }
            .fail();
        }
        Ok(())
    }
}

impl Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ProviderDescriptor")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// Builds a [`ProviderDescriptor`] by enumerating inputs and outputs
/// explicitly, for callers that cannot go through the typed factory layer.
pub struct DescriptorBuilder {
    location: Location,
    inputs: Vec<InputSpec>,
    args: Vec<ArgSpec>,
    outputs: Vec<OutputSpec>,
    error_output_seen: bool,
    pending: Option<ConfigError>,
}

impl DescriptorBuilder {
    #[track_caller]
    pub fn new(name: &str) -> Self {
        Self {
            location: Location::call_site(name),
            inputs: Vec::new(),
            args: Vec::new(),
            outputs: Vec::new(),
            error_output_seen: false,
            pending: None,
        }
    }

    pub fn input<T: Providable>(mut self) -> Self {
        self.push_arg::<T>(false);
        self
    }

    /// Declares an input whose absence is tolerated: the call-through
    /// receives `None` in its slot instead of an error.
    pub fn optional_input<T: Providable>(mut self) -> Self {
        self.push_arg::<T>(true);
        self
    }

    fn push_arg<T: Providable>(&mut self, optional: bool) {
        let mut shape = T::input_shape();
        for spec in &mut shape.inputs {
            if optional {
                if matches!(spec.kind, InputKind::ModuleKey | InputKind::OwnModuleKey) {
                    self.pending.get_or_insert(
                        BadOptionalTagSnafu {
                            location: self.location.clone(),
                            type_name: spec.key.name(),
                        }
                        .build(),
                    );
                }
                spec.optional = true;
            }
        }
        self.args.push(ArgSpec {
            start: self.inputs.len(),
            len: shape.inputs.len(),
            build_expr: T::arg_expr,
        });
        self.inputs.extend(shape.inputs);
    }

    pub fn output<T: Providable>(mut self) -> Self {
        if self.error_output_seen && self.pending.is_none() {
            self.pending = Some(
                BadErrorPositionSnafu {
                    location: self.location.clone(),
                }
                .build(),
            );
        }
        let shape = T::output_shape();
        if let Some(reason) = shape.reject {
            self.pending.get_or_insert(
                BadReturnTypeSnafu {
                    location: self.location.clone(),
                    type_name: T::key().name(),
                    reason,
                }
                .build(),
            );
        }
        self.outputs.extend(shape.outputs);
        self
    }

    /// Declares that the call-through's error is positioned here; any
    /// output declared afterwards is rejected.
    pub fn output_error(mut self) -> Self {
        self.error_output_seen = true;
        self
    }

    pub fn call<F>(self, f: F) -> Result<ProviderDescriptor, ConfigError>
    where
        F: Fn(Vec<Option<Value>>) -> Result<Vec<Value>, BoxError> + Send + Sync + 'static,
    {
        if let Some(err) = self.pending {
            return Err(err);
        }
        let descriptor = ProviderDescriptor {
            location: self.location,
            inputs: self.inputs,
            args: self.args,
            outputs: self.outputs,
            fallible: self.error_output_seen,
            call: Box::new(f),
        };
        descriptor.validate()?;
        Ok(descriptor)
    }
}
