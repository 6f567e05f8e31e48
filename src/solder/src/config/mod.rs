use std::sync::Arc;

use syn::Expr;

use crate::codegen::{CodegenError, FileGen};
use crate::container::registry::ConfigError;
use crate::key::TypeKey;
use crate::provider::{BoxError, Factory, Invoker, Location, Providable, ProviderDescriptor, Value};

pub(crate) type SupplyExprFn = fn(&Value, &mut FileGen) -> Result<Expr, CodegenError>;

/// A bundle of registrations handed to the container.
///
/// Configs compose: each builder below returns one, and [`configs`] (or
/// [`Config::merge`]) concatenates them. Registration problems are carried
/// inside the config and surface when the container is built, so builders
/// themselves never fail.
#[derive(Default)]
pub struct Config {
    pub(crate) entries: Vec<ConfigEntry>,
}

pub(crate) enum ConfigEntry {
    Provide {
        descriptor: Arc<ProviderDescriptor>,
        module: Option<String>,
    },
    Supply {
        key: TypeKey,
        value: Value,
        expr: SupplyExprFn,
        location: Location,
    },
    Invoke {
        descriptor: Arc<ProviderDescriptor>,
        module: Option<String>,
    },
    BindInterface {
        iface: TypeKey,
        implementation: TypeKey,
        module: Option<String>,
        location: Location,
    },
    Error {
        error: ConfigError,
    },
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(mut self, mut other: Config) -> Self {
        self.entries.append(&mut other.entries);
        self
    }

    fn with(entry: ConfigEntry) -> Self {
        Self {
            entries: vec![entry],
        }
    }
}

/// Bundles several configs into one, preserving registration order.
pub fn configs<I>(configs: I) -> Config
where
    I: IntoIterator<Item = Config>,
{
    configs
        .into_iter()
        .fold(Config::new(), |acc, config| acc.merge(config))
}

/// Registers a provider: a factory whose inputs are resolved from the graph
/// and whose output types become resolvable.
#[track_caller]
pub fn provide<F, Args>(factory: F) -> Config
where
    F: Factory<Args>,
{
    let location = Location::capture(&factory);
    tracing::debug!(provider = %location, "registering provider");
    match factory.describe(location) {
        Ok(descriptor) => Config::with(ConfigEntry::Provide {
            descriptor: Arc::new(descriptor),
            module: None,
        }),
        Err(error) => Config::with(ConfigEntry::Error { error }),
    }
}

/// Registers a provider inside a named module.
#[track_caller]
pub fn provide_in_module<F, Args>(module: &str, factory: F) -> Config
where
    F: Factory<Args>,
{
    let location = Location::capture(&factory);
    tracing::debug!(provider = %location, module, "registering provider");
    match factory.describe(location) {
        Ok(descriptor) => Config::with(ConfigEntry::Provide {
            descriptor: Arc::new(descriptor),
            module: Some(module.to_owned()),
        }),
        Err(error) => Config::with(ConfigEntry::Error { error }),
    }
}

/// Registers an already-constructed value. In codegen mode the value is
/// rendered as a literal, or becomes a pre-bound parameter when the
/// generated function declares one of its type.
#[track_caller]
pub fn supply<T: Providable>(value: T) -> Config {
    fn expr_of<T: Providable>(value: &Value, gen: &mut FileGen) -> Result<Expr, CodegenError> {
        match value.downcast_ref::<T>() {
            Some(concrete) => concrete.value_expr(gen),
            None => unreachable!("a supplied value should match its registered type"),
        }
    }

    let location = Location::call_site("supply");
    Config::with(ConfigEntry::Supply {
        key: T::key(),
        value: Value::new(value),
        expr: expr_of::<T>,
        location,
    })
}

/// Queues a zero-output function to run after the primary resolution pass.
#[track_caller]
pub fn invoke<F, Args>(function: F) -> Config
where
    F: Invoker<Args>,
{
    let location = Location::capture(&function);
    match function.describe(location) {
        Ok(descriptor) => Config::with(ConfigEntry::Invoke {
            descriptor: Arc::new(descriptor),
            module: None,
        }),
        Err(error) => Config::with(ConfigEntry::Error { error }),
    }
}

/// Queues a zero-output function owned by a named module.
#[track_caller]
pub fn invoke_in_module<F, Args>(module: &str, function: F) -> Config
where
    F: Invoker<Args>,
{
    let location = Location::capture(&function);
    match function.describe(location) {
        Ok(descriptor) => Config::with(ConfigEntry::Invoke {
            descriptor: Arc::new(descriptor),
            module: Some(module.to_owned()),
        }),
        Err(error) => Config::with(ConfigEntry::Error { error }),
    }
}

/// Prefers `C` wherever the interface `I` is requested, container-wide.
///
/// `C` must declare the interface via `#[providable(implements(dyn ..))]`;
/// the binding itself only records the preference and is checked when the
/// graph is solved.
#[track_caller]
pub fn bind_interface<I, C>() -> Config
where
    I: Providable,
    C: Providable,
{
    let location = Location::call_site("bind_interface");
    Config::with(ConfigEntry::BindInterface {
        iface: I::key(),
        implementation: C::key(),
        module: None,
        location,
    })
}

/// Prefers `C` for the interface `I`, for consumers inside one module only.
#[track_caller]
pub fn bind_interface_in_module<I, C>(module: &str) -> Config
where
    I: Providable,
    C: Providable,
{
    let location = Location::call_site("bind_interface_in_module");
    Config::with(ConfigEntry::BindInterface {
        iface: I::key(),
        implementation: C::key(),
        module: Some(module.to_owned()),
        location,
    })
}

/// Forces the build to fail with the given error.
pub fn error<E>(err: E) -> Config
where
    E: Into<BoxError>,
{
    Config::with(ConfigEntry::Error {
        error: ConfigError::Supplied { source: err.into() },
    })
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;

    fn answer() -> Result<i32, Infallible> {
        Ok(42)
    }

    #[test]
    fn provide_succeeds_for_a_function_item() {
        let config = provide(answer);

        assert_eq!(config.entries.len(), 1);
        match &config.entries[0] {
            ConfigEntry::Provide { descriptor, module } => {
                assert!(module.is_none());
                assert!(descriptor.location().name().ends_with("answer"));
            }
            _ => panic!("expected a provide entry"),
        }
    }

    #[test]
    fn configs_preserves_registration_order() {
        let config = configs([provide(answer), supply(1i32), error("forced")]);

        assert_eq!(config.entries.len(), 3);
        assert!(matches!(config.entries[0], ConfigEntry::Provide { .. }));
        assert!(matches!(config.entries[1], ConfigEntry::Supply { .. }));
        assert!(matches!(config.entries[2], ConfigEntry::Error { .. }));
    }

    #[test]
    fn supply_records_the_type_key() {
        let config = supply(String::from("s"));

        match &config.entries[0] {
            ConfigEntry::Supply { key, value, .. } => {
                assert_eq!(*key, TypeKey::of::<String>());
                assert_eq!(value.downcast_ref::<String>().map(String::as_str), Some("s"));
            }
            _ => panic!("expected a supply entry"),
        }
    }
}
