use std::any::TypeId;
use std::convert::Infallible;

use crate::container::registry::{BadReturnTypeSnafu, ConfigError};
use crate::provider::descriptor::{ArgSpec, BoxError, CallFn, Location, ProviderDescriptor};
use crate::provider::providable::Providable;
use crate::provider::value::Value;

/// A factory function the container can register as a provider.
///
/// Implemented for `Fn(A1, .., An) -> Result<O, E>` up to twelve arguments,
/// where every `Ai` and `O` is [`Providable`] and `E` converts into a boxed
/// error. Infallible factories are spelled `Ok::<_, Infallible>(..)`.
pub trait Factory<Args>: Send + Sync + 'static {
    fn describe(self, location: Location) -> Result<ProviderDescriptor, ConfigError>;
}

/// A zero-output function queued by `invoke` and called after the primary
/// resolution pass.
pub trait Invoker<Args>: Send + Sync + 'static {
    fn describe(self, location: Location) -> Result<ProviderDescriptor, ConfigError>;
}

macro_rules! impl_factory {
    ($($arg:ident)*) => {
        #[allow(non_snake_case, unused_variables, unused_mut)]
        impl<F, O, E, $($arg,)*> Factory<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> Result<O, E> + Send + Sync + 'static,
            O: Providable,
            E: Into<BoxError> + 'static,
            $($arg: Providable,)*
        {
            fn describe(self, location: Location) -> Result<ProviderDescriptor, ConfigError> {
                let mut inputs = Vec::new();
                let mut args = Vec::new();
                $(
                    let shape = <$arg as Providable>::input_shape();
                    args.push(ArgSpec {
                        start: inputs.len(),
                        len: shape.inputs.len(),
                        build_expr: <$arg as Providable>::arg_expr,
                    });
                    inputs.extend(shape.inputs);
                )*

                let out_shape = O::output_shape();
                if let Some(reason) = out_shape.reject {
                    return BadReturnTypeSnafu {
                        location,
                        type_name: O::key().name(),
                        reason,
                    }
                    .fail();
                }

                let call: CallFn = Box::new(move |slots: Vec<Option<Value>>| {
                    let mut slots = slots.into_iter();
                    $(
                        let $arg = <$arg as Providable>::from_resolved(&mut slots);
                    )*
                    let out = (self)($($arg),*).map_err(Into::into)?;
                    Ok(out.into_values())
                });

                let descriptor = ProviderDescriptor {
                    location,
                    inputs,
                    args,
                    outputs: out_shape.outputs,
                    fallible: TypeId::of::<E>() != TypeId::of::<Infallible>(),
                    call,
                };
                descriptor.validate()?;
                Ok(descriptor)
            }
        }

        #[allow(non_snake_case, unused_variables, unused_mut)]
        impl<F, E, $($arg,)*> Invoker<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> Result<(), E> + Send + Sync + 'static,
            E: Into<BoxError> + 'static,
            $($arg: Providable,)*
        {
            fn describe(self, location: Location) -> Result<ProviderDescriptor, ConfigError> {
                let mut inputs = Vec::new();
                let mut args = Vec::new();
                $(
                    let shape = <$arg as Providable>::input_shape();
                    args.push(ArgSpec {
                        start: inputs.len(),
                        len: shape.inputs.len(),
                        build_expr: <$arg as Providable>::arg_expr,
                    });
                    inputs.extend(shape.inputs);
                )*

                let call: CallFn = Box::new(move |slots: Vec<Option<Value>>| {
                    let mut slots = slots.into_iter();
                    $(
                        let $arg = <$arg as Providable>::from_resolved(&mut slots);
                    )*
                    (self)($($arg),*).map_err(Into::into)?;
                    Ok(Vec::new())
                });

                let descriptor = ProviderDescriptor {
                    location,
                    inputs,
                    args,
                    outputs: Vec::new(),
                    fallible: TypeId::of::<E>() != TypeId::of::<Infallible>(),
                    call,
                };
                descriptor.validate()?;
                Ok(descriptor)
            }
        }
    };
}

impl_factory!();
impl_factory!(A1);
impl_factory!(A1 A2);
impl_factory!(A1 A2 A3);
impl_factory!(A1 A2 A3 A4);
impl_factory!(A1 A2 A3 A4 A5);
impl_factory!(A1 A2 A3 A4 A5 A6);
impl_factory!(A1 A2 A3 A4 A5 A6 A7);
impl_factory!(A1 A2 A3 A4 A5 A6 A7 A8);
impl_factory!(A1 A2 A3 A4 A5 A6 A7 A8 A9);
impl_factory!(A1 A2 A3 A4 A5 A6 A7 A8 A9 A10);
impl_factory!(A1 A2 A3 A4 A5 A6 A7 A8 A9 A10 A11);
impl_factory!(A1 A2 A3 A4 A5 A6 A7 A8 A9 A10 A11 A12);

#[cfg(test)]
mod tests {
    use super::*;

    fn make_answer() -> Result<i32, Infallible> {
        Ok(42)
    }

    fn stringify(x: i32) -> Result<String, Infallible> {
        Ok(format!("{x}"))
    }

    fn failing() -> Result<i32, std::io::Error> {
        Err(std::io::Error::other("boom"))
    }

    fn describe<F, Args>(factory: F) -> ProviderDescriptor
    where
        F: Factory<Args>,
    {
        let location = Location::capture(&factory);
        factory.describe(location).unwrap()
    }

    #[test]
    fn factory_describe_succeeds_for_a_source() {
        let descriptor = describe(make_answer);

        assert!(descriptor.inputs.is_empty());
        assert_eq!(descriptor.outputs.len(), 1);
        assert!(!descriptor.fallible);

        let out = (descriptor.call)(Vec::new()).unwrap();
        assert_eq!(out[0].clone().take::<i32>(), 42);
    }

    #[test]
    fn factory_describe_succeeds_for_a_transformer() {
        let descriptor = describe(stringify);

        assert_eq!(descriptor.inputs.len(), 1);
        let out = (descriptor.call)(vec![Some(Value::new(7i32))]).unwrap();
        assert_eq!(out[0].clone().take::<String>(), "7");
    }

    #[test]
    fn factory_call_fails_when_the_source_fails() {
        let descriptor = describe(failing);

        assert!(descriptor.fallible);
        assert!((descriptor.call)(Vec::new()).is_err());
    }

    #[test]
    fn invoker_describe_succeeds_with_zero_outputs() {
        fn observe(_x: Option<i32>) -> Result<(), Infallible> {
            Ok(())
        }

        let location = Location::capture(&observe);
        let descriptor = Invoker::describe(observe, location).unwrap();

        assert!(descriptor.outputs.is_empty());
        assert_eq!(descriptor.inputs.len(), 1);
        assert!(descriptor.inputs[0].optional());
    }
}
