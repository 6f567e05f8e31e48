mod descriptor;
mod factory;
mod providable;
mod value;

pub use descriptor::{DescriptorBuilder, Location, ProviderDescriptor};
pub use factory::{Factory, Invoker};
pub use providable::{
    CastStyle, InputKind, InputShape, InputSpec, InterfaceCast, ManyPerContainer, OnePerModule,
    OutputKind, OutputShape, OutputSpec, Providable,
};
pub use value::{Provided, Value};

pub(crate) use descriptor::{ArgExprFn, ArgSpec, BoxError, CallFn};
