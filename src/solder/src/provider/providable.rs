use std::collections::BTreeMap;

use syn::Expr;

use crate::codegen::{self, CodegenError, FileGen, UnrepresentableValueSnafu};
use crate::key::{ModuleKey, OwnModuleKey, TypeKey};
use crate::provider::value::Value;

/// How one expanded input slot is resolved by the container.
#[derive(Clone, Copy, Debug)]
pub enum InputKind {
    /// Looked up directly by its own type key.
    Plain,
    /// Looked up through the interface-binding table before falling back to
    /// a direct match or a single implicit implementer.
    Interface,
    /// A `Vec<T>` of a many-per-container element type.
    SliceOfGroup { elem: TypeKey },
    /// A `BTreeMap<String, T>` of a one-per-module element type.
    MapOfOnePerModule { elem: TypeKey },
    /// The consuming module's key.
    ModuleKey,
    /// The provider's own module key.
    OwnModuleKey,
    /// A many-per-container element requested directly; always rejected.
    GroupElement,
    /// A one-per-module element requested directly; always rejected.
    OnePerModuleElement,
}

/// One expanded input of a provider.
#[derive(Clone, Debug)]
pub struct InputSpec {
    pub(crate) key: TypeKey,
    pub(crate) kind: InputKind,
    pub(crate) optional: bool,
    pub(crate) field: Option<&'static str>,
}

impl InputSpec {
    pub(crate) fn new(key: TypeKey, kind: InputKind) -> Self {
        Self {
            key,
            kind,
            optional: false,
            field: None,
        }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn optional(&self) -> bool {
        self.optional
    }
}

/// The expanded input list one factory argument contributes.
#[derive(Clone, Debug, Default)]
pub struct InputShape {
    pub inputs: Vec<InputSpec>,
}

impl InputShape {
    pub fn empty() -> Self {
        Self { inputs: Vec::new() }
    }

    pub fn plain(key: TypeKey) -> Self {
        Self {
            inputs: vec![InputSpec::new(key, InputKind::Plain)],
        }
    }

    pub fn interface(key: TypeKey) -> Self {
        Self {
            inputs: vec![InputSpec::new(key, InputKind::Interface)],
        }
    }

    pub fn slice_of_group(key: TypeKey, elem: TypeKey) -> Self {
        Self {
            inputs: vec![InputSpec::new(key, InputKind::SliceOfGroup { elem })],
        }
    }

    pub fn map_of_one_per_module(key: TypeKey, elem: TypeKey) -> Self {
        Self {
            inputs: vec![InputSpec::new(key, InputKind::MapOfOnePerModule { elem })],
        }
    }

    pub fn module_key(key: TypeKey) -> Self {
        Self {
            inputs: vec![InputSpec::new(key, InputKind::ModuleKey)],
        }
    }

    pub fn own_module_key(key: TypeKey) -> Self {
        Self {
            inputs: vec![InputSpec::new(key, InputKind::OwnModuleKey)],
        }
    }

    pub fn group_element(key: TypeKey) -> Self {
        Self {
            inputs: vec![InputSpec::new(key, InputKind::GroupElement)],
        }
    }

    pub fn one_per_module_element(key: TypeKey) -> Self {
        Self {
            inputs: vec![InputSpec::new(key, InputKind::OnePerModuleElement)],
        }
    }

    /// Appends the inputs of one struct-in field, tagging them with the
    /// field's name so code emission can rebuild the composite literal.
    pub fn push_field<T: Providable>(&mut self, name: &'static str, optional: bool) {
        let mut shape = T::input_shape();
        for spec in &mut shape.inputs {
            spec.field = Some(name);
            if optional {
                spec.optional = true;
            }
        }
        self.inputs.extend(shape.inputs);
    }
}

/// How one output slot participates in registration.
#[derive(Clone, Copy)]
pub enum OutputKind {
    Plain,
    /// A single many-per-container element.
    GroupElement {
        slice: TypeKey,
        build_slice: fn(Vec<Value>) -> Value,
    },
    /// A `Vec` of many-per-container elements, unwrapped at registration.
    GroupElements {
        elem: TypeKey,
        slice: TypeKey,
        build_slice: fn(Vec<Value>) -> Value,
        split: fn(Value) -> Vec<Value>,
    },
    /// A one-per-module element, keyed by the provider's module name.
    OnePerModuleElement {
        map: TypeKey,
        build_map: fn(Vec<(String, Value)>) -> Value,
    },
}

/// One expanded output of a provider.
#[derive(Clone)]
pub struct OutputSpec {
    pub(crate) key: TypeKey,
    pub(crate) kind: OutputKind,
    /// Field path from the factory's return value, for struct-out sugar.
    pub(crate) access: Vec<&'static str>,
    pub(crate) casts: Vec<InterfaceCast>,
}

impl OutputSpec {
    fn new(key: TypeKey, kind: OutputKind) -> Self {
        Self {
            key,
            kind,
            access: Vec::new(),
            casts: Vec::new(),
        }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }
}

/// The expanded output list of one factory return type.
#[derive(Clone, Default)]
pub struct OutputShape {
    pub(crate) outputs: Vec<OutputSpec>,
    pub(crate) reject: Option<&'static str>,
}

impl OutputShape {
    pub fn single(key: TypeKey) -> Self {
        Self {
            outputs: vec![OutputSpec::new(key, OutputKind::Plain)],
            reject: None,
        }
    }

    pub fn group_element<T: Providable>() -> Self {
        Self {
            outputs: vec![OutputSpec::new(
                T::key(),
                OutputKind::GroupElement {
                    slice: TypeKey::of::<Vec<T>>(),
                    build_slice: build_slice_value::<T>,
                },
            )],
            reject: None,
        }
    }

    pub fn group_elements<T: Providable>() -> Self {
        Self {
            outputs: vec![OutputSpec::new(
                TypeKey::of::<Vec<T>>(),
                OutputKind::GroupElements {
                    elem: T::key(),
                    slice: TypeKey::of::<Vec<T>>(),
                    build_slice: build_slice_value::<T>,
                    split: split_slice_value::<T>,
                },
            )],
            reject: None,
        }
    }

    pub fn one_per_module_element<T: Providable>() -> Self {
        Self {
            outputs: vec![OutputSpec::new(
                T::key(),
                OutputKind::OnePerModuleElement {
                    map: TypeKey::of::<BTreeMap<String, T>>(),
                    build_map: build_map_value::<T>,
                },
            )],
            reject: None,
        }
    }

    pub fn rejected(reason: &'static str) -> Self {
        Self {
            outputs: Vec::new(),
            reject: Some(reason),
        }
    }

    /// Starts an empty struct-out expansion.
    pub fn bundle() -> Self {
        Self {
            outputs: Vec::new(),
            reject: None,
        }
    }

    /// Appends the outputs of one struct-out field.
    pub fn push_field<T: Providable>(&mut self, name: &'static str) {
        let shape = T::output_shape();
        if let Some(reason) = shape.reject {
            self.reject = Some(reason);
            return;
        }
        for mut spec in shape.outputs {
            spec.access.insert(0, name);
            self.outputs.push(spec);
        }
    }

    /// Records that the (single) output type also satisfies an interface.
    pub fn with_cast(mut self, cast: InterfaceCast) -> Self {
        if let Some(out) = self.outputs.first_mut() {
            out.casts.push(cast);
        }
        self
    }
}

/// How a recorded interface cast is rendered in generated code.
#[derive(Clone, Copy, Debug)]
pub enum CastStyle {
    /// `Arc::new(expr)` — the concrete value is boxed into the interface.
    ArcNew,
    /// `expr as Type` — the value is an `Arc` already and only coerces.
    Coerce,
}

/// A registration-time record that a concrete type satisfies an interface.
///
/// This is what the container consults in place of runtime trait queries:
/// a consumer asking for the interface resolves the concrete type and runs
/// the cast, and code emission renders the matching expression.
#[derive(Clone, Copy)]
pub struct InterfaceCast {
    pub(crate) iface: TypeKey,
    pub(crate) cast: fn(Value) -> Value,
    pub(crate) style: CastStyle,
}

impl InterfaceCast {
    pub fn new<I: ?Sized + 'static>(cast: fn(Value) -> Value, style: CastStyle) -> Self {
        Self {
            iface: TypeKey::of::<I>(),
            cast,
            style,
        }
    }

    pub fn iface(&self) -> TypeKey {
        self.iface
    }
}

fn build_slice_value<T: Providable>(values: Vec<Value>) -> Value {
    let items: Vec<T> = values.into_iter().map(Value::take).collect();
    Value::new(items)
}

fn split_slice_value<T: Providable>(value: Value) -> Vec<Value> {
    value.take::<Vec<T>>().into_iter().map(Value::new).collect()
}

fn build_map_value<T: Providable>(entries: Vec<(String, Value)>) -> Value {
    let map: BTreeMap<String, T> = entries
        .into_iter()
        .map(|(name, value)| (name, value.take()))
        .collect();
    Value::new(map)
}

/// A type the container can resolve and provide.
///
/// The default methods describe an ordinary concrete type: requested
/// directly, provided as a single output, with no literal form. Collection
/// shapes, optional inputs, module keys and struct sugar override the
/// relevant methods; `#[derive(Providable)]` and its attributes generate
/// those overrides.
pub trait Providable: Clone + Send + Sync + 'static {
    fn key() -> TypeKey {
        TypeKey::of::<Self>()
    }

    /// The expanded inputs this type contributes as one factory argument.
    fn input_shape() -> InputShape {
        InputShape::plain(Self::key())
    }

    /// Reassembles the argument from its resolved slots. `None` slots are
    /// optional inputs that had no resolver.
    fn from_resolved(slots: &mut dyn Iterator<Item = Option<Value>>) -> Self {
        match slots.next() {
            Some(Some(value)) => value.take(),
            _ => unreachable!("a required input should have been resolved"),
        }
    }

    /// Builds the generated-code expression for this argument from the
    /// expressions of its resolved slots.
    fn arg_expr(slots: &[Option<Expr>], gen: &mut FileGen) -> Result<Expr, CodegenError> {
        let _ = gen;
        match slots.first() {
            Some(Some(expr)) => Ok(codegen::clone_expr(expr)),
            _ => unreachable!("a required input should have an expression"),
        }
    }

    /// The expanded outputs this type contributes as a factory return type.
    fn output_shape() -> OutputShape {
        OutputShape::single(Self::key())
    }

    /// Splits a returned value into one [`Value`] per expanded output.
    fn into_values(self) -> Vec<Value> {
        vec![Value::new(self)]
    }

    /// A literal expression reproducing `self` in generated code.
    fn value_expr(&self, gen: &mut FileGen) -> Result<Expr, CodegenError> {
        let _ = gen;
        UnrepresentableValueSnafu {
            type_name: Self::key().name(),
        }
        .fail()
    }
}

/// Marker for types any number of providers may output, consumed as `Vec<T>`.
pub trait ManyPerContainer: Providable {}

/// Marker for types each module outputs at most once, consumed as
/// `BTreeMap<String, T>`.
pub trait OnePerModule: Providable {}

impl<T: Providable> Providable for Option<T> {
    fn input_shape() -> InputShape {
        let mut shape = T::input_shape();
        for spec in &mut shape.inputs {
            spec.optional = true;
        }
        shape
    }

    fn from_resolved(slots: &mut dyn Iterator<Item = Option<Value>>) -> Self {
        match slots.next() {
            Some(Some(value)) => Some(value.take()),
            Some(None) => None,
            None => unreachable!("an optional input should still occupy a slot"),
        }
    }

    fn arg_expr(slots: &[Option<Expr>], gen: &mut FileGen) -> Result<Expr, CodegenError> {
        match slots.first() {
            Some(Some(_)) => {
                let inner = T::arg_expr(slots, gen)?;
                Ok(syn::parse_quote!(Some(#inner)))
            }
            _ => Ok(syn::parse_quote!(None)),
        }
    }

    fn output_shape() -> OutputShape {
        OutputShape::rejected("an optional value cannot be provided")
    }

    fn value_expr(&self, gen: &mut FileGen) -> Result<Expr, CodegenError> {
        match self {
            Some(inner) => {
                let expr = inner.value_expr(gen)?;
                Ok(syn::parse_quote!(Some(#expr)))
            }
            None => Ok(syn::parse_quote!(None)),
        }
    }
}

impl<T: ManyPerContainer> Providable for Vec<T> {
    fn input_shape() -> InputShape {
        InputShape::slice_of_group(Self::key(), T::key())
    }

    fn output_shape() -> OutputShape {
        OutputShape::group_elements::<T>()
    }

    fn value_expr(&self, gen: &mut FileGen) -> Result<Expr, CodegenError> {
        let items = self
            .iter()
            .map(|item| item.value_expr(gen))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(syn::parse_quote!(vec![#(#items),*]))
    }
}

impl<T: OnePerModule> Providable for BTreeMap<String, T> {
    fn input_shape() -> InputShape {
        InputShape::map_of_one_per_module(Self::key(), T::key())
    }

    fn output_shape() -> OutputShape {
        OutputShape::rejected("a one-per-module map is assembled by the container")
    }
}

impl Providable for ModuleKey {
    fn input_shape() -> InputShape {
        InputShape::module_key(Self::key())
    }

    fn output_shape() -> OutputShape {
        OutputShape::rejected("a module key is assigned by the container")
    }
}

impl Providable for OwnModuleKey {
    fn input_shape() -> InputShape {
        InputShape::own_module_key(<Self as Providable>::key())
    }

    fn output_shape() -> OutputShape {
        OutputShape::rejected("a module key is assigned by the container")
    }
}

macro_rules! impl_providable_numeric {
    ($($ty:ty),* $(,)?) => {$(
        impl Providable for $ty {
            fn value_expr(&self, _gen: &mut FileGen) -> Result<Expr, CodegenError> {
                let value = self;
                Ok(syn::parse_quote!(#value))
            }
        }
    )*};
}

impl_providable_numeric!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
);

impl Providable for String {
    fn value_expr(&self, _gen: &mut FileGen) -> Result<Expr, CodegenError> {
        let lit = self.as_str();
        Ok(syn::parse_quote!(#lit.to_string()))
    }
}

impl Providable for &'static str {
    fn value_expr(&self, _gen: &mut FileGen) -> Result<Expr, CodegenError> {
        let value = *self;
        Ok(syn::parse_quote!(#value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_shape_succeeds() {
        let shape = i32::input_shape();
        assert_eq!(shape.inputs.len(), 1);
        assert_eq!(shape.inputs[0].key, TypeKey::of::<i32>());
        assert!(!shape.inputs[0].optional);
        assert!(matches!(shape.inputs[0].kind, InputKind::Plain));
    }

    #[test]
    fn optional_shape_marks_inner_spec() {
        let shape = Option::<String>::input_shape();
        assert_eq!(shape.inputs.len(), 1);
        assert_eq!(shape.inputs[0].key, TypeKey::of::<String>());
        assert!(shape.inputs[0].optional);
    }

    #[test]
    fn optional_from_resolved_yields_value_or_none() {
        let mut present = vec![Some(Value::new(3i32))].into_iter();
        assert_eq!(Option::<i32>::from_resolved(&mut present), Some(3));

        let mut absent = Vec::<Option<Value>>::from([None]).into_iter();
        assert_eq!(Option::<i32>::from_resolved(&mut absent), None);
    }

    #[test]
    fn module_key_cannot_be_output() {
        assert!(ModuleKey::output_shape().reject.is_some());
        assert!(OwnModuleKey::output_shape().reject.is_some());
    }

    #[test]
    fn struct_in_field_expansion_tags_names() {
        let mut shape = InputShape::empty();
        shape.push_field::<i32>("count", false);
        shape.push_field::<String>("label", true);

        assert_eq!(shape.inputs.len(), 2);
        assert_eq!(shape.inputs[0].field, Some("count"));
        assert!(!shape.inputs[0].optional);
        assert_eq!(shape.inputs[1].field, Some("label"));
        assert!(shape.inputs[1].optional);
    }
}
