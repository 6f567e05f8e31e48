use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Error, Fields, FieldsNamed, Ident, Result, Type};

use crate::attrs;

fn named_fields(input: &DeriveInput, derive: &str) -> Result<FieldsNamed> {
    match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => Ok(fields.clone()),
            _ => Err(Error::new_spanned(
                &input.ident,
                format!("#[derive({derive})] requires named fields"),
            )),
        },
        _ => Err(Error::new_spanned(
            &input.ident,
            format!("#[derive({derive})] only applies to structs"),
        )),
    }
}

fn reject_generics(input: &DeriveInput) -> Result<()> {
    if input.generics.params.is_empty() {
        Ok(())
    } else {
        Err(Error::new_spanned(
            &input.generics,
            "generic types cannot be derived as providable",
        ))
    }
}

pub(crate) fn expand_providable(input: DeriveInput) -> Result<TokenStream> {
    reject_generics(&input)?;
    let parsed = attrs::parse_providable_attrs(&input.attrs)?;
    let name = &input.ident;

    let mut methods = TokenStream::new();
    let mut extra = TokenStream::new();

    if parsed.many_per_container {
        methods.extend(quote! {
            fn input_shape() -> ::solder::provider::InputShape {
                ::solder::provider::InputShape::group_element(
                    <Self as ::solder::provider::Providable>::key(),
                )
            }

            fn output_shape() -> ::solder::provider::OutputShape {
                ::solder::provider::OutputShape::group_element::<Self>()
            }
        });
        extra.extend(quote! {
            impl ::solder::provider::ManyPerContainer for #name {}
        });
    } else if parsed.one_per_module {
        methods.extend(quote! {
            fn input_shape() -> ::solder::provider::InputShape {
                ::solder::provider::InputShape::one_per_module_element(
                    <Self as ::solder::provider::Providable>::key(),
                )
            }

            fn output_shape() -> ::solder::provider::OutputShape {
                ::solder::provider::OutputShape::one_per_module_element::<Self>()
            }
        });
        extra.extend(quote! {
            impl ::solder::provider::OnePerModule for #name {}
        });
    } else if !parsed.implements.is_empty() {
        let casts = parsed.implements.iter().map(|iface| {
            quote! {
                .with_cast(::solder::provider::InterfaceCast::new::<
                    ::std::sync::Arc<#iface>,
                >(
                    {
                        fn cast(value: ::solder::provider::Value) -> ::solder::provider::Value {
                            let concrete: #name = value.take();
                            ::solder::provider::Value::new::<::std::sync::Arc<#iface>>(
                                ::std::sync::Arc::new(concrete),
                            )
                        }
                        cast
                    },
                    ::solder::provider::CastStyle::ArcNew,
                ))
            }
        });
        methods.extend(quote! {
            fn output_shape() -> ::solder::provider::OutputShape {
                ::solder::provider::OutputShape::single(
                    <Self as ::solder::provider::Providable>::key(),
                )
                #(#casts)*
            }
        });
    }

    if parsed.expressible {
        let fields = named_fields(&input, "Providable")?;
        let field_inits = fields.named.iter().map(|field| {
            let ident = field.ident.as_ref().expect("named field");
            let label = ident.to_string();
            quote! {
                (#label, ::solder::provider::Providable::value_expr(&self.#ident, gen)?)
            }
        });
        methods.extend(quote! {
            fn value_expr(
                &self,
                gen: &mut ::solder::codegen::FileGen,
            ) -> ::std::result::Result<::solder::codegen::Expr, ::solder::codegen::CodegenError>
            {
                gen.struct_literal(
                    <Self as ::solder::provider::Providable>::key(),
                    ::std::vec![#(#field_inits),*],
                )
            }
        });
    }

    if parsed.shared {
        extra.extend(quote! {
            impl ::solder::provider::Providable for ::std::sync::Arc<#name> {}
        });
    }

    Ok(quote! {
        impl ::solder::provider::Providable for #name {
            #methods
        }

        #extra
    })
}

struct InField {
    ident: Ident,
    ty: Type,
    optional: bool,
}

pub(crate) fn expand_in(input: DeriveInput) -> Result<TokenStream> {
    reject_generics(&input)?;
    let fields = named_fields(&input, "In")?;
    let name = &input.ident;

    let mut parsed = Vec::new();
    for field in &fields.named {
        parsed.push(InField {
            ident: field.ident.clone().expect("named field"),
            ty: field.ty.clone(),
            optional: attrs::field_is_optional(field)?,
        });
    }

    let shape_fields = parsed.iter().map(|field| {
        let ty = &field.ty;
        let label = field.ident.to_string();
        let optional = field.optional;
        quote! {
            shape.push_field::<#ty>(#label, #optional);
        }
    });

    let resolve_fields = parsed.iter().map(|field| {
        let ident = &field.ident;
        let ty = &field.ty;
        if field.optional {
            quote! {
                #ident: match slots.next() {
                    ::std::option::Option::Some(::std::option::Option::Some(value)) => value.take(),
                    _ => ::std::default::Default::default(),
                },
            }
        } else {
            quote! {
                #ident: <#ty as ::solder::provider::Providable>::from_resolved(slots),
            }
        }
    });

    let expr_fields = parsed.iter().map(|field| {
        let ty = &field.ty;
        let label = field.ident.to_string();
        if field.optional {
            quote! {
                {
                    let expr = match slots[at].as_ref() {
                        ::std::option::Option::Some(expr) => ::solder::codegen::clone_expr(expr),
                        ::std::option::Option::None => ::solder::codegen::default_expr(),
                    };
                    fields.push((#label, expr));
                    at += 1;
                }
            }
        } else {
            quote! {
                {
                    let len = <#ty as ::solder::provider::Providable>::input_shape().inputs.len();
                    fields.push((
                        #label,
                        <#ty as ::solder::provider::Providable>::arg_expr(&slots[at..at + len], gen)?,
                    ));
                    at += len;
                }
            }
        }
    });

    Ok(quote! {
        impl ::solder::provider::Providable for #name {
            fn input_shape() -> ::solder::provider::InputShape {
                let mut shape = ::solder::provider::InputShape::empty();
                #(#shape_fields)*
                shape
            }

            fn from_resolved(
                slots: &mut dyn ::std::iter::Iterator<
                    Item = ::std::option::Option<::solder::provider::Value>,
                >,
            ) -> Self {
                Self {
                    #(#resolve_fields)*
                }
            }

            fn arg_expr(
                slots: &[::std::option::Option<::solder::codegen::Expr>],
                gen: &mut ::solder::codegen::FileGen,
            ) -> ::std::result::Result<::solder::codegen::Expr, ::solder::codegen::CodegenError>
            {
                let mut at = 0usize;
                let mut fields = ::std::vec::Vec::new();
                #(#expr_fields)*
                let _ = at;
                gen.struct_literal(<Self as ::solder::provider::Providable>::key(), fields)
            }

            fn output_shape() -> ::solder::provider::OutputShape {
                ::solder::provider::OutputShape::rejected(
                    "a struct-in bundle gathers inputs and cannot be provided",
                )
            }
        }
    })
}

pub(crate) fn expand_out(input: DeriveInput) -> Result<TokenStream> {
    reject_generics(&input)?;
    let fields = named_fields(&input, "Out")?;
    let name = &input.ident;

    let mut idents = Vec::new();
    let mut types = Vec::new();
    for field in &fields.named {
        idents.push(field.ident.clone().expect("named field"));
        types.push(field.ty.clone());
    }
    let labels: Vec<String> = idents.iter().map(Ident::to_string).collect();

    Ok(quote! {
        impl ::solder::provider::Providable for #name {
            fn output_shape() -> ::solder::provider::OutputShape {
                let mut shape = ::solder::provider::OutputShape::bundle();
                #(shape.push_field::<#types>(#labels);)*
                shape
            }

            fn into_values(self) -> ::std::vec::Vec<::solder::provider::Value> {
                let mut values = ::std::vec::Vec::new();
                #(values.extend(
                    <#types as ::solder::provider::Providable>::into_values(self.#idents),
                );)*
                values
            }
        }
    })
}
