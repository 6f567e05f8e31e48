use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use solder::config::{
    bind_interface, bind_interface_in_module, configs, error, invoke_in_module, provide,
    provide_in_module, supply, Config,
};
use solder::container::registry::ConfigError;
use solder::container::solver::ResolveError;
use solder::key::ModuleKey;
use solder::{inject, Error, In, Out, Providable};

fn one() -> Result<i32, Infallible> {
    Ok(1)
}

fn widen(x: i32) -> Result<f64, Infallible> {
    Ok(f64::from(x))
}

fn render(x: f64) -> Result<String, Infallible> {
    Ok(format!("{x:.6}"))
}

fn chain_config() -> Config {
    configs([provide(one), provide(widen), provide(render)])
}

#[test]
fn simple_chain_resolves_transitively() {
    let mut out = String::new();
    inject(chain_config(), &mut out).unwrap();
    assert_eq!(out, "1.000000");
}

#[test]
fn repeated_builds_with_identical_config_agree() {
    let mut first = String::new();
    inject(chain_config(), &mut first).unwrap();
    let mut second = String::new();
    inject(chain_config(), &mut second).unwrap();
    assert_eq!(first, second);
}

#[test]
fn duplicate_provision_reports_both_locations() {
    fn zero() -> Result<i32, Infallible> {
        Ok(0)
    }

    let mut out = 0i32;
    let err = inject(configs([provide(zero), provide(one)]), &mut out).unwrap_err();
    match err {
        Error::Config {
            source: ConfigError::Duplicate { first, second, .. },
            ..
        } => {
            assert!(first.contains("zero"), "first was {first}");
            assert!(second.contains("one"), "second was {second}");
        }
        other => panic!("expected a duplicate error, got {other}"),
    }
}

#[derive(Clone, Out)]
struct Pair {
    int: i32,
    text: String,
}

#[test]
fn cyclic_graph_fails_with_a_cycle_error() {
    fn make_pair(x: f64) -> Result<Pair, Infallible> {
        Ok(Pair {
            int: x as i32,
            text: format!("{x}"),
        })
    }

    let mut out = String::new();
    let err = inject(configs([provide(widen), provide(make_pair)]), &mut out).unwrap_err();
    match err {
        Error::Resolve {
            source: ResolveError::Cycle { stack, .. },
            ..
        } => assert!(stack.contains("make_pair"), "stack was {stack}"),
        other => panic!("expected a cycle error, got {other}"),
    }
}

#[derive(Clone, Providable)]
#[providable(many_per_container)]
struct ManyInt(i32);

#[test]
fn many_per_container_aggregates_in_registration_order() {
    fn first() -> Result<ManyInt, Infallible> {
        Ok(ManyInt(3))
    }
    fn second() -> Result<ManyInt, Infallible> {
        Ok(ManyInt(4))
    }
    fn rest() -> Result<Vec<ManyInt>, Infallible> {
        Ok(vec![ManyInt(5), ManyInt(6)])
    }
    fn digits(xs: Vec<ManyInt>) -> Result<String, Infallible> {
        Ok(xs.iter().map(|x| x.0.to_string()).collect())
    }

    let mut out = String::new();
    inject(
        configs([
            provide(first),
            provide(second),
            provide(rest),
            provide(digits),
        ]),
        &mut out,
    )
    .unwrap();
    assert_eq!(out, "3456");
}

#[test]
fn many_per_container_element_is_rejected_as_direct_input() {
    fn first() -> Result<ManyInt, Infallible> {
        Ok(ManyInt(3))
    }
    fn misuse(x: ManyInt) -> Result<String, Infallible> {
        Ok(x.0.to_string())
    }

    let mut out = String::new();
    let err = inject(configs([provide(first), provide(misuse)]), &mut out).unwrap_err();
    assert!(matches!(
        err,
        Error::Config {
            source: ConfigError::BadInputType { .. },
            ..
        }
    ));
}

#[derive(Clone, Debug, PartialEq, Providable)]
#[providable(one_per_module)]
struct Opm(i32);

#[test]
fn one_per_module_collects_into_a_map_keyed_by_module() {
    fn in_a() -> Result<Opm, Infallible> {
        Ok(Opm(3))
    }
    fn in_b() -> Result<Opm, Infallible> {
        Ok(Opm(4))
    }
    fn total(map: BTreeMap<String, Opm>) -> Result<String, Infallible> {
        Ok(map.values().map(|o| o.0).sum::<i32>().to_string())
    }

    let mut out = String::new();
    let mut map = BTreeMap::new();
    inject(
        configs([
            provide_in_module("a", in_a),
            provide_in_module("b", in_b),
            provide(total),
        ]),
        (&mut out, &mut map),
    )
    .unwrap();
    assert_eq!(out, "7");
    assert_eq!(
        map,
        BTreeMap::from([
            (String::from("a"), Opm(3)),
            (String::from("b"), Opm(4)),
        ])
    );
}

#[test]
fn one_per_module_outside_a_module_is_out_of_scope() {
    fn stray() -> Result<Opm, Infallible> {
        Ok(Opm(1))
    }

    let mut map = BTreeMap::<String, Opm>::new();
    let err = inject(provide(stray), &mut map).unwrap_err();
    assert!(matches!(
        err,
        Error::Config {
            source: ConfigError::OutOfScope { .. },
            ..
        }
    ));
}

static OBSERVED: Mutex<Option<(i32, Option<String>)>> = Mutex::new(None);

#[test]
fn invoker_runs_after_resolution_with_optional_inputs() {
    fn key_len(key: ModuleKey) -> Result<i32, Infallible> {
        Ok(key.name().len() as i32)
    }
    fn observe(len: i32, text: Option<String>) -> Result<(), Infallible> {
        *OBSERVED.lock().unwrap() = Some((len, text));
        Ok(())
    }

    inject(
        configs([provide(key_len), invoke_in_module("test", observe)]),
        (),
    )
    .unwrap();
    assert_eq!(*OBSERVED.lock().unwrap(), Some((4, None)));
}

#[test]
fn module_key_outside_a_module_fails() {
    fn key_len(key: ModuleKey) -> Result<i32, Infallible> {
        Ok(key.name().len() as i32)
    }

    let mut out = 0i32;
    let err = inject(provide(key_len), &mut out).unwrap_err();
    assert!(matches!(
        err,
        Error::Resolve {
            source: ResolveError::NoModuleScope { .. },
            ..
        }
    ));
}

trait Duck: Send + Sync + 'static {
    fn quack(&self) -> String;
}

solder::declare_interface!(dyn Duck);

#[derive(Clone, Providable)]
#[providable(implements(dyn Duck))]
struct Mallard;

impl Duck for Mallard {
    fn quack(&self) -> String {
        String::from("mallard")
    }
}

#[derive(Clone, Providable)]
#[providable(implements(dyn Duck))]
struct Canvasback;

impl Duck for Canvasback {
    fn quack(&self) -> String {
        String::from("canvasback")
    }
}

fn make_mallard() -> Result<Mallard, Infallible> {
    Ok(Mallard)
}

fn make_canvasback() -> Result<Canvasback, Infallible> {
    Ok(Canvasback)
}

fn speak(duck: Arc<dyn Duck>) -> Result<String, Infallible> {
    Ok(duck.quack())
}

#[test]
fn single_implementer_binds_implicitly() {
    let mut out = String::new();
    inject(configs([provide(make_mallard), provide(speak)]), &mut out).unwrap();
    assert_eq!(out, "mallard");
}

#[test]
fn two_implementers_without_a_binding_are_ambiguous() {
    let mut out = String::new();
    let err = inject(
        configs([provide(make_mallard), provide(make_canvasback), provide(speak)]),
        &mut out,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        Error::Resolve {
            source: ResolveError::MultipleImplicitBindings { .. },
            ..
        }
    ));
}

#[test]
fn explicit_binding_selects_an_implementation() {
    let mut out = String::new();
    inject(
        configs([
            provide(make_mallard),
            provide(make_canvasback),
            provide(speak),
            bind_interface::<Arc<dyn Duck>, Canvasback>(),
        ]),
        &mut out,
    )
    .unwrap();
    assert_eq!(out, "canvasback");
}

#[derive(Clone, Providable)]
struct ScopedQuack(String);

#[test]
fn module_scoped_binding_overrides_the_global_one() {
    fn speak_in_module(duck: Arc<dyn Duck>) -> Result<ScopedQuack, Infallible> {
        Ok(ScopedQuack(duck.quack()))
    }

    let mut global = String::new();
    let mut scoped = ScopedQuack(String::new());
    inject(
        configs([
            provide(make_mallard),
            provide(make_canvasback),
            provide(speak),
            provide_in_module("pond", speak_in_module),
            bind_interface::<Arc<dyn Duck>, Mallard>(),
            bind_interface_in_module::<Arc<dyn Duck>, Canvasback>("pond"),
        ]),
        (&mut global, &mut scoped),
    )
    .unwrap();
    assert_eq!(global, "mallard");
    assert_eq!(scoped.0, "canvasback");
}

#[test]
fn binding_to_an_unregistered_implementation_fails() {
    let mut out = String::new();
    let err = inject(
        configs([
            provide(make_mallard),
            provide(speak),
            bind_interface::<Arc<dyn Duck>, Canvasback>(),
        ]),
        &mut out,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        Error::Resolve {
            source: ResolveError::ExplicitBindingNotFound { .. },
            ..
        }
    ));
}

#[test]
fn supply_and_provide_of_one_type_collide() {
    let mut out = 0i32;
    let err = inject(configs([supply(3i32), provide(one)]), &mut out).unwrap_err();
    assert!(matches!(
        err,
        Error::Config {
            source: ConfigError::Duplicate { .. },
            ..
        }
    ));
}

#[test]
fn optional_absence_yields_the_zero_value() {
    fn describe(x: Option<i32>) -> Result<String, Infallible> {
        Ok(match x {
            Some(x) => format!("got {x}"),
            None => String::from("nothing"),
        })
    }

    let mut out = String::new();
    inject(provide(describe), &mut out).unwrap();
    assert_eq!(out, "nothing");
}

#[test]
fn each_provider_is_called_at_most_once_per_build() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counted() -> Result<i32, Infallible> {
        CALLS.fetch_add(1, Ordering::SeqCst);
        Ok(5)
    }
    fn left(x: i32) -> Result<f64, Infallible> {
        Ok(f64::from(x))
    }
    fn both(x: i32, y: f64) -> Result<String, Infallible> {
        Ok(format!("{x}{y}"))
    }

    let mut out = String::new();
    inject(
        configs([provide(counted), provide(left), provide(both)]),
        &mut out,
    )
    .unwrap();
    assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    assert_eq!(out, "55");
}

#[test]
fn provider_errors_carry_the_failing_location() {
    fn boom() -> Result<i32, std::io::Error> {
        Err(std::io::Error::other("boom"))
    }

    let mut out = 0i32;
    let err = inject(provide(boom), &mut out).unwrap_err();
    match err {
        Error::Resolve {
            source: ResolveError::ProviderError { location, .. },
            ..
        } => assert!(location.name().contains("boom")),
        other => panic!("expected a provider error, got {other}"),
    }
}

#[test]
fn unresolvable_inputs_format_the_resolve_stack() {
    let mut out = String::new();
    let err = inject(configs([provide(widen), provide(render)]), &mut out).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("while resolving"), "message was {message}");
    assert!(message.contains("i32"), "message was {message}");
}

#[test]
fn forced_config_error_fails_the_build() {
    let mut out = 0i32;
    let err = inject(configs([supply(1i32), error("refused")]), &mut out).unwrap_err();
    assert!(matches!(
        err,
        Error::Config {
            source: ConfigError::Supplied { .. },
            ..
        }
    ));
}

#[derive(Clone, In)]
struct Deps {
    count: i32,
    #[solder(optional)]
    label: String,
}

#[test]
fn struct_in_expands_fields_with_optional_defaults() {
    fn compose(deps: Deps) -> Result<String, Infallible> {
        Ok(format!("{}#{}", deps.label, deps.count))
    }

    let mut out = String::new();
    inject(configs([supply(7i32), provide(compose)]), &mut out).unwrap();
    assert_eq!(out, "#7");
}

#[test]
fn struct_out_provides_each_field() {
    fn make_both() -> Result<Pair, Infallible> {
        Ok(Pair {
            int: 9,
            text: String::from("nine"),
        })
    }
    fn join(x: i32, text: String) -> Result<f64, Infallible> {
        let _ = text;
        Ok(f64::from(x))
    }

    let mut out = 0f64;
    inject(configs([provide(make_both), provide(join)]), &mut out).unwrap();
    assert_eq!(out, 9.0);
}
