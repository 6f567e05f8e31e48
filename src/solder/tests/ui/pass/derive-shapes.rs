use solder::prelude::*;

#[derive(Clone, Providable)]
pub struct Plain {
    pub value: i32,
}

#[derive(Clone, Providable)]
#[providable(shared)]
pub struct Shared {
    pub value: i32,
}

#[derive(Clone, Providable)]
#[providable(many_per_container)]
pub struct Route(pub String);

#[derive(Clone, Providable)]
#[providable(one_per_module)]
pub struct Migration(pub String);

#[derive(Clone, Providable)]
#[providable(expressible)]
pub struct Settings {
    pub retries: i32,
    pub name: String,
}

pub trait Store: Send + Sync + 'static {
    fn name(&self) -> &str;
}

solder::declare_interface!(dyn Store);

#[derive(Clone, Providable)]
#[providable(implements(dyn Store))]
pub struct MemoryStore;

impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }
}

#[derive(Clone, In)]
pub struct Inputs {
    pub plain: Plain,
    #[solder(optional)]
    pub label: String,
    pub routes: Vec<Route>,
}

#[derive(Clone, Out)]
pub struct Outputs {
    pub plain: Plain,
    pub label: String,
}

fn main() {}
