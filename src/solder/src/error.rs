use snafu::prelude::*;

use crate::codegen::CodegenError;
use crate::container::registry::ConfigError;
use crate::container::solver::ResolveError;

/// Any failure of a build: configuration, resolution or code emission.
/// All are fatal for the enclosing build; nothing partial is returned.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(context(false), display("{source}"))]
    #[non_exhaustive]
    Config { source: ConfigError },

    #[snafu(context(false), display("{source}"))]
    #[non_exhaustive]
    Resolve { source: ResolveError },

    #[snafu(context(false), display("{source}"))]
    #[non_exhaustive]
    Codegen { source: CodegenError },
}
