mod compare;
mod extract;
mod query;

pub use compare::*;
pub use extract::*;
pub use query::*;

use crate::config::Opts;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> anyhow::Result<()>;
}
