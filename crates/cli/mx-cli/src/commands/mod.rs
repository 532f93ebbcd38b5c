//! `expand`, `walk` and `check`

pub mod check;
pub mod expand;
pub mod walk;

use crate::input::InputFile;
use mx_driver::{Driver, ExpansionConfig};
use mx_intern::Interner;
use tracing::warn;

/// Driver with every readable definition of `input` registered
fn load(input: &InputFile, config: ExpansionConfig) -> Driver {
    let driver = Driver::new(config, Interner::new());
    for (spec, error) in input.define_all(&driver) {
        warn!(macro_name = spec.display_name(), %error, "skipping definition");
    }
    driver
}

/// `path!(body)` for headers
fn call_text(path: &str, body: &str) -> String {
    format!("{path}!({body})")
}
