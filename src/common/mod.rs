//! Common functionality.

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

/// Commonly used command line arguments.
#[derive(Parser, Debug)]
pub struct Args {
    /// Verbosity of the program
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            verbose: Verbosity::new(0, 0),
        }
    }
}

/// The version of the `synteny-server-worker` package.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Punctuation characters the search tokenizer treats as whitespace.
///
/// This is the separator set of the search index; the loader and the
/// name-search services must split on exactly these characters so stored
/// tokens and query tokens line up.
pub const TOKEN_SEPARATORS: &str = ",.<>{}[]\"':;!@#$%^&*()-+=~";

/// Split free text into lowercased tokens on whitespace and the fixed
/// punctuation set.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || TOKEN_SEPARATORS.contains(c))
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}
